use crate::brain::{DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::errors::ConfigError;
use crate::types::{MAX_MARKUP_CHARS, Timings};

pub const DEFAULT_TARGET_URL: &str = "https://fs1.formsite.com/res/showFormEmbed?EParam=B6fiTn-RcO5Oi8C4iSTjsq4WXqv4L_Qk&748593425&EmbedId=748593425";

/// Environment variables consulted for the model API key, in order.
pub const API_KEY_VARS: [&str; 2] = ["OPENROUTER_API_KEY", "OPENAI_API_KEY"];

/// Everything a run needs, passed explicitly instead of read from globals.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub default_url: String,
    pub max_markup_chars: usize,
    pub timings: Timings,
}

/// Optional overrides, typically from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_base: Option<String>,
    pub model: Option<String>,
    pub default_url: Option<String>,
    pub max_markup_chars: Option<usize>,
}

impl Settings {
    /// Resolve settings; `lookup` reads environment variables.
    pub fn resolve(
        overrides: Overrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = API_KEY_VARS
            .iter()
            .filter_map(|&name| lookup(name))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let max_markup_chars = overrides.max_markup_chars.unwrap_or(MAX_MARKUP_CHARS);
        if max_markup_chars == 0 {
            return Err(ConfigError::Invalid {
                name: "max_markup_chars",
                reason: "must be greater than zero".into(),
            });
        }

        let default_url = overrides
            .default_url
            .unwrap_or_else(|| DEFAULT_TARGET_URL.to_string());
        if !(default_url.starts_with("http://") || default_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "url",
                reason: format!("`{default_url}` is not an http(s) address"),
            });
        }

        Ok(Self {
            api_key,
            api_base: overrides
                .api_base
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: overrides.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            default_url,
            max_markup_chars,
            timings: Timings::default(),
        })
    }

    pub fn from_env(overrides: Overrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |name| std::env::var(name).ok())
    }
}
