use thiserror::Error;

/// Diagnostic emitted when a fill targets something that cannot hold a value.
/// Fill errors carrying it are considered explained and are not retried.
pub const NOT_FILLABLE_DIAGNOSTIC: &str = "element is not a fillable input";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no model API key found; set OPENROUTER_API_KEY (or OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("invalid setting `{name}`: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("no content in model response: {0}")]
    MissingContent(String),
}

/// Failures raised by the page collaborator.
#[derive(Debug, Clone, Error)]
pub enum PageError {
    #[error("no element matches selector `{0}`")]
    NotFound(String),

    #[error("element is not a fillable input: `{0}`")]
    NotFillable(String),

    #[error("element `{0}` is not a <select>")]
    NotSelect(String),

    #[error("no option matching {0:?} in `{1}`")]
    NoOption(String, String),

    #[error("timed out after {millis}ms: {what}")]
    Timeout { what: String, millis: u128 },

    #[error("script error: {0}")]
    Script(String),

    #[error("browser error: {0}")]
    Browser(String),
}

impl PageError {
    pub fn is_not_fillable(&self) -> bool {
        self.to_string().contains(NOT_FILLABLE_DIAGNOSTIC)
    }
}

impl From<anyhow::Error> for PageError {
    fn from(e: anyhow::Error) -> Self {
        PageError::Browser(format!("{e:#}"))
    }
}

/// Failure of a single action. Never aborts the surrounding plan.
#[derive(Debug, Clone, Error)]
pub enum ActionError {
    #[error("click on `{selector}` failed: {source}")]
    Click { selector: String, source: PageError },

    #[error("fill on `{selector}` failed: {source}")]
    Fill { selector: String, source: PageError },

    #[error("select on `{selector}` failed (by label: {by_label}; by value: {by_value})")]
    Select {
        selector: String,
        by_label: PageError,
        by_value: PageError,
    },
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("model response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("model response object has no array-valued property")]
    NoArray,

    #[error("model response is a JSON {0}, expected an array or object")]
    UnsupportedShape(&'static str),
}
