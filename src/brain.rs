use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::errors::ModelError;
use crate::records::Record;
use crate::schema;
use crate::types::{ActionPlan, MAX_MARKUP_CHARS};

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

const SYSTEM_PROMPT: &str = "You are a helpful automation assistant returning raw JSON.";

/// One completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    /// Ask the provider for a JSON-object response.
    pub json_output: bool,
}

/// Anything that can turn a request into the completion's text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError>;
}

#[async_trait]
impl<T: ModelClient + ?Sized> ModelClient for Arc<T> {
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError> {
        (**self).complete(request).await
    }
}

/// OpenAI-compatible chat completions client (OpenRouter by default).
pub struct OpenRouterClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl ModelClient for OpenRouterClient {
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError> {
        let mut body = json!({
            "model": &request.model,
            "messages": [
                {"role": "system", "content": &request.system},
                {"role": "user", "content": &request.user},
            ],
        });
        if request.json_output {
            body["response_format"] = json!({"type": "json_object"});
        }

        tracing::debug!(model = %request.model, prompt_chars = request.user.len(), "sending model request");

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", "http://localhost:3000")
            .header("X-Title", "FormPilot")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        completion_content(status.as_u16(), &body)
    }
}

/// Pull the completion text out of a chat-completions response body.
/// Non-2xx statuses keep their code even when the body is not JSON.
fn completion_content(status: u16, body: &str) -> Result<String, ModelError> {
    let parsed = serde_json::from_str::<Value>(body).ok();

    if !(200..300).contains(&status) {
        let message = parsed
            .as_ref()
            .and_then(|v| v["error"]["message"].as_str())
            .map(str::to_string)
            .unwrap_or_else(|| match body.trim() {
                "" => "empty response body".to_string(),
                raw => raw.to_string(),
            });
        return Err(ModelError::Api { status, message });
    }

    let Some(json_resp) = parsed else {
        return Err(ModelError::MissingContent(body.to_string()));
    };
    json_resp["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ModelError::MissingContent(json_resp.to_string()))
}

/// Longest prefix of `markup` holding at most `max_chars` characters.
pub fn truncate_markup(markup: &str, max_chars: usize) -> &str {
    match markup.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &markup[..byte_idx],
        None => markup,
    }
}

/// The user prompt for one record against one page.
pub fn build_prompt(markup: &str, fields: &Map<String, Value>) -> String {
    let data = serde_json::to_string_pretty(fields).unwrap_or_else(|_| "{}".to_string());
    format!(
        r##"You are an expert browser automation agent.

TASK:
Produce the actions that fill the form below with this data:
{data}

HTML CONTEXT:
```html
{markup}
```

REQUIREMENTS:
1. Return strictly a JSON object, no markdown, shaped like:
   {{"actions": [
       {{"selector": "#name", "value": "John", "type": "fill"}},
       {{"selector": "#submit", "type": "click"}}
   ]}}
2. One action per form control that should receive a value.
3. Use "fill" to enter text. Every "fill" needs a "value".
4. For dropdowns (<select>), use "fill" with the EXACT VISIBLE TEXT of the option.
5. Use "click" for buttons, checkboxes and radio buttons.
6. Find the submit control and click it as the LAST action.
7. For dates, prefer filling the text input if one exists.
8. Selectors must be valid CSS selectors that match the HTML above."##
    )
}

/// Turns page markup plus a record into a validated [`ActionPlan`].
pub struct PlanGenerator<C> {
    client: C,
    model: String,
    max_markup_chars: usize,
}

impl<C: ModelClient> PlanGenerator<C> {
    pub fn new(client: C, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_markup_chars: MAX_MARKUP_CHARS,
        }
    }

    pub fn with_max_markup_chars(mut self, max_chars: usize) -> Self {
        self.max_markup_chars = max_chars;
        self
    }

    /// Never fails: model errors and unusable responses yield an empty plan.
    pub async fn generate(&self, markup: &str, record: &Record) -> ActionPlan {
        let markup = truncate_markup(markup, self.max_markup_chars);
        let request = ModelRequest {
            model: self.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            user: build_prompt(markup, &record.fillable_fields()),
            json_output: true,
        };

        tracing::info!(model = %self.model, markup_chars = markup.chars().count(), "asking model for an action plan");

        match self.client.complete(request).await {
            Ok(content) => {
                tracing::debug!(response = %content, "model replied");
                schema::plan_from_response(&content)
            }
            Err(e) => {
                tracing::warn!(error = %e, "model call failed, using an empty plan");
                ActionPlan::empty()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedModel;
    use super::*;
    use crate::types::Action;

    fn record(value: Value) -> Record {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn truncation_is_a_character_prefix() {
        assert_eq!(truncate_markup("abcdef", 3), "abc");
        assert_eq!(truncate_markup("abc", 10), "abc");
        assert_eq!(truncate_markup("ñañaña", 4), "ñaña");
    }

    #[test]
    fn long_markup_is_cut_to_exactly_the_limit() {
        let markup = format!("{}{}", "a".repeat(MAX_MARKUP_CHARS), "TAIL");
        let cut = truncate_markup(&markup, MAX_MARKUP_CHARS);
        assert_eq!(cut.chars().count(), MAX_MARKUP_CHARS);
        assert_eq!(cut, &markup[..MAX_MARKUP_CHARS]);
    }

    #[test]
    fn prompt_embeds_record_as_pretty_json() {
        let fields = record(json!({"First Name": "Ada", "url": "https://x"})).fillable_fields();
        let prompt = build_prompt("<form></form>", &fields);
        assert!(prompt.contains("{\n  \"First Name\": \"Ada\"\n}"));
        assert!(prompt.contains("<form></form>"));
        assert!(!prompt.contains("https://x"));
    }

    #[tokio::test]
    async fn generator_sends_truncated_markup_and_parses_reply() {
        let model = Arc::new(ScriptedModel::replying(vec![Ok(
            r##"{"actions": [{"selector": "#first", "value": "Ada"}, {"selector": "#go", "type": "click"}]}"##
                .to_string(),
        )]));
        let generator = PlanGenerator::new(Arc::clone(&model), "test-model").with_max_markup_chars(10);

        let plan = generator
            .generate("<form>0123456789</form>", &record(json!({"First Name": "Ada"})))
            .await;

        assert_eq!(
            plan,
            ActionPlan::from(vec![Action::fill("#first", "Ada"), Action::click("#go")])
        );
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "test-model");
        assert!(requests[0].json_output);
        assert!(requests[0].user.contains("```html\n<form>0123\n```"));
    }

    #[tokio::test]
    async fn model_failure_yields_empty_plan() {
        let model = ScriptedModel::replying(vec![Err(ModelError::Api {
            status: 401,
            message: "invalid key".into(),
        })]);
        let generator = PlanGenerator::new(model, DEFAULT_MODEL);
        let plan = generator.generate("<form/>", &record(json!({"a": "b"}))).await;
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn unparseable_reply_yields_empty_plan() {
        let model = ScriptedModel::replying(vec![Ok("I cannot help with that.".into())]);
        let generator = PlanGenerator::new(model, DEFAULT_MODEL);
        assert!(generator.generate("<form/>", &Record::default()).await.is_empty());
    }

    #[test]
    fn completion_content_is_extracted() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "[]"}}]}"#;
        assert_eq!(completion_content(200, body).unwrap(), "[]");
    }

    #[test]
    fn api_error_message_is_used_when_present() {
        let body = r#"{"error": {"message": "invalid key"}}"#;
        match completion_content(401, body) {
            Err(ModelError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid key");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn non_json_error_body_keeps_the_status() {
        match completion_content(502, "<html>Bad Gateway</html>") {
            Err(ModelError::Api { status, message }) => {
                assert_eq!(status, 502);
                assert_eq!(message, "<html>Bad Gateway</html>");
            }
            other => panic!("expected api error, got {other:?}"),
        }
        assert!(matches!(
            completion_content(503, ""),
            Err(ModelError::Api { status: 503, .. })
        ));
    }

    #[test]
    fn success_without_content_is_missing_content() {
        assert!(matches!(
            completion_content(200, r#"{"choices": []}"#),
            Err(ModelError::MissingContent(_))
        ));
        assert!(matches!(
            completion_content(200, "not json"),
            Err(ModelError::MissingContent(_))
        ));
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        let client = OpenRouterClient::new("https://openrouter.ai/api/v1/", "k");
        assert_eq!(client.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
    }
}
