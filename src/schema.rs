//! Tolerant extraction of an [`ActionPlan`] from raw model output.
//!
//! The model is asked for strict JSON but routinely wraps it in markdown
//! fences, nests the list under an arbitrary key, or emits a few malformed
//! entries. Each of those is handled here so the rest of the pipeline only
//! ever sees validated actions.

use serde_json::Value;

use crate::errors::SchemaError;
use crate::records::json_kind;
use crate::types::{Action, ActionPlan};

/// Remove a leading ```` ```json ```` marker and a trailing ```` ``` ````
/// marker. Each side is handled independently.
pub fn strip_fences(raw: &str) -> &str {
    let text = raw.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Locate the array of candidate actions in a response.
pub fn extract_candidates(raw: &str) -> Result<Vec<Value>, SchemaError> {
    let parsed: Value = serde_json::from_str(strip_fences(raw))?;
    match parsed {
        Value::Array(items) => Ok(items),
        Value::Object(map) => map
            .into_iter()
            .find_map(|(_, v)| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })
            .ok_or(SchemaError::NoArray),
        other => Err(SchemaError::UnsupportedShape(json_kind(&other))),
    }
}

/// Validate one candidate element. `None` means the element is dropped.
pub fn validate_action(candidate: &Value) -> Option<Action> {
    let obj = candidate.as_object()?;

    let selector = obj
        .get("selector")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?
        .to_string();

    let kind = match obj.get("type") {
        None | Some(Value::Null) => "fill".to_string(),
        Some(Value::String(s)) => s.trim().to_ascii_lowercase(),
        Some(_) => return None,
    };

    match kind.as_str() {
        "fill" => {
            let value = match obj.get("value")? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some(Action::Fill { selector, value })
        }
        "click" => Some(Action::Click { selector }),
        _ => None,
    }
}

/// Normalise any model response into a plan. Never fails: unusable
/// responses yield an empty plan and a warning.
pub fn plan_from_response(raw: &str) -> ActionPlan {
    let candidates = match extract_candidates(raw) {
        Ok(c) => c,
        Err(e) => {
            let preview: String = raw.chars().take(200).collect();
            tracing::warn!(error = %e, response = %preview, "discarding model response");
            return ActionPlan::empty();
        }
    };

    let total = candidates.len();
    let actions: Vec<Action> = candidates
        .iter()
        .enumerate()
        .filter_map(|(i, c)| {
            let action = validate_action(c);
            if action.is_none() {
                tracing::warn!(index = i, candidate = %c, "dropping malformed action");
            }
            action
        })
        .collect();

    if actions.len() < total {
        tracing::debug!(kept = actions.len(), total, "validated action plan");
    }
    ActionPlan::from(actions)
}
