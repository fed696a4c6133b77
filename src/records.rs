use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Reserved key carrying a per-record override of the target address.
pub const URL_KEY: &str = "url";

pub const DEFAULT_INPUT_FILE: &str = "form_data.json";

/// One form submission's worth of field values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// The record's own address when it carries a non-empty one, else `default`.
    pub fn navigation_target<'a>(&'a self, default: &'a str) -> &'a str {
        match self.0.get(URL_KEY).and_then(Value::as_str) {
            Some(url) if !url.trim().is_empty() => url.trim(),
            _ => default,
        }
    }

    /// Every field except the reserved navigation key, in input order.
    pub fn fillable_fields(&self) -> Map<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| k.as_str() != URL_KEY)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Short human label for log lines.
    pub fn label(&self) -> String {
        ["First Name", "first_name", "name", "Name", "email", "Email"]
            .iter()
            .find_map(|k| self.0.get(*k).and_then(Value::as_str))
            .unwrap_or("entry")
            .to_string()
    }
}

/// Normalise an arbitrary JSON document into records.
///
/// An array yields one record per object element (other elements are
/// skipped); a bare object is a single record; anything else is empty.
pub fn records_from_value(value: Value) -> Vec<Record> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| match item {
                Value::Object(fields) => Some(Record(fields)),
                other => {
                    tracing::warn!(index = i, kind = %json_kind(&other), "skipping non-object entry");
                    None
                }
            })
            .collect(),
        Value::Object(fields) => vec![Record(fields)],
        other => {
            tracing::warn!(kind = %json_kind(&other), "input is neither an array nor an object");
            Vec::new()
        }
    }
}

/// Load records from a JSON file. A missing or unreadable file is an empty batch.
pub fn load_records(path: impl AsRef<Path>) -> Vec<Record> {
    let path = path.as_ref();
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read input file");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Value>(&content) {
        Ok(value) => records_from_value(value),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "input file is not valid JSON");
            Vec::new()
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
