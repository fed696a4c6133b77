//! JavaScript evaluated inside the page by the Chrome-backed [`Page`].
//!
//! Scripts never throw: they report outcomes as short status strings so a
//! failed lookup comes back as data rather than as a protocol exception.
//! Selectors and values are embedded as JSON string literals.
//!
//! [`Page`]: crate::page::Page

use crate::errors::PageError;

/// Fill a text-like control through the native value setter, then fire
/// `input` and `change` so framework-managed forms notice the edit.
const FILL_JS: &str = r#"
(() => {
  const el = document.querySelector(__SELECTOR__);
  if (!el) return 'not-found';
  const tag = el.tagName;
  const blocked = ['checkbox','radio','file','submit','button','image','reset','hidden'];
  const isInput = tag === 'INPUT' && !blocked.includes((el.type || 'text').toLowerCase());
  const editable = el.isContentEditable && tag !== 'INPUT' && tag !== 'TEXTAREA';
  if (!isInput && tag !== 'TEXTAREA' && !editable) return 'not-fillable';
  el.focus();
  if (editable) {
    el.textContent = __VALUE__;
  } else {
    const proto = tag === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, __VALUE__);
  }
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return 'ok';
})()
"#;

const SELECT_JS: &str = r#"
(() => {
  const el = document.querySelector(__SELECTOR__);
  if (!el) return 'not-found';
  if (el.tagName !== 'SELECT') return 'not-select';
  const wanted = __VALUE__;
  const opt = [...el.options].find(o => __BY_LABEL__ ? o.label === wanted || o.text === wanted : o.value === wanted);
  if (!opt) return 'no-option';
  el.value = opt.value;
  opt.selected = true;
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
  return 'ok';
})()
"#;

const TAG_NAME_JS: &str = r#"
(() => {
  const el = document.querySelector(__SELECTOR__);
  return el ? el.tagName : null;
})()
"#;

const HIGHLIGHT_JS: &str = r#"
(() => {
  const el = document.querySelector(__SELECTOR__);
  if (el) el.style.border = '2px solid red';
  return !!el;
})()
"#;

const INNER_HTML_JS: &str = r#"
(() => {
  const el = document.querySelector(__SELECTOR__);
  return el ? el.innerHTML : null;
})()
"#;

/// Document readiness plus the number of resources fetched so far. The
/// network is considered idle once the count stops moving.
pub const NETWORK_STATE_JS: &str =
    "JSON.stringify([document.readyState, performance.getEntriesByType('resource').length])";

fn literal(s: &str) -> String {
    // Serialising a &str cannot fail.
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Single-pass placeholder substitution, so substituted text is never rescanned.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;
    'scan: while !rest.is_empty() {
        for (key, value) in vars {
            if let Some(after) = rest.strip_prefix(key) {
                out.push_str(value);
                rest = after;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }
    out
}

pub fn fill_script(selector: &str, value: &str) -> String {
    render(
        FILL_JS,
        &[("__SELECTOR__", literal(selector).as_str()), ("__VALUE__", literal(value).as_str())],
    )
}

pub fn select_script(selector: &str, wanted: &str, by_label: bool) -> String {
    render(
        SELECT_JS,
        &[
            ("__SELECTOR__", literal(selector).as_str()),
            ("__VALUE__", literal(wanted).as_str()),
            ("__BY_LABEL__", if by_label { "true" } else { "false" }),
        ],
    )
}

pub fn tag_name_script(selector: &str) -> String {
    render(TAG_NAME_JS, &[("__SELECTOR__", literal(selector).as_str())])
}

pub fn highlight_script(selector: &str) -> String {
    render(HIGHLIGHT_JS, &[("__SELECTOR__", literal(selector).as_str())])
}

pub fn inner_html_script(selector: &str) -> String {
    render(INNER_HTML_JS, &[("__SELECTOR__", literal(selector).as_str())])
}

/// Map a status string returned by [`fill_script`] or [`select_script`].
pub fn check_status(status: Option<&str>, selector: &str, wanted: &str) -> Result<(), PageError> {
    match status {
        Some("ok") => Ok(()),
        Some("not-found") => Err(PageError::NotFound(selector.to_string())),
        Some("not-fillable") => Err(PageError::NotFillable(selector.to_string())),
        Some("not-select") => Err(PageError::NotSelect(selector.to_string())),
        Some("no-option") => Err(PageError::NoOption(wanted.to_string(), selector.to_string())),
        other => Err(PageError::Script(format!(
            "unexpected script result {other:?} for `{selector}`"
        ))),
    }
}

/// Parse [`NETWORK_STATE_JS`] output into `(ready, resource_count)`.
pub fn parse_network_state(raw: Option<&str>) -> Option<(bool, u64)> {
    let (state, count): (String, u64) = serde_json::from_str(raw?).ok()?;
    Some((state == "complete", count))
}
