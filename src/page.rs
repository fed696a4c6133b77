use async_trait::async_trait;
use std::time::Duration;

use crate::errors::PageError;

/// The live page the actions are applied to.
///
/// Every operation either succeeds or returns a [`PageError`]; callers
/// decide which failures are fatal.
#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), PageError>;

    async fn wait_for_network_idle(&self) -> Result<(), PageError>;

    async fn inner_html(&self, selector: &str) -> Result<String, PageError>;

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, PageError>;

    /// Upper-case tag name of the first match, bounded by `timeout`.
    async fn tag_name(&self, selector: &str, timeout: Duration) -> Result<String, PageError>;

    async fn fill(&self, selector: &str, value: &str) -> Result<(), PageError>;

    async fn select_option_by_label(&self, selector: &str, label: &str) -> Result<(), PageError>;

    async fn select_option_by_value(&self, selector: &str, value: &str) -> Result<(), PageError>;

    async fn click(&self, selector: &str) -> Result<(), PageError>;
}
