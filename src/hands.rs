use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::dom;
use crate::errors::PageError;
use crate::page::Page;
use crate::types::{ELEMENT_WAIT_MS, NAVIGATION_TIMEOUT_MS};

/// How the browser is obtained.
#[derive(Debug, Clone, Default)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Browser WebSocket URL (`ws://…/devtools/browser/<id>`) of an already
    /// running Chrome. See [`resolve_attach_endpoint`] for HTTP endpoints.
    pub attach: Option<String>,
}

/// `/json/version` address for an HTTP DevTools endpoint, or `None` when
/// the endpoint already is a WebSocket URL.
fn version_url(endpoint: &str) -> Option<String> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        return None;
    }
    let base = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    };
    Some(format!("{base}/json/version"))
}

fn websocket_url(body: &str) -> Option<String> {
    let version: serde_json::Value = serde_json::from_str(body).ok()?;
    version
        .get("webSocketDebuggerUrl")?
        .as_str()
        .map(str::to_string)
}

/// Turn `http://127.0.0.1:9222` (or bare `127.0.0.1:9222`) into the
/// browser WebSocket URL `Browser::connect` expects. WebSocket URLs pass
/// through unchanged.
pub async fn resolve_attach_endpoint(endpoint: &str) -> Result<String, PageError> {
    let Some(url) = version_url(endpoint) else {
        return Ok(endpoint.trim().to_string());
    };
    let browser_error = |e: reqwest::Error| PageError::Browser(format!("{url}: {e}"));
    let body = reqwest::get(&url)
        .await
        .map_err(browser_error)?
        .text()
        .await
        .map_err(browser_error)?;
    websocket_url(&body)
        .ok_or_else(|| PageError::Browser(format!("{url} has no webSocketDebuggerUrl")))
}

/// Browser session owning the one tab all records are filled in.
pub struct BrowserSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    /// Blocking; run it under `spawn_blocking`.
    pub fn launch(options: &BrowserOptions) -> Result<Self, PageError> {
        if let Some(endpoint) = &options.attach {
            tracing::info!(%endpoint, "attaching to existing Chrome");
            match Browser::connect(endpoint.clone()) {
                Ok(browser) => {
                    let existing = browser
                        .get_tabs()
                        .lock()
                        .map_err(|e| PageError::Browser(format!("tab list poisoned: {e}")))?
                        .first()
                        .cloned();
                    let tab = match existing {
                        Some(t) => t,
                        None => browser.new_tab()?,
                    };
                    return Ok(Self { _browser: browser, tab });
                }
                Err(e) => {
                    tracing::warn!(%endpoint, error = %e, "could not attach, launching a new Chrome");
                }
            }
        }

        let launch = LaunchOptions {
            headless: options.headless,
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-blink-features=AutomationControlled"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(600),
            ..Default::default()
        };

        tracing::info!(headless = options.headless, "starting Chrome");
        let browser = Browser::new(launch)
            .map_err(|e| PageError::Browser(format!("browser launch failed: {e:#}")))?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        tracing::info!("Chrome ready");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }

    pub fn page(&self) -> ChromePage {
        ChromePage::new(Arc::clone(&self.tab))
    }
}

/// [`Page`] backed by a headless_chrome tab. The tab API is synchronous,
/// so every call hops onto the blocking pool.
pub struct ChromePage {
    tab: Arc<Tab>,
    element_wait: Duration,
    navigation_timeout: Duration,
}

impl ChromePage {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self {
            tab,
            element_wait: Duration::from_millis(ELEMENT_WAIT_MS),
            navigation_timeout: Duration::from_millis(NAVIGATION_TIMEOUT_MS),
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, PageError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, PageError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&*tab))
            .await
            .map_err(|e| PageError::Browser(format!("browser task failed: {e}")))?
    }

    /// Wait for `selector` to appear, then run a status-returning script.
    async fn run_checked(
        &self,
        selector: &str,
        wanted: &str,
        script: String,
    ) -> Result<(), PageError> {
        let wait = self.element_wait;
        let selector = selector.to_string();
        let wanted = wanted.to_string();
        self.blocking(move |tab| {
            wait_for(tab, &selector, wait)?;
            let status = eval(tab, &script)?;
            dom::check_status(status.as_str(), &selector, &wanted)
        })
        .await
    }
}

fn eval(tab: &Tab, script: &str) -> Result<serde_json::Value, PageError> {
    let result = tab.evaluate(script, false)?;
    Ok(result.value.unwrap_or(serde_json::Value::Null))
}

fn wait_for(tab: &Tab, selector: &str, wait: Duration) -> Result<(), PageError> {
    tab.wait_for_element_with_custom_timeout(selector, wait)
        .map(|_| ())
        .map_err(|_| PageError::NotFound(selector.to_string()))
}

#[async_trait]
impl Page for ChromePage {
    async fn navigate(&self, url: &str) -> Result<(), PageError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
    }

    /// Document complete and no new resource entries for 500ms.
    async fn wait_for_network_idle(&self) -> Result<(), PageError> {
        let limit = self.navigation_timeout;
        self.blocking(move |tab| {
            let quiet = Duration::from_millis(500);
            let poll = Duration::from_millis(100);
            let start = Instant::now();
            let mut last_count = None;
            let mut stable_since = Instant::now();

            while start.elapsed() < limit {
                let raw = eval(tab, dom::NETWORK_STATE_JS)?;
                if let Some((ready, count)) = dom::parse_network_state(raw.as_str()) {
                    if last_count != Some(count) {
                        last_count = Some(count);
                        stable_since = Instant::now();
                    } else if ready && stable_since.elapsed() >= quiet {
                        return Ok(());
                    }
                }
                std::thread::sleep(poll);
            }
            Err(PageError::Timeout {
                what: "network idle".to_string(),
                millis: limit.as_millis(),
            })
        })
        .await
    }

    async fn inner_html(&self, selector: &str) -> Result<String, PageError> {
        let selector = selector.to_string();
        self.blocking(move |tab| match eval(tab, &dom::inner_html_script(&selector))? {
            serde_json::Value::String(html) => Ok(html),
            _ => Err(PageError::NotFound(selector)),
        })
        .await
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, PageError> {
        let script = script.to_string();
        self.blocking(move |tab| eval(tab, &script)).await
    }

    async fn tag_name(&self, selector: &str, timeout: Duration) -> Result<String, PageError> {
        let owned = selector.to_string();
        let probe = self.blocking(move |tab| {
            wait_for(tab, &owned, timeout)?;
            match eval(tab, &dom::tag_name_script(&owned))? {
                serde_json::Value::String(tag) => Ok(tag.to_ascii_uppercase()),
                _ => Err(PageError::NotFound(owned)),
            }
        });
        // The blocking wait honours `timeout` too; this bounds the hop itself.
        tokio::time::timeout(timeout + Duration::from_millis(250), probe)
            .await
            .map_err(|_| PageError::Timeout {
                what: format!("tag name of `{selector}`"),
                millis: timeout.as_millis(),
            })?
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.run_checked(selector, value, dom::fill_script(selector, value))
            .await
    }

    async fn select_option_by_label(&self, selector: &str, label: &str) -> Result<(), PageError> {
        self.run_checked(selector, label, dom::select_script(selector, label, true))
            .await
    }

    async fn select_option_by_value(&self, selector: &str, value: &str) -> Result<(), PageError> {
        self.run_checked(selector, value, dom::select_script(selector, value, false))
            .await
    }

    async fn click(&self, selector: &str) -> Result<(), PageError> {
        let wait = self.element_wait;
        let selector = selector.to_string();
        self.blocking(move |tab| {
            let el = tab
                .wait_for_element_with_custom_timeout(&selector, wait)
                .map_err(|_| PageError::NotFound(selector.clone()))?;
            el.click()?;
            Ok(())
        })
        .await
    }
}
