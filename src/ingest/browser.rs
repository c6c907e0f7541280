// src/ingest/browser.rs
//! Headless browser capability used by the source adapters.
//!
//! Adapters only see [`BrowserLauncher`] / [`BrowserSession`]. The production
//! implementation talks the W3C WebDriver wire protocol (JSON over HTTP) to a running
//! chromedriver / selenium endpoint, so no browser bindings are linked into the crate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

pub type BrowserResult<T> = std::result::Result<T, BrowserError>;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("WebDriver error ({error}): {message}")]
    WebDriver { error: String, message: String },

    #[error("Unexpected WebDriver response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for BrowserError {
    fn from(err: reqwest::Error) -> Self {
        BrowserError::Network(err.to_string())
    }
}

impl BrowserError {
    /// True when the browser session itself is gone (crashed or closed). Detected by
    /// message inspection, since drivers report it as `invalid session id`.
    pub fn is_session_lost(&self) -> bool {
        self.to_string()
            .to_ascii_lowercase()
            .contains("invalid session id")
    }
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> BrowserResult<()>;
    async fn page_source(&self) -> BrowserResult<String>;
    async fn execute(&self, script: &str) -> BrowserResult<Value>;
    /// Release the browser. Calling it more than once is a no-op.
    async fn quit(&self) -> BrowserResult<()>;
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserSession>>;
}

/// Current `document.body.scrollHeight`.
pub async fn scroll_height(session: &dyn BrowserSession) -> BrowserResult<u64> {
    let v = session
        .execute("return document.body.scrollHeight;")
        .await?;
    v.as_u64()
        .or_else(|| v.as_f64().map(|f| f.max(0.0) as u64))
        .ok_or_else(|| BrowserError::Protocol(format!("scrollHeight is not a number: {v}")))
}

pub async fn scroll_to_bottom(session: &dyn BrowserSession) -> BrowserResult<()> {
    session
        .execute("window.scrollTo(0, document.body.scrollHeight);")
        .await
        .map(|_| ())
}

// ------------------------------------------------------------
// WebDriver implementation
// ------------------------------------------------------------

pub struct WebDriverLauncher {
    client: reqwest::Client,
    base_url: String,
    capabilities: Value,
}

impl WebDriverLauncher {
    pub fn new(base_url: &str, headless: bool, extra_args: &[String]) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .context("building webdriver http client")?;

        let mut args: Vec<String> = Vec::new();
        if headless {
            args.push("--headless".to_string());
        }
        args.push("--no-sandbox".to_string());
        args.push("--disable-dev-shm-usage".to_string());
        args.extend(extra_args.iter().cloned());

        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args },
                    "timeouts": { "pageLoad": 60_000, "script": 30_000 }
                }
            }
        });

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            capabilities,
        })
    }
}

#[async_trait]
impl BrowserLauncher for WebDriverLauncher {
    async fn launch(&self) -> BrowserResult<Box<dyn BrowserSession>> {
        let resp = self
            .client
            .post(format!("{}/session", self.base_url))
            .json(&self.capabilities)
            .send()
            .await?;
        let value = unwrap_value(resp).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| BrowserError::Protocol(format!("no sessionId in {value}")))?
            .to_string();

        tracing::debug!(target: "ingest", %session_id, "webdriver session started");

        Ok(Box::new(WebDriverSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            session_id,
            closed: AtomicBool::new(false),
        }))
    }
}

pub struct WebDriverSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
    closed: AtomicBool,
}

impl WebDriverSession {
    fn session_url(&self) -> String {
        format!("{}/session/{}", self.base_url, self.session_id)
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    async fn goto(&self, url: &str) -> BrowserResult<()> {
        let resp = self
            .client
            .post(format!("{}/url", self.session_url()))
            .json(&json!({ "url": url }))
            .send()
            .await?;
        unwrap_value(resp).await.map(|_| ())
    }

    async fn page_source(&self) -> BrowserResult<String> {
        let resp = self
            .client
            .get(format!("{}/source", self.session_url()))
            .send()
            .await?;
        match unwrap_value(resp).await? {
            Value::String(s) => Ok(s),
            other => Err(BrowserError::Protocol(format!(
                "page source is not a string: {other}"
            ))),
        }
    }

    async fn execute(&self, script: &str) -> BrowserResult<Value> {
        let resp = self
            .client
            .post(format!("{}/execute/sync", self.session_url()))
            .json(&json!({ "script": script, "args": [] }))
            .send()
            .await?;
        unwrap_value(resp).await
    }

    async fn quit(&self) -> BrowserResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let resp = self.client.delete(self.session_url()).send().await?;
        unwrap_value(resp).await.map(|_| ())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Not quit explicitly (panic or early drop): close it in the background.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            let url = self.session_url();
            handle.spawn(async move {
                if let Err(e) = client.delete(&url).send().await {
                    tracing::warn!(target: "ingest", error = %e, "webdriver session cleanup failed");
                }
            });
        }
    }
}

/// WebDriver wraps every payload as `{"value": ...}`; errors carry `value.error`.
async fn unwrap_value(resp: reqwest::Response) -> BrowserResult<Value> {
    let status = resp.status();
    let body: Value = resp.json().await?;
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(BrowserError::WebDriver { error, message });
    }

    Ok(value)
}
