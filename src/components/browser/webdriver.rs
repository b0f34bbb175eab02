use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;
use url::Url;

use super::{BrowserSession, RemoteBrowser};
use crate::error::{session_error, JobResult};

/// W3C key under which element references are returned
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Delay between element lookups while waiting for a selector
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Connection details shared by the browser and its sessions
#[derive(Debug)]
struct Endpoint {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

/// Outcome of a WebDriver command that reached the server
enum Reply {
    Value(Value),
    Failure { status: StatusCode, error: String, message: String },
}

impl Endpoint {
    fn url(&self, segments: &[&str]) -> JobResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| session_error("WebDriver URL cannot be a base"))?
            .pop_if_empty()
            .extend(segments);
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("token", key);
        }
        Ok(url)
    }

    async fn command(&self, method: Method, segments: &[&str], body: Option<Value>) -> JobResult<Reply> {
        let url = self.url(segments)?;
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| session_error(&format!("WebDriver endpoint unreachable: {}", e)))?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|e| session_error(&format!("Unreadable WebDriver response (HTTP {}): {}", status, e)))?;
        let value = payload.get("value").cloned().unwrap_or(Value::Null);

        if status.is_success() {
            return Ok(Reply::Value(value));
        }

        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error").to_string();
        let message = value.get("message").and_then(Value::as_str).unwrap_or_default().to_string();
        Ok(Reply::Failure { status, error, message })
    }

    async fn expect_value(&self, method: Method, segments: &[&str], body: Option<Value>) -> JobResult<Value> {
        match self.command(method, segments, body).await? {
            Reply::Value(value) => Ok(value),
            Reply::Failure { status, error, message } => Err(session_error(&format!(
                "WebDriver command {} failed: HTTP {} - {} {}",
                segments.last().copied().unwrap_or("session"),
                status,
                error,
                message
            ))),
        }
    }
}

/// Remote browser reached through a WebDriver endpoint
#[derive(Debug, Clone)]
pub struct WebDriverBrowser {
    endpoint: Arc<Endpoint>,
    poll_interval: Duration,
}

impl WebDriverBrowser {
    /// Create a browser for `webdriver_url`; `api_key` is sent as the `token` query parameter
    pub fn new(webdriver_url: &str, api_key: Option<String>) -> JobResult<Self> {
        let base_url = Url::parse(webdriver_url)
            .map_err(|e| session_error(&format!("Invalid WebDriver URL '{}': {}", webdriver_url, e)))?;

        Ok(Self {
            endpoint: Arc::new(Endpoint {
                client: Client::new(),
                base_url,
                api_key,
            }),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override how often the page is polled while waiting for an element
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[async_trait]
impl RemoteBrowser for WebDriverBrowser {
    async fn open_session(&self) -> JobResult<Box<dyn BrowserSession>> {
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": ["--headless=new", "--no-sandbox"] }
                }
            }
        });

        let value = self
            .endpoint
            .expect_value(Method::POST, &["session"], Some(capabilities))
            .await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| session_error("WebDriver did not return a session id"))?
            .to_string();

        Ok(Box::new(WebDriverSession {
            endpoint: Arc::clone(&self.endpoint),
            session_id,
            poll_interval: self.poll_interval,
        }))
    }
}

/// A live WebDriver session
#[derive(Debug)]
pub struct WebDriverSession {
    endpoint: Arc<Endpoint>,
    session_id: String,
    poll_interval: Duration,
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    fn id(&self) -> &str {
        &self.session_id
    }

    async fn navigate(&self, url: &str) -> JobResult<()> {
        debug!(url, "Navigating");
        self.endpoint
            .expect_value(Method::POST, &["session", &self.session_id, "url"], Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> JobResult<String> {
        let deadline = Instant::now() + timeout;
        let query = json!({ "using": "css selector", "value": selector });

        loop {
            let reply = self
                .endpoint
                .command(Method::POST, &["session", &self.session_id, "element"], Some(query.clone()))
                .await?;

            match reply {
                Reply::Value(value) => {
                    return value
                        .get(ELEMENT_KEY)
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| session_error("WebDriver returned an element without a reference"));
                }
                Reply::Failure { error, .. } if error == "no such element" => {
                    if Instant::now() >= deadline {
                        return Err(session_error(&format!(
                            "Timed out after {:?} waiting for '{}'",
                            timeout, selector
                        )));
                    }
                    sleep(self.poll_interval).await;
                }
                Reply::Failure { status, error, message } => {
                    return Err(session_error(&format!(
                        "Element lookup failed: HTTP {} - {} {}",
                        status, error, message
                    )));
                }
            }
        }
    }

    async fn outer_html(&self, element: &str) -> JobResult<String> {
        let value = self
            .endpoint
            .expect_value(
                Method::GET,
                &["session", &self.session_id, "element", element, "property", "outerHTML"],
                None,
            )
            .await?;

        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| session_error("outerHTML was not a string"))
    }

    async fn close(&self) -> JobResult<()> {
        self.endpoint
            .expect_value(Method::DELETE, &["session", &self.session_id], None)
            .await?;
        Ok(())
    }
}
