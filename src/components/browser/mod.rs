//! Remote browser sessions used to render the vendor's schedule page.

mod webdriver;

pub use webdriver::{WebDriverBrowser, WebDriverSession};

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::JobResult;

/// A remote browser service able to open page sessions
#[async_trait]
pub trait RemoteBrowser: Send + Sync {
    /// Establish a new session
    async fn open_session(&self) -> JobResult<Box<dyn BrowserSession>>;
}

/// One live remote page. Must be closed by the caller.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    fn id(&self) -> &str;

    /// Navigate the page to `url`
    async fn navigate(&self, url: &str) -> JobResult<()>;

    /// Wait until an element matching `selector` is present, returning its reference
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> JobResult<String>;

    /// Serialized markup of a previously located element
    async fn outer_html(&self, element: &str) -> JobResult<String>;

    /// Release the remote session
    async fn close(&self) -> JobResult<()>;
}

/// Open a session, capture the markup of `selector` on `url`, and release the
/// session whatever the outcome.
pub async fn capture_markup(
    browser: &dyn RemoteBrowser,
    url: &str,
    selector: &str,
    timeout: Duration,
) -> JobResult<String> {
    let session = browser.open_session().await?;
    info!(session = session.id(), "Browser session opened");

    let result = capture_in_session(session.as_ref(), url, selector, timeout).await;

    match session.close().await {
        Ok(()) => debug!(session = session.id(), "Browser session released"),
        Err(e) => warn!(session = session.id(), "Failed to release browser session: {}", e),
    }

    result
}

async fn capture_in_session(
    session: &dyn BrowserSession,
    url: &str,
    selector: &str,
    timeout: Duration,
) -> JobResult<String> {
    session.navigate(url).await?;
    let element = session.wait_for_selector(selector, timeout).await?;
    let markup = session.outer_html(&element).await?;
    info!(bytes = markup.len(), "Captured schedule markup");
    Ok(markup)
}
