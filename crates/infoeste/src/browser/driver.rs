//! The capability boundary between the pipeline and a real browser.
//!
//! Every method is blocking; [`super::SessionManager`] runs them on the
//! blocking pool with a timeout.

use super::config::BrowserConfig;
use crate::error::ScrapeError;
use std::time::Duration;

/// Starts browser sessions.
pub trait BrowserDriver: Send + Sync + 'static {
    type Session: BrowserSession;

    /// Launches a browser and opens the page it will be driven through.
    ///
    /// Anything created before a failure must be released before returning.
    fn launch(&self, config: &BrowserConfig) -> Result<Self::Session, ScrapeError>;
}

/// One browser process plus its single page.
pub trait BrowserSession: Send + Sync + 'static {
    /// Navigates to `url` and waits for the load to settle.
    fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Reloads the current page and waits for the load to settle.
    fn reload(&self, timeout: Duration) -> Result<(), ScrapeError>;

    /// Waits for `selector` to match in the top-level document.
    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), ScrapeError>;

    /// Evaluates a script in the page and returns its value as JSON.
    fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScrapeError>;

    fn close_page(&self) -> Result<(), ScrapeError>;

    fn close(&self) -> Result<(), ScrapeError>;
}
