//! In-process stand-in for a browser, driven by the scripts the crate sends.

use super::config::BrowserConfig;
use super::driver::{BrowserDriver, BrowserSession};
use crate::error::ScrapeError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared state behind every session a [`FakeDriver`] launches.
#[derive(Default)]
pub struct FakeBrowser {
    pub launches: AtomicUsize,
    /// Number of upcoming launches that fail
    pub failing_launches: AtomicUsize,
    launch_delay: Mutex<Duration>,
    navigations: Mutex<Vec<String>>,
    pub reloads: AtomicUsize,
    pub snapshots: AtomicUsize,
    pub closed_pages: AtomicUsize,
    pub closed_browsers: AtomicUsize,
    pub fail_close: AtomicBool,
    pub fail_navigation: AtomicBool,
    /// Every page call fails as if the browser process died
    pub connection_lost: AtomicBool,
    navigate_delay: Mutex<Duration>,
    close_delay: Mutex<Duration>,
    /// Selectors or option values the page does not have
    missing: Mutex<Vec<String>>,
    /// JSON string returned by the snapshot script
    listing: Mutex<String>,
}

impl FakeBrowser {
    pub fn new() -> Arc<Self> {
        let browser = Self::default();
        *browser.listing.lock().unwrap() = "null".to_string();
        Arc::new(browser)
    }

    pub fn set_launch_delay(&self, delay: Duration) {
        *self.launch_delay.lock().unwrap() = delay;
    }

    pub fn set_navigate_delay(&self, delay: Duration) {
        *self.navigate_delay.lock().unwrap() = delay;
    }

    pub fn set_close_delay(&self, delay: Duration) {
        *self.close_delay.lock().unwrap() = delay;
    }

    pub fn set_listing_json(&self, json: impl Into<String>) {
        *self.listing.lock().unwrap() = json.into();
    }

    /// Serves `html` as the listing, converted the same way the page would.
    pub fn set_listing_html(&self, html: &str) {
        let snapshot = crate::dom::ListingSnapshot::from_html(html);
        self.set_listing_json(serde_json::to_string(&snapshot).unwrap());
    }

    pub fn remove(&self, selector: &str) {
        self.missing.lock().unwrap().push(selector.to_string());
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    fn check_connection(&self, operation: &str) -> Result<(), ScrapeError> {
        if self.connection_lost.load(Ordering::SeqCst) {
            return Err(ScrapeError::SessionUnavailable {
                message: format!("{operation}: browser connection lost"),
            });
        }
        Ok(())
    }

    fn is_missing(&self, text: &str) -> bool {
        self.missing
            .lock()
            .unwrap()
            .iter()
            .any(|m| text.contains(m.as_str()))
    }
}

pub struct FakeDriver(pub Arc<FakeBrowser>);

pub struct FakeSession(Arc<FakeBrowser>);

impl BrowserDriver for FakeDriver {
    type Session = FakeSession;

    fn launch(&self, _config: &BrowserConfig) -> Result<FakeSession, ScrapeError> {
        let browser = &self.0;
        browser.launches.fetch_add(1, Ordering::SeqCst);

        let delay = *browser.launch_delay.lock().unwrap();
        std::thread::sleep(delay);

        let failing = browser
            .failing_launches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ScrapeError::SessionUnavailable {
                message: "Browser launch failed: no chrome binary".to_string(),
            });
        }

        Ok(FakeSession(Arc::clone(browser)))
    }
}

impl BrowserSession for FakeSession {
    fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScrapeError> {
        self.0.check_connection("navigating")?;
        let delay = *self.0.navigate_delay.lock().unwrap();
        std::thread::sleep(delay);
        if self.0.fail_navigation.load(Ordering::SeqCst) {
            return Err(ScrapeError::timeout(format!("navigating to {url}"), timeout));
        }
        self.0.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    fn reload(&self, timeout: Duration) -> Result<(), ScrapeError> {
        self.0.check_connection("reloading page")?;
        if self.0.fail_navigation.load(Ordering::SeqCst) {
            return Err(ScrapeError::timeout("reloading page", timeout));
        }
        self.0.reloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), ScrapeError> {
        self.0.check_connection("waiting for selector")?;
        if self.0.is_missing(selector) {
            return Err(ScrapeError::timeout(format!("waiting for {selector}"), timeout));
        }
        Ok(())
    }

    fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScrapeError> {
        self.0.check_connection("evaluating script")?;
        if script.contains("dispatchEvent") {
            // Category selection; false when the option is absent
            return Ok(serde_json::Value::Bool(!self.0.is_missing(script)));
        }
        if script.contains("readyState") {
            return Ok(serde_json::Value::Bool(true));
        }
        if script.contains("groups") {
            self.0.snapshots.fetch_add(1, Ordering::SeqCst);
            let listing = self.0.listing.lock().unwrap().clone();
            return Ok(serde_json::Value::String(listing));
        }
        // Presence check
        Ok(serde_json::Value::Bool(!self.0.is_missing(script)))
    }

    fn close_page(&self) -> Result<(), ScrapeError> {
        let delay = *self.0.close_delay.lock().unwrap();
        std::thread::sleep(delay);
        self.0.closed_pages.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_close.load(Ordering::SeqCst) {
            return Err(ScrapeError::SessionUnavailable {
                message: "Failed to close page: target crashed".to_string(),
            });
        }
        Ok(())
    }

    fn close(&self) -> Result<(), ScrapeError> {
        self.0.closed_browsers.fetch_add(1, Ordering::SeqCst);
        if self.0.fail_close.load(Ordering::SeqCst) {
            return Err(ScrapeError::SessionUnavailable {
                message: "Browser already closed".to_string(),
            });
        }
        Ok(())
    }
}
