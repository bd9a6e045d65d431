use super::config::BrowserConfig;
use super::driver::{BrowserDriver, BrowserSession};
use crate::error::ScrapeError;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Launches Chrome/Chromium through the DevTools protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeDriver;

/// A running Chrome process and the tab it is driven through.
pub struct ChromeSession {
    /// Dropping the browser terminates the process
    browser: Mutex<Option<Browser>>,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    fn launch_browser(config: &BrowserConfig) -> Result<Browser, ScrapeError> {
        // Owned strings must outlive the borrowed OsStr args
        let user_agent_arg = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={ua}"));

        let mut args: Vec<&OsStr> = config.chrome_flags.iter().map(OsStr::new).collect();
        if let Some(ref ua) = user_agent_arg {
            args.push(OsStr::new(ua));
        }

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false)
            .window_size(Some(config.window_size))
            .idle_browser_timeout(config.idle_timeout)
            .args(args)
            .build()
            .map_err(|e| ScrapeError::SessionUnavailable {
                message: format!("Invalid browser launch options: {e}"),
            })?;

        Browser::new(launch_options).map_err(|e| ScrapeError::SessionUnavailable {
            message: format!("Browser launch failed: {e}"),
        })
    }
}

impl BrowserDriver for ChromeDriver {
    type Session = ChromeSession;

    fn launch(&self, config: &BrowserConfig) -> Result<ChromeSession, ScrapeError> {
        info!(headless = config.headless, "Launching Chrome");
        let browser = Self::launch_browser(config)?;

        let tab = browser.new_tab().map_err(|e| {
            warn!(error = %e, "Tab creation failed; discarding browser");
            ScrapeError::SessionUnavailable {
                message: format!("Tab creation failed: {e}"),
            }
        })?;
        debug!("Tab opened");

        Ok(ChromeSession {
            browser: Mutex::new(Some(browser)),
            tab,
        })
    }
}

/// True when the DevTools connection to the browser is gone.
fn connection_lost(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("connection is closed")
        || lower.contains("connection closed")
        || lower.contains("closed channel")
        || lower.contains("channel closed")
}

fn lost(operation: &str, message: &str) -> ScrapeError {
    ScrapeError::SessionUnavailable {
        message: format!("{operation}: browser connection lost: {message}"),
    }
}

/// Maps a DevTools failure to a lost session, a timeout or a not-ready error.
fn classify(error: anyhow::Error, operation: &str, timeout: Duration) -> ScrapeError {
    let message = error.to_string();
    let lower = message.to_lowercase();
    if connection_lost(&message) {
        lost(operation, &message)
    } else if lower.contains("timeout") || lower.contains("timed out") || lower.contains("never came") {
        ScrapeError::timeout(operation, timeout)
    } else {
        ScrapeError::PageNotReady {
            message: format!("{operation}: {message}"),
        }
    }
}

impl BrowserSession for ChromeSession {
    fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScrapeError> {
        let operation = format!("navigating to {url}");
        self.tab.set_default_timeout(timeout);
        self.tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| classify(e, &operation, timeout))?;
        Ok(())
    }

    fn reload(&self, timeout: Duration) -> Result<(), ScrapeError> {
        self.tab.set_default_timeout(timeout);
        self.tab
            .reload(false, None)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| classify(e, "reloading page", timeout))?;
        Ok(())
    }

    fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), ScrapeError> {
        let operation = format!("waiting for {selector}");
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(|e| classify(e, &operation, timeout))?;
        Ok(())
    }

    fn evaluate(&self, script: &str) -> Result<serde_json::Value, ScrapeError> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| {
                let message = e.to_string();
                if connection_lost(&message) {
                    lost("evaluating script", &message)
                } else {
                    ScrapeError::Script { message }
                }
            })?;

        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    fn close_page(&self) -> Result<(), ScrapeError> {
        self.tab
            .close(true)
            .map(|_| ())
            .map_err(|e| ScrapeError::SessionUnavailable {
                message: format!("Failed to close page: {e}"),
            })
    }

    fn close(&self) -> Result<(), ScrapeError> {
        let browser = self
            .browser
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match browser {
            Some(browser) => {
                drop(browser);
                Ok(())
            }
            None => Err(ScrapeError::SessionUnavailable {
                message: "Browser already closed".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_timeout_messages() {
        let err = classify(
            anyhow::anyhow!("The event waited for never came"),
            "reloading page",
            Duration::from_secs(30),
        );
        assert!(matches!(err, ScrapeError::NavigationTimeout { .. }));

        let err = classify(
            anyhow::anyhow!("Could not find node"),
            "waiting for #ddlCat",
            Duration::from_secs(10),
        );
        assert_eq!(
            err,
            ScrapeError::PageNotReady {
                message: "waiting for #ddlCat: Could not find node".to_string()
            }
        );
    }

    #[test]
    fn test_classify_closed_connection_as_lost_session() {
        let err = classify(
            anyhow::anyhow!("Unable to make method calls because underlying connection is closed"),
            "navigating to https://a.example",
            Duration::from_secs(30),
        );
        assert!(matches!(err, ScrapeError::SessionUnavailable { .. }));
        assert!(err.to_string().contains("browser connection lost"));

        assert!(connection_lost("receiving on a closed channel"));
        assert!(!connection_lost("Could not find node with given id"));
    }

    #[test]
    #[ignore] // Requires Chrome to be installed
    fn test_launch_and_evaluate() {
        let session = ChromeDriver.launch(&BrowserConfig::default()).unwrap();
        session
            .navigate("https://example.com", Duration::from_secs(30))
            .unwrap();

        let value = session.evaluate("document.title").unwrap();
        assert_eq!(value.as_str(), Some("Example Domain"));

        session.close_page().unwrap();
        session.close().unwrap();
        assert!(session.close().is_err());
    }
}
