use std::time::Duration;

/// Configuration for the long-lived browser session
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,

    /// Browser window size
    pub window_size: (u32, u32),

    /// Custom user agent
    pub user_agent: Option<String>,

    /// Additional Chrome flags
    pub chrome_flags: Vec<String>,

    /// Maximum time for launching the browser and opening its page
    pub launch_timeout: Duration,

    /// Maximum time a caller waits for another caller's start-up to finish
    pub startup_wait_timeout: Duration,

    /// Maximum time teardown may take before the session is abandoned
    pub close_timeout: Duration,

    /// How long the browser may sit without DevTools traffic before the
    /// connection is dropped. The session lives for the whole process, so
    /// this is much longer than a typical scrape.
    pub idle_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1920, 1080),
            user_agent: Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
                    .to_string(),
            ),
            chrome_flags: vec![
                "--disable-setuid-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            launch_timeout: Duration::from_secs(30),
            startup_wait_timeout: Duration::from_secs(60),
            close_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl BrowserConfig {
    /// Create a configuration for debugging (non-headless, visible browser)
    pub fn debug_mode() -> Self {
        Self {
            headless: false,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert_eq!(config.window_size, (1920, 1080));
        assert!(config.user_agent.is_some());
        assert!(config.startup_wait_timeout > config.launch_timeout);
    }

    #[test]
    fn test_debug_mode() {
        let config = BrowserConfig::debug_mode();
        assert!(!config.headless);
        assert_eq!(config.close_timeout, BrowserConfig::default().close_timeout);
    }
}
