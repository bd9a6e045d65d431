//! Process configuration read from the environment.

use crate::browser::BrowserConfig;
use crate::page::{PageContract, DEFAULT_URL};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got {value:?}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("INFOESTE_URL is not a valid http(s) URL: {0}")]
    InvalidUrl(String),
}

/// Settings for the server and the scrape pipeline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub cache_ttl: Duration,
    pub headless: bool,
    pub navigation_timeout: Duration,
    pub startup_wait_timeout: Duration,
    pub validate_before_extract: bool,
    pub url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            cache_ttl: Duration::from_secs(300),
            headless: true,
            navigation_timeout: Duration::from_secs(30),
            startup_wait_timeout: Duration::from_secs(60),
            validate_before_extract: false,
            url: DEFAULT_URL.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from `lookup`; unset variables keep defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| invalid("PORT", "a port number between 1 and 65535", v))?,
            None => defaults.port,
        };

        let cache_ttl = seconds(get("CACHE_TTL_SECONDS"), "CACHE_TTL_SECONDS")?
            .unwrap_or(defaults.cache_ttl);
        let navigation_timeout = seconds(get("NAVIGATION_TIMEOUT_SECS"), "NAVIGATION_TIMEOUT_SECS")?
            .unwrap_or(defaults.navigation_timeout);
        let startup_wait_timeout = seconds(get("STARTUP_WAIT_SECS"), "STARTUP_WAIT_SECS")?
            .unwrap_or(defaults.startup_wait_timeout);

        let headless = flag(get("BROWSER_HEADLESS"), "BROWSER_HEADLESS")?.unwrap_or(defaults.headless);
        let validate_before_extract = flag(get("VALIDATE_BEFORE_EXTRACT"), "VALIDATE_BEFORE_EXTRACT")?
            .unwrap_or(defaults.validate_before_extract);

        let url = match get("INFOESTE_URL") {
            Some(v) => {
                let v = v.trim().to_string();
                match Url::parse(&v) {
                    Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => v,
                    _ => return Err(ConfigError::InvalidUrl(v)),
                }
            }
            None => defaults.url,
        };

        Ok(Self {
            port,
            cache_ttl,
            headless,
            navigation_timeout,
            startup_wait_timeout,
            validate_before_extract,
            url,
        })
    }

    pub fn browser_config(&self) -> BrowserConfig {
        let base = if self.headless {
            BrowserConfig::default()
        } else {
            BrowserConfig::debug_mode()
        };
        BrowserConfig {
            startup_wait_timeout: self.startup_wait_timeout,
            ..base
        }
    }

    pub fn page_contract(&self) -> PageContract {
        PageContract {
            url: self.url.clone(),
            navigation_timeout: self.navigation_timeout,
            ..PageContract::default()
        }
    }
}

fn invalid(name: &'static str, expected: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        expected,
        value,
    }
}

fn seconds(value: Option<String>, name: &'static str) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| invalid(name, "a positive number of seconds", v))
        })
        .transpose()
}

fn flag(value: Option<String>, name: &'static str) -> Result<Option<bool>, ConfigError> {
    value
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(name, "true or false", v)),
        })
        .transpose()
}
