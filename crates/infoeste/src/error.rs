//! Error types for the schedule extraction pipeline.

use thiserror::Error;

/// Errors that can occur while driving the browser or extracting records.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScrapeError {
    /// The browser session could not be started, recovered, or was shut down
    #[error("Browser session unavailable: {message}")]
    SessionUnavailable { message: String },

    /// A navigation, reload, or wait exceeded its timeout
    #[error("Timed out after {timeout_secs:.1}s while {operation}")]
    NavigationTimeout { operation: String, timeout_secs: f64 },

    /// The page loaded but an expected frame/selector never became available
    #[error("Page not ready: {message}")]
    PageNotReady { message: String },

    /// The listing no longer matches the structure the extractor relies on
    #[error("Page structure invalid ({} violation(s)): {}", .errors.len(), .errors.join("; "))]
    StructureInvalid { errors: Vec<String> },

    /// The page loaded and validated but produced zero events
    #[error("Extraction produced no events")]
    ExtractionEmpty,

    /// In-page script evaluation failed or returned an undecodable value
    #[error("Script evaluation failed: {message}")]
    Script { message: String },

    /// Reading or writing a snapshot file failed
    #[error("I/O error: {message}")]
    Io { message: String },
}

impl ScrapeError {
    pub(crate) fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        ScrapeError::NavigationTimeout {
            operation: operation.into(),
            timeout_secs: timeout.as_secs_f64(),
        }
    }

    /// Returns true if a later call may reasonably succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::NavigationTimeout { .. }
                | ScrapeError::PageNotReady { .. }
                | ScrapeError::SessionUnavailable { .. }
        )
    }

    /// Returns true if this error points at upstream markup drift.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ScrapeError::StructureInvalid { .. } | ScrapeError::ExtractionEmpty
        )
    }
}

impl From<serde_json::Error> for ScrapeError {
    fn from(err: serde_json::Error) -> Self {
        ScrapeError::Script {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for ScrapeError {
    fn from(err: std::io::Error) -> Self {
        ScrapeError::Io {
            message: err.to_string(),
        }
    }
}
