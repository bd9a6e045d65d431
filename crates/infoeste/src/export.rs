//! One-shot JSON snapshots of extracted events.

use crate::error::ScrapeError;
use crate::types::Event;
use std::fs;
use std::path::Path;
use tracing::info;

/// Writes `events` as pretty-printed JSON, creating parent directories.
pub fn write_snapshot(path: impl AsRef<Path>, events: &[Event]) -> Result<(), ScrapeError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(events)?;
    fs::write(path, json)?;

    info!(path = %path.display(), events = events.len(), "Snapshot written");
    Ok(())
}

pub fn read_snapshot(path: impl AsRef<Path>) -> Result<Vec<Event>, ScrapeError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
