//! Types for extracted schedule data
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A titled grouping of sessions (e.g. "Oficinas", "Palestras")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub title: String,
    pub courses: Vec<Course>,
}

/// A single scheduled session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Code from the "( 1234 )" prefix of the display name, 0 when absent
    pub id: i64,
    pub name: String,
    /// DD/MM/YYYY, inherited from the preceding date header row
    pub date: String,
    /// Raw range as shown, e.g. "19:00 às 22:30"
    pub period_time: String,
    pub start_time: String,
    pub end_time: String,
    pub vacancies: i64,
    pub vacancies_left: i64,
}

/// Events from one scrape, stamped with when they were read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedEvents {
    pub events: Vec<Event>,
    pub scraped_at: DateTime<Utc>,
}

impl ScrapedEvents {
    pub fn now(events: Vec<Event>) -> Self {
        Self {
            events,
            scraped_at: Utc::now(),
        }
    }
}

/// Outcome of checking the live listing against the expected structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }

    /// A report carrying one synthetic error for a pass that could not run.
    pub fn aborted(reason: impl std::fmt::Display) -> Self {
        Self::from_errors(vec![format!("Validation aborted: {reason}")])
    }
}

impl Event {
    /// Total remaining seats across all courses in this event.
    pub fn vacancies_left(&self) -> i64 {
        self.courses.iter().map(|c| c.vacancies_left).sum()
    }
}
