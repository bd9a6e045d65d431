//! Conversion of a listing snapshot into typed events and courses.
//!
//! Field parsing never fails: malformed values degrade to sentinels (`0` or
//! an empty string) so one broken row cannot lose the rest of the page.

use crate::dom::{GroupNode, ListingSnapshot, RowNode};
use crate::types::{Course, Event};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Minimum number of `td` cells for a row to be read as a course.
pub const MIN_COURSE_CELLS: usize = 4;

/// Separator between start and end time ("19:00 às 22:30").
pub const PERIOD_SEPARATOR: &str = "às";

static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static CODE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\s*(\d+)\s*\)").unwrap());
static CODE_PREFIX_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*\d+\s*\)\s*-\s*").unwrap());
static DATE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{2}/\d{2}/\d{4})").unwrap());
static LEADING_INT_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([+-]?\d+)").unwrap());

/// Extracts every event that has a title and at least one course.
///
/// Output order is document order.
pub fn extract_events(snapshot: &ListingSnapshot) -> Vec<Event> {
    let events: Vec<Event> = snapshot
        .groups
        .iter()
        .enumerate()
        .filter_map(|(index, group)| extract_group(index, group))
        .collect();

    debug!(
        groups = snapshot.groups.len(),
        events = events.len(),
        "Extracted events from listing"
    );

    events
}

/// Extracts one group, or `None` if it has no title or no qualifying rows.
fn extract_group(index: usize, group: &GroupNode) -> Option<Event> {
    let title = group.title.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() {
        debug!(group = index + 1, "Skipping group without title");
        return None;
    }

    let rows = group
        .table
        .as_ref()
        .and_then(|t| t.body.as_deref())
        .unwrap_or_default();

    let mut current_date = String::new();
    let mut saw_date = false;
    let mut courses = Vec::new();

    for row in rows {
        // Rows opening with a header cell are date or column headers, never courses
        if let Some(header) = row.first_header() {
            if let Some(date) = parse_date(header) {
                current_date = date;
                saw_date = true;
            }
            continue;
        }

        if row.cells.len() < MIN_COURSE_CELLS {
            continue;
        }

        courses.push(parse_course(row, &current_date));
    }

    if courses.is_empty() {
        debug!(group = index + 1, title, "Dropping group without courses");
        return None;
    }

    if !saw_date {
        warn!(
            group = index + 1,
            title, "No date header found; courses keep an empty date"
        );
    }

    Some(Event {
        title: title.to_string(),
        courses,
    })
}

/// Parses a course row. Expects at least [`MIN_COURSE_CELLS`] cells.
fn parse_course(row: &RowNode, date: &str) -> Course {
    let raw_name = match row.cells[0].link.as_deref() {
        Some(link) => collapse_whitespace(link),
        None => {
            debug!(cell = %row.cells[0].text, "Course name link missing, defaulting to empty");
            String::new()
        }
    };

    let period_time = row.cells[1].text.trim().to_string();
    let (start_time, end_time) = split_period(&period_time);

    Course {
        id: parse_course_code(&raw_name),
        name: strip_course_code(&raw_name),
        date: date.to_string(),
        period_time,
        start_time,
        end_time,
        vacancies: parse_count(&row.cells[2].text),
        vacancies_left: parse_count(&row.cells[3].text),
    }
}

/// Collapses runs of whitespace into single spaces and trims.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text.trim(), " ").into_owned()
}

/// Reads the number inside the first "( n )" of a display name, 0 if absent.
pub fn parse_course_code(name: &str) -> i64 {
    CODE_REGEX
        .captures(name)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or_else(|| {
            debug!(name, "Course code missing, defaulting to 0");
            0
        })
}

/// Removes the "( n ) - " code prefix from a display name.
pub fn strip_course_code(name: &str) -> String {
    let collapsed = collapse_whitespace(name);
    CODE_PREFIX_REGEX
        .replacen(&collapsed, 1, "")
        .trim()
        .to_string()
}

/// Splits "19:00 às 22:30" into its trimmed halves; a missing half is empty.
pub fn split_period(period: &str) -> (String, String) {
    let mut parts = period.split(PERIOD_SEPARATOR);
    let start = parts.next().unwrap_or_default().trim().to_string();
    let end = parts.next().unwrap_or_default().trim().to_string();

    if end.is_empty() {
        debug!(period, "Period has no end time");
    }

    (start, end)
}

/// Parses the leading integer of a count cell ("30", "30 vagas"), 0 otherwise.
pub fn parse_count(text: &str) -> i64 {
    LEADING_INT_REGEX
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or_else(|| {
            debug!(text, "Count is not numeric, defaulting to 0");
            0
        })
}

/// Finds a DD/MM/YYYY date anywhere in a header cell.
pub fn parse_date(header: &str) -> Option<String> {
    DATE_REGEX.find(header).map(|m| m.as_str().to_string())
}
