//! Structural checks on the listing, used to detect upstream drift.
//!
//! Validation collects every violation it can find in one pass instead of
//! stopping at the first. Only a missing root, or a missing table, body or row
//! set inside a group, stops checks below that point.

use crate::dom::{GroupNode, ListingSnapshot, LISTING_SELECTOR, TITLE_SELECTOR};
use crate::extract::MIN_COURSE_CELLS;
use crate::types::ValidationReport;
use regex::Regex;
use std::sync::LazyLock;

/// Minimum number of `th` cells in the column header row.
pub const MIN_HEADER_COLUMNS: usize = 4;

/// "01/12/2025 - Segunda-feira"
static DATE_HEADER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{2}/\d{2}/\d{4})\s*-\s*(.+?)\s*$").unwrap());

/// Validates a snapshot; `None` means the listing container was not found.
pub fn validate(listing: Option<&ListingSnapshot>) -> ValidationReport {
    let Some(listing) = listing else {
        return ValidationReport::from_errors(vec![format!(
            "Element {LISTING_SELECTOR} not found"
        )]);
    };

    if listing.groups.is_empty() {
        return ValidationReport::from_errors(vec![format!(
            "No groups found in {LISTING_SELECTOR} > li"
        )]);
    }

    let mut errors = Vec::new();
    for (index, group) in listing.groups.iter().enumerate() {
        validate_group(index + 1, group, &mut errors);
    }

    ValidationReport::from_errors(errors)
}

fn validate_group(number: usize, group: &GroupNode, errors: &mut Vec<String>) {
    if group.title.is_none() {
        errors.push(format!("Group {number}: element {TITLE_SELECTOR} not found"));
    }

    let Some(table) = &group.table else {
        errors.push(format!("Group {number}: element table not found"));
        return;
    };
    let Some(rows) = &table.body else {
        errors.push(format!("Group {number}: element tbody not found"));
        return;
    };
    let Some((header, data_rows)) = rows.split_first() else {
        errors.push(format!("Group {number}: no rows found in table"));
        return;
    };

    if header.headers.len() < MIN_HEADER_COLUMNS {
        errors.push(format!(
            "Group {number}: header must have at least {MIN_HEADER_COLUMNS} columns (found: {})",
            header.headers.len()
        ));
    }

    if data_rows.is_empty() {
        errors.push(format!("Group {number}: no data rows found"));
        return;
    }

    for (row_index, row) in data_rows.iter().enumerate() {
        let row_number = row_index + 1;

        if row.first_header().is_some_and(is_date_header) {
            continue;
        }

        if row.cells.len() < MIN_COURSE_CELLS {
            errors.push(format!(
                "Group {number}, row {row_number}: must have at least {MIN_COURSE_CELLS} columns (found: {})",
                row.cells.len()
            ));
            continue;
        }

        if row.cells[0].link.is_none() {
            errors.push(format!(
                "Group {number}, row {row_number}: course link not found in first column"
            ));
        }
    }
}

/// Returns true for date header text such as "01/12/2025 - Segunda-feira".
pub fn is_date_header(text: &str) -> bool {
    DATE_HEADER_REGEX.is_match(text)
}
