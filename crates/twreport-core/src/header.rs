//! Header locator — finds the row where a report's column headers begin
//!
//! Reports prepend titles, dates, blank lines and unit notes before the
//! header row. A format supplies the tokens its header must contain and an
//! optional skip-row hint; the hint is tried first and the token scan is the
//! fallback.
//!
//! # Algorithm
//!
//! 1. With a hint, look at that row. While it starts with a bare number
//!    (the hint overshot into data) step back one row, never below zero.
//!    If the row then carries every token, it is the header.
//! 2. Otherwise scan rows in order within the bounded window and take the
//!    first one carrying every token.
//! 3. No such row → `HeaderNotFound`.

use tracing::debug;

use crate::{Error, Result};

/// How the header row was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum LocateMethod {
    /// The skip-row hint pointed straight at the header
    Hint,
    /// The hint overshot; it was walked back from `from`
    HintAdjusted { from: usize },
    /// Found by scanning for the required tokens
    Scan,
}

/// Result of header location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderMatch {
    pub index: usize,
    pub method: LocateMethod,
}

/// Whether every needle appears inside some cell of the row
pub fn row_contains_all(row: &[String], needles: &[&str]) -> bool {
    needles.iter().all(|n| row.iter().any(|cell| cell.contains(n)))
}

/// A first cell like `1,234` or `76.5` means the row is data, not a header
fn starts_with_bare_number(row: &[String]) -> bool {
    let Some(first) = row.first() else {
        return false;
    };
    let digits: String = first.trim().chars().filter(|c| *c != ',' && *c != '.').collect();
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Locate the header row
///
/// # Errors
/// Returns `HeaderNotFound` when neither the hint nor the scan of the first
/// `scan_window` rows yields a row carrying every needle.
pub fn locate_header(
    rows: &[Vec<String>],
    needles: &[&str],
    skip_hint: Option<usize>,
    scan_window: usize,
) -> Result<HeaderMatch> {
    if let Some(hint) = skip_hint {
        if let Some(found) = try_hint(rows, needles, hint) {
            return Ok(found);
        }
        debug!(hint, "skip-row hint missed the header, scanning");
    }

    let limit = scan_window.min(rows.len());
    rows[..limit]
        .iter()
        .position(|row| !needles.is_empty() && row_contains_all(row, needles))
        .map(|index| HeaderMatch {
            index,
            method: LocateMethod::Scan,
        })
        .ok_or_else(|| Error::HeaderNotFound {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            scanned: limit,
        })
}

fn try_hint(rows: &[Vec<String>], needles: &[&str], hint: usize) -> Option<HeaderMatch> {
    let mut index = hint.min(rows.len().checked_sub(1)?);
    while index > 0 && starts_with_bare_number(&rows[index]) {
        index -= 1;
    }
    if !row_contains_all(&rows[index], needles) {
        return None;
    }
    let method = if index == hint {
        LocateMethod::Hint
    } else {
        LocateMethod::HintAdjusted { from: hint }
    };
    Some(HeaderMatch { index, method })
}
