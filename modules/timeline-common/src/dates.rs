//! Date precision normalization.
//!
//! Knowledge-graph time values arrive as full ISO-like timestamps
//! (`1944-06-06T00:00:00Z`) paired with a numeric precision code. A value
//! known only to the year is still sent as `1944-01-01T00:00:00Z`, so the
//! precision decides how much of the timestamp is meaningful. BCE years may
//! carry U+2212 instead of an ASCII minus.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{DateField, Resolution};

const UNICODE_MINUS: char = '\u{2212}';

static YEAR_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+\-\x{2212}]?\d{1,4}-01-01T00:00:00Z$").unwrap());
static MONTH_START: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+\-\x{2212}]?\d{1,4}-\d{2}-01T00:00:00Z$").unwrap());
static YEAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+\-\x{2212}]?\d{1,4})").unwrap());
static MONTH_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+\-\x{2212}]?\d{4}-\d{2})").unwrap());

/// Convert a raw time value and optional precision code into a [`DateField`].
///
/// Returns `None` for empty input or when a year cannot be read from a
/// year-precision value. Unmapped precision codes fall back to inference from
/// the timestamp shape.
pub fn normalize_date(raw: &str, precision: Option<u8>) -> Option<DateField> {
    if raw.is_empty() {
        return None;
    }

    let resolution = precision
        .and_then(Resolution::from_precision)
        .unwrap_or_else(|| infer_resolution(raw));

    match resolution {
        Resolution::Year => {
            let token = YEAR_TOKEN.captures(raw)?.get(1)?.as_str();
            Some(DateField::new(canonical_year(token), Resolution::Year))
        }
        Resolution::Month => {
            let month = match MONTH_TOKEN.captures(raw).and_then(|c| c.get(1)) {
                Some(m) => m.as_str().to_string(),
                None => raw.chars().take(7).collect(),
            };
            Some(DateField::new(canonical_sign(&month), Resolution::Month))
        }
        finer => Some(DateField::new(canonical_sign(raw), finer)),
    }
}

fn infer_resolution(raw: &str) -> Resolution {
    if YEAR_START.is_match(raw) {
        Resolution::Year
    } else if MONTH_START.is_match(raw) {
        Resolution::Month
    } else {
        Resolution::Day
    }
}

/// ASCII minus for BCE, no explicit plus for CE.
fn canonical_sign(value: &str) -> String {
    if let Some(rest) = value.strip_prefix(UNICODE_MINUS) {
        format!("-{rest}")
    } else if let Some(rest) = value.strip_prefix('+') {
        rest.to_string()
    } else {
        value.to_string()
    }
}

/// Negative years are zero-padded to four digits: `-500` becomes `-0500`.
fn canonical_year(token: &str) -> String {
    let signed = canonical_sign(token);
    match signed.strip_prefix('-') {
        Some(digits) => {
            let trimmed = digits.trim_start_matches('0');
            let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
            format!("-{trimmed:0>4}")
        }
        None => signed,
    }
}

/// Expand a normalized date into a full timestamp string for ordering.
/// Missing dates produce an empty string.
pub fn sortable_key(field: Option<&DateField>) -> String {
    let Some(field) = field else {
        return String::new();
    };
    let value = field.value.as_str();
    match field.resolution {
        Resolution::Year => format!("{value}-01-01T00:00:00Z"),
        Resolution::Month if value.len() >= 7 => format!("{value}-01T00:00:00Z"),
        Resolution::Month => format!("{value}-01-01T00:00:00Z"),
        _ if value.contains('T') => value.to_string(),
        _ => format!("{value}T00:00:00Z"),
    }
}

/// Overall key for a record: start, then point in time, then end.
pub fn record_sort_key(
    start: Option<&DateField>,
    point: Option<&DateField>,
    end: Option<&DateField>,
) -> String {
    [start, point, end]
        .into_iter()
        .map(sortable_key)
        .find(|key| !key.is_empty())
        .unwrap_or_default()
}
