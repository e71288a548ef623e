//! Lenient timestamp parsing for spreadsheet exports.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

const ISO_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const MONTH_FIRST: &[&str] = &["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M"];
const DAY_FIRST: &[&str] = &["%d/%m/%Y %H:%M:%S", "%d/%m/%Y %H:%M"];

/// Parses a sheet timestamp into wall-clock time.
///
/// Accepts ISO-style date-times, RFC 3339 with an offset (the written wall
/// time is kept, the offset dropped), slash dates in the order selected by
/// `day_first`, and bare dates (midnight). Returns `None` for anything else.
pub fn parse_timestamp(raw: &str, day_first: bool) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }

    for fmt in ISO_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    let (primary, secondary) = if day_first {
        (DAY_FIRST, MONTH_FIRST)
    } else {
        (MONTH_FIRST, DAY_FIRST)
    };
    // The secondary order only applies when the primary one cannot be valid,
    // e.g. `25/12/2025` read month-first.
    for fmt in primary.iter().chain(secondary) {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }

    let date_formats: [&str; 3] = if day_first {
        ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"]
    } else {
        ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y"]
    };
    date_formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
