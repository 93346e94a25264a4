//! Time utilities: record timestamps are untyped text until compared.

use chrono::{Datelike, NaiveDateTime};

/// Canonical record timestamp layout.
pub const RECORD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a record time like "2025-03-24 13:14:10".
///
/// Some exports quote the cell twice, so stray quotes are dropped first.
pub fn parse_record_time(raw: &str) -> Option<NaiveDateTime> {
    let cleaned = raw.replace('"', "");
    NaiveDateTime::parse_from_str(cleaned.trim(), RECORD_TIME_FORMAT).ok()
}

/// True when `raw` parses and falls inside the given calendar month.
pub fn is_in_month(raw: &str, year: i32, month: u32) -> bool {
    parse_record_time(raw)
        .map(|t| t.year() == year && t.month() == month)
        .unwrap_or(false)
}
