use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

/// An ISO-8601 UTC timestamp with fractional seconds at the start of a line,
/// the prefix GitLab runners write on every log line.
static LINE_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?P<date>\d{4,}-\d{2}-\d{2}T\d{1,2}:\d{2}:\d{2}\.\d+Z)\b")
        .expect("line timestamp pattern is valid")
});

/// Parses one timestamp fragment such as `2024-01-01T10:00:05.123456Z`.
///
/// Accepts RFC 3339 and, failing that, the looser shape GitLab sometimes
/// emits (single-digit hours). Returns `None` for anything else.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.fZ")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Every line-start timestamp in `text`, in document order.
///
/// Lexical matches that are not real dates (e.g. month 13) are skipped.
pub fn timestamps(text: &str) -> impl Iterator<Item = DateTime<Utc>> + '_ {
    LINE_TIMESTAMP
        .captures_iter(text)
        .filter_map(|caps| caps.name("date"))
        .filter_map(|date| parse_timestamp(date.as_str()))
}

/// The first line-start timestamp in `text`, or `None` when no line
/// carries one.
pub fn first_timestamp(text: &str) -> Option<DateTime<Utc>> {
    timestamps(text).next()
}
