//! Timestamp parsing for upstream records.
//!
//! This is the single place where raw timestamps become typed values.
//! Inputs without an offset are taken to be UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

/// Parse a timestamp string, assigning UTC when no offset is present.
///
/// Accepts RFC 3339, ISO-8601 with or without fractional seconds, the
/// space-separated form, and bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Outcome of reading an optional timestamp field from a JSON record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampField {
    /// Absent, null or empty
    Missing,
    Valid(DateTime<Utc>),
    /// Present but not a recognizable timestamp
    Malformed,
}

impl TimestampField {
    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => TimestampField::Missing,
            Some(Value::String(s)) if s.trim().is_empty() => TimestampField::Missing,
            Some(Value::String(s)) => match parse_timestamp(s) {
                Some(dt) => TimestampField::Valid(dt),
                None => TimestampField::Malformed,
            },
            Some(_) => TimestampField::Malformed,
        }
    }

    pub fn valid(self) -> Option<DateTime<Utc>> {
        match self {
            TimestampField::Valid(dt) => Some(dt),
            _ => None,
        }
    }
}
