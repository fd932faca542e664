//! Ingestion-boundary value types.
//!
//! The upstream API disagrees with itself about representations: ids arrive
//! as numbers or strings, statuses as numbers, booleans or localized labels,
//! timestamps as unix seconds, unix milliseconds or formatted text. Each of
//! these is captured once here as a tagged union and interpreted in exactly
//! one place downstream; nothing else branches on the raw representation.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unix timestamps at or above this value are milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

/// Text layouts accepted for naive (offset-less) timestamps.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y/%m/%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// Identifier as sent by the API: number or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Number(i64),
    Text(String),
}

impl RawId {
    /// Canonical string form, or `None` when the value is empty.
    ///
    /// Numeric `0` and blank strings are empty: upstream uses them as
    /// "not set" placeholders.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Self::Number(0) => None,
            Self::Number(n) => Some(n.to_string()),
            Self::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}

impl fmt::Display for RawId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Status value as sent by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawStatus {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl RawStatus {
    /// True for `false`, `0` and blank strings.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Flag(b) => !b,
            Self::Number(n) => *n == 0,
            Self::Text(s) => s.trim().is_empty(),
        }
    }
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Timestamp as sent by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Unix(i64),
    Text(String),
}

impl RawTimestamp {
    /// Interpret the timestamp as a UTC instant.
    ///
    /// Text without an explicit offset is read in `source_offset`, the
    /// timezone the upstream servers format their dates in.
    pub fn to_utc(&self, source_offset: FixedOffset) -> Option<DateTime<Utc>> {
        match self {
            Self::Unix(n) => from_unix(*n),
            Self::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return None;
                }
                if let Ok(n) = s.parse::<i64>() {
                    return from_unix(n);
                }
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                NAIVE_FORMATS.iter().find_map(|fmt| {
                    let naive = NaiveDateTime::parse_from_str(s, fmt).ok()?;
                    source_offset
                        .from_local_datetime(&naive)
                        .single()
                        .map(|dt| dt.with_timezone(&Utc))
                })
            }
        }
    }
}

fn from_unix(n: i64) -> Option<DateTime<Utc>> {
    if n <= 0 {
        None
    } else if n >= MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}
