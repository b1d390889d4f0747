//! Normalization of heterogeneous stored time values.
//!
//! Session documents were written by several generations of the primary
//! application, so `time_in` may be a store-native timestamp object, a plain
//! epoch-millisecond number, or an ISO-8601 string. Everything else is
//! unrepresentable, which is not an error: the caller treats it as "unknown
//! session start".

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

/// Closed set of recognized stored-time encodings.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredTimestamp {
    /// Store-native timestamp object: `{"seconds": i64, "nanos": u32}`.
    Native { seconds: i64, nanos: u32 },
    /// Plain number, interpreted as epoch milliseconds.
    EpochMillis(i64),
    /// ISO-8601 / RFC 3339 string; offset-less strings are read as UTC.
    Iso8601(DateTime<Utc>),
}

impl StoredTimestamp {
    /// Classify a raw stored value into a recognized encoding, if any.
    pub fn classify(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::EpochMillis),
            Value::String(s) => parse_iso8601(s).map(Self::Iso8601),
            Value::Object(map) => {
                let seconds = map.get("seconds")?.as_i64()?;
                let nanos = u32::try_from(map.get("nanos")?.as_i64()?).ok()?;
                Some(Self::Native { seconds, nanos })
            }
            Value::Null | Value::Bool(_) | Value::Array(_) => None,
        }
    }

    /// Comparable epoch-millisecond value of this timestamp.
    pub fn epoch_millis(&self) -> i64 {
        match self {
            Self::Native { seconds, nanos } => {
                seconds.saturating_mul(1000) + i64::from(nanos / 1_000_000)
            }
            Self::EpochMillis(ms) => *ms,
            Self::Iso8601(dt) => dt.timestamp_millis(),
        }
    }
}

/// Normalize any recognized timestamp encoding to epoch milliseconds.
/// Returns `None` when the value is not a recognized encoding.
pub fn normalize_epoch_millis(value: &Value) -> Option<i64> {
    StoredTimestamp::classify(value).map(|ts| ts.epoch_millis())
}

fn parse_iso8601(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    // Older records stored naive local-less strings like "2024-03-01T09:30:00"
    raw.parse::<NaiveDateTime>()
        .ok()
        .map(|naive| naive.and_utc())
}
