//! Data models for chat rooms, messages and notifications
//!
//! Upstream payloads are loose: ids arrive as strings or numbers, room ids
//! hide under several field names, timestamps come in more than one shape.
//! Everything is normalized here, at the ingestion boundary, so the rest of
//! the crate only sees one canonical form.

mod message;
mod notification;
mod room;

pub use message::*;
pub use notification::*;
pub use room::*;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use thiserror::Error;

/// Why an inbound payload was rejected.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload has no {0}")]
    MissingId(&'static str),

    #[error("notification has neither title nor message")]
    EmptyNotification,
}

/// Normalize a JSON id (string or number) to a non-empty string.
pub(crate) fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First usable id among `candidates`, in order.
pub(crate) fn first_id<'a>(candidates: impl IntoIterator<Item = &'a Option<Value>>) -> Option<String> {
    candidates
        .into_iter()
        .filter_map(|v| v.as_ref())
        .find_map(id_string)
}

/// Parse a timestamp as RFC 3339, a naive local date-time, or epoch millis.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_timestamp_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Backend LocalDateTime, e.g. 2024-01-05T10:51:00.123
    let naive = s
        .parse::<NaiveDateTime>()
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
