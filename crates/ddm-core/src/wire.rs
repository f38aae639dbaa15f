use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("missing field '{0}'")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum UpdateKind {
    #[serde(rename = "UPDATE")]
    Update,
}

/// Server-asserted change to the resource behind `api_path`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LiveUpdateEvent {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(rename = "apiPath")]
    pub api_path: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: i64,
}

impl LiveUpdateEvent {
    pub fn update(api_path: impl Into<String>, timestamp: i64) -> Self {
        Self {
            kind: UpdateKind::Update,
            api_path: api_path.into(),
            timestamp,
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.kind == UpdateKind::Update && self.api_path == path
    }
}

/// Parses one push-channel frame. Frames whose `type` is not an update are
/// not errors; they yield `None`.
pub fn parse_broadcast(text: &str, max_bytes: usize) -> Result<Option<LiveUpdateEvent>, WireError> {
    if text.len() > max_bytes {
        return Err(WireError::FrameTooLarge {
            size: text.len(),
            max: max_bytes,
        });
    }
    let value: Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(WireError::MissingField("type"))?;
    if kind != "UPDATE" {
        return Ok(None);
    }
    if value.get("apiPath").is_none() {
        return Err(WireError::MissingField("apiPath"));
    }
    Ok(Some(serde_json::from_value(value)?))
}

/// Error body returned by the API alongside non-2xx statuses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServiceError {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a millisecond timestamp as integer or string")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            i64::try_from(value).map_err(|_| E::custom(format!("timestamp out of range: {value}")))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !value.is_finite() {
                return Err(E::custom("timestamp must be finite"));
            }
            Ok(value as i64)
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            value
                .trim()
                .parse::<i64>()
                .map_err(|err| E::custom(format!("invalid timestamp '{value}': {err}")))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_update_frames() {
        let event = parse_broadcast(
            r#"{"type":"UPDATE","apiPath":"/mixed-drinks","timestamp":1700000000000}"#,
            DEFAULT_MAX_FRAME_BYTES,
        )
        .expect("parse frame")
        .expect("update event");
        assert_eq!(event, LiveUpdateEvent::update("/mixed-drinks", 1_700_000_000_000));
        assert!(event.matches("/mixed-drinks"));
        assert!(!event.matches("/beers-and-liquors"));
    }

    #[test]
    fn accepts_string_timestamps() {
        let event = parse_broadcast(
            r#"{"type":"UPDATE","apiPath":"/beers-and-liquors","timestamp":"17"}"#,
            DEFAULT_MAX_FRAME_BYTES,
        )
        .expect("parse frame")
        .expect("update event");
        assert_eq!(event.timestamp, 17);
    }

    #[test]
    fn ignores_other_message_types() {
        let parsed = parse_broadcast(r#"{"type":"PING"}"#, DEFAULT_MAX_FRAME_BYTES).expect("parse");
        assert!(parsed.is_none());
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(
            parse_broadcast("not json", DEFAULT_MAX_FRAME_BYTES),
            Err(WireError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_broadcast(r#"{"type":"UPDATE","timestamp":1}"#, DEFAULT_MAX_FRAME_BYTES),
            Err(WireError::MissingField("apiPath"))
        ));
        assert!(matches!(
            parse_broadcast(r#"{"apiPath":"/x"}"#, DEFAULT_MAX_FRAME_BYTES),
            Err(WireError::MissingField("type"))
        ));
        let big = format!(r#"{{"type":"UPDATE","apiPath":"{}","timestamp":1}}"#, "x".repeat(64));
        assert!(matches!(
            parse_broadcast(&big, 32),
            Err(WireError::FrameTooLarge { max: 32, .. })
        ));
    }

    #[test]
    fn service_error_keeps_unknown_fields() {
        let body: ServiceError = serde_json::from_str(
            r#"{"status":422,"message":"Invalid password","path":"/login"}"#,
        )
        .expect("parse service error");
        assert_eq!(body.status, Some(422));
        assert_eq!(body.message.as_deref(), Some("Invalid password"));
        assert!(body.extra.contains_key("path"));
    }
}
