//! CapturedEvent / Event - capture layer output and sink input
//!
//! 页面内观察到的每条 WebSocket 消息对应一条记录。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Sentinel preserved in place of binary frame contents.
pub const BINARY_SENTINEL: &str = "(binary data)";

/// Message direction relative to the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Server → page
    Incoming,
    /// Page → server
    Outgoing,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw payload as captured
///
/// Binary frames never carry their bytes past the capture layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// UTF-8 text frame
    Text(String),
    /// Structured value handed over by the capture layer
    Structured(Value),
    /// Binary frame marker
    Binary,
}

impl Payload {
    /// Build a payload from a JSON value, recognising the binary sentinel.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) if s == BINARY_SENTINEL => Self::Binary,
            Value::String(s) => Self::Text(s),
            other => Self::Structured(other),
        }
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary)
    }

    /// Approximate size in bytes, used for logging only.
    pub fn approx_len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Structured(v) => v.to_string().len(),
            Self::Binary => 0,
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::from_value(Value::String(s.to_string()))
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::from_value(Value::String(s))
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(s) => serializer.serialize_str(s),
            Self::Structured(v) => v.serialize(serializer),
            Self::Binary => serializer.serialize_str(BINARY_SENTINEL),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// Browser context the message was observed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOrigin {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
}

/// Event pushed by the capture layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedEvent {
    pub direction: Direction,

    /// Origin endpoint of the observed socket
    pub url: String,

    /// Payload captured synchronously at interception time
    #[serde(default)]
    pub raw_payload: Option<Payload>,

    /// Capture instant
    pub timestamp: DateTime<Utc>,

    /// Channel precomputed by the capture layer, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<CaptureOrigin>,
}

impl CapturedEvent {
    /// Create a captured event stamped with the current time
    pub fn now(direction: Direction, url: impl Into<String>, payload: Option<Payload>) -> Self {
        Self {
            direction,
            url: url.into(),
            raw_payload: payload,
            timestamp: Utc::now(),
            channel: None,
            origin: None,
        }
    }
}

/// Event as published to sinks
///
/// Immutable once built; `channel` is attached before queueing so that
/// downstream consumers never re-parse the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub direction: Direction,
    pub url: String,
    pub raw_payload: Option<Payload>,
    pub channel: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<CaptureOrigin>,
}

impl Event {
    /// Finalize a captured event with its routing hint
    pub fn from_captured(captured: CapturedEvent, channel: Option<String>) -> Self {
        Self {
            direction: captured.direction,
            url: captured.url,
            raw_payload: captured.raw_payload,
            channel,
            timestamp: captured.timestamp,
            origin: captured.origin,
        }
    }

    /// JSON value used as the remote invocation argument
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// JSON text used as a socket frame
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_binary_sentinel_roundtrip() {
        let payload: Payload = serde_json::from_str("\"(binary data)\"").unwrap();
        assert_eq!(payload, Payload::Binary);
        assert_eq!(serde_json::to_string(&Payload::Binary).unwrap(), "\"(binary data)\"");
    }

    #[test]
    fn test_structured_payload() {
        let payload: Payload = serde_json::from_value(json!({"channel": "a"})).unwrap();
        assert!(matches!(payload, Payload::Structured(_)));
    }

    #[test]
    fn test_captured_event_wire_format() {
        let raw = r#"{
            "direction": "incoming",
            "url": "wss://example.test/socket",
            "rawPayload": "{\"channel\":\"lobby\"}",
            "timestamp": "2024-05-01T12:00:00Z",
            "origin": { "tabId": 4, "frameId": 0 }
        }"#;
        let captured: CapturedEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(captured.direction, Direction::Incoming);
        assert_eq!(captured.origin.unwrap().tab_id, Some(4));
        assert!(matches!(captured.raw_payload, Some(Payload::Text(_))));
    }

    #[test]
    fn test_null_payload_is_none() {
        let raw = r#"{"direction":"outgoing","url":"x","rawPayload":null,"timestamp":"2024-05-01T12:00:00Z"}"#;
        let captured: CapturedEvent = serde_json::from_str(raw).unwrap();
        assert!(captured.raw_payload.is_none());
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let captured = CapturedEvent::now(Direction::Outgoing, "wss://x", Some("hi".into()));
        let event = Event::from_captured(captured, Some("lobby".into()));
        let value = event.to_value().unwrap();
        assert_eq!(value["rawPayload"], "hi");
        assert_eq!(value["channel"], "lobby");
        assert_eq!(value["direction"], "outgoing");
    }
}
