//! Hub JSON protocol framing
//!
//! Every message is a JSON object terminated by the ASCII record separator
//! (0x1E); one WebSocket text frame may carry several messages. The client
//! opens with a handshake request and must receive an empty (or error)
//! handshake response before anything else.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message terminator
pub const RECORD_SEPARATOR: char = '\u{1e}';

const PROTOCOL_NAME: &str = "json";
const PROTOCOL_VERSION: u32 = 1;

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

#[derive(Serialize)]
struct HandshakeRequest {
    protocol: &'static str,
    version: u32,
}

#[derive(Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvocationFrame<'a> {
    #[serde(rename = "type")]
    kind: u8,
    invocation_id: &'a str,
    target: &'a str,
    arguments: [Value; 1],
}

#[derive(Serialize)]
struct TypeOnlyFrame {
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

/// Decoded server → client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Server-initiated invocation of a client method (ignored by the relay)
    Invocation { target: String },
    /// Result of a client invocation
    Completion {
        invocation_id: String,
        error: Option<String>,
    },
    Ping,
    /// Server is closing the connection
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Stream items and other message types the relay does not use
    Other(u8),
}

/// Handshake request frame
pub fn handshake_request() -> String {
    terminate(&HandshakeRequest {
        protocol: PROTOCOL_NAME,
        version: PROTOCOL_VERSION,
    })
}

/// Parse the handshake response
///
/// Returns the remaining frames that arrived in the same text message.
pub fn parse_handshake_response(text: &str) -> Result<Vec<&str>, String> {
    let mut frames = split_frames(text);
    let first = frames
        .next()
        .ok_or_else(|| "empty handshake response".to_string())?;
    let response: HandshakeResponse = serde_json::from_str(first)
        .map_err(|e| format!("invalid handshake response: {e}"))?;
    match response.error {
        Some(error) => Err(format!("Handshake was rejected by the server: {error}")),
        None => Ok(frames.collect()),
    }
}

/// Invocation frame carrying a single argument
pub fn invocation_message(invocation_id: &str, target: &str, argument: Value) -> String {
    terminate(&InvocationFrame {
        kind: TYPE_INVOCATION,
        invocation_id,
        target,
        arguments: [argument],
    })
}

pub fn ping_message() -> String {
    terminate(&TypeOnlyFrame { kind: TYPE_PING })
}

pub fn close_message() -> String {
    terminate(&TypeOnlyFrame { kind: TYPE_CLOSE })
}

/// Split a text frame into its record-separated messages
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR).filter(|s| !s.trim().is_empty())
}

/// Decode one message
pub fn parse_message(frame: &str) -> Result<ServerMessage, serde_json::Error> {
    let raw: RawMessage = serde_json::from_str(frame)?;
    Ok(match raw.kind {
        TYPE_INVOCATION => ServerMessage::Invocation {
            target: raw.target.unwrap_or_default(),
        },
        TYPE_COMPLETION => ServerMessage::Completion {
            invocation_id: raw.invocation_id.unwrap_or_default(),
            error: raw.error,
        },
        TYPE_PING => ServerMessage::Ping,
        TYPE_CLOSE => ServerMessage::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect,
        },
        other => ServerMessage::Other(other),
    })
}

fn terminate<T: Serialize>(message: &T) -> String {
    // Serializing these plain structs cannot fail.
    let mut json = serde_json::to_string(message).unwrap_or_default();
    json.push(RECORD_SEPARATOR);
    json
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_request() {
        assert_eq!(handshake_request(), "{\"protocol\":\"json\",\"version\":1}\u{1e}");
    }

    #[test]
    fn test_handshake_response() {
        assert!(parse_handshake_response("{}\u{1e}").unwrap().is_empty());

        let rest = parse_handshake_response("{}\u{1e}{\"type\":6}\u{1e}").unwrap();
        assert_eq!(rest, vec!["{\"type\":6}"]);

        let err = parse_handshake_response("{\"error\":\"bad protocol\"}\u{1e}").unwrap_err();
        assert!(err.contains("bad protocol"));
    }

    #[test]
    fn test_invocation_frame() {
        let frame = invocation_message("7", "Publish", json!({"channel": "a"}));
        let value: Value = serde_json::from_str(frame.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(value["type"], 1);
        assert_eq!(value["invocationId"], "7");
        assert_eq!(value["target"], "Publish");
        assert_eq!(value["arguments"][0]["channel"], "a");
    }

    #[test]
    fn test_parse_messages() {
        let text = "{\"type\":3,\"invocationId\":\"1\"}\u{1e}{\"type\":3,\"invocationId\":\"2\",\"error\":\"boom\"}\u{1e}{\"type\":7,\"allowReconnect\":true}\u{1e}";
        let messages: Vec<_> = split_frames(text).map(|f| parse_message(f).unwrap()).collect();
        assert_eq!(
            messages,
            vec![
                ServerMessage::Completion {
                    invocation_id: "1".into(),
                    error: None
                },
                ServerMessage::Completion {
                    invocation_id: "2".into(),
                    error: Some("boom".into())
                },
                ServerMessage::Close {
                    error: None,
                    allow_reconnect: true
                },
            ]
        );
    }

    #[test]
    fn test_unknown_type() {
        assert_eq!(
            parse_message("{\"type\":2,\"item\":1}").unwrap(),
            ServerMessage::Other(2)
        );
    }
}
