//! Channel extraction
//!
//! Best-effort routing hint pulled from a captured payload. Never fails:
//! anything unrecognized yields `None`. False positives are possible since
//! text payloads are scanned, not parsed.

use std::sync::LazyLock;

use contracts::{CapturedEvent, Payload, BINARY_SENTINEL};
use regex::Regex;
use serde_json::Value;

/// Keys checked on structured payloads, in priority order
const MAPPING_KEYS: &[&str] = &["channel", "topic", "event", "name", "type"];

/// Literal markers searched in text payloads, in priority order
const TEXT_MARKERS: &[&str] = &["\"channel\"", "\"Channel\"", "'channel'", "'Channel'"];

static CHANNEL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)["']channel["']\s*:\s*["']([^"']+)["']"#).ok());

/// Channel for a captured event
///
/// A channel precomputed by the capture layer wins over extraction.
pub fn resolve_channel(captured: &CapturedEvent) -> Option<String> {
    captured
        .channel
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .or_else(|| extract_channel(captured.raw_payload.as_ref()))
}

/// Extract a channel name from a payload
pub fn extract_channel(payload: Option<&Payload>) -> Option<String> {
    match payload? {
        Payload::Binary => None,
        Payload::Text(text) => extract_from_text(text),
        Payload::Structured(Value::String(text)) => extract_from_text(text),
        Payload::Structured(Value::Object(map)) => MAPPING_KEYS.iter().find_map(|key| {
            map.get(*key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }),
        Payload::Structured(_) => None,
    }
}

fn extract_from_text(text: &str) -> Option<String> {
    if text == BINARY_SENTINEL {
        return None;
    }

    let found = TEXT_MARKERS
        .iter()
        .find_map(|marker| text.find(marker).map(|pos| pos + marker.len()));

    let channel = match found {
        Some(after_marker) => value_after_marker(&text[after_marker..]),
        None => CHANNEL_PATTERN
            .as_ref()
            .and_then(|re| re.captures(text))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string()),
    };

    channel.filter(|c| !c.is_empty())
}

/// Token following the next `:` after a marker
fn value_after_marker(rest: &str) -> Option<String> {
    let colon = rest.find(':')?;
    let value = rest[colon + 1..].trim_start();
    let mut chars = value.chars();

    match chars.next()? {
        quote @ ('"' | '\'') => read_quoted(chars.as_str(), quote),
        _ => {
            let end = value
                .find(|c: char| c == ',' || c == ']' || c == '}' || c.is_whitespace())
                .unwrap_or(value.len());
            Some(strip_one_quote(&value[..end]).to_string())
        }
    }
}

/// Read up to the matching unescaped quote; unterminated yields `None`.
fn read_quoted(body: &str, quote: char) -> Option<String> {
    let mut out = String::new();
    let mut escaped = false;
    for c in body.chars() {
        if escaped {
            out.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Some(out);
        } else {
            out.push(c);
        }
    }
    None
}

fn strip_one_quote(token: &str) -> &str {
    let token = token
        .strip_prefix('"')
        .or_else(|| token.strip_prefix('\''))
        .unwrap_or(token);
    token
        .strip_suffix('"')
        .or_else(|| token.strip_suffix('\''))
        .unwrap_or(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn text(s: &str) -> Option<String> {
        extract_channel(Some(&Payload::Text(s.to_string())))
    }

    #[test]
    fn test_missing_and_binary() {
        assert_eq!(extract_channel(None), None);
        assert_eq!(extract_channel(Some(&Payload::Binary)), None);
        assert_eq!(text(BINARY_SENTINEL), None);
    }

    #[test]
    fn test_structured_key_priority() {
        let payload = Payload::Structured(json!({"type": "t", "topic": "prices", "name": ""}));
        assert_eq!(extract_channel(Some(&payload)), Some("prices".into()));

        let payload = Payload::Structured(json!({"channel": "", "event": 5, "type": "ping"}));
        assert_eq!(extract_channel(Some(&payload)), Some("ping".into()));

        let payload = Payload::Structured(json!([1, 2, 3]));
        assert_eq!(extract_channel(Some(&payload)), None);
    }

    #[test]
    fn test_quoted_text() {
        assert_eq!(text(r#"{"channel":"lobby","x":1}"#), Some("lobby".into()));
        assert_eq!(text(r#"{"Channel" : "room-7"}"#), Some("room-7".into()));
        assert_eq!(text(r#"{'channel': 'single'}"#), Some("single".into()));
        assert_eq!(text(r#"{"channel":"a\"b"}"#), Some("a\"b".into()));
    }

    #[test]
    fn test_marker_priority() {
        assert_eq!(
            text(r#"{'channel':'second', "channel":"first"}"#),
            Some("first".into())
        );
    }

    #[test]
    fn test_bare_token() {
        assert_eq!(text(r#"{"channel": 42, "x": 1}"#), Some("42".into()));
        assert_eq!(text(r#"["channel": abc]"#), Some("abc".into()));
    }

    #[test]
    fn test_unterminated_or_empty() {
        assert_eq!(text(r#"{"channel":"never closed"#), None);
        assert_eq!(text(r#"{"channel":""}"#), None);
        assert_eq!(text(r#"{"channel"}"#), None);
        assert_eq!(text("no marker here"), None);
    }

    #[test]
    fn test_regex_fallback() {
        // Marker with mixed case is only reachable through the pattern.
        assert_eq!(text(r#"{"CHANNEL": "upper"}"#), Some("upper".into()));
    }

    #[test]
    fn test_structured_string_treated_as_text() {
        let payload = Payload::Structured(Value::String(r#"{"channel":"x"}"#.into()));
        assert_eq!(extract_channel(Some(&payload)), Some("x".into()));
    }

    #[test]
    fn test_precomputed_channel_wins() {
        let mut captured = CapturedEvent::now(
            contracts::Direction::Incoming,
            "wss://x",
            Some(r#"{"channel":"payload"}"#.into()),
        );
        assert_eq!(resolve_channel(&captured), Some("payload".into()));
        captured.channel = Some("precomputed".into());
        assert_eq!(resolve_channel(&captured), Some("precomputed".into()));
        captured.channel = Some("  ".into());
        assert_eq!(resolve_channel(&captured), Some("payload".into()));
    }

    proptest! {
        #[test]
        fn prop_extract_is_total_and_idempotent(s in ".*") {
            let first = text(&s);
            let second = text(&s);
            prop_assert_eq!(&first, &second);
            if let Some(channel) = first {
                prop_assert!(!channel.is_empty());
            }
        }

        #[test]
        fn prop_embedded_channel_found(name in "[a-z][a-z0-9_-]{0,15}") {
            let payload = format!(r#"{{"id":1,"channel":"{name}","data":[]}}"#);
            prop_assert_eq!(text(&payload), Some(name));
        }
    }
}
