//! RelaySettings - 配置存储快照
//!
//! Owned by the external config store; dispatcher and sinks keep read-only
//! copies refreshed on every change notification.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::Direction;

/// Default remote method invoked on the hub
pub const DEFAULT_HUB_METHOD: &str = "Publish";

/// Complete settings snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct RelaySettings {
    /// Hub (RPC) sink section
    #[serde(default)]
    #[validate(nested)]
    pub hub: HubSettings,

    /// Raw socket sink section
    #[serde(default)]
    #[validate(nested)]
    pub socket: SocketSettings,
}

/// Hub sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct HubSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Hub endpoint (`ws(s)://` or `http(s)://`)
    #[serde(default)]
    pub url: String,

    /// Remote method name invoked per event
    #[serde(default = "default_hub_method")]
    #[validate(length(min = 1, message = "hub method cannot be empty"))]
    pub method: String,

    #[serde(default)]
    pub publish_incoming: bool,

    #[serde(default)]
    pub publish_outgoing: bool,

    /// Surface expected handshake noise at warn level
    #[serde(default)]
    pub verbose_logging: bool,
}

fn default_hub_method() -> String {
    DEFAULT_HUB_METHOD.to_string()
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            method: default_hub_method(),
            publish_incoming: false,
            publish_outgoing: false,
            verbose_logging: false,
        }
    }
}

/// Raw socket sink settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SocketSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Socket endpoint (`ws(s)://`)
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub publish_incoming: bool,

    #[serde(default)]
    pub publish_outgoing: bool,

    #[serde(default)]
    pub verbose_logging: bool,
}

/// Enablement and direction gates shared by both sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkGate {
    pub enabled: bool,
    pub has_url: bool,
    pub publish_incoming: bool,
    pub publish_outgoing: bool,
}

impl SinkGate {
    /// A sink is active when enabled with a non-empty endpoint.
    pub fn is_active(&self) -> bool {
        self.enabled && self.has_url
    }

    /// Whether an event in `direction` may be published to this sink.
    pub fn allows(&self, direction: Direction) -> bool {
        self.is_active()
            && match direction {
                Direction::Incoming => self.publish_incoming,
                Direction::Outgoing => self.publish_outgoing,
            }
    }
}

impl HubSettings {
    pub fn gate(&self) -> SinkGate {
        SinkGate {
            enabled: self.enabled,
            has_url: !self.url.trim().is_empty(),
            publish_incoming: self.publish_incoming,
            publish_outgoing: self.publish_outgoing,
        }
    }

    pub fn is_active(&self) -> bool {
        self.gate().is_active()
    }
}

impl SocketSettings {
    pub fn gate(&self) -> SinkGate {
        SinkGate {
            enabled: self.enabled,
            has_url: !self.url.trim().is_empty(),
            publish_incoming: self.publish_incoming,
            publish_outgoing: self.publish_outgoing,
        }
    }

    pub fn is_active(&self) -> bool {
        self.gate().is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RelaySettings::default();
        assert!(!settings.hub.enabled);
        assert_eq!(settings.hub.method, "Publish");
        assert!(!settings.socket.is_active());
    }

    #[test]
    fn test_gate_requires_url() {
        let hub = HubSettings {
            enabled: true,
            publish_incoming: true,
            ..Default::default()
        };
        assert!(!hub.gate().allows(Direction::Incoming));

        let hub = HubSettings {
            url: "wss://x".into(),
            ..hub
        };
        assert!(hub.gate().allows(Direction::Incoming));
        assert!(!hub.gate().allows(Direction::Outgoing));
    }

    #[test]
    fn test_partial_deserialize() {
        let settings: RelaySettings =
            serde_json::from_str(r#"{"socket": {"enabled": true, "url": "ws://localhost:9"}}"#)
                .unwrap();
        assert!(settings.socket.is_active());
        assert_eq!(settings.hub, HubSettings::default());
    }

    #[test]
    fn test_validate_empty_method() {
        let mut settings = RelaySettings::default();
        settings.hub.method = String::new();
        assert!(settings.validate().is_err());
    }
}
