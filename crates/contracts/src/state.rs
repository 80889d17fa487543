//! Connection states and the status query interface

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::RelaySettings;

/// Sink 类型标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Hub-style RPC connection
    Hub,
    /// Raw message socket
    Socket,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hub => "hub",
            Self::Socket => "socket",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个 sink 的连接状态
///
/// ```text
/// Disconnected → Connecting → Connected → Disconnected
///                                 ↕ (hub transport only)
///                           Reconnecting
/// Disconnected → RetryExhausted (socket only, after the auto-retry ceiling)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    RetryExhausted,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::RetryExhausted => "retry-exhausted",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Numeric encoding for gauges
    pub fn as_gauge(&self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting => 3.0,
            Self::RetryExhausted => 4.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkStatus {
    pub kind: SinkKind,
    pub state: ConnectionState,
    pub queue_len: usize,
    /// Reconnect attempts since the last successful connection
    pub reconnect_attempts: u32,
    /// Whether a reconnect timer is pending
    pub retry_pending: bool,
    /// Delay of the most recently scheduled reconnect
    pub retry_delay_ms: Option<u64>,
    /// Auto-retry ceiling reached (socket only)
    pub auto_exhausted: bool,
}

/// Status query result exposed to hosts and tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub hub_state: ConnectionState,
    pub socket_state: ConnectionState,
    pub socket_auto_attempts: u32,
    pub socket_auto_exhausted: bool,
    pub hub: SinkStatus,
    pub socket: SinkStatus,
    pub settings: RelaySettings,
}

impl RelayStatus {
    pub fn new(hub: SinkStatus, socket: SinkStatus, settings: RelaySettings) -> Self {
        Self {
            hub_state: hub.state,
            socket_state: socket.state,
            socket_auto_attempts: socket.reconnect_attempts,
            socket_auto_exhausted: socket.auto_exhausted,
            hub,
            socket,
            settings,
        }
    }
}
