//! 分层错误定义
//!
//! 按来源分类：config / transport / delivery / capacity / general

use thiserror::Error;

use crate::SinkKind;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Unknown key in a flat settings change set
    #[error("unknown settings key '{key}'")]
    UnknownSettingsKey { key: String },

    // ===== Transport Errors =====
    /// Endpoint URL could not be parsed or has an unsupported scheme
    #[error("invalid endpoint url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Connection negotiation failed (expected during reconnect churn)
    #[error("{sink} handshake failed: {message}")]
    HandshakeFailed { sink: SinkKind, message: String },

    /// Connection closed while an operation was in flight
    #[error("{sink} connection closed")]
    ConnectionClosed { sink: SinkKind },

    /// Sink has no active connection target
    #[error("{sink} is disabled or has no endpoint configured")]
    SinkDisabled { sink: SinkKind },

    // ===== Delivery Errors =====
    /// Send or invoke failed after the connection was believed open
    #[error("{sink} delivery failed: {message}")]
    DeliveryFailed {
        sink: SinkKind,
        message: String,
        /// Whether the event went back into the pending queue
        requeued: bool,
    },

    /// Remote hub reported an invocation error
    #[error("{sink} remote invocation '{method}' failed: {message}")]
    RemoteInvocation {
        sink: SinkKind,
        method: String,
        message: String,
    },

    // ===== Capacity Errors =====
    /// Pending queue at capacity, new message dropped
    #[error("{sink} queue full ({capacity}), message dropped")]
    QueueFull { sink: SinkKind, capacity: usize },

    /// Auto-reconnect ceiling reached
    #[error("{sink} auto-retry stopped after {attempts} attempts")]
    RetryExhausted { sink: SinkKind, attempts: u32 },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create invalid url error
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create handshake error
    pub fn handshake(sink: SinkKind, message: impl Into<String>) -> Self {
        Self::HandshakeFailed {
            sink,
            message: message.into(),
        }
    }

    /// Create delivery error
    pub fn delivery(sink: SinkKind, message: impl Into<String>, requeued: bool) -> Self {
        Self::DeliveryFailed {
            sink,
            message: message.into(),
            requeued,
        }
    }

    /// Create remote invocation error
    pub fn remote_invocation(
        sink: SinkKind,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RemoteInvocation {
            sink,
            method: method.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for connection negotiation noise.
    ///
    /// These are suppressed from default-level logs.
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::HandshakeFailed { .. })
    }

    /// Returns `true` if a later configure/connect/publish can recover.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::HandshakeFailed { .. }
                | Self::ConnectionClosed { .. }
                | Self::SinkDisabled { .. }
                | Self::DeliveryFailed { .. }
                | Self::RemoteInvocation { .. }
                | Self::QueueFull { .. }
                | Self::RetryExhausted { .. }
                | Self::Io(_)
        )
    }

    /// Short machine-readable classification used in reports and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. }
            | Self::ConfigValidation { .. }
            | Self::UnknownSettingsKey { .. } => "config",
            Self::InvalidUrl { .. } => "invalid-url",
            Self::HandshakeFailed { .. } => "handshake",
            Self::ConnectionClosed { .. } => "closed",
            Self::SinkDisabled { .. } => "disabled",
            Self::DeliveryFailed { .. } | Self::RemoteInvocation { .. } => "delivery",
            Self::QueueFull { .. } => "queue-full",
            Self::RetryExhausted { .. } => "retry-exhausted",
            Self::Io(_) | Self::Json(_) | Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ContractError::QueueFull {
            sink: SinkKind::Hub,
            capacity: 500,
        };
        assert_eq!(err.to_string(), "hub queue full (500), message dropped");
    }

    #[test]
    fn test_handshake_is_expected() {
        let err = ContractError::handshake(SinkKind::Hub, "Failed to fetch");
        assert!(err.is_expected());
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "handshake");
    }

    #[test]
    fn test_config_errors_not_recoverable() {
        let err = ContractError::config_validation("hub.url", "missing");
        assert!(!err.is_recoverable());
        assert!(!err.is_expected());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: ContractError = json_err.into();
        assert!(matches!(err, ContractError::Json(_)));
    }
}
