//! Publish outcomes and the aggregated dispatch report

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Result of handing one event to one sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "status")]
pub enum PublishOutcome {
    /// Transport accepted the event now
    Delivered,
    /// Held in the pending queue until the sink connects
    Queued,
    /// Failed; the reason is already logged
    Errored { reason: String },
}

impl PublishOutcome {
    pub fn errored(reason: impl Into<String>) -> Self {
        Self::Errored {
            reason: reason.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Queued => "queued",
            Self::Errored { .. } => "errored",
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

impl From<Result<PublishOutcome, ContractError>> for PublishOutcome {
    fn from(result: Result<PublishOutcome, ContractError>) -> Self {
        result.unwrap_or_else(|e| Self::errored(e.to_string()))
    }
}

/// What a `configure` call set in motion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigureEffect {
    /// A (re)connect was started
    Connect,
    /// The live connection is being stopped
    Disconnect,
    /// Settings absorbed without touching the connection
    None,
}

/// Result of an explicit hub connect request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnsureConnected {
    /// Hub sink is disabled
    Disabled,
    /// Hub sink has no endpoint configured
    NoUrl,
    /// Connect requested; a no-op when already connected or connecting
    Started,
}

/// Why nothing was published
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkipReason {
    /// No sink allows the event's direction
    Disabled,
}

/// Aggregated per-sink report for one dispatched event
///
/// A `None` sink entry means the sink was gated out for this event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub hub: Option<PublishOutcome>,
    pub socket: Option<PublishOutcome>,
}

impl DispatchReport {
    /// Report for an event no sink accepted
    pub fn disabled(channel: Option<String>) -> Self {
        Self {
            published: false,
            reason: Some(SkipReason::Disabled),
            channel,
            hub: None,
            socket: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SinkKind;

    #[test]
    fn test_outcome_from_error() {
        let result: Result<PublishOutcome, ContractError> = Err(ContractError::QueueFull {
            sink: SinkKind::Socket,
            capacity: 500,
        });
        let outcome = PublishOutcome::from(result);
        assert_eq!(outcome.as_str(), "errored");
    }

    #[test]
    fn test_disabled_report_serialization() {
        let value = serde_json::to_value(DispatchReport::disabled(None)).unwrap();
        assert_eq!(value["published"], false);
        assert_eq!(value["reason"], "disabled");
    }
}
