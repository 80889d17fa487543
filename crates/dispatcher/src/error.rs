//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Capture feed line could not be decoded
    #[error("invalid captured event at line {line}: {message}")]
    InvalidEvent { line: u64, message: String },

    /// Sink or transport error (from contract)
    #[error("sink error: {0}")]
    Contract(#[from] contracts::ContractError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatcherError {
    /// Create an invalid event error
    pub fn invalid_event(line: u64, message: impl Into<String>) -> Self {
        Self::InvalidEvent {
            line,
            message: message.into(),
        }
    }

    /// Whether processing can continue with the next input
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidEvent { .. } => true,
            Self::Contract(e) => e.is_recoverable(),
            Self::Io(_) => false,
        }
    }
}
