//! Error types for CLI operations.

use contracts::ContractError;
use dispatcher::DispatcherError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Settings file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Malformed `--set` argument
    #[error("Invalid override '{raw}': expected KEY=VALUE")]
    InvalidOverride { raw: String },

    /// Settings parse, validation or store error
    #[error(transparent)]
    Config(#[from] ContractError),

    /// Relay runtime error
    #[error("Relay failed: {0}")]
    Relay(#[from] DispatcherError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn invalid_override(raw: impl Into<String>) -> Self {
        Self::InvalidOverride { raw: raw.into() }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
