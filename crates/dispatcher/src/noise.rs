//! Connection noise suppression
//!
//! Reconnect churn produces a stream of well-known failure messages. Those
//! are demoted to debug unless the sink's verbose flag is set; everything
//! else keeps its level.

use std::sync::LazyLock;

use regex::RegexSet;
use tracing::Level;

const NOISE_PATTERNS: &[&str] = &[
    r"Failed to complete negotiation with the server",
    r"Failed to start the connection",
    r"Connection disconnected with error",
    r"WebSocket closed with status code:\s*1006",
    r"Failed to fetch",
    r"HubConnection failed to start successfully",
];

static NOISE: LazyLock<Option<RegexSet>> = LazyLock::new(|| RegexSet::new(NOISE_PATTERNS).ok());

/// Whether `message` is known reconnect noise
pub fn is_noise(message: &str) -> bool {
    NOISE.as_ref().is_some_and(|set| set.is_match(message))
}

/// Per-sink log level policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoiseFilter {
    verbose: bool,
}

impl NoiseFilter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Level for a failure normally logged at `level`
    pub fn level_for(&self, level: Level, message: &str) -> Level {
        if !self.verbose && level <= Level::WARN && is_noise(message) {
            Level::DEBUG
        } else {
            level
        }
    }

    /// Level for an expected handshake failure
    pub fn handshake_level(&self) -> Level {
        if self.verbose {
            Level::WARN
        } else {
            Level::DEBUG
        }
    }
}

/// Emit a sink failure at a runtime-chosen level
macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {{
        let level: tracing::Level = $level;
        if level == tracing::Level::ERROR {
            tracing::error!($($arg)+)
        } else if level == tracing::Level::WARN {
            tracing::warn!($($arg)+)
        } else if level == tracing::Level::INFO {
            tracing::info!($($arg)+)
        } else if level == tracing::Level::DEBUG {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    }};
}

pub(crate) use log_at;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_noise() {
        assert!(is_noise("Error: Failed to complete negotiation with the server: TypeError"));
        assert!(is_noise("WebSocket closed with status code: 1006 ()."));
        assert!(is_noise("WebSocket closed with status code:1006"));
        assert!(!is_noise("WebSocket closed with status code: 1000"));
        assert!(!is_noise("queue full"));
    }

    #[test]
    fn test_demotion_respects_verbose() {
        let quiet = NoiseFilter::new(false);
        let verbose = NoiseFilter::new(true);
        let msg = "Failed to fetch";

        assert_eq!(quiet.level_for(Level::WARN, msg), Level::DEBUG);
        assert_eq!(quiet.level_for(Level::ERROR, msg), Level::DEBUG);
        assert_eq!(verbose.level_for(Level::WARN, msg), Level::WARN);
        assert_eq!(quiet.level_for(Level::WARN, "send failed"), Level::WARN);

        assert_eq!(quiet.handshake_level(), Level::DEBUG);
        assert_eq!(verbose.handshake_level(), Level::WARN);
    }
}
