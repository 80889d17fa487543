//! Relay orchestration module.

mod orchestrator;
mod stats;

pub use orchestrator::{build_dispatcher, Relay, RelayConfig};
pub use stats::RelayStats;
