//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// WS Relay - forwards captured WebSocket traffic to a hub and a raw socket
#[derive(Parser, Debug)]
#[command(
    name = "ws-relay",
    author,
    version,
    about = "WebSocket capture relay",
    long_about = "Relays captured WebSocket messages to an RPC hub and/or a raw WebSocket endpoint.\n\n\
                  Reads newline-delimited captured events, gates them per sink and direction, \n\
                  and keeps both sinks connected with queueing and reconnect backoff."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "WS_RELAY_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "WS_RELAY_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Relay a capture feed to the configured sinks
    Run(RunArgs),

    /// Validate a settings file without connecting
    Validate(ValidateArgs),

    /// Display settings information
    Info(InfoArgs),

    /// Configure the sinks, wait briefly and print their status
    Status(StatusArgs),
}

impl Commands {
    /// Settings file the command reads
    pub fn config_path(&self) -> &Path {
        match self {
            Self::Run(args) => &args.config,
            Self::Validate(args) => &args.config,
            Self::Info(args) => &args.config,
            Self::Status(args) => &args.config,
        }
    }
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to settings file (TOML or JSON); re-read on SIGHUP
    #[arg(short, long, default_value = "relay.toml", env = "WS_RELAY_CONFIG")]
    pub config: PathBuf,

    /// Capture feed with one JSON event per line (default: stdin)
    #[arg(short, long, env = "WS_RELAY_INPUT")]
    pub input: Option<PathBuf>,

    /// Override a setting, e.g. `--set hub.enabled=true` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Validate settings and exit without relaying
    #[arg(long)]
    pub dry_run: bool,

    /// Capture feed channel capacity
    #[arg(long, default_value = "256", env = "WS_RELAY_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Seconds to wait for queued events after the feed ends (0 = none)
    #[arg(long, default_value = "0", env = "WS_RELAY_DRAIN_SECS")]
    pub drain_secs: u64,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "WS_RELAY_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to settings file to validate
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to settings file
    #[arg(short, long, default_value = "relay.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `status` command
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Path to settings file
    #[arg(short, long, default_value = "relay.toml", env = "WS_RELAY_CONFIG")]
    pub config: PathBuf,

    /// Override a setting, e.g. `--set socket.url=ws://localhost:9000` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// Milliseconds to let connections settle before reporting
    #[arg(long, default_value = "2000")]
    pub settle_ms: u64,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_per_command() {
        let cli = Cli::try_parse_from(["ws-relay", "validate", "-c", "relay.json"]).unwrap();
        assert_eq!(cli.command.config_path(), Path::new("relay.json"));

        let cli = Cli::try_parse_from(["ws-relay", "status", "--config", "a/b.toml"]).unwrap();
        assert_eq!(cli.command.config_path(), Path::new("a/b.toml"));
    }
}
