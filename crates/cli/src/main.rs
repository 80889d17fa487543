//! # WS Relay CLI
//!
//! Command-line host for the capture relay.
//!
//! Provides:
//! - Settings loading and validation
//! - Relay orchestration and lifecycle management
//! - Graceful shutdown and live settings reload

mod cli;
mod commands;
mod error;
mod relay;

use anyhow::Result;
use clap::Parser;
use config_loader::ConfigLoader;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_info, run_relay, run_status, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    init_logging(&cli)?;

    info!(version = env!("CARGO_PKG_VERSION"), "WS Relay CLI starting");

    let result = match &cli.command {
        Commands::Run(args) => run_relay(args).await,
        Commands::Validate(args) => run_validate(args),
        Commands::Info(args) => run_info(args),
        Commands::Status(args) => run_status(args).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}

/// Initialize logging based on CLI options
fn init_logging(cli: &Cli) -> Result<()> {
    let default_log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    // The metrics exporter is installed by `run` once the port is known.
    let mut config = ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: None,
        default_log_level: default_log_level.to_string(),
        verbose_sinks: false,
    };
    // Load errors surface from the command itself
    if let Ok(settings) = ConfigLoader::load_from_path(cli.command.config_path()) {
        config = config.with_settings(&settings);
    }
    observability::init_with_config(config)
}
