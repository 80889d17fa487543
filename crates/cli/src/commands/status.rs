//! `status` command implementation.

use anyhow::{Context, Result};
use config_loader::SettingsStore;
use contracts::{RelayStatus, SinkStatus};
use std::time::Duration;
use tracing::info;

use super::{apply_overrides, load_settings};
use crate::cli::StatusArgs;
use crate::relay::build_dispatcher;

/// Execute the `status` command
pub async fn run_status(args: &StatusArgs) -> Result<()> {
    let settings = load_settings(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let store = SettingsStore::new(settings);
    apply_overrides(&store, &args.overrides).context("Invalid --set override")?;

    let dispatcher = build_dispatcher();
    let applied = dispatcher.apply_settings(store.snapshot());
    info!(
        hub = ?applied.hub,
        socket = ?applied.socket,
        settle_ms = args.settle_ms,
        "Sinks configured, waiting for connections to settle"
    );

    tokio::time::sleep(Duration::from_millis(args.settle_ms)).await;

    let status = dispatcher.status();
    dispatcher.shutdown();

    if args.json {
        let json = serde_json::to_string_pretty(&status).context("Failed to serialize status")?;
        println!("{}", json);
    } else {
        print_status(&status);
    }

    Ok(())
}

fn print_status(status: &RelayStatus) {
    println!("\n=== Relay Status ===\n");
    print_sink("Hub", &status.hub);
    print_sink("Socket", &status.socket);
}

fn print_sink(name: &str, sink: &SinkStatus) {
    println!("{}:", name);
    println!("  State: {:?}", sink.state);
    println!("  Queued: {}", sink.queue_len);
    println!("  Reconnect attempts: {}", sink.reconnect_attempts);
    match (sink.retry_pending, sink.retry_delay_ms) {
        (true, Some(delay)) => println!("  Retry: pending in {} ms", delay),
        (true, None) => println!("  Retry: pending"),
        (false, _) => println!("  Retry: none"),
    }
    if sink.auto_exhausted {
        println!("  Auto-retry exhausted; a new event will trigger a manual dial");
    }
    println!();
}
