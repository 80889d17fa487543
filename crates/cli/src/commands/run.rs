//! `run` command implementation.

use anyhow::{Context, Result};
use config_loader::SettingsStore;
use contracts::RelaySettings;
use std::time::Duration;
use tracing::info;

use super::{apply_overrides, load_settings};
use crate::cli::RunArgs;
use crate::relay::{Relay, RelayConfig};

/// Execute the `run` command
pub async fn run_relay(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let settings = load_settings(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let store = SettingsStore::new(settings);

    let changed = apply_overrides(&store, &args.overrides).context("Invalid --set override")?;
    if !changed.is_empty() {
        info!(changed = ?changed, "Applied CLI overrides");
    }

    let settings = store.snapshot();
    info!(
        hub_active = settings.hub.is_active(),
        hub_method = %settings.hub.method,
        socket_active = settings.socket.is_active(),
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&settings);
        return Ok(());
    }

    let relay_config = RelayConfig {
        store,
        config_path: args.config.clone(),
        overrides: args.overrides.clone(),
        input: args.input.clone(),
        buffer_size: args.buffer_size,
        drain: if args.drain_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(args.drain_secs))
        },
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
    };

    info!("Starting relay...");

    let stats = Relay::new(relay_config)
        .run(shutdown_signal())
        .await
        .context("Relay execution failed")?;

    info!(
        events = stats.summary.total_events,
        rejected_lines = stats.feed.rejected,
        reloads = stats.reloads,
        duration_secs = stats.duration.as_secs_f64(),
        events_per_sec = format!("{:.2}", stats.events_per_sec()),
        interrupted = stats.interrupted,
        "Relay finished"
    );
    stats.print_summary();

    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(settings: &RelaySettings) {
    println!("\n=== Configuration Summary ===\n");
    println!("Hub:");
    println!("  Active: {}", settings.hub.is_active());
    println!("  URL: {}", display_url(&settings.hub.url));
    println!("  Method: {}", settings.hub.method);
    println!(
        "  Publish: incoming={}, outgoing={}",
        settings.hub.publish_incoming, settings.hub.publish_outgoing
    );

    println!("\nSocket:");
    println!("  Active: {}", settings.socket.is_active());
    println!("  URL: {}", display_url(&settings.socket.url));
    println!(
        "  Publish: incoming={}, outgoing={}",
        settings.socket.publish_incoming, settings.socket.publish_outgoing
    );

    println!();
}

fn display_url(url: &str) -> &str {
    if url.is_empty() {
        "(none)"
    } else {
        url
    }
}
