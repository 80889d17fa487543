//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{RelaySettings, SinkGate};
use serde::Serialize;
use tracing::info;

use super::load_settings;
use crate::cli::InfoArgs;

/// Settings info for JSON output
#[derive(Serialize)]
struct SettingsInfo {
    hub: SinkInfo,
    socket: SinkInfo,
}

#[derive(Serialize)]
struct SinkInfo {
    enabled: bool,
    active: bool,
    url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    directions: Vec<&'static str>,
    verbose_logging: bool,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let settings = load_settings(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_settings_info(&settings);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_settings_info(&settings);
    }

    Ok(())
}

fn directions(gate: &SinkGate) -> Vec<&'static str> {
    let mut out = Vec::new();
    if gate.publish_incoming {
        out.push("incoming");
    }
    if gate.publish_outgoing {
        out.push("outgoing");
    }
    out
}

fn build_settings_info(settings: &RelaySettings) -> SettingsInfo {
    let hub_gate = settings.hub.gate();
    let socket_gate = settings.socket.gate();

    SettingsInfo {
        hub: SinkInfo {
            enabled: settings.hub.enabled,
            active: hub_gate.is_active(),
            url: settings.hub.url.clone(),
            method: Some(settings.hub.method.clone()),
            directions: directions(&hub_gate),
            verbose_logging: settings.hub.verbose_logging,
        },
        socket: SinkInfo {
            enabled: settings.socket.enabled,
            active: socket_gate.is_active(),
            url: settings.socket.url.clone(),
            method: None,
            directions: directions(&socket_gate),
            verbose_logging: settings.socket.verbose_logging,
        },
    }
}

fn print_settings_info(settings: &RelaySettings) {
    let info = build_settings_info(settings);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  WS Relay Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    for (name, sink) in [("Hub", &info.hub), ("Socket", &info.socket)] {
        println!("📤 {} ({})", name, if sink.active { "active" } else { "inactive" });
        println!("   ├─ Enabled: {}", sink.enabled);
        println!(
            "   ├─ URL: {}",
            if sink.url.is_empty() { "(none)" } else { &sink.url }
        );
        if let Some(ref method) = sink.method {
            println!("   ├─ Method: {}", method);
        }
        if sink.directions.is_empty() {
            println!("   ├─ Directions: (none)");
        } else {
            println!("   ├─ Directions: {}", sink.directions.join(", "));
        }
        println!("   └─ Verbose logging: {}\n", sink.verbose_logging);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::HubSettings;

    #[test]
    fn test_build_settings_info() {
        let settings = RelaySettings {
            hub: HubSettings {
                enabled: true,
                url: "wss://hub.test".into(),
                publish_outgoing: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let info = build_settings_info(&settings);
        assert!(info.hub.active);
        assert_eq!(info.hub.directions, vec!["outgoing"]);
        assert_eq!(info.hub.method.as_deref(), Some("Publish"));
        assert!(!info.socket.active);

        let value = serde_json::to_value(&info).unwrap();
        assert!(value["socket"].get("method").is_none());
    }
}
