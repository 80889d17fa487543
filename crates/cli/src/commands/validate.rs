//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::RelaySettings;
use serde::Serialize;
use tracing::info;

use super::load_settings;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<SettingsSummary>,
}

#[derive(Serialize)]
struct SettingsSummary {
    hub_active: bool,
    hub_method: String,
    socket_active: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_settings(&args.config) {
        Ok(settings) => {
            let warnings = collect_warnings(&settings);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(SettingsSummary {
                    hub_active: settings.hub.is_active(),
                    hub_method: settings.hub.method.clone(),
                    socket_active: settings.socket.is_active(),
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect non-fatal issues
fn collect_warnings(settings: &RelaySettings) -> Vec<String> {
    let mut warnings = Vec::new();

    let sections = [
        ("hub", settings.hub.gate()),
        ("socket", settings.socket.gate()),
    ];

    if sections.iter().all(|(_, gate)| !gate.is_active()) {
        warnings.push("No sink is active - every event will be skipped".to_string());
    }

    for (name, gate) in sections {
        if gate.enabled && !gate.has_url {
            warnings.push(format!("{name} is enabled but has no url"));
        }
        if gate.is_active() && !gate.publish_incoming && !gate.publish_outgoing {
            warnings.push(format!("{name} is active but publishes neither direction"));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Hub active: {}", summary.hub_active);
            println!("  Hub method: {}", summary.hub_method);
            println!("  Socket active: {}", summary.socket_active);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{HubSettings, SocketSettings};

    #[test]
    fn test_warnings() {
        let settings = RelaySettings::default();
        assert_eq!(collect_warnings(&settings).len(), 1);

        let settings = RelaySettings {
            hub: HubSettings {
                enabled: true,
                ..Default::default()
            },
            socket: SocketSettings {
                enabled: true,
                url: "ws://127.0.0.1:9000".into(),
                ..Default::default()
            },
        };
        let warnings = collect_warnings(&settings);
        assert!(warnings.iter().any(|w| w.contains("hub is enabled but has no url")));
        assert!(warnings.iter().any(|w| w.contains("socket is active but publishes neither")));
    }
}
