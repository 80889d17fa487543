//! Command implementations.

mod info;
mod run;
mod status;
mod validate;

pub use info::run_info;
pub use run::run_relay;
pub use status::run_status;
pub use validate::run_validate;

use std::path::Path;

use config_loader::{ConfigLoader, SettingsStore};
use contracts::RelaySettings;
use serde_json::Value;

use crate::error::{CliError, Result};

/// Load and validate a settings file
pub(crate) fn load_settings(path: &Path) -> Result<RelaySettings> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    Ok(ConfigLoader::load_from_path(path)?)
}

/// Apply `KEY=VALUE` overrides through the settings store
///
/// Values are read as JSON when they parse, otherwise as plain strings, so
/// `hub.enabled=true` and `hub.url=wss://x` both work.
pub(crate) fn apply_overrides(store: &SettingsStore, overrides: &[String]) -> Result<Vec<&'static str>> {
    let mut changes = Vec::with_capacity(overrides.len());
    for raw in overrides {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| CliError::invalid_override(raw))?;
        let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
        changes.push((key.trim().to_string(), value));
    }
    if changes.is_empty() {
        return Ok(Vec::new());
    }
    Ok(store.apply_changes(changes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file() {
        let err = load_settings(Path::new("/nonexistent/relay.toml")).unwrap_err();
        assert!(matches!(err, CliError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_settings_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[socket]\nenabled = true\nurl = \"ws://127.0.0.1:9000\"").unwrap();
        let settings = load_settings(file.path()).unwrap();
        assert!(settings.socket.is_active());
    }

    #[test]
    fn test_apply_overrides() {
        let store = SettingsStore::default();
        let changed = apply_overrides(
            &store,
            &[
                "hub.enabled=true".to_string(),
                "hub.url=wss://hub.test/relay".to_string(),
                "hub.method=Capture".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(changed, vec!["hub.enabled", "hub.url", "hub.method"]);
        assert_eq!(store.snapshot().hub.method, "Capture");

        let err = apply_overrides(&store, &["hub.enabled".to_string()]).unwrap_err();
        assert!(matches!(err, CliError::InvalidOverride { .. }));

        let err = apply_overrides(&store, &["hub.color=red".to_string()]).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
