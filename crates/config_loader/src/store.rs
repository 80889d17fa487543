//! SettingsStore - in-memory settings source with change notification
//!
//! Stands in for the host's key-value settings storage. Consumers take a
//! `watch::Receiver` and re-read the full snapshot on every notification.

use contracts::{ContractError, RelaySettings};
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::validator;

/// Every flat key understood by [`SettingsStore::apply_changes`]
pub const SETTINGS_KEYS: &[&str] = &[
    "hub.enabled",
    "hub.url",
    "hub.method",
    "hub.publish_incoming",
    "hub.publish_outgoing",
    "hub.verbose_logging",
    "socket.enabled",
    "socket.url",
    "socket.publish_incoming",
    "socket.publish_outgoing",
    "socket.verbose_logging",
];

/// Shared settings snapshot with change notification
#[derive(Debug, Clone)]
pub struct SettingsStore {
    tx: watch::Sender<RelaySettings>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new(RelaySettings::default())
    }
}

impl SettingsStore {
    pub fn new(initial: RelaySettings) -> Self {
        Self {
            tx: watch::Sender::new(initial),
        }
    }

    /// Current settings
    pub fn snapshot(&self) -> RelaySettings {
        self.tx.borrow().clone()
    }

    /// Change notifications; the receiver starts at the current snapshot
    pub fn subscribe(&self) -> watch::Receiver<RelaySettings> {
        self.tx.subscribe()
    }

    /// Replace the whole snapshot
    ///
    /// Subscribers are notified only when something changed.
    ///
    /// # Errors
    /// Validation failure; the stored snapshot is left untouched
    pub fn replace(&self, settings: RelaySettings) -> Result<Vec<&'static str>, ContractError> {
        validator::validate(&settings)?;
        Ok(self.commit(settings))
    }

    /// Apply flat `section.field` changes atomically
    ///
    /// Returns the keys whose values actually changed.
    ///
    /// # Errors
    /// Unknown key, wrongly typed value or validation failure; nothing is
    /// applied in that case
    pub fn apply_changes<I, K>(&self, changes: I) -> Result<Vec<&'static str>, ContractError>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        let mut candidate = self.snapshot();
        for (key, value) in changes {
            set_key(&mut candidate, key.as_ref(), value)?;
        }
        validator::validate(&candidate)?;
        Ok(self.commit(candidate))
    }

    fn commit(&self, settings: RelaySettings) -> Vec<&'static str> {
        let mut changed = Vec::new();
        self.tx.send_if_modified(|current| {
            changed = changed_keys(current, &settings);
            if changed.is_empty() {
                return false;
            }
            *current = settings;
            true
        });
        if !changed.is_empty() {
            debug!(keys = ?changed, "Settings changed");
        }
        changed
    }
}

/// Flat keys that differ between two snapshots
pub fn changed_keys(old: &RelaySettings, new: &RelaySettings) -> Vec<&'static str> {
    let (a, b) = (&old.hub, &new.hub);
    let (c, d) = (&old.socket, &new.socket);
    [
        ("hub.enabled", a.enabled != b.enabled),
        ("hub.url", a.url != b.url),
        ("hub.method", a.method != b.method),
        ("hub.publish_incoming", a.publish_incoming != b.publish_incoming),
        ("hub.publish_outgoing", a.publish_outgoing != b.publish_outgoing),
        ("hub.verbose_logging", a.verbose_logging != b.verbose_logging),
        ("socket.enabled", c.enabled != d.enabled),
        ("socket.url", c.url != d.url),
        ("socket.publish_incoming", c.publish_incoming != d.publish_incoming),
        ("socket.publish_outgoing", c.publish_outgoing != d.publish_outgoing),
        ("socket.verbose_logging", c.verbose_logging != d.verbose_logging),
    ]
    .into_iter()
    .filter_map(|(key, differs)| differs.then_some(key))
    .collect()
}

pub(crate) fn set_key(
    settings: &mut RelaySettings,
    key: &str,
    value: Value,
) -> Result<(), ContractError> {
    let hub = &mut settings.hub;
    let socket = &mut settings.socket;
    match key {
        "hub.enabled" => hub.enabled = as_bool(key, value)?,
        "hub.url" => hub.url = as_string(key, value)?,
        "hub.method" => hub.method = as_string(key, value)?,
        "hub.publish_incoming" => hub.publish_incoming = as_bool(key, value)?,
        "hub.publish_outgoing" => hub.publish_outgoing = as_bool(key, value)?,
        "hub.verbose_logging" => hub.verbose_logging = as_bool(key, value)?,
        "socket.enabled" => socket.enabled = as_bool(key, value)?,
        "socket.url" => socket.url = as_string(key, value)?,
        "socket.publish_incoming" => socket.publish_incoming = as_bool(key, value)?,
        "socket.publish_outgoing" => socket.publish_outgoing = as_bool(key, value)?,
        "socket.verbose_logging" => socket.verbose_logging = as_bool(key, value)?,
        _ => {
            return Err(ContractError::UnknownSettingsKey {
                key: key.to_string(),
            })
        }
    }
    Ok(())
}

fn as_bool(key: &str, value: Value) -> Result<bool, ContractError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(ContractError::config_validation(
            key,
            format!("expected boolean, got {other}"),
        )),
    }
}

fn as_string(key: &str, value: Value) -> Result<String, ContractError> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Err(ContractError::config_validation(
            key,
            format!("expected string, got {other}"),
        )),
    }
}
