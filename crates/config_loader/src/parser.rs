//! 配置文件解析
//!
//! 支持 TOML（首选）和 JSON 两种格式。
//!
//! Either format takes `[hub]`/`[socket]` sections or a flat document of
//! `section.field` keys, the same keys the settings store accepts as changes.

use contracts::{ContractError, RelaySettings};
use serde_json::Value;

use crate::store::set_key;

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format (recommended)
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Infer format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Parse TOML settings
pub fn parse_toml(content: &str) -> Result<RelaySettings, ContractError> {
    let table: toml::Table = toml::from_str(content).map_err(toml_error)?;
    if is_flat(table.keys()) {
        let document = serde_json::to_value(table)
            .map_err(|e| ContractError::config_parse(format!("TOML conversion error: {e}")))?;
        return from_flat(document);
    }
    toml::from_str(content).map_err(toml_error)
}

/// Parse JSON settings
pub fn parse_json(content: &str) -> Result<RelaySettings, ContractError> {
    let document: Value = serde_json::from_str(content).map_err(json_error)?;
    let flat = document
        .as_object()
        .is_some_and(|entries| is_flat(entries.keys()));
    if flat {
        return from_flat(document);
    }
    serde_json::from_value(document).map_err(json_error)
}

/// Parse settings according to format
pub fn parse(content: &str, format: ConfigFormat) -> Result<RelaySettings, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

fn is_flat<'a>(mut keys: impl Iterator<Item = &'a String>) -> bool {
    keys.any(|key| key.contains('.'))
}

/// Build settings from `section.field` keys over the defaults
fn from_flat(document: Value) -> Result<RelaySettings, ContractError> {
    let Value::Object(entries) = document else {
        return Err(ContractError::config_parse("settings document must be a table"));
    };
    let mut settings = RelaySettings::default();
    for (key, value) in entries {
        if !key.contains('.') {
            return Err(ContractError::config_parse(format!(
                "section `{key}` cannot be mixed with flat keys"
            )));
        }
        set_key(&mut settings, &key, value)?;
    }
    Ok(settings)
}

fn toml_error(e: toml::de::Error) -> ContractError {
    ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    }
}

fn json_error(e: serde_json::Error) -> ContractError {
    ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_minimal() {
        let content = r#"
[hub]
enabled = true
url = "https://relay.example.test/hub"
publish_incoming = true

[socket]
url = "ws://127.0.0.1:9000"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let settings = result.unwrap();
        assert!(settings.hub.enabled);
        assert_eq!(settings.hub.method, "Publish");
        assert!(!settings.hub.publish_outgoing);
        assert!(!settings.socket.enabled);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "socket": {
                "enabled": true,
                "url": "ws://127.0.0.1:9000",
                "publish_outgoing": true
            }
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        assert!(result.unwrap().socket.publish_outgoing);
    }

    #[test]
    fn test_empty_document_yields_defaults() {
        let settings = parse_toml("").unwrap();
        assert_eq!(settings, RelaySettings::default());
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_parse_flat_json_keys() {
        let content = r#"{
            "hub.enabled": true,
            "hub.url": "https://relay.example.test/hub",
            "hub.publish_outgoing": true,
            "socket.verbose_logging": true
        }"#;
        let settings = parse_json(content).unwrap();
        assert!(settings.hub.is_active());
        assert!(settings.hub.publish_outgoing);
        assert!(!settings.hub.publish_incoming);
        assert_eq!(settings.hub.method, "Publish");
        assert!(settings.socket.verbose_logging);
    }

    #[test]
    fn test_parse_flat_toml_keys() {
        let content = r#"
"socket.enabled" = true
"socket.url" = "ws://127.0.0.1:9000"
"#;
        let settings = parse_toml(content).unwrap();
        assert!(settings.socket.is_active());
        assert!(!settings.hub.enabled);
    }

    #[test]
    fn test_flat_keys_reject_unknown_and_mixed() {
        let err = parse_json(r#"{"hub.colour": "blue"}"#).unwrap_err();
        assert!(matches!(err, ContractError::UnknownSettingsKey { .. }));

        let err = parse_json(r#"{"hub.enabled": "yes"}"#).unwrap_err();
        assert!(err.to_string().contains("hub.enabled"));

        let err = parse_json(r#"{"hub.enabled": true, "socket": {"enabled": true}}"#).unwrap_err();
        assert!(err.to_string().contains("socket"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("TOML"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("json"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }
}
