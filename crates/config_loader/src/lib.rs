//! # Config Loader
//!
//! 中继配置加载与存储。
//!
//! 职责：
//! - 解析 TOML/JSON 配置文件
//! - 校验配置合法性
//! - 持有当前快照并在变更时通知订阅者
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let settings = ConfigLoader::load_from_path(Path::new("relay.toml")).unwrap();
//! println!("Hub enabled: {}", settings.hub.enabled);
//! ```

mod parser;
mod store;
mod validator;

pub use contracts::RelaySettings;
pub use parser::ConfigFormat;
pub use store::{changed_keys, SettingsStore, SETTINGS_KEYS};
pub use validator::validate_endpoint;

use contracts::ContractError;
use std::path::Path;

/// 配置加载器
///
/// 提供从文件或字符串加载配置的静态方法。
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<RelaySettings, ContractError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load settings from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<RelaySettings, ContractError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an in-memory snapshot with the same rules as file loading
    pub fn validate(settings: &RelaySettings) -> Result<(), ContractError> {
        validator::validate(settings)
    }

    /// Serialize RelaySettings to TOML string
    pub fn to_toml(settings: &RelaySettings) -> Result<String, ContractError> {
        toml::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize RelaySettings to JSON string
    pub fn to_json(settings: &RelaySettings) -> Result<String, ContractError> {
        serde_json::to_string_pretty(settings)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer settings format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ContractError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read settings file content
    fn read_file(path: &Path) -> Result<String, ContractError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate settings content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<RelaySettings, ContractError> {
        let settings = parser::parse(content, format)?;
        validator::validate(&settings)?;
        Ok(settings)
    }
}
