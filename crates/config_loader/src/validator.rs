//! 配置校验
//!
//! Rules:
//! - field-level rules declared on the settings types (`validator` derive)
//! - an active section needs a parseable endpoint with a supported scheme
//! - hub method must not contain whitespace
//!
//! Inactive sections are not checked beyond the derive rules; a disabled
//! sink may carry a half-typed URL.

use contracts::{ContractError, RelaySettings};
use url::Url;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

const HUB_SCHEMES: &[&str] = &["ws", "wss", "http", "https"];
const SOCKET_SCHEMES: &[&str] = &["ws", "wss"];

/// Validate a settings snapshot
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(settings: &RelaySettings) -> Result<(), ContractError> {
    settings.validate().map_err(from_validation_errors)?;
    validate_hub(settings)?;
    validate_socket(settings)?;
    Ok(())
}

/// Parse an endpoint and check its scheme
pub fn validate_endpoint(url: &str, schemes: &[&str]) -> Result<Url, ContractError> {
    let parsed = Url::parse(url.trim()).map_err(|e| ContractError::invalid_url(url, e.to_string()))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(ContractError::invalid_url(
            url,
            format!(
                "unsupported scheme '{}', expected one of {}",
                parsed.scheme(),
                schemes.join(", ")
            ),
        ));
    }
    Ok(parsed)
}

fn validate_hub(settings: &RelaySettings) -> Result<(), ContractError> {
    let hub = &settings.hub;
    if hub.method.chars().any(char::is_whitespace) {
        return Err(ContractError::config_validation(
            "hub.method",
            format!("method '{}' must not contain whitespace", hub.method),
        ));
    }
    if hub.is_active() {
        validate_endpoint(&hub.url, HUB_SCHEMES)?;
    }
    Ok(())
}

fn validate_socket(settings: &RelaySettings) -> Result<(), ContractError> {
    let socket = &settings.socket;
    if socket.is_active() {
        validate_endpoint(&socket.url, SOCKET_SCHEMES)?;
    }
    Ok(())
}

/// Flatten the first derive failure into a field-addressed error
fn from_validation_errors(errors: ValidationErrors) -> ContractError {
    let first = errors.errors().iter().find_map(|(section, kind)| match kind {
        ValidationErrorsKind::Struct(inner) => {
            inner.field_errors().into_iter().next().map(|(field, field_errors)| {
                let message = field_errors
                    .first()
                    .and_then(|e| e.message.as_ref())
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "invalid value".to_string());
                ContractError::config_validation(format!("{section}.{field}"), message)
            })
        }
        _ => None,
    });
    first.unwrap_or_else(|| ContractError::config_validation("settings", errors.to_string()))
}
