//! Endpoint normalization

use contracts::ContractError;
use url::Url;

/// Map a hub endpoint onto the WebSocket URL actually dialed
///
/// `http(s)://` becomes `ws(s)://`; `ws(s)://` passes through.
pub fn hub_socket_url(endpoint: &str) -> Result<Url, ContractError> {
    let mut url = Url::parse(endpoint.trim())
        .map_err(|e| ContractError::invalid_url(endpoint, e.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ContractError::invalid_url(
                endpoint,
                format!("unsupported scheme '{other}'"),
            ))
        }
    };
    if url.scheme() != scheme {
        url.set_scheme(scheme)
            .map_err(|()| ContractError::invalid_url(endpoint, "cannot switch scheme"))?;
    }
    Ok(url)
}

/// Validate a raw socket endpoint
pub fn socket_url(endpoint: &str) -> Result<Url, ContractError> {
    let url = Url::parse(endpoint.trim())
        .map_err(|e| ContractError::invalid_url(endpoint, e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ContractError::invalid_url(
            endpoint,
            format!("unsupported scheme '{other}'"),
        )),
    }
}
