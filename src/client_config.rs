//! Public client configuration.
//!
//! Holds what is needed to reach the service (base URL and API key) plus
//! client-side knobs. The WebSocket URL is derived here, so transports only
//! ever see an address already normalized to their scheme.

use std::time::Duration;

use crate::{KvError, Result};

/// Environment variable holding the service base URL.
pub const ENV_BASE_URL: &str = "HPKV_BASE_URL";

/// Environment variable holding the API key.
pub const ENV_API_KEY: &str = "HPKV_API_KEY";

/// Path of the WebSocket endpoint below the base URL.
const WS_PATH: &str = "/ws";

/// Default timeout applied to each call when the caller does not pass one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration and connection parameters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // ---
    /// Service base URL.
    ///
    /// Accepts `https://host`, `http://host`, `wss://host`, `ws://host` or a
    /// bare `host[:port]` (treated as secure).
    pub base_url: String,

    /// API key attached to the connection.
    pub api_key: Option<String>,

    /// Timeout for each call made without an explicit timeout.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Identifier used in log output. Defaults to the redacted endpoint.
    pub client_id: Option<String>,
}

impl ClientConfig {
    /// Create a configuration for the given base URL with no API key.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            client_id: None,
        }
    }

    /// Build a configuration from `HPKV_BASE_URL` and `HPKV_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns `KvError::MissingConfig` naming the first unset variable.
    pub fn from_env() -> Result<Self> {
        // ---
        let base_url = read_env(ENV_BASE_URL)?;
        let api_key = read_env(ENV_API_KEY)?;
        Ok(Self::new(base_url).with_api_key(api_key))
    }

    /// Set the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the default per-call timeout.
    ///
    /// # Example
    ///
    /// ```
    /// use kv_mux::ClientConfig;
    /// use std::time::Duration;
    ///
    /// let config = ClientConfig::new("https://api.example.com")
    ///     .with_request_timeout(Duration::from_secs(5));
    /// assert_eq!(config.request_timeout, Duration::from_secs(5));
    /// ```
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the identifier used in log output.
    pub fn with_client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    /// WebSocket endpoint derived from `base_url`, without the credential.
    ///
    /// # Example
    ///
    /// ```
    /// use kv_mux::ClientConfig;
    ///
    /// let config = ClientConfig::new("https://api.example.com/");
    /// assert_eq!(config.websocket_url().unwrap(), "wss://api.example.com/ws");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `KvError::MissingConfig` for an empty base URL and
    /// `KvError::InvalidEndpoint` for an unsupported scheme.
    pub fn websocket_url(&self) -> Result<String> {
        // ---
        let base = self.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(KvError::MissingConfig("base_url".into()));
        }

        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else if base.starts_with("wss://") || base.starts_with("ws://") {
            base.to_string()
        } else if base.contains("://") {
            return Err(KvError::InvalidEndpoint(format!(
                "unsupported scheme in base_url: {base}"
            )));
        } else {
            format!("wss://{base}")
        };

        if ws_base.ends_with(WS_PATH) {
            Ok(ws_base)
        } else {
            Ok(format!("{ws_base}{WS_PATH}"))
        }
    }
}

fn read_env(name: &str) -> Result<String> {
    // ---
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(KvError::MissingConfig(name.into())),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn ws(base: &str) -> String {
        ClientConfig::new(base).websocket_url().unwrap()
    }

    #[test]
    fn test_scheme_mapping() {
        // ---
        assert_eq!(ws("https://api.example.com"), "wss://api.example.com/ws");
        assert_eq!(ws("http://localhost:3000"), "ws://localhost:3000/ws");
        assert_eq!(ws("api.example.com"), "wss://api.example.com/ws");
        assert_eq!(ws("ws://localhost:9000"), "ws://localhost:9000/ws");
        assert_eq!(ws("wss://h/ws"), "wss://h/ws");
    }

    #[test]
    fn test_trailing_slashes_trimmed() {
        // ---
        assert_eq!(ws("https://api.example.com///"), "wss://api.example.com/ws");
        assert_eq!(ws("https://h/tenant/"), "wss://h/tenant/ws");
    }

    #[test]
    fn test_bad_base_url() {
        // ---
        assert!(matches!(
            ClientConfig::new("  ").websocket_url(),
            Err(KvError::MissingConfig(_))
        ));
        assert!(matches!(
            ClientConfig::new("ftp://h").websocket_url(),
            Err(KvError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_builder_defaults() {
        // ---
        let config = ClientConfig::new("h").with_api_key("k").with_client_id("demo");
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.client_id.as_deref(), Some("demo"));
        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }
}
