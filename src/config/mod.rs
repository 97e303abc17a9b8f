mod env;

pub use env::apply_env_overrides;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;

pub use crate::nats::NatsConfig;

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub connections: ConnectionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub weblogin: WebLoginConfig,
}

/// HTTP listener and the identity the gateway presents to browsers
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Externally reachable base URL, used to build web-login links.
    ///
    /// The web-login cookie is `Secure`: browsers only send it back over
    /// HTTPS (or to localhost), so a non-local deployment needs TLS
    /// terminated in front of the gateway and an `https://` URL here.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8449".to_string()
}

fn default_public_url() -> String {
    "http://localhost:8449".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_url: default_public_url(),
        }
    }
}

/// Token refresh scheduling
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    /// Tick period; the first tick is also delayed by this amount
    #[serde(default = "default_refresh_interval")]
    pub interval_seconds: u64,
    /// Consecutive refresh failures tolerated before a connection is dropped
    #[serde(default = "default_refresh_retries")]
    pub refresh_retries: u32,
}

fn default_refresh_interval() -> u64 {
    10
}

fn default_refresh_retries() -> u32 {
    5
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_refresh_interval(),
            refresh_retries: default_refresh_retries(),
        }
    }
}

/// Per-connection limits
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    /// Attempts allowed when a backend keeps answering price-bar requests with a timeout
    #[serde(default = "default_price_bars_retries")]
    pub price_bars_retries: u32,
    /// Timeout applied to every outbound backend request
    #[serde(default = "default_network_timeout")]
    pub network_timeout_seconds: u64,
}

fn default_price_bars_retries() -> u32 {
    5
}

fn default_network_timeout() -> u64 {
    180
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            price_bars_retries: default_price_bars_retries(),
            network_timeout_seconds: default_network_timeout(),
        }
    }
}

/// Caller identity. Disabled means every caller acts as "default".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Bearer token → username
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    /// Usernames allowed to act on other users' connections
    #[serde(default)]
    pub admin_users: Vec<String>,
}

/// Web-login reverse proxy
#[derive(Debug, Clone, Deserialize)]
pub struct WebLoginConfig {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Skip TLS verification towards backend login domains
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_cookie_name() -> String {
    "InstanceCode".to_string()
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024 // 10 MB
}

impl Default for WebLoginConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            accept_invalid_certs: false,
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &str) -> Result<GatewayConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path))?;
    let config: GatewayConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file '{}'", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.refresh.interval_seconds, 10);
        assert_eq!(config.refresh.refresh_retries, 5);
        assert_eq!(config.connections.price_bars_retries, 5);
        assert_eq!(config.connections.network_timeout_seconds, 180);
        assert_eq!(config.weblogin.cookie_name, "InstanceCode");
        assert_eq!(config.server.public_url, "http://localhost:8449");
        assert_eq!(config.server.bind_addr, "0.0.0.0:8449");
        assert_eq!(config.nats.stream_name, "SYSTEM_EVENTS");
        assert!(!config.auth.enabled);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:9000"
            public_url = "https://gateway.example.com:8443"

            [nats]
            enabled = false
            url = "nats://example.com:4222"

            [refresh]
            interval_seconds = 30
            refresh_retries = 3

            [auth]
            enabled = true
            admin_users = ["root"]

            [auth.tokens]
            "tok-1" = "alice"

            [weblogin]
            accept_invalid_certs = true
        "#;

        let config: GatewayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.server.public_url, "https://gateway.example.com:8443");
        assert!(!config.nats.enabled);
        assert_eq!(config.nats.url, "nats://example.com:4222");
        assert_eq!(config.refresh.interval_seconds, 30);
        assert_eq!(config.refresh.refresh_retries, 3);
        assert_eq!(config.auth.tokens.get("tok-1").map(String::as_str), Some("alice"));
        assert_eq!(config.auth.admin_users, vec!["root".to_string()]);
        assert!(config.weblogin.accept_invalid_certs);
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [connections]
            price_bars_retries = 2
        "#;

        let config: GatewayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.connections.price_bars_retries, 2);
        assert_eq!(config.connections.network_timeout_seconds, 180); // Default
        assert_eq!(config.refresh.interval_seconds, 10); // Default
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[refresh]\ninterval_seconds = 15").unwrap();

        let config = load_config(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.refresh.interval_seconds, 15);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/sysgate.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
