//! Adapter capability contract.
//!
//! Every backend integration implements [`Adapter`]. The catalog holds one
//! unbound prototype per backend; a connection gets its own instance through
//! [`Adapter::clone_with`], bound to validated parameters, and that instance
//! owns the backend session (HTTP client, cookies, tokens) for the lifetime
//! of the connection.
//!
//! ```text
//!   catalog prototype ──clone_with(config, connect)──▶ bound adapter
//!                                                        │
//!                          connect() ──▶ Connected | NeedsRedirect | NeedsProxiedLogin
//!                                                        │
//!              (web login) init_from_web_login() ────────┤
//!                                                        ▼
//!                 refresh_token() / service calls until disconnect()
//! ```

pub mod model;
pub mod params;

use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum_extra::extract::cookie::Cookie;
use chrono::NaiveDate;
use serde::Serialize;
use std::time::Duration;

pub use model::{Account, AccountType, Instrument, PriceBar, PriceBars, RootSymbol};
pub use params::{validate, ParamDef, ParamError, ParamType, ValidatedParams};

/// Static description of a backend.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub supports_feed: bool,
    pub supports_broker: bool,
    pub supports_multiple_feeds: bool,
    pub supports_inventory: bool,
    pub config_params: &'static [ParamDef],
    pub connect_params: &'static [ParamDef],
}

/// Outcome of a successful connect call.
///
/// Failures are reported through `Err`, never through this type.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionResult {
    Connected,
    /// The browser must open this URL directly
    NeedsRedirect(String),
    /// The browser must log in through the gateway's web-login proxy
    NeedsProxiedLogin,
}

/// Settings applied to every adapter instance.
#[derive(Clone, Debug)]
pub struct AdapterSettings {
    pub network_timeout: Duration,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            network_timeout: Duration::from_secs(180),
        }
    }
}

impl From<&sysgate::config::ConnectionConfig> for AdapterSettings {
    fn from(config: &sysgate::config::ConnectionConfig) -> Self {
        Self {
            network_timeout: Duration::from_secs(config.network_timeout_seconds),
        }
    }
}

/// Capability interface implemented once per backend.
///
/// Service operations a backend does not offer keep the default body and
/// answer [`GatewayError::Unsupported`].
#[async_trait]
pub trait Adapter: Send + Sync {
    fn info(&self) -> &'static AdapterInfo;

    /// Login URL, meaningful once `connect` asked for a redirect or proxied login.
    fn auth_url(&self) -> String {
        String::new()
    }

    /// Returns a fresh instance bound to the given parameters.
    fn clone_with(&self, config: &ValidatedParams, connect: &ValidatedParams) -> Result<Box<dyn Adapter>>;

    async fn connect(&mut self) -> Result<ConnectionResult>;

    /// Best-effort; must succeed on an instance that never connected.
    async fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether a proxied response marks the end of a browser login.
    fn is_web_login_completed(&self, _status: u16, _path: &str) -> bool {
        false
    }

    /// Captures the session established by a browser login.
    async fn init_from_web_login(&mut self, _request_headers: &HeaderMap, _cookies: &[Cookie<'static>]) -> Result<()> {
        Err(self.unsupported("web login"))
    }

    /// Token lifetime in seconds; 0 means the session never needs refreshing.
    fn token_exp_seconds(&self) -> u64 {
        0
    }

    async fn refresh_token(&mut self) -> Result<()> {
        Ok(())
    }

    async fn root_symbols(&self, _filter: &str) -> Result<Vec<RootSymbol>> {
        Err(self.unsupported("root symbols"))
    }

    async fn root_symbol(&self, _root: &str) -> Result<RootSymbol> {
        Err(self.unsupported("root symbol lookup"))
    }

    async fn instruments(&self, _root: &str) -> Result<Vec<Instrument>> {
        Err(self.unsupported("instruments"))
    }

    async fn price_bars(&self, _symbol: &str, _date: NaiveDate) -> Result<PriceBars> {
        Err(self.unsupported("price bars"))
    }

    async fn accounts(&self) -> Result<Vec<Account>> {
        Err(self.unsupported("accounts"))
    }

    async fn orders(&self) -> Result<serde_json::Value> {
        Err(self.unsupported("orders"))
    }

    async fn positions(&self) -> Result<serde_json::Value> {
        Err(self.unsupported("positions"))
    }

    /// Raw GET against the backend API, for diagnostics.
    async fn test_service(&self, _path: &str, _query: &str) -> Result<String> {
        Err(self.unsupported("test service"))
    }

    fn unsupported(&self, operation: &'static str) -> GatewayError {
        GatewayError::Unsupported {
            adapter: self.info().name,
            operation,
        }
    }
}

/// Passes 2xx responses through and turns anything else into an upstream error.
pub async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    Err(GatewayError::from_status(status, &body))
}

/// Builds the HTTP client an adapter instance uses for its backend session.
pub fn session_client(settings: &AdapterSettings) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .cookie_store(true)
        .timeout(settings.network_timeout)
        .build()
        .map_err(GatewayError::from)
}
