//! Per-connection state machine.
//!
//! ```text
//!                connect: Connected
//!   Disconnected ───────────────────────────────▶ Connected
//!        │  ▲                                       │  ▲
//!        │  └─── disconnect / refresh exhausted ────┘  │
//!        │       / connect error                       │
//!        └── connect: NeedsRedirect | NeedsProxiedLogin ─▶ Connecting ── web login completed
//! ```
//!
//! The adapter sits behind a `tokio::sync::RwLock`: lifecycle operations
//! (connect, disconnect, refresh, web-login completion) take it exclusively,
//! service calls share it. Status, timestamps and the refresh counter live in
//! a small synchronous mutex and are only changed while the exclusive adapter
//! lock is held, except for the connect reservation, which happens before the
//! context is shared.

use crate::adapter::{Account, Adapter, AdapterInfo, ConnectionResult, Instrument, PriceBars, RootSymbol};
use crate::error::{GatewayError, Result};
use axum::http::HeaderMap;
use axum_extra::extract::cookie::Cookie;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard};
use sysgate::config::{ConnectionConfig, RefreshConfig};
use sysgate::{ConnectionChange, ConnectionStatus};
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Tokens expiring in at least this many seconds are refreshed early.
const REFRESH_MARGIN_THRESHOLD: u64 = 150;
const REFRESH_MARGIN: u64 = 120;

/// Retry bounds applied to every context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryLimits {
    pub refresh_retries: u32,
    pub price_bars_retries: u32,
}

impl Default for RetryLimits {
    fn default() -> Self {
        Self {
            refresh_retries: 5,
            price_bars_retries: 5,
        }
    }
}

impl RetryLimits {
    pub fn from_config(refresh: &RefreshConfig, connections: &ConnectionConfig) -> Self {
        Self {
            refresh_retries: refresh.refresh_retries.max(1),
            price_bars_retries: connections.price_bars_retries.max(1),
        }
    }
}

#[derive(Debug)]
struct Lifecycle {
    status: ConnectionStatus,
    connected_since: Option<DateTime<Utc>>,
    last_refresh: DateTime<Utc>,
    refresh_retries: u32,
    /// Token lifetime reported by the adapter when the session was established
    token_exp_seconds: u64,
    /// A browser login was started and its completion not yet consumed
    web_login_pending: bool,
}

/// Descriptor returned by connection listings.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDescriptor {
    pub username: String,
    pub connection_code: String,
    pub system_code: String,
    pub system_name: String,
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_since: Option<DateTime<Utc>>,
}

pub struct ConnectionContext {
    username: String,
    connection_code: String,
    instance_code: String,
    info: &'static AdapterInfo,
    limits: RetryLimits,
    lifecycle: Mutex<Lifecycle>,
    adapter: RwLock<Box<dyn Adapter>>,
}

impl std::fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("username", &self.username)
            .field("connection_code", &self.connection_code)
            .field("system", &self.info.code)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl ConnectionContext {
    /// Wraps a bound adapter. The context starts Disconnected.
    pub fn new(
        username: impl Into<String>,
        connection_code: impl Into<String>,
        adapter: Box<dyn Adapter>,
        limits: RetryLimits,
    ) -> Self {
        Self {
            username: username.into(),
            connection_code: connection_code.into(),
            instance_code: Uuid::new_v4().to_string(),
            info: adapter.info(),
            limits,
            lifecycle: Mutex::new(Lifecycle {
                status: ConnectionStatus::Disconnected,
                connected_since: None,
                last_refresh: Utc::now(),
                refresh_retries: limits.refresh_retries,
                token_exp_seconds: 0,
                web_login_pending: false,
            }),
            adapter: RwLock::new(adapter),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn connection_code(&self) -> &str {
        &self.connection_code
    }

    /// Opaque code naming this context in the web-login cookie.
    pub fn instance_code(&self) -> &str {
        &self.instance_code
    }

    pub fn info(&self) -> &'static AdapterInfo {
        self.info
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        // State stays consistent even if a holder panicked: every update is a plain assignment
        self.lifecycle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lifecycle().status
    }

    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.lifecycle().connected_since
    }

    pub fn refresh_retries(&self) -> u32 {
        self.lifecycle().refresh_retries
    }

    pub fn descriptor(&self) -> ConnectionDescriptor {
        let lifecycle = self.lifecycle();
        ConnectionDescriptor {
            username: self.username.clone(),
            connection_code: self.connection_code.clone(),
            system_code: self.info.code.to_string(),
            system_name: self.info.name.to_string(),
            status: lifecycle.status,
            connected_since: lifecycle.connected_since,
        }
    }

    /// Status change payload for the current state.
    pub fn change(&self) -> ConnectionChange {
        ConnectionChange {
            username: self.username.clone(),
            connection_code: self.connection_code.clone(),
            system_code: self.info.code.to_string(),
            status: self.status(),
        }
    }

    /// Reserves the context for a connect attempt.
    ///
    /// Returns the current status, untouched, when it is already Connected
    /// or Connecting; otherwise moves to Connecting.
    pub fn try_begin_connect(&self) -> std::result::Result<(), ConnectionStatus> {
        let mut lifecycle = self.lifecycle();
        match lifecycle.status {
            ConnectionStatus::Disconnected => {
                lifecycle.status = ConnectionStatus::Connecting;
                Ok(())
            }
            status => Err(status),
        }
    }

    /// Runs the adapter handshake of a reserved context.
    pub async fn run_connect(&self) -> Result<ConnectionResult> {
        let mut adapter = self.adapter.write().await;

        match adapter.connect().await {
            Ok(result) => {
                let mut lifecycle = self.lifecycle();
                match result {
                    ConnectionResult::Connected => {
                        let token_exp = adapter.token_exp_seconds();
                        Self::mark_connected(&mut lifecycle, token_exp, self.limits.refresh_retries);
                    }
                    ConnectionResult::NeedsRedirect(_) | ConnectionResult::NeedsProxiedLogin => {
                        lifecycle.status = ConnectionStatus::Connecting;
                        lifecycle.web_login_pending = true;
                    }
                }
                Ok(result)
            }
            Err(e) => {
                let mut lifecycle = self.lifecycle();
                lifecycle.status = ConnectionStatus::Disconnected;
                lifecycle.web_login_pending = false;
                Err(e)
            }
        }
    }

    /// Reserve and run in one step. `Ok(None)` when already Connected or Connecting.
    pub async fn connect(&self) -> Result<Option<ConnectionResult>> {
        if self.try_begin_connect().is_err() {
            return Ok(None);
        }
        self.run_connect().await.map(Some)
    }

    fn mark_connected(lifecycle: &mut Lifecycle, token_exp_seconds: u64, refresh_retries: u32) {
        let now = Utc::now();
        lifecycle.status = ConnectionStatus::Connected;
        lifecycle.connected_since = Some(now);
        lifecycle.last_refresh = now;
        lifecycle.refresh_retries = refresh_retries;
        lifecycle.token_exp_seconds = token_exp_seconds;
        lifecycle.web_login_pending = false;
    }

    /// Moves to Disconnected. Returns false when the context already was.
    ///
    /// The adapter logout is best-effort: its failure is logged only.
    pub async fn disconnect(&self) -> bool {
        let mut adapter = self.adapter.write().await;

        if self.status() == ConnectionStatus::Disconnected {
            return false;
        }

        if let Err(e) = adapter.disconnect().await {
            warn!(
                user = %self.username,
                connection = %self.connection_code,
                error = %e,
                "Adapter disconnect failed"
            );
        }

        let mut lifecycle = self.lifecycle();
        lifecycle.status = ConnectionStatus::Disconnected;
        lifecycle.connected_since = None;
        lifecycle.web_login_pending = false;
        true
    }

    /// True when the session token is close enough to expiry to be renewed.
    pub fn needs_refresh(&self) -> bool {
        let lifecycle = self.lifecycle();
        Self::refresh_due(&lifecycle, Utc::now())
    }

    fn refresh_due(lifecycle: &Lifecycle, now: DateTime<Utc>) -> bool {
        let mut expiry = lifecycle.token_exp_seconds;
        if expiry == 0 || lifecycle.status != ConnectionStatus::Connected {
            return false;
        }

        if expiry >= REFRESH_MARGIN_THRESHOLD {
            expiry -= REFRESH_MARGIN;
        }

        let elapsed = (now - lifecycle.last_refresh).num_seconds();
        elapsed > expiry as i64
    }

    /// Renews the session token.
    ///
    /// Failures are absorbed until the retry budget is spent; the last one
    /// disconnects the context and is returned.
    pub async fn refresh_token(&self) -> Result<()> {
        let mut adapter = self.adapter.write().await;

        if self.status() != ConnectionStatus::Connected {
            return Ok(());
        }

        match adapter.refresh_token().await {
            Ok(()) => {
                let mut lifecycle = self.lifecycle();
                lifecycle.last_refresh = Utc::now();
                lifecycle.refresh_retries = self.limits.refresh_retries;
                Ok(())
            }
            Err(e) => {
                let mut lifecycle = self.lifecycle();
                lifecycle.refresh_retries = lifecycle.refresh_retries.saturating_sub(1);

                if lifecycle.refresh_retries > 0 {
                    warn!(
                        user = %self.username,
                        connection = %self.connection_code,
                        retries_left = lifecycle.refresh_retries,
                        error = %e,
                        "The adapter cannot refresh the token. Retrying..."
                    );
                    return Ok(());
                }

                lifecycle.status = ConnectionStatus::Disconnected;
                lifecycle.connected_since = None;
                error!(
                    user = %self.username,
                    connection = %self.connection_code,
                    error = %e,
                    "Cannot refresh token. Disconnecting"
                );
                Err(e)
            }
        }
    }

    /// Login URL of the adapter, as configured by its parameters.
    pub async fn auth_url(&self) -> String {
        self.adapter.read().await.auth_url()
    }

    pub async fn is_web_login_completed(&self, status: u16, path: &str) -> bool {
        self.adapter.read().await.is_web_login_completed(status, path)
    }

    /// Hands a finished browser login to the adapter.
    ///
    /// Consumes the pending login: `Ok(false)` when there was none. On
    /// success the context is Connected; on failure it falls back to
    /// Disconnected so the user can start over.
    pub async fn complete_web_login(&self, request_headers: &HeaderMap, cookies: &[Cookie<'static>]) -> Result<bool> {
        let mut adapter = self.adapter.write().await;

        {
            let mut lifecycle = self.lifecycle();
            if !lifecycle.web_login_pending || lifecycle.status != ConnectionStatus::Connecting {
                return Ok(false);
            }
            lifecycle.web_login_pending = false;
        }

        let outcome = adapter.init_from_web_login(request_headers, cookies).await;
        let mut lifecycle = self.lifecycle();

        match outcome {
            Ok(()) => {
                let token_exp = adapter.token_exp_seconds();
                Self::mark_connected(&mut lifecycle, token_exp, self.limits.refresh_retries);
                info!(
                    user = %self.username,
                    connection = %self.connection_code,
                    system = %self.info.code,
                    "Web login completed"
                );
                Ok(true)
            }
            Err(e) => {
                lifecycle.status = ConnectionStatus::Disconnected;
                error!(
                    user = %self.username,
                    connection = %self.connection_code,
                    adapter = %self.info.name,
                    error = %e,
                    "Adapter authentication failed"
                );
                Err(e)
            }
        }
    }

    // --- services ------------------------------------------------------------

    pub async fn root_symbols(&self, filter: &str) -> Result<Vec<RootSymbol>> {
        self.adapter.read().await.root_symbols(filter).await
    }

    pub async fn root_symbol(&self, root: &str) -> Result<RootSymbol> {
        self.adapter.read().await.root_symbol(root).await
    }

    pub async fn instruments(&self, root: &str) -> Result<Vec<Instrument>> {
        self.adapter.read().await.instruments(root).await
    }

    /// Price bars, asking again while the backend reports a timeout.
    pub async fn price_bars(&self, symbol: &str, date: NaiveDate) -> Result<PriceBars> {
        let adapter = self.adapter.read().await;
        let mut counter = 0;

        loop {
            let bars = adapter.price_bars(symbol, date).await?;
            if !bars.timeout {
                return Ok(bars);
            }

            counter += 1;
            warn!(adapter = %self.info.name, counter = counter, "Got timeout from adapter");

            if counter >= self.limits.price_bars_retries {
                return Err(GatewayError::ExhaustedRetries(self.info.name.to_string()));
            }
        }
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        self.adapter.read().await.accounts().await
    }

    pub async fn orders(&self) -> Result<serde_json::Value> {
        self.adapter.read().await.orders().await
    }

    pub async fn positions(&self) -> Result<serde_json::Value> {
        self.adapter.read().await.positions().await
    }

    pub async fn test_service(&self, path: &str, query: &str) -> Result<String> {
        self.adapter.read().await.test_service(path, query).await
    }
}

#[cfg(test)]
mod tests;
