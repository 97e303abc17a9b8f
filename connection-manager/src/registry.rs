//! Connection registry - per-user connection contexts.
//!
//! One `UserConnections` map per user, each mapping a connection code to its
//! [`ConnectionContext`]. Map guards are only held for lookup and insertion;
//! every backend call happens on a cloned `Arc` after the guard is released.

use crate::adapter::{validate, ConnectionResult};
use crate::catalog::AdapterCatalog;
use crate::context::{ConnectionContext, ConnectionDescriptor, RetryLimits};
use crate::error::{GatewayError, Result};
use crate::notifier::StatusPublisher;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use sysgate::ConnectionStatus;
use tracing::{info, warn};

/// Body of a connect request.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSpec {
    pub system_code: String,
    #[serde(default)]
    pub config_params: Map<String, Value>,
    #[serde(default)]
    pub connect_params: Map<String, Value>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectStatus {
    Connecting,
    Connected,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectAction {
    None,
    OpenUrl,
}

/// What the caller gets back from a connect request.
///
/// Adapter failures are reported here with status `error`; only request
/// problems (unknown backend, invalid parameters) are returned as errors.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConnectResponse {
    pub status: ConnectStatus,
    pub action: ConnectAction,
    pub message: String,
}

impl ConnectResponse {
    fn new(status: ConnectStatus, action: ConnectAction, message: impl Into<String>) -> Self {
        Self {
            status,
            action,
            message: message.into(),
        }
    }
}

#[derive(Default)]
pub struct UserConnections {
    contexts: DashMap<String, Arc<ConnectionContext>>,
}

pub struct ConnectionRegistry {
    catalog: AdapterCatalog,
    users: DashMap<String, Arc<UserConnections>>,
    publisher: Arc<dyn StatusPublisher>,
    limits: RetryLimits,
    public_url: String,
}

impl ConnectionRegistry {
    /// # Arguments
    /// * `public_url` - Base URL browsers use to reach this gateway (e.g., "https://gateway:8449")
    pub fn new(
        catalog: AdapterCatalog,
        publisher: Arc<dyn StatusPublisher>,
        limits: RetryLimits,
        public_url: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            users: DashMap::new(),
            publisher,
            limits,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn catalog(&self) -> &AdapterCatalog {
        &self.catalog
    }

    /// Entry point of the proxied login for one context.
    pub fn web_login_url(&self, instance_code: &str) -> String {
        format!("{}/api/system/v1/weblogin/{}/login", self.public_url, instance_code)
    }

    fn user_connections(&self, username: &str) -> Arc<UserConnections> {
        self.users
            .entry(username.to_string())
            .or_insert_with(|| Arc::new(UserConnections::default()))
            .clone()
    }

    /// Validates the request and builds a context reserved for connecting.
    fn prepare(&self, username: &str, code: &str, spec: &ConnectionSpec) -> Result<Arc<ConnectionContext>> {
        let prototype = self
            .catalog
            .find(&spec.system_code)
            .ok_or_else(|| GatewayError::NotFound(format!("System not found: {}", spec.system_code)))?;

        let info = prototype.info();
        let config = validate(info.config_params, &spec.config_params)?;
        let connect = validate(info.connect_params, &spec.connect_params)?;

        let context = ConnectionContext::new(username, code, prototype.clone_with(&config, &connect)?, self.limits);
        // A fresh context is always Disconnected
        let _ = context.try_begin_connect();
        Ok(Arc::new(context))
    }

    /// Connects `code` for `username`.
    ///
    /// A code that is Connected or Connecting is left alone. Otherwise a new
    /// context replaces any previous one, possibly for another backend.
    pub async fn connect(&self, username: &str, code: &str, spec: &ConnectionSpec) -> Result<ConnectResponse> {
        let user = self.user_connections(username);

        let context = match user.contexts.entry(code.to_string()) {
            Entry::Occupied(mut entry) => {
                match entry.get().status() {
                    ConnectionStatus::Connected => {
                        return Ok(ConnectResponse::new(ConnectStatus::Connected, ConnectAction::None, "Already connected"));
                    }
                    ConnectionStatus::Connecting => {
                        return Ok(ConnectResponse::new(ConnectStatus::Connecting, ConnectAction::None, "Still connecting"));
                    }
                    ConnectionStatus::Disconnected => {}
                }
                let context = self.prepare(username, code, spec)?;
                entry.insert(Arc::clone(&context));
                context
            }
            Entry::Vacant(entry) => {
                let context = self.prepare(username, code, spec)?;
                entry.insert(Arc::clone(&context));
                context
            }
        };

        info!(
            user = %username,
            connection = %code,
            system = %spec.system_code,
            "Connecting"
        );

        let result = match context.run_connect().await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    user = %username,
                    connection = %code,
                    system = %spec.system_code,
                    error = %e,
                    "Adapter connect failed"
                );
                return Ok(ConnectResponse::new(ConnectStatus::Error, ConnectAction::None, e.to_string()));
            }
        };

        self.announce(&context).await;

        Ok(match result {
            ConnectionResult::Connected => ConnectResponse::new(ConnectStatus::Connected, ConnectAction::None, ""),
            ConnectionResult::NeedsRedirect(url) => {
                ConnectResponse::new(ConnectStatus::Connecting, ConnectAction::OpenUrl, url)
            }
            ConnectionResult::NeedsProxiedLogin => ConnectResponse::new(
                ConnectStatus::Connecting,
                ConnectAction::OpenUrl,
                self.web_login_url(context.instance_code()),
            ),
        })
    }

    /// Disconnects `code`. The context stays registered, Disconnected.
    pub async fn disconnect(&self, username: &str, code: &str) -> Result<()> {
        let context = self.context(username, code)?;

        if context.disconnect().await {
            info!(user = %username, connection = %code, "Disconnected");
            self.announce(&context).await;
        }
        Ok(())
    }

    pub fn context(&self, username: &str, code: &str) -> Result<Arc<ConnectionContext>> {
        let user = self
            .users
            .get(username)
            .map(|u| Arc::clone(u.value()))
            .ok_or_else(|| GatewayError::NotFound(format!("Connection not found for user: {}", username)))?;

        user.contexts
            .get(code)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| GatewayError::NotFound(format!("Connection not found: {}", code)))
    }

    /// Context usable for service calls.
    pub fn connected_context(&self, username: &str, code: &str) -> Result<Arc<ConnectionContext>> {
        let context = self.context(username, code)?;
        if context.status() != ConnectionStatus::Connected {
            return Err(GatewayError::NotConnected(code.to_string()));
        }
        Ok(context)
    }

    /// Descriptors of all of a user's connections, ordered by code.
    pub fn connections(&self, username: &str) -> Vec<ConnectionDescriptor> {
        let Some(user) = self.users.get(username).map(|u| Arc::clone(u.value())) else {
            return Vec::new();
        };

        let mut list: Vec<_> = user.contexts.iter().map(|c| c.value().descriptor()).collect();
        list.sort_by(|a, b| a.connection_code.cmp(&b.connection_code));
        list
    }

    fn all_contexts(&self) -> Vec<Arc<ConnectionContext>> {
        let users: Vec<_> = self.users.iter().map(|u| Arc::clone(u.value())).collect();
        users
            .iter()
            .flat_map(|u| u.contexts.iter().map(|c| Arc::clone(c.value())).collect::<Vec<_>>())
            .collect()
    }

    /// Contexts whose session token is due for renewal.
    pub fn contexts_to_refresh(&self) -> Vec<Arc<ConnectionContext>> {
        self.all_contexts()
            .into_iter()
            .filter(|c| c.needs_refresh())
            .collect()
    }

    /// Looks a context up by the instance code carried in the web-login cookie.
    pub fn find_by_instance(&self, instance_code: &str) -> Option<Arc<ConnectionContext>> {
        self.all_contexts()
            .into_iter()
            .find(|c| c.instance_code() == instance_code)
    }

    /// Broadcasts the current status of `context`.
    pub async fn announce(&self, context: &ConnectionContext) {
        self.publisher.publish(context.change()).await;
    }
}
