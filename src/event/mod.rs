use chrono::Utc;
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::{validate_and_prepare, ValidationError};

/// Lifecycle status of a single system connection.
///
/// Shared by the connection registry, the refresh scheduler, the web-login
/// bridge and every change message published on the bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status change of one connection, as broadcast to other services.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionChange {
    pub username: String,
    pub connection_code: String,
    pub system_code: String,
    pub status: ConnectionStatus,
}

/// Envelope for messages published by the gateway.
///
/// Identifiers are UUIDv7, so messages from one gateway are time-ordered.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemMessage {
    /// UUIDv7 identifier, generated on validation when absent
    #[serde(rename = "messageId")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,

    /// Logical origin (e.g. "system.connection"), lowercase with dot separators
    pub origin: String,

    /// Message kind within the origin (e.g. "change")
    pub kind: String,

    /// Unix epoch milliseconds
    pub timestamp: i64,

    pub change: ConnectionChange,
}

impl SystemMessage {
    pub const CONNECTION_ORIGIN: &'static str = "system.connection";
    pub const CHANGE_KIND: &'static str = "change";

    /// Builds a connection change message stamped with the current time.
    pub fn connection_change(change: ConnectionChange) -> Self {
        Self {
            message_id: None,
            origin: Self::CONNECTION_ORIGIN.to_string(),
            kind: Self::CHANGE_KIND.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            change,
        }
    }

    /// Validates the envelope and assigns a message id if missing.
    pub fn validate_and_prepare(&mut self) -> Result<(), ValidationError> {
        validation::validate_and_prepare(self)
    }
}
