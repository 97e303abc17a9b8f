//! Connection status broadcast.
//!
//! Every status change (connect, web-login completion, disconnect, refresh
//! giving up) is announced with the same [`ConnectionChange`] payload.
//! Publishing never fails the operation that caused the change.

use async_trait::async_trait;
use std::sync::Mutex;
use sysgate::nats::MessagePublisher;
use sysgate::{ConnectionChange, SystemMessage};
use tracing::{error, info};

#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, change: ConnectionChange);
}

/// Publishes changes to JetStream.
pub struct NatsStatusPublisher {
    publisher: MessagePublisher,
}

impl NatsStatusPublisher {
    pub fn new(publisher: MessagePublisher) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl StatusPublisher for NatsStatusPublisher {
    async fn publish(&self, change: ConnectionChange) {
        let user = change.username.clone();
        let connection = change.connection_code.clone();

        if let Err(e) = self.publisher.publish(SystemMessage::connection_change(change)).await {
            error!(
                user = %user,
                connection = %connection,
                error = %e,
                "Failed to publish connection change"
            );
        }
    }
}

/// Used when NATS is disabled: changes only reach the log.
pub struct LogStatusPublisher;

#[async_trait]
impl StatusPublisher for LogStatusPublisher {
    async fn publish(&self, change: ConnectionChange) {
        info!(
            user = %change.username,
            connection = %change.connection_code,
            system = %change.system_code,
            status = %change.status,
            "Connection status changed"
        );
    }
}

/// Keeps every change in memory.
#[derive(Default)]
pub struct RecordingPublisher {
    changes: Mutex<Vec<ConnectionChange>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<ConnectionChange> {
        self.changes.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl StatusPublisher for RecordingPublisher {
    async fn publish(&self, change: ConnectionChange) {
        if let Ok(mut changes) = self.changes.lock() {
            changes.push(change);
        }
    }
}
