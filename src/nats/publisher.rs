use crate::event::SystemMessage;
use anyhow::{Context, Result};
use async_nats::jetstream;
use tracing::debug;

/// Publishes gateway messages to NATS JetStream
#[derive(Clone)]
pub struct MessagePublisher {
    jetstream: jetstream::Context,
}

impl MessagePublisher {
    pub fn new(jetstream: jetstream::Context) -> Self {
        Self { jetstream }
    }

    /// Subject a message is published on: `{origin}.{kind}`
    pub fn subject_for(message: &SystemMessage) -> String {
        format!("{}.{}", message.origin, message.kind)
    }

    /// Validate and publish a single message, waiting for the stream ack.
    pub async fn publish(&self, mut message: SystemMessage) -> Result<()> {
        message
            .validate_and_prepare()
            .context("Refusing to publish invalid message")?;

        let subject = Self::subject_for(&message);
        let payload = serde_json::to_vec(&message).context("Failed to serialize message to JSON")?;

        debug!(
            message_id = ?message.message_id,
            subject = %subject,
            user = %message.change.username,
            connection = %message.change.connection_code,
            status = %message.change.status,
            "Publishing message to NATS"
        );

        self.jetstream
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish message to subject '{}'", subject))?
            .await
            .context("Failed to await publish ack")?;

        Ok(())
    }
}
