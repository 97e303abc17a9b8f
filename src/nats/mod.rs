// NATS client integration (connection change broadcast)

mod client;
mod publisher;

pub use client::{NatsClient, NatsConfig};
pub use publisher::MessagePublisher;
