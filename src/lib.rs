// Connection status vocabulary and change messages
pub mod event;

// NATS client integration
pub mod nats;

// Gateway configuration
pub mod config;

// Caller identity (bearer token → username)
pub mod auth;

pub use event::{ConnectionChange, ConnectionStatus, SystemMessage};
