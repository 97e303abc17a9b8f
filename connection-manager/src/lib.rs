//! Connection manager: one gateway in front of several trading back-ends.
//!
//! Each user owns named connections to back-end systems. A connection is
//! created through an [`Adapter`], kept alive by periodic token refreshes and
//! torn down when the user disconnects or the back-end stops answering.
//!
//! # Architecture
//!
//! ```text
//!  HTTP client                          browser (web login)
//!      │                                       │
//!      ▼                                       ▼
//! ┌──────────────┐                     ┌────────────────┐
//! │   api        │                     │   weblogin     │──▶ back-end login pages
//! └──────┬───────┘                     └───────┬────────┘
//!        ▼                                     │
//! ┌─────────────────────────────────────────┐  │
//! │   ConnectionRegistry                     │◀─┘
//! │  - user → code → ConnectionContext       │
//! │  - connect / disconnect / lookup         │
//! └──────┬───────────────────────┬──────────┘
//!        ▼                       ▼
//! ┌──────────────┐       ┌────────────────────┐
//! │ Context      │◀──────│ TokenRefresh       │
//! │  + Adapter   │       │ Scheduler (10 s)   │
//! └──────┬───────┘       └────────────────────┘
//!        ▼
//!   LOCAL / IBKR / TS         status changes ──▶ NATS (system.connection.change)
//! ```
//!
//! # Core Types
//!
//! - [`Adapter`] - Contract every back-end implements
//! - [`AdapterCatalog`] - The adapters a gateway offers
//! - [`ConnectionContext`] - One live connection and its lifecycle
//! - [`ConnectionRegistry`] - All connections, keyed by user and code
//! - [`TokenRefreshScheduler`] - Keeps back-end tokens fresh
//! - [`GatewayError`] - Error taxonomy shared by every layer

pub mod adapter;
pub mod adapters;
pub mod api;
pub mod catalog;
pub mod context;
pub mod error;
pub mod notifier;
pub mod refresh;
pub mod registry;
pub mod weblogin;

#[cfg(test)]
mod testing;

pub use adapter::{Adapter, AdapterInfo, AdapterSettings, ConnectionResult, ParamDef, ParamType};
pub use catalog::AdapterCatalog;
pub use context::{ConnectionContext, ConnectionDescriptor, RetryLimits};
pub use error::{GatewayError, UpstreamKind};
pub use notifier::{LogStatusPublisher, NatsStatusPublisher, StatusPublisher};
pub use refresh::TokenRefreshScheduler;
pub use registry::{ConnectResponse, ConnectionRegistry, ConnectionSpec};
pub use weblogin::WebLoginState;
