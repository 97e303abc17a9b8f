//! Error taxonomy shared by adapters, connection contexts and the HTTP layer.

use crate::adapter::params::ParamError;
use reqwest::StatusCode;
use thiserror::Error;

/// What went wrong while talking to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    Timeout,
    AuthFailure,
    MalformedResponse,
    Transport,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Caller-supplied data rejected before any backend call
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{message}")]
    Upstream { kind: UpstreamKind, message: String },

    /// Carries the adapter display name
    #[error("Maximum number of retries exceeded: {0}")]
    ExhaustedRetries(String),

    #[error("Connection '{0}' is not connected")]
    NotConnected(String),

    #[error("{adapter} does not support {operation}")]
    Unsupported {
        adapter: &'static str,
        operation: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn upstream(kind: UpstreamKind, message: impl Into<String>) -> Self {
        GatewayError::Upstream {
            kind,
            message: message.into(),
        }
    }

    pub fn auth_failure(message: impl Into<String>) -> Self {
        Self::upstream(UpstreamKind::AuthFailure, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::upstream(UpstreamKind::MalformedResponse, message)
    }

    /// Maps a non-success backend status to an upstream error.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        let kind = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamKind::AuthFailure,
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => UpstreamKind::Timeout,
            _ => UpstreamKind::Transport,
        };
        Self::upstream(kind, format!("Backend answered {}: {}", status, body))
    }

    pub fn upstream_kind(&self) -> Option<UpstreamKind> {
        match self {
            GatewayError::Upstream { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            UpstreamKind::Timeout
        } else if e.is_decode() {
            UpstreamKind::MalformedResponse
        } else {
            UpstreamKind::Transport
        };
        Self::upstream(kind, e.to_string())
    }
}

impl From<ParamError> for GatewayError {
    fn from(e: ParamError) -> Self {
        GatewayError::Validation(e.to_string())
    }
}
