use super::SystemMessage;
use std::fmt;
use uuid::Uuid;

/// Validation errors for SystemMessage
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    MissingOrigin,
    MissingKind,
    MissingUsername,
    MissingConnectionCode,
    MissingSystemCode,
    InvalidOriginFormat(String),
    InvalidTimestamp(i64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::MissingOrigin => write!(f, "origin is required"),
            ValidationError::MissingKind => write!(f, "kind is required"),
            ValidationError::MissingUsername => write!(f, "username is required"),
            ValidationError::MissingConnectionCode => write!(f, "connection code is required"),
            ValidationError::MissingSystemCode => write!(f, "system code is required"),
            ValidationError::InvalidOriginFormat(s) => {
                write!(f, "invalid origin '{}': must be lowercase with optional dots", s)
            }
            ValidationError::InvalidTimestamp(ts) => {
                write!(f, "timestamp must be positive, got {}", ts)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validates a SystemMessage before publishing.
///
/// Rules:
/// - origin and kind are non-empty, origin is dot-separated lowercase
/// - the change names a user, a connection and a system
/// - timestamp is positive (Unix epoch milliseconds)
/// - message_id gets a UUIDv7 when missing or empty
pub fn validate_and_prepare(message: &mut SystemMessage) -> Result<(), ValidationError> {
    if message.origin.is_empty() {
        return Err(ValidationError::MissingOrigin);
    }
    if message.kind.is_empty() {
        return Err(ValidationError::MissingKind);
    }
    if !is_valid_origin(&message.origin) {
        return Err(ValidationError::InvalidOriginFormat(message.origin.clone()));
    }

    let change = &message.change;
    if change.username.is_empty() {
        return Err(ValidationError::MissingUsername);
    }
    if change.connection_code.is_empty() {
        return Err(ValidationError::MissingConnectionCode);
    }
    if change.system_code.is_empty() {
        return Err(ValidationError::MissingSystemCode);
    }

    if message.timestamp <= 0 {
        return Err(ValidationError::InvalidTimestamp(message.timestamp));
    }

    if message.message_id.as_deref().map_or(true, str::is_empty) {
        message.message_id = Some(Uuid::now_v7().to_string());
    }

    Ok(())
}

/// Origins are lowercase segments joined by single dots.
fn is_valid_origin(origin: &str) -> bool {
    !origin.is_empty()
        && origin.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        })
}
