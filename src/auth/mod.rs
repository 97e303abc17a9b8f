use crate::config::AuthConfig;
use axum::http::HeaderMap;
use dashmap::DashMap;
use std::collections::HashSet;


/// Username every caller acts as when authentication is disabled.
pub const DEFAULT_USER: &str = "default";

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, TokenError> {
    let auth_header = headers
        .get("authorization")
        .ok_or(TokenError::Missing)?
        .to_str()
        .map_err(|_| TokenError::InvalidFormat)?;

    parse_bearer_token(auth_header)
}

fn parse_bearer_token(header_value: &str) -> Result<String, TokenError> {
    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or(TokenError::InvalidFormat)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(TokenError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    Ok(token.to_string())
}

/// Token extraction errors
#[derive(Debug, PartialEq, Clone)]
pub enum TokenError {
    /// Authorization header not present
    Missing,
    /// Not "Bearer <token>"
    InvalidFormat,
    /// Token is empty string
    Empty,
    /// Well-formed token that maps to no user
    Unknown,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Missing => write!(f, "Authorization token not provided"),
            TokenError::InvalidFormat => write!(f, "Invalid authorization token format"),
            TokenError::Empty => write!(f, "Authorization token is empty"),
            TokenError::Unknown => write!(f, "Authorization token not recognized"),
        }
    }
}

impl std::error::Error for TokenError {}

/// Identity of an API caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub username: String,
    pub admin: bool,
}

impl Caller {
    /// Resolves whose connections a request acts on.
    ///
    /// Callers act on their own connections; admins may name another owner.
    pub fn acting_as<'a>(&'a self, owner: Option<&'a str>) -> Result<&'a str, OwnershipError> {
        match owner {
            None => Ok(&self.username),
            Some(o) if o == self.username => Ok(o),
            Some(o) if self.admin => Ok(o),
            Some(_) => Err(OwnershipError),
        }
    }
}

/// Returned when a non-admin caller targets another user's connection.
#[derive(Debug, PartialEq, Clone)]
pub struct OwnershipError;

impl std::fmt::Display for OwnershipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection not owned by user")
    }
}

impl std::error::Error for OwnershipError {}

/// Maps bearer tokens to gateway users.
pub struct CallerDirectory {
    enabled: bool,
    tokens: DashMap<String, String>,
    admins: HashSet<String>,
}

impl CallerDirectory {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            enabled: config.enabled,
            tokens: config
                .tokens
                .iter()
                .map(|(token, user)| (token.clone(), user.clone()))
                .collect(),
            admins: config.admin_users.iter().cloned().collect(),
        }
    }

    /// Directory that lets every request through as [`DEFAULT_USER`].
    pub fn disabled() -> Self {
        Self::new(&AuthConfig::default())
    }

    /// Identifies the caller of a request.
    pub fn identify(&self, headers: &HeaderMap) -> Result<Caller, TokenError> {
        if !self.enabled {
            return Ok(Caller {
                username: DEFAULT_USER.to_string(),
                admin: self.admins.contains(DEFAULT_USER),
            });
        }

        let token = extract_bearer_token(headers)?;
        let username = self
            .tokens
            .get(&token)
            .map(|entry| entry.value().clone())
            .ok_or(TokenError::Unknown)?;

        Ok(Caller {
            admin: self.admins.contains(&username),
            username,
        })
    }
}
