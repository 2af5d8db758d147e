//! Account identity, credentials and server address.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};
use crate::status::{ConnectionState, ConnectionStatus};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Identifier of an account (the login e-mail).
///
/// Comparison is exact; the store is the authority on uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Creates a new AccountId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the local part of an e-mail style id (before `@`).
    ///
    /// Used as the fallback in-game name when the client reports none.
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for AccountId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Identity plus secret, as handed to the protocol client and authenticator.
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub id: AccountId,
    pub secret: String,
}

impl Credentials {
    pub fn new(id: impl Into<AccountId>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
        }
    }

    /// Parses an `email:password` line.
    ///
    /// The first `:` separates the two parts, so secrets may contain colons.
    /// Both parts are trimmed and must be non-empty; the id must contain `@`.
    pub fn parse_line(line: &str) -> DomainResult<Self> {
        let trimmed = line.trim();
        let (id, secret) = trimmed
            .split_once(':')
            .ok_or_else(|| DomainError::InvalidCredentialLine {
                line: trimmed.to_string(),
                reason: "missing ':' separator".to_string(),
            })?;

        let id = id.trim();
        let secret = secret.trim();

        if id.is_empty() || !id.contains('@') {
            return Err(DomainError::InvalidCredentialLine {
                line: trimmed.to_string(),
                reason: "account must be an e-mail address".to_string(),
            });
        }
        if secret.is_empty() {
            return Err(DomainError::InvalidCredentialLine {
                line: trimmed.to_string(),
                reason: "empty password".to_string(),
            });
        }

        Ok(Self::new(id, secret))
    }

    /// Formats back to the `email:password` line form.
    pub fn to_line(&self) -> String {
        format!("{}:{}", self.id, self.secret)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ============================================================================
// Account
// ============================================================================

/// An account as held by the persistent store.
///
/// The engine reads credentials from it and writes back only the status
/// projection (`status`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub credentials: Credentials,

    #[serde(default)]
    pub status: ConnectionStatus,

    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            status: ConnectionStatus::default(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.credentials.id
    }

    pub fn is_connected(&self) -> bool {
        self.status.is_connected
    }

    pub fn state(&self) -> ConnectionState {
        self.status.state
    }
}

// ============================================================================
// Server Address
// ============================================================================

/// Default game server port.
pub const DEFAULT_SERVER_PORT: u16 = 25565;

/// Target server for every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parses `host` or `host:port`.
    pub fn parse(addr: &str) -> DomainResult<Self> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(DomainError::InvalidFieldValue {
                field: "server".to_string(),
                value: String::new(),
                expected: "host or host:port".to_string(),
            });
        }

        match addr.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port = port.parse::<u16>().map_err(|e| DomainError::ParseError {
                    field: "port".to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Self::new(host, port))
            }
            _ => Ok(Self::new(addr, DEFAULT_SERVER_PORT)),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_SERVER_PORT)
    }
}

impl fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
