//! Connection state, the persisted status projection, and log severities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Connection State (4-State Model)
// ============================================================================

/// Where a session is in its connect/reconnect lifecycle.
///
/// - **Disconnected**: initial and terminal; nothing is scheduled
/// - **Connecting**: waiting for the client to spawn (bounded by the connect timeout)
/// - **Connected**: spawned; keepalive and addon are live
/// - **Failed**: transient; always followed by a reconnect or by giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    /// Returns the display label for this state.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Failed => "failed",
        }
    }

    /// Returns true only for `Connected`.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns true while a connection is being established or retried.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Connecting | Self::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

// ============================================================================
// Persisted Status Projection
// ============================================================================

/// The status projection written back to the store after every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub is_connected: bool,

    /// Set when the session enters `Connected`; kept through later transitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    /// Status for a state, carrying over the last connection time.
    pub fn new(state: ConnectionState, last_connected_at: Option<DateTime<Utc>>) -> Self {
        Self {
            state,
            is_connected: state.is_connected(),
            last_connected_at,
        }
    }

    /// Status for a session that just spawned.
    pub fn connected_now() -> Self {
        Self::new(ConnectionState::Connected, Some(Utc::now()))
    }
}

// ============================================================================
// Log Levels
// ============================================================================

/// Severity of an entry in the persistent log sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry of the persistent log sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub account: crate::AccountId,
    pub level: LogLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(account: crate::AccountId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            account,
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}: {}",
            self.at.format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.account,
            self.message
        )
    }
}
