//! Session actor commands and errors.
//!
//! Operator commands carry a oneshot `respond_to`. Internal commands come
//! from the session's own timers and carry the connection generation they
//! were scheduled for; the actor drops any whose generation is stale.

use std::time::Duration;

use fleet_core::SessionView;
use fleet_protocol::{ClientConnection, ClientError};
use thiserror::Error;
use tokio::sync::oneshot;

use crate::addon::AddonError;
use crate::scheduler::Tick;

// ============================================================================
// Errors
// ============================================================================

/// Why a connection attempt (or a live connection) ended.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// No spawn within the connect bound.
    #[error("no spawn within {}s", .0.as_secs())]
    ConnectTimeout(Duration),

    /// Server-initiated termination.
    #[error("kicked: {0}")]
    Kicked(String),

    /// Transport or protocol failure.
    #[error("client error: {0}")]
    ClientError(String),

    /// Operator-initiated disconnect. Never retried.
    #[error("disconnected by operator")]
    ManualDisconnect,

    /// Retries used up. Terminal.
    #[error("reconnect attempts exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// A connect is already running or waiting for its retry.
    #[error("connection attempt already in progress")]
    InProgress,

    #[error("session actor has shut down")]
    ChannelClosed,
}

impl ConnectError {
    /// True for failures the reconnect policy may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout(_) | Self::Kicked(_) | Self::ClientError(_)
        )
    }
}

impl From<ClientError> for ConnectError {
    fn from(err: ClientError) -> Self {
        Self::ClientError(err.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session is not connected")]
    NotConnected,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Addon(#[from] AddonError),

    #[error("session actor has shut down")]
    ChannelClosed,
}

// ============================================================================
// Addon Operations
// ============================================================================

/// Operator request forwarded to the session's addon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddonOp {
    StartDiscovery,
    StopDiscovery,
    StartMassMessage {
        template: String,
        messages: Vec<String>,
        delay: Duration,
    },
    StopMassMessage,
    EnableTeamJoin {
        messages: Vec<String>,
    },
    DisableTeamJoin,
    StartCommandLoop {
        command: String,
        interval_secs: u64,
    },
    StopCommandLoop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonOutcome {
    Started,
    /// Mass messaging started over this many players.
    Queued(usize),
    /// Whether there was something to stop.
    Stopped(bool),
}

// ============================================================================
// Commands
// ============================================================================

pub enum SessionCommand {
    /// First connect. Resolves when the first attempt spawns or fails.
    Connect {
        respond_to: oneshot::Sender<Result<(), ConnectError>>,
    },

    /// Manual disconnect. The actor exits afterwards.
    Disconnect {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    Chat {
        text: String,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    Addon {
        op: AddonOp,
        respond_to: oneshot::Sender<Result<AddonOutcome, SessionError>>,
    },

    Status {
        respond_to: oneshot::Sender<SessionView>,
    },

    // ----- internal, generation-tagged -----
    Opened {
        generation: u64,
        result: Result<ClientConnection, ClientError>,
    },

    ConnectTimedOut {
        generation: u64,
    },

    ReconnectDue {
        generation: u64,
    },

    /// The human-like delay after spawn has passed.
    SpawnSettled {
        generation: u64,
    },

    KeepalivePulse {
        generation: u64,
        respond_to: oneshot::Sender<Tick>,
    },

    KeepaliveRelease {
        generation: u64,
    },
}

impl std::fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connect { .. } => "Connect",
            Self::Disconnect { .. } => "Disconnect",
            Self::Chat { .. } => "Chat",
            Self::Addon { .. } => "Addon",
            Self::Status { .. } => "Status",
            Self::Opened { .. } => "Opened",
            Self::ConnectTimedOut { .. } => "ConnectTimedOut",
            Self::ReconnectDue { .. } => "ReconnectDue",
            Self::SpawnSettled { .. } => "SpawnSettled",
            Self::KeepalivePulse { .. } => "KeepalivePulse",
            Self::KeepaliveRelease { .. } => "KeepaliveRelease",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_display() {
        assert_eq!(
            ConnectError::ConnectTimeout(Duration::from_secs(30)).to_string(),
            "no spawn within 30s"
        );
        assert_eq!(
            ConnectError::ReconnectExhausted { attempts: 10 }.to_string(),
            "reconnect attempts exhausted after 10 attempts"
        );
    }

    #[test]
    fn test_retryable_taxonomy() {
        assert!(ConnectError::Kicked("x".to_string()).is_retryable());
        assert!(ConnectError::from(ClientError::Protocol("bad".to_string())).is_retryable());
        assert!(!ConnectError::ManualDisconnect.is_retryable());
        assert!(!ConnectError::ReconnectExhausted { attempts: 3 }.is_retryable());
    }
}
