//! Contract with the game-protocol client.
//!
//! The engine never speaks the wire protocol itself. A [`GameClient`] opens
//! a connection and returns a [`ClientConnection`]: an action handle plus the
//! stream of [`ClientEvent`]s for that connection. Closing the handle or
//! dropping the receiver ends the engine's interest in the connection.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{Credentials, ServerConfig};
use thiserror::Error;
use tokio::sync::mpsc;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The connection could not be opened.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Transport or protocol failure on a live connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The action requires a live connection.
    #[error("client is not connected")]
    NotConnected,
}

// ============================================================================
// Events
// ============================================================================

/// Events emitted by a live connection, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Login handshake completed.
    Login,
    /// The player entity exists in the world; the session is usable.
    Spawn,
    /// Server-initiated termination.
    Kicked { reason: String },
    /// Transport/protocol error.
    Error { message: String },
    /// Connection closed.
    End { reason: Option<String> },
    /// A chat line; `username` is the sender as reported by the server.
    Chat { username: String, message: String },
    /// Health or food changed.
    Health { health: f32, food: f32 },
}

impl ClientEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Spawn => "spawn",
            Self::Kicked { .. } => "kicked",
            Self::Error { .. } => "error",
            Self::End { .. } => "end",
            Self::Chat { .. } => "chat",
            Self::Health { .. } => "health",
        }
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Movement flags the engine toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MovementFlag {
    Jump,
    Sneak,
    Forward,
}

impl fmt::Display for MovementFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jump => write!(f, "jump"),
            Self::Sneak => write!(f, "sneak"),
            Self::Forward => write!(f, "forward"),
        }
    }
}

/// Actions on one live connection.
///
/// Owned exclusively by the session that opened it.
pub trait ClientHandle: Send + Sync {
    /// In-game name of the logged-in player, once known.
    fn username(&self) -> Option<String>;

    /// True while the player entity is present in the world.
    fn has_entity(&self) -> bool;

    /// Sends one chat line (or command, when it starts with `/`).
    fn chat(&self, text: &str) -> Result<(), ClientError>;

    /// Sets a movement flag on or off.
    fn set_movement_flag(&self, flag: MovementFlag, on: bool) -> Result<(), ClientError>;

    /// Closes the connection. Idempotent.
    fn close(&self, reason: &str);
}

// ============================================================================
// Opening Connections
// ============================================================================

/// Parameters for one connection attempt.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub credentials: Credentials,
    pub server: ServerConfig,
    /// Bound the client should apply to its own handshake.
    pub timeout: Duration,
}

/// A freshly opened connection.
pub struct ClientConnection {
    pub handle: Arc<dyn ClientHandle>,
    pub events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection").finish_non_exhaustive()
    }
}

/// Factory for connections, injected into every session.
#[async_trait]
pub trait GameClient: Send + Sync {
    /// Opens a connection. Success means the transport is up; the session
    /// is usable only after [`ClientEvent::Spawn`] arrives on `events`.
    async fn open(&self, request: ConnectRequest) -> Result<ClientConnection, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind() {
        assert_eq!(ClientEvent::Spawn.kind(), "spawn");
        assert_eq!(
            ClientEvent::Kicked {
                reason: "bye".to_string()
            }
            .kind(),
            "kicked"
        );
        assert_eq!(ClientEvent::End { reason: None }.kind(), "end");
    }

    #[test]
    fn test_client_error_display() {
        assert_eq!(
            ClientError::Connect("refused".to_string()).to_string(),
            "connection failed: refused"
        );
        assert_eq!(ClientError::NotConnected.to_string(), "client is not connected");
    }

    #[test]
    fn test_movement_flag_display() {
        assert_eq!(MovementFlag::Jump.to_string(), "jump");
    }
}
