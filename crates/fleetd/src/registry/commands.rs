//! Registry actor commands and errors.

use fleet_core::{Account, AccountId, ServerConfig};
use fleet_protocol::StoreError;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::scheduler::ScheduledTask;
use crate::session::{ConnectError, SessionError, SessionHandle};

// ============================================================================
// Registry Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A connected session already exists for this account.
    #[error("account already connected: {0}")]
    AlreadyConnected(AccountId),

    #[error("no session for account: {0}")]
    SessionNotFound(AccountId),

    #[error("registry full (max {max} sessions)")]
    RegistryFull { max: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The first connect attempt failed. Retries may continue.
    #[error("connect {account} failed: {source}")]
    Connect {
        account: AccountId,
        #[source]
        source: ConnectError,
    },

    #[error("session {account}: {source}")]
    Session {
        account: AccountId,
        #[source]
        source: SessionError,
    },

    #[error("invalid message loop: {0}")]
    InvalidMessageLoop(String),

    #[error("registry actor has shut down")]
    ChannelClosed,
}

impl RegistryError {
    pub(crate) fn session(account: &AccountId, source: SessionError) -> Self {
        Self::Session {
            account: account.clone(),
            source,
        }
    }
}

// ============================================================================
// Registry Commands
// ============================================================================

pub enum RegistryCommand {
    /// Create a session for `account`, replacing a non-connected entry.
    ///
    /// # Errors
    /// - `AlreadyConnected` if the existing entry is connected
    /// - `RegistryFull` at capacity
    Attach {
        account: Box<Account>,
        server: ServerConfig,
        respond_to: oneshot::Sender<Result<SessionHandle, RegistryError>>,
    },

    Get {
        account: AccountId,
        respond_to: oneshot::Sender<Option<SessionHandle>>,
    },

    /// Remove and return an entry.
    Detach {
        account: AccountId,
        respond_to: oneshot::Sender<Option<SessionHandle>>,
    },

    /// Every entry, in account order.
    All {
        respond_to: oneshot::Sender<Vec<SessionHandle>>,
    },

    /// Remove and return every entry.
    DrainAll {
        respond_to: oneshot::Sender<Vec<SessionHandle>>,
    },

    /// Periodic: forget sessions whose actor has stopped.
    PruneClosed,

    /// Install a new set of message loops, cancelling the old set.
    ReplaceLoops {
        tasks: Vec<ScheduledTask>,
        respond_to: oneshot::Sender<usize>,
    },

    /// Cancel every message loop; replies with how many were active.
    StopLoops {
        respond_to: oneshot::Sender<usize>,
    },

    LoopCount {
        respond_to: oneshot::Sender<usize>,
    },

    /// Cancel loops, hand back every session and stop the actor.
    Shutdown {
        respond_to: oneshot::Sender<Vec<SessionHandle>>,
    },
}

impl std::fmt::Debug for RegistryCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attach { account, .. } => {
                f.debug_struct("Attach").field("account", account.id()).finish()
            }
            Self::Get { account, .. } => f.debug_struct("Get").field("account", account).finish(),
            Self::Detach { account, .. } => {
                f.debug_struct("Detach").field("account", account).finish()
            }
            Self::All { .. } => f.write_str("All"),
            Self::DrainAll { .. } => f.write_str("DrainAll"),
            Self::PruneClosed => f.write_str("PruneClosed"),
            Self::ReplaceLoops { tasks, .. } => f
                .debug_struct("ReplaceLoops")
                .field("count", &tasks.len())
                .finish(),
            Self::StopLoops { .. } => f.write_str("StopLoops"),
            Self::LoopCount { .. } => f.write_str("LoopCount"),
            Self::Shutdown { .. } => f.write_str("Shutdown"),
        }
    }
}
