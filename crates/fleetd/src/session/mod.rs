//! One account's live session using the actor pattern.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐  SessionCommand  ┌──────────────┐  open/actions  ┌────────────┐
//! │ SessionHandle │─────────────────▶│ SessionActor │───────────────▶│ GameClient │
//! └───────────────┘   (mpsc)         └──────────────┘◀───────────────└────────────┘
//!                                      ▲    │   │        ClientEvent
//!                    timers report back│    │   └──▶ Store (status + log sink)
//!                    (generation-tagged)    ▼
//!                                    AutomationAddon (after spawn)
//! ```
//!
//! The actor is the only owner of the client handle. Everything else,
//! including the addon's chat output, goes through its command channel.

use fleet_core::{Account, ConnectionState, ServerConfig};
use tokio::sync::{mpsc, watch};

mod actor;
mod commands;
mod handle;
mod keepalive;

pub use actor::SessionActor;
pub use commands::{AddonOp, AddonOutcome, ConnectError, SessionCommand, SessionError};
pub use handle::SessionHandle;

use crate::context::EngineContext;

/// Channel buffer size
const COMMAND_BUFFER: usize = 64;

/// Spawns a session actor for `account` against `server`.
///
/// The session starts `Disconnected`; call [`SessionHandle::connect`].
pub fn spawn_session(account: Account, server: ServerConfig, ctx: EngineContext) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

    let id = account.id().clone();
    let actor = SessionActor::new(
        account,
        server,
        ctx,
        cmd_rx,
        cmd_tx.downgrade(),
        state_tx,
    );
    tokio::spawn(actor.run());

    SessionHandle::new(id, cmd_tx, state_rx)
}
