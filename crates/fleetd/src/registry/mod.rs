//! Session registry using the actor pattern.
//!
//! The registry maps each account to at most one live session and runs the
//! bulk operations on top of that map.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐  RegistryCommand  ┌───────────────┐
//! │ RegistryHandle │──────────────────▶│ RegistryActor │  BTreeMap<AccountId,
//! └────────────────┘     (mpsc)        └───────────────┘       SessionHandle>
//!         │
//!         │ connect / disconnect / chat / addon ops / status
//!         ▼
//!   SessionHandle ──▶ SessionActor (one per account)
//! ```
//!
//! Sessions report state through their own handles; they never write to
//! the registry. A periodic cleanup command forgets sessions whose actor
//! has stopped.
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tracing::debug;

mod actor;
mod commands;
mod handle;
mod message_loop;

pub use actor::{RegistryActor, MAX_SESSIONS};
pub use commands::{RegistryCommand, RegistryError};
pub use handle::{BroadcastSummary, DisconnectSummary, RegistryHandle};
pub use message_loop::LoopMessage;

use crate::context::EngineContext;

/// Channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Cleanup interval in seconds
const CLEANUP_INTERVAL_SECS: u64 = 30;

/// Spawns the registry actor and its cleanup task.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use fleet_core::{AccountId, DomainError, FleetConfig};
/// use fleet_protocol::GameClient;
/// use fleetd::{registry::spawn_registry, store::MemoryStore, EngineContext};
///
/// async fn run(client: Arc<dyn GameClient>) -> Result<(), DomainError> {
///     let store = Arc::new(MemoryStore::new());
///     let ctx = EngineContext::new(client, store, FleetConfig::default())?;
///     let registry = spawn_registry(ctx);
///     let _ = registry.connect(&AccountId::new("a@x.com")).await;
///     Ok(())
/// }
/// ```
pub fn spawn_registry(ctx: EngineContext) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let handle = RegistryHandle::new(
        cmd_tx.clone(),
        ctx.store.clone(),
        ctx.config.clone(),
        ctx.scheduler.clone(),
    );

    let actor = RegistryActor::new(cmd_rx, ctx);
    tokio::spawn(actor.run());

    spawn_cleanup_task(cmd_tx);

    handle
}

/// Periodically asks the actor to forget stopped sessions.
fn spawn_cleanup_task(sender: mpsc::Sender<RegistryCommand>) {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            if sender.send(RegistryCommand::PruneClosed).await.is_err() {
                debug!("Cleanup task stopping: registry channel closed");
                break;
            }
        }
    });
}
