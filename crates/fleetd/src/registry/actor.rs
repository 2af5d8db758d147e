//! Registry actor - owns the account → session map.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Responder send failures are ignored (the caller went away)

use std::collections::BTreeMap;

use fleet_core::{Account, AccountId, ServerConfig};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::commands::{RegistryCommand, RegistryError};
use crate::context::EngineContext;
use crate::scheduler::ScheduledTask;
use crate::session::{spawn_session, SessionHandle};

// ============================================================================
// Resource Limits
// ============================================================================

/// Maximum number of sessions the registry can hold.
pub const MAX_SESSIONS: usize = 100;

// ============================================================================
// Registry Actor
// ============================================================================

/// Single owner of the session map and the message-loop tasks.
///
/// Commands are processed sequentially. The actor never awaits a session:
/// anything that talks to a session (connect, disconnect, status) happens
/// in the handle, outside the actor.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,
    ctx: EngineContext,
    sessions: BTreeMap<AccountId, SessionHandle>,
    loops: Vec<ScheduledTask>,
}

impl RegistryActor {
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, ctx: EngineContext) -> Self {
        Self {
            receiver,
            ctx,
            sessions: BTreeMap::new(),
            loops: Vec::new(),
        }
    }

    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            if !self.handle_command(cmd) {
                break;
            }
        }

        self.cancel_loops();
        info!(sessions = self.sessions.len(), "Registry actor stopped");
    }

    /// Returns false when the actor should stop.
    fn handle_command(&mut self, cmd: RegistryCommand) -> bool {
        match cmd {
            RegistryCommand::Attach {
                account,
                server,
                respond_to,
            } => {
                let result = self.handle_attach(*account, server);
                let _ = respond_to.send(result);
            }
            RegistryCommand::Get {
                account,
                respond_to,
            } => {
                let _ = respond_to.send(self.sessions.get(&account).cloned());
            }
            RegistryCommand::Detach {
                account,
                respond_to,
            } => {
                let _ = respond_to.send(self.sessions.remove(&account));
            }
            RegistryCommand::All { respond_to } => {
                let _ = respond_to.send(self.sessions.values().cloned().collect());
            }
            RegistryCommand::DrainAll { respond_to } => {
                let drained = std::mem::take(&mut self.sessions);
                let _ = respond_to.send(drained.into_values().collect());
            }
            RegistryCommand::PruneClosed => self.handle_prune(),
            RegistryCommand::ReplaceLoops { tasks, respond_to } => {
                let replaced = self.cancel_loops();
                self.loops = tasks;
                debug!(replaced, active = self.loops.len(), "Message loops replaced");
                let _ = respond_to.send(replaced);
            }
            RegistryCommand::StopLoops { respond_to } => {
                let _ = respond_to.send(self.cancel_loops());
            }
            RegistryCommand::LoopCount { respond_to } => {
                self.loops.retain(ScheduledTask::is_active);
                let _ = respond_to.send(self.loops.len());
            }
            RegistryCommand::Shutdown { respond_to } => {
                self.cancel_loops();
                let drained = std::mem::take(&mut self.sessions);
                let _ = respond_to.send(drained.into_values().collect());
                return false;
            }
        }
        true
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_attach(
        &mut self,
        account: Account,
        server: ServerConfig,
    ) -> Result<SessionHandle, RegistryError> {
        let id = account.id().clone();

        if let Some(existing) = self.sessions.get(&id) {
            if existing.is_connected() {
                return Err(RegistryError::AlreadyConnected(id));
            }
        } else if self.sessions.len() >= MAX_SESSIONS {
            warn!(
                account = %id,
                current = self.sessions.len(),
                max = MAX_SESSIONS,
                "Registry is full, rejecting session"
            );
            return Err(RegistryError::RegistryFull { max: MAX_SESSIONS });
        }

        let handle = spawn_session(account, server, self.ctx.clone());

        if let Some(previous) = self.sessions.insert(id.clone(), handle.clone()) {
            if previous.is_alive() {
                debug!(account = %id, state = %previous.state(), "Replacing idle session");
                tokio::spawn(async move {
                    let _ = previous.disconnect().await;
                });
            }
        }

        debug!(account = %id, total = self.sessions.len(), "Session attached");
        Ok(handle)
    }

    fn handle_prune(&mut self) {
        let before = self.sessions.len();
        self.sessions.retain(|_, handle| handle.is_alive());
        let pruned = before - self.sessions.len();
        if pruned > 0 {
            debug!(pruned, remaining = self.sessions.len(), "Pruned stopped sessions");
        }
    }

    fn cancel_loops(&mut self) -> usize {
        let active = self.loops.iter().filter(|t| t.is_active()).count();
        for task in self.loops.drain(..) {
            task.cancel();
        }
        active
    }
}
