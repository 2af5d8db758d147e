//! Client interface for the registry actor.
//!
//! Operations that talk to sessions (connect, disconnect, chat, addon
//! commands, status) run here, on the caller's task; the actor only owns
//! the map. Bulk operations therefore never block other registry commands.
//!
//! # Panic-Free Guarantees
//!
//! - Channel errors are mapped to `RegistryError::ChannelClosed`
//! - Per-session failures in bulk operations are collected, never propagated

use std::sync::Arc;
use std::time::Duration;

use fleet_core::{
    AccountId, ConnectionState, ConnectionStatus, FleetConfig, LogLevel, ServerConfig,
    SessionView,
};
use fleet_protocol::Store;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::commands::{RegistryCommand, RegistryError};
use super::message_loop::{self, LoopMessage};
use crate::scheduler::Scheduler;
use crate::session::{SessionError, SessionHandle};

/// Outcome of [`RegistryHandle::disconnect_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisconnectSummary {
    pub disconnected: Vec<AccountId>,
    pub failed: Vec<(AccountId, String)>,
}

/// Outcome of [`RegistryHandle::broadcast_chat`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastSummary {
    pub sent: Vec<AccountId>,
    pub failed: Vec<(AccountId, String)>,
}

/// Cheap-to-clone handle to the registry.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
    store: Arc<dyn Store>,
    config: Arc<FleetConfig>,
    scheduler: Scheduler,
}

impl std::fmt::Debug for RegistryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryHandle").finish_non_exhaustive()
    }
}

impl RegistryHandle {
    pub(crate) fn new(
        sender: mpsc::Sender<RegistryCommand>,
        store: Arc<dyn Store>,
        config: Arc<FleetConfig>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            sender,
            store,
            config,
            scheduler,
        }
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;
        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Writes to the log sink; failures are traced only.
    pub(crate) async fn log(&self, account: &AccountId, level: LogLevel, message: &str) {
        if let Err(e) = self.store.append_log(account, level, message).await {
            warn!(account = %account, error = %e, "Failed to write log entry");
        }
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Every session, in account order.
    pub async fn sessions(&self) -> Result<Vec<SessionHandle>, RegistryError> {
        self.request(|respond_to| RegistryCommand::All { respond_to })
            .await
    }

    pub async fn session(&self, account: &AccountId) -> Result<SessionHandle, RegistryError> {
        self.request(|respond_to| RegistryCommand::Get {
            account: account.clone(),
            respond_to,
        })
        .await?
        .ok_or_else(|| RegistryError::SessionNotFound(account.clone()))
    }

    /// Server from the store, else the configured fallback.
    pub async fn server_config(&self) -> Result<ServerConfig, RegistryError> {
        Ok(self
            .store
            .get_server_config()
            .await?
            .unwrap_or_else(|| self.config.server.clone()))
    }

    // ========================================================================
    // Connect
    // ========================================================================

    /// Creates a session for `account` and waits for its first attempt.
    ///
    /// The entry stays registered when the first attempt fails; automatic
    /// retries continue in the background.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` if a connected session exists
    /// - `Store` if the account is unknown
    /// - `Connect` if the first attempt failed
    pub async fn connect(&self, account: &AccountId) -> Result<(), RegistryError> {
        let record = self.store.get_account(account).await?;
        let server = self.server_config().await?;

        if let Ok(existing) = self.session(account).await {
            if existing.is_connected() {
                return Err(RegistryError::AlreadyConnected(account.clone()));
            }
            if existing.is_alive() {
                debug!(account = %account, "Stopping previous session before reconnect");
                let _ = existing.disconnect().await;
            }
        }

        let session = self
            .request(|respond_to| RegistryCommand::Attach {
                account: Box::new(record),
                server,
                respond_to,
            })
            .await??;

        session
            .connect()
            .await
            .map_err(|source| RegistryError::Connect {
                account: account.clone(),
                source,
            })
    }

    /// Connects each account independently; results in input order.
    pub async fn connect_many(
        &self,
        accounts: Vec<AccountId>,
    ) -> Vec<(AccountId, Result<(), RegistryError>)> {
        let mut set = JoinSet::new();
        for (index, account) in accounts.iter().cloned().enumerate() {
            let registry = self.clone();
            set.spawn(async move {
                let result = registry.connect(&account).await;
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<(), RegistryError>>> = vec![None; accounts.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Some(slot) = results.get_mut(index) {
                        *slot = Some(result);
                    }
                }
                Err(e) => warn!(error = %e, "Connect task failed"),
            }
        }

        accounts
            .into_iter()
            .zip(results)
            .map(|(account, result)| (account, result.unwrap_or(Err(RegistryError::ChannelClosed))))
            .collect()
    }

    /// Connects every account in the store.
    pub async fn connect_all(
        &self,
    ) -> Result<Vec<(AccountId, Result<(), RegistryError>)>, RegistryError> {
        let ids: Vec<AccountId> = self
            .store
            .list_accounts()
            .await?
            .iter()
            .map(|a| a.id().clone())
            .collect();
        info!(accounts = ids.len(), "Connecting all accounts");
        Ok(self.connect_many(ids).await)
    }

    // ========================================================================
    // Disconnect
    // ========================================================================

    /// Manually disconnects one account and forgets its session.
    pub async fn disconnect(&self, account: &AccountId) -> Result<(), RegistryError> {
        let session = self
            .request(|respond_to| RegistryCommand::Detach {
                account: account.clone(),
                respond_to,
            })
            .await?
            .ok_or_else(|| RegistryError::SessionNotFound(account.clone()))?;

        match session.disconnect().await {
            Ok(()) | Err(SessionError::ChannelClosed) => Ok(()),
            Err(e) => Err(RegistryError::session(account, e)),
        }
    }

    /// Disconnects every session; one failure does not stop the rest.
    pub async fn disconnect_all(&self) -> Result<DisconnectSummary, RegistryError> {
        let sessions = self
            .request(|respond_to| RegistryCommand::DrainAll { respond_to })
            .await?;
        Ok(self.disconnect_each(sessions).await)
    }

    async fn disconnect_each(&self, sessions: Vec<SessionHandle>) -> DisconnectSummary {
        let mut summary = DisconnectSummary::default();

        for session in sessions {
            let account = session.account().clone();
            match session.disconnect().await {
                Ok(()) | Err(SessionError::ChannelClosed) => summary.disconnected.push(account),
                Err(e) => {
                    warn!(account = %account, error = %e, "Disconnect failed");
                    self.log(&account, LogLevel::Error, &format!("Disconnect failed: {e}"))
                        .await;
                    let status = ConnectionStatus::new(ConnectionState::Disconnected, None);
                    if let Err(e) = self.store.upsert_account_status(&account, status).await {
                        warn!(account = %account, error = %e, "Failed to persist status");
                    }
                    summary.failed.push((account, e.to_string()));
                }
            }
        }

        info!(
            disconnected = summary.disconnected.len(),
            failed = summary.failed.len(),
            "Disconnected all sessions"
        );
        summary
    }

    /// Stops message loops, disconnects every session and stops the actor.
    pub async fn shutdown(&self) -> Result<DisconnectSummary, RegistryError> {
        let sessions = self
            .request(|respond_to| RegistryCommand::Shutdown { respond_to })
            .await?;
        let summary = self.disconnect_each(sessions).await;
        self.scheduler.shutdown();
        Ok(summary)
    }

    // ========================================================================
    // Chat
    // ========================================================================

    pub async fn send_chat(&self, account: &AccountId, text: &str) -> Result<(), RegistryError> {
        self.session(account)
            .await?
            .send_chat(text)
            .await
            .map_err(|e| RegistryError::session(account, e))
    }

    /// Sends `text` from every connected session.
    pub async fn broadcast_chat(&self, text: &str) -> Result<BroadcastSummary, RegistryError> {
        let mut summary = BroadcastSummary::default();
        for session in self.sessions().await? {
            if !session.is_connected() {
                continue;
            }
            let account = session.account().clone();
            match session.send_chat(text).await {
                Ok(()) => summary.sent.push(account),
                Err(e) => summary.failed.push((account, e.to_string())),
            }
        }
        Ok(summary)
    }

    // ========================================================================
    // Addon Operations
    // ========================================================================

    pub async fn enable_team_join(
        &self,
        account: &AccountId,
        messages: Vec<String>,
    ) -> Result<(), RegistryError> {
        self.session(account)
            .await?
            .enable_team_join(messages)
            .await
            .map_err(|e| RegistryError::session(account, e))
    }

    pub async fn disable_team_join(&self, account: &AccountId) -> Result<bool, RegistryError> {
        self.session(account)
            .await?
            .disable_team_join()
            .await
            .map_err(|e| RegistryError::session(account, e))
    }

    pub async fn start_command_loop(
        &self,
        account: &AccountId,
        command: &str,
        interval_secs: u64,
    ) -> Result<(), RegistryError> {
        self.session(account)
            .await?
            .start_command_loop(command, interval_secs)
            .await
            .map_err(|e| RegistryError::session(account, e))
    }

    pub async fn stop_command_loop(&self, account: &AccountId) -> Result<bool, RegistryError> {
        self.session(account)
            .await?
            .stop_command_loop()
            .await
            .map_err(|e| RegistryError::session(account, e))
    }

    pub async fn start_discovery(&self, account: &AccountId) -> Result<(), RegistryError> {
        self.session(account)
            .await?
            .start_discovery()
            .await
            .map_err(|e| RegistryError::session(account, e))
    }

    pub async fn stop_discovery(&self, account: &AccountId) -> Result<bool, RegistryError> {
        self.session(account)
            .await?
            .stop_discovery()
            .await
            .map_err(|e| RegistryError::session(account, e))
    }

    pub async fn start_mass_message(
        &self,
        account: &AccountId,
        template: &str,
        messages: Vec<String>,
        delay: Duration,
    ) -> Result<usize, RegistryError> {
        self.session(account)
            .await?
            .start_mass_message(template, messages, delay)
            .await
            .map_err(|e| RegistryError::session(account, e))
    }

    pub async fn stop_mass_message(&self, account: &AccountId) -> Result<bool, RegistryError> {
        self.session(account)
            .await?
            .stop_mass_message()
            .await
            .map_err(|e| RegistryError::session(account, e))
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Read-only views of every session, in account order.
    pub async fn snapshot(&self) -> Result<Vec<SessionView>, RegistryError> {
        let mut views = Vec::new();
        for session in self.sessions().await? {
            views.push(session.status().await);
        }
        Ok(views)
    }

    // ========================================================================
    // Message Loops
    // ========================================================================

    /// Replaces the running message loops. Returns how many were started.
    pub async fn start_message_loops(
        &self,
        messages: Vec<LoopMessage>,
    ) -> Result<usize, RegistryError> {
        if messages.is_empty() {
            return Err(RegistryError::InvalidMessageLoop(
                "no messages configured".to_string(),
            ));
        }
        for message in &messages {
            message.validate()?;
        }

        let tasks: Vec<_> = messages
            .into_iter()
            .map(|message| message_loop::start(self.clone(), message))
            .collect();
        let count = tasks.len();

        let pending = tasks.clone();
        match self
            .request(|respond_to| RegistryCommand::ReplaceLoops { tasks, respond_to })
            .await
        {
            Ok(_) => {
                info!(count, "Message loops started");
                Ok(count)
            }
            Err(e) => {
                for task in pending {
                    task.cancel();
                }
                Err(e)
            }
        }
    }

    /// Starts one loop per enabled chat message in the store, replacing any
    /// running set. Returns how many were started.
    pub async fn start_stored_message_loops(&self) -> Result<usize, RegistryError> {
        let messages: Vec<LoopMessage> = self
            .store
            .list_chat_messages()
            .await?
            .iter()
            .filter(|m| m.enabled)
            .map(LoopMessage::from)
            .collect();

        if messages.is_empty() {
            return Err(RegistryError::InvalidMessageLoop(
                "no enabled chat messages stored".to_string(),
            ));
        }
        self.start_message_loops(messages).await
    }

    /// Returns how many loops were stopped.
    pub async fn stop_message_loops(&self) -> Result<usize, RegistryError> {
        let stopped = self
            .request(|respond_to| RegistryCommand::StopLoops { respond_to })
            .await?;
        info!(stopped, "Message loops stopped");
        Ok(stopped)
    }

    pub async fn message_loop_count(&self) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::LoopCount { respond_to })
            .await
    }
}
