//! Client interface for one session actor.
//!
//! # Panic-Free Guarantees
//!
//! - Channel errors are mapped to `ChannelClosed`
//! - `status()` never fails; a stopped actor reports a disconnected view

use std::time::Duration;

use fleet_core::{AccountId, ConnectionState, SessionView};
use tokio::sync::{mpsc, oneshot, watch};

use super::commands::{AddonOp, AddonOutcome, ConnectError, SessionCommand, SessionError};

/// Cheap-to-clone handle to a session actor.
///
/// The actor stops once it has been disconnected or every handle has been
/// dropped.
#[derive(Clone)]
pub struct SessionHandle {
    account: AccountId,
    sender: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("account", &self.account)
            .field("state", &self.state())
            .finish()
    }
}

impl SessionHandle {
    pub(crate) fn new(
        account: AccountId,
        sender: mpsc::Sender<SessionCommand>,
        state: watch::Receiver<ConnectionState>,
    ) -> Self {
        Self {
            account,
            sender,
            state,
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Last state published by the actor.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// False once the actor has stopped.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Waits until the session reaches `target`.
    ///
    /// Fails with `ChannelClosed` if the actor stops first without
    /// publishing it.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), SessionError> {
        let mut rx = self.state.clone();
        rx.wait_for(|state| *state == target)
            .await
            .map(|_| ())
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Starts the connect sequence and waits for the first attempt.
    ///
    /// # Errors
    ///
    /// - `ConnectTimeout`, `Kicked`, `ClientError` for a failed first attempt
    ///   (automatic retries continue in the background)
    /// - `InProgress` if an attempt or retry is already pending
    /// - `ManualDisconnect` if disconnected before the attempt settled
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Connect { respond_to: tx })
            .await
            .map_err(|_| ConnectError::ChannelClosed)?;
        rx.await.map_err(|_| ConnectError::ChannelClosed)?
    }

    /// Manual disconnect. Terminal for this session.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Disconnect { respond_to: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    pub async fn send_chat(&self, text: &str) -> Result<(), SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Chat {
                text: text.to_string(),
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Snapshot of the session.
    pub async fn status(&self) -> SessionView {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionCommand::Status { respond_to: tx })
            .await
            .is_err()
        {
            return SessionView::gone(self.account.clone());
        }
        rx.await
            .unwrap_or_else(|_| SessionView::gone(self.account.clone()))
    }

    // ========================================================================
    // Addon Operations
    // ========================================================================

    async fn addon(&self, op: AddonOp) -> Result<AddonOutcome, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::Addon { op, respond_to: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    async fn addon_stop(&self, op: AddonOp) -> Result<bool, SessionError> {
        match self.addon(op).await? {
            AddonOutcome::Stopped(stopped) => Ok(stopped),
            _ => Ok(true),
        }
    }

    pub async fn start_discovery(&self) -> Result<(), SessionError> {
        self.addon(AddonOp::StartDiscovery).await.map(|_| ())
    }

    /// Returns false if no discovery pass was running.
    pub async fn stop_discovery(&self) -> Result<bool, SessionError> {
        self.addon_stop(AddonOp::StopDiscovery).await
    }

    /// Returns the number of players in the pass.
    pub async fn start_mass_message(
        &self,
        template: &str,
        messages: Vec<String>,
        delay: Duration,
    ) -> Result<usize, SessionError> {
        let outcome = self
            .addon(AddonOp::StartMassMessage {
                template: template.to_string(),
                messages,
                delay,
            })
            .await?;
        match outcome {
            AddonOutcome::Queued(count) => Ok(count),
            _ => Ok(0),
        }
    }

    pub async fn stop_mass_message(&self) -> Result<bool, SessionError> {
        self.addon_stop(AddonOp::StopMassMessage).await
    }

    pub async fn enable_team_join(&self, messages: Vec<String>) -> Result<(), SessionError> {
        self.addon(AddonOp::EnableTeamJoin { messages })
            .await
            .map(|_| ())
    }

    pub async fn disable_team_join(&self) -> Result<bool, SessionError> {
        self.addon_stop(AddonOp::DisableTeamJoin).await
    }

    pub async fn start_command_loop(
        &self,
        command: &str,
        interval_secs: u64,
    ) -> Result<(), SessionError> {
        self.addon(AddonOp::StartCommandLoop {
            command: command.to_string(),
            interval_secs,
        })
        .await
        .map(|_| ())
    }

    pub async fn stop_command_loop(&self) -> Result<bool, SessionError> {
        self.addon_stop(AddonOp::StopCommandLoop).await
    }
}
