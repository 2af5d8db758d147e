//! Session actor - owns one account's connection and state machine.
//!
//! # States
//!
//! ```text
//!   Disconnected --connect--> Connecting --spawn--> Connected
//!        ^                      |    ^                 |
//!        |            timeout/kick/error          kick/error/end
//!        |                      v    |                 |
//!        +----give up------- Failed <------------------+
//!                               |  retry after backoff
//!                               +----> Connecting
//! ```
//!
//! Manual disconnect from any state tears everything down, persists
//! `Disconnected` and stops the actor.
//!
//! # Generations
//!
//! Each connection attempt gets a new generation number. Timers and the
//! open task report back with the generation they were started for;
//! anything stale is ignored, so a late callback never acts on a
//! connection that has already been torn down.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Dropped responders are ignored

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleet_core::{
    is_duplicate_login, Account, ConnectMode, ConnectionState, ConnectionStatus, ServerConfig,
    SessionView,
};
use fleet_protocol::{
    ClientConnection, ClientError, ClientEvent, ClientHandle, ConnectRequest, MovementFlag,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::commands::{AddonOp, AddonOutcome, ConnectError, SessionCommand, SessionError};
use super::keepalive;
use crate::addon::{AddonError, AddonParts, AutomationAddon, ChatSink};
use crate::context::EngineContext;
use crate::events::{ChatBus, ChatLine};
use crate::journal::Journal;
use crate::scheduler::{jitter, ScheduledTask, TaskSet, Tick};

/// The live connection: action handle plus its event stream.
struct Link {
    handle: Arc<dyn ClientHandle>,
    events: mpsc::UnboundedReceiver<ClientEvent>,
}

pub struct SessionActor {
    account: Account,
    server: ServerConfig,
    ctx: EngineContext,

    receiver: mpsc::Receiver<SessionCommand>,
    /// For timers that report back; never keeps the actor alive.
    weak: mpsc::WeakSender<SessionCommand>,
    state_tx: watch::Sender<ConnectionState>,

    journal: Journal,
    bus: ChatBus,

    state: ConnectionState,
    generation: u64,
    reconnect_attempts: u32,
    auto_reconnect: bool,
    last_connected_at: Option<DateTime<Utc>>,

    link: Option<Link>,
    addon: Option<AutomationAddon>,
    tasks: TaskSet,
    connect_timeout: Option<ScheduledTask>,

    /// Caller of the first `connect`, answered on first spawn or failure.
    pending_first: Option<oneshot::Sender<Result<(), ConnectError>>>,
}

impl SessionActor {
    pub(crate) fn new(
        account: Account,
        server: ServerConfig,
        ctx: EngineContext,
        receiver: mpsc::Receiver<SessionCommand>,
        weak: mpsc::WeakSender<SessionCommand>,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        let journal = Journal::new(account.id().clone(), ctx.store.clone());
        let auto_reconnect = ctx.config.reconnect.enabled;
        Self {
            account,
            server,
            ctx,
            receiver,
            weak,
            state_tx,
            journal,
            bus: ChatBus::new(),
            state: ConnectionState::Disconnected,
            generation: 0,
            reconnect_attempts: 0,
            auto_reconnect,
            last_connected_at: None,
            link: None,
            addon: None,
            tasks: TaskSet::new(),
            connect_timeout: None,
            pending_first: None,
        }
    }

    /// Processes commands and client events until disconnected or every
    /// handle is dropped.
    pub async fn run(mut self) {
        debug!(account = %self.account.id(), "Session actor starting");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else {
                        self.release("session dropped").await;
                        break;
                    };
                    if !self.handle_command(cmd).await {
                        break;
                    }
                }
                event = next_event(&mut self.link) => {
                    self.handle_event(event).await;
                }
            }
        }

        debug!(account = %self.account.id(), "Session actor stopped");
    }

    /// Returns false when the actor should stop.
    async fn handle_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::Connect { respond_to } => self.handle_connect(respond_to).await,
            SessionCommand::Disconnect { respond_to } => {
                self.handle_disconnect().await;
                let _ = respond_to.send(Ok(()));
                return false;
            }
            SessionCommand::Chat { text, respond_to } => {
                let _ = respond_to.send(self.handle_chat(&text));
            }
            SessionCommand::Addon { op, respond_to } => {
                let result = self.handle_addon(op).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::Status { respond_to } => {
                let _ = respond_to.send(self.view());
            }
            SessionCommand::Opened { generation, result } => {
                self.handle_opened(generation, result).await;
            }
            SessionCommand::ConnectTimedOut { generation } => {
                if generation == self.generation && self.state == ConnectionState::Connecting {
                    let timeout = self.ctx.config.connect.timeout();
                    self.fail(ConnectError::ConnectTimeout(timeout)).await;
                }
            }
            SessionCommand::ReconnectDue { generation } => {
                if generation == self.generation && self.state == ConnectionState::Failed {
                    self.begin_connect().await;
                }
            }
            SessionCommand::SpawnSettled { generation } => {
                if generation == self.generation && self.state.is_connected() {
                    self.handle_spawn_settled().await;
                }
            }
            SessionCommand::KeepalivePulse {
                generation,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_pulse(generation));
            }
            SessionCommand::KeepaliveRelease { generation } => {
                if generation == self.generation {
                    if let Some(link) = &self.link {
                        if let Err(e) = link.handle.set_movement_flag(MovementFlag::Jump, false) {
                            debug!(account = %self.account.id(), error = %e, "Keepalive release failed");
                        }
                    }
                }
            }
        }
        true
    }

    // ========================================================================
    // Connect / Disconnect
    // ========================================================================

    async fn handle_connect(&mut self, respond_to: oneshot::Sender<Result<(), ConnectError>>) {
        match self.state {
            ConnectionState::Connected => {
                let _ = respond_to.send(Ok(()));
            }
            ConnectionState::Connecting | ConnectionState::Failed => {
                let _ = respond_to.send(Err(ConnectError::InProgress));
            }
            ConnectionState::Disconnected => {
                self.reconnect_attempts = 0;
                self.auto_reconnect = self.ctx.config.reconnect.enabled;
                self.pending_first = Some(respond_to);
                self.begin_connect().await;
            }
        }
    }

    async fn begin_connect(&mut self) {
        self.generation += 1;
        let generation = self.generation;

        self.set_state(ConnectionState::Connecting).await;
        info!(
            account = %self.account.id(),
            server = %self.server,
            attempt = self.reconnect_attempts,
            "Connecting"
        );
        self.journal
            .info(&format!("Attempting connection to {}", self.server))
            .await;

        let timeout = self.ctx.config.connect.timeout();
        let weak = self.weak.clone();
        let timer = self.ctx.scheduler.after(timeout, move || async move {
            notify(&weak, SessionCommand::ConnectTimedOut { generation }).await;
        });
        self.connect_timeout = Some(timer.clone());
        self.tasks.track(timer);

        let client = self.ctx.client.clone();
        let request = ConnectRequest {
            credentials: self.account.credentials.clone(),
            server: self.server.clone(),
            timeout,
        };
        let weak = self.weak.clone();
        let open = self.ctx.scheduler.spawn(async move {
            let result = client.open(request).await;
            deliver_opened(&weak, generation, result).await;
        });
        self.tasks.track(open);
    }

    async fn handle_opened(
        &mut self,
        generation: u64,
        result: Result<ClientConnection, ClientError>,
    ) {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            if let Ok(conn) = result {
                conn.handle.close("stale connection");
            }
            return;
        }

        match result {
            Ok(conn) => {
                debug!(account = %self.account.id(), "Transport open, waiting for spawn");
                self.link = Some(Link {
                    handle: conn.handle,
                    events: conn.events,
                });
            }
            Err(e) => self.fail(ConnectError::from(e)).await,
        }
    }

    async fn handle_disconnect(&mut self) {
        self.auto_reconnect = false;
        self.teardown_live("manual disconnect");

        if let Some(tx) = self.pending_first.take() {
            let _ = tx.send(Err(ConnectError::ManualDisconnect));
        }

        self.set_state(ConnectionState::Disconnected).await;
        info!(account = %self.account.id(), "Disconnected by operator");
        self.journal.info("Disconnected").await;
    }

    /// Quiet teardown when every handle is gone.
    async fn release(&mut self, reason: &str) {
        self.auto_reconnect = false;
        self.teardown_live(reason);
        if self.state != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected).await;
        }
    }

    /// Cancels every timer, destroys the addon, then releases the handle.
    fn teardown_live(&mut self, reason: &str) {
        self.generation += 1;
        let cancelled = self.tasks.cancel_all();
        self.connect_timeout = None;

        if let Some(addon) = self.addon.take() {
            addon.teardown();
        }
        if let Some(link) = self.link.take() {
            link.handle.close(reason);
        }
        debug!(account = %self.account.id(), cancelled, reason, "Session torn down");
    }

    // ========================================================================
    // Failure and Reconnect
    // ========================================================================

    async fn fail(&mut self, err: ConnectError) {
        let duplicate = matches!(&err, ConnectError::Kicked(reason) if is_duplicate_login(reason));

        self.teardown_live("connection failed");
        self.set_state(ConnectionState::Failed).await;

        warn!(account = %self.account.id(), error = %err, "Connection failed");
        self.journal.error(&failure_message(&err)).await;

        if let Some(tx) = self.pending_first.take() {
            let _ = tx.send(Err(err));
        }

        let policy = self.ctx.config.reconnect.clone();
        if self.auto_reconnect && policy.allows_retry(self.reconnect_attempts) {
            let delay = policy.delay_for(self.reconnect_attempts, duplicate);
            self.reconnect_attempts += 1;

            info!(
                account = %self.account.id(),
                attempt = self.reconnect_attempts,
                max = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                duplicate_login = duplicate,
                "Scheduling reconnect"
            );
            self.journal
                .warning(&format!(
                    "Reconnecting in {}s (attempt {}/{})",
                    delay.as_secs(),
                    self.reconnect_attempts,
                    policy.max_attempts
                ))
                .await;

            let generation = self.generation;
            let weak = self.weak.clone();
            let timer = self.ctx.scheduler.after(delay, move || async move {
                notify(&weak, SessionCommand::ReconnectDue { generation }).await;
            });
            self.tasks.track(timer);
            return;
        }

        let exhausted = self.auto_reconnect && policy.enabled;
        self.set_state(ConnectionState::Disconnected).await;

        if exhausted {
            let err = ConnectError::ReconnectExhausted {
                attempts: self.reconnect_attempts,
            };
            error!(account = %self.account.id(), error = %err, "Giving up");
            self.journal.error(&format!("Reconnect failed: {err}")).await;
        } else {
            self.journal.info("Auto-reconnect disabled, not retrying").await;
        }
    }

    // ========================================================================
    // Client Events
    // ========================================================================

    async fn handle_event(&mut self, event: Option<ClientEvent>) {
        let Some(event) = event else {
            self.fail(ConnectError::ClientError("connection ended".to_string()))
                .await;
            return;
        };

        match event {
            ClientEvent::Login => {
                debug!(account = %self.account.id(), "Logged in");
            }
            ClientEvent::Spawn => {
                if self.state == ConnectionState::Connecting {
                    self.on_spawn().await;
                } else {
                    debug!(account = %self.account.id(), "Respawned");
                }
            }
            ClientEvent::Kicked { reason } => {
                self.fail(ConnectError::Kicked(reason)).await;
            }
            ClientEvent::Error { message } => {
                self.fail(ConnectError::ClientError(message)).await;
            }
            ClientEvent::End { reason } => {
                let detail = match reason {
                    Some(reason) => format!("connection ended: {reason}"),
                    None => "connection ended".to_string(),
                };
                self.fail(ConnectError::ClientError(detail)).await;
            }
            ClientEvent::Chat { username, message } => {
                debug!(account = %self.account.id(), from = %username, message = %message, "Chat");
                self.bus.publish(&ChatLine { username, message });
            }
            ClientEvent::Health { health, food } => {
                debug!(account = %self.account.id(), health, food, "Health update");
            }
        }
    }

    async fn on_spawn(&mut self) {
        if let Some(timer) = self.connect_timeout.take() {
            timer.cancel();
        }

        self.reconnect_attempts = 0;
        self.last_connected_at = Some(Utc::now());
        self.set_state(ConnectionState::Connected).await;

        info!(account = %self.account.id(), server = %self.server, "Spawned");
        self.journal.success("Bot spawned in game").await;

        let self_name = self
            .link
            .as_ref()
            .and_then(|link| link.handle.username())
            .unwrap_or_else(|| self.account.id().local_part().to_string());

        self.addon = Some(AutomationAddon::new(AddonParts {
            account: self.account.id().clone(),
            self_name,
            config: self.ctx.config.addon.clone(),
            scheduler: self.ctx.scheduler.clone(),
            chat: Arc::new(Outbox {
                sender: self.weak.clone(),
            }),
            journal: self.journal.clone(),
            discovery: self.ctx.discovery.clone(),
            bus: self.bus.clone(),
        }));

        let (min, max) = self.ctx.config.connect.spawn_delay_range();
        let generation = self.generation;
        let weak = self.weak.clone();
        let timer = self.ctx.scheduler.after(jitter(min, max), move || async move {
            notify(&weak, SessionCommand::SpawnSettled { generation }).await;
        });
        self.tasks.track(timer);

        if let Some(tx) = self.pending_first.take() {
            let _ = tx.send(Ok(()));
        }
    }

    async fn handle_spawn_settled(&mut self) {
        if self.ctx.config.connect.mode == ConnectMode::Standard {
            let commands = self.ctx.config.connect.startup_commands.clone();
            for command in commands {
                match self.handle_chat(&command) {
                    Ok(()) => self.journal.info(&format!("Sent: {command}")).await,
                    Err(e) => {
                        self.journal
                            .warning(&format!("Startup command {command} failed: {e}"))
                            .await;
                    }
                }
            }
        }

        let task = keepalive::start(
            &self.ctx.scheduler,
            &self.ctx.config.keepalive,
            self.weak.clone(),
            self.generation,
        );
        self.tasks.track(task);
        debug!(account = %self.account.id(), "Keepalive started");
    }

    fn handle_pulse(&mut self, generation: u64) -> Tick {
        if generation != self.generation || !self.state.is_connected() {
            return Tick::Stop;
        }
        let Some(link) = &self.link else {
            return Tick::Stop;
        };

        if !link.handle.has_entity() {
            debug!(account = %self.account.id(), "No entity for keepalive, retrying soon");
            return Tick::RetryAfter(self.ctx.config.keepalive.retry());
        }

        if let Err(e) = link.handle.set_movement_flag(MovementFlag::Jump, true) {
            debug!(account = %self.account.id(), error = %e, "Keepalive pulse failed");
            return Tick::Continue;
        }

        let weak = self.weak.clone();
        let timer = self
            .ctx
            .scheduler
            .after(self.ctx.config.keepalive.pulse(), move || async move {
                notify(&weak, SessionCommand::KeepaliveRelease { generation }).await;
            });
        self.tasks.track(timer);
        Tick::Continue
    }

    // ========================================================================
    // Operator Actions
    // ========================================================================

    fn handle_chat(&self, text: &str) -> Result<(), SessionError> {
        match (&self.link, self.state) {
            (Some(link), ConnectionState::Connected) => Ok(link.handle.chat(text)?),
            _ => Err(SessionError::NotConnected),
        }
    }

    async fn handle_addon(&mut self, op: AddonOp) -> Result<AddonOutcome, SessionError> {
        let Some(addon) = &self.addon else {
            return Err(SessionError::NotConnected);
        };

        let outcome = match op {
            AddonOp::StartDiscovery => {
                addon.start_discovery().await?;
                AddonOutcome::Started
            }
            AddonOp::StopDiscovery => AddonOutcome::Stopped(addon.stop_discovery().await),
            AddonOp::StartMassMessage {
                template,
                messages,
                delay,
            } => AddonOutcome::Queued(addon.start_mass_message(&template, messages, delay).await?),
            AddonOp::StopMassMessage => AddonOutcome::Stopped(addon.stop_mass_message().await),
            AddonOp::EnableTeamJoin { messages } => {
                let count = messages.len();
                addon.enable_team_join(messages)?;
                self.journal
                    .info(&format!("Team join messaging enabled with {count} messages"))
                    .await;
                AddonOutcome::Started
            }
            AddonOp::DisableTeamJoin => {
                let stopped = addon.disable_team_join();
                if stopped {
                    self.journal.info("Team join messaging disabled").await;
                }
                AddonOutcome::Stopped(stopped)
            }
            AddonOp::StartCommandLoop {
                command,
                interval_secs,
            } => {
                addon.start_command_loop(&command, interval_secs).await?;
                AddonOutcome::Started
            }
            AddonOp::StopCommandLoop => AddonOutcome::Stopped(addon.stop_command_loop().await),
        };
        Ok(outcome)
    }

    fn view(&self) -> SessionView {
        SessionView {
            account_id: self.account.id().clone(),
            state: self.state,
            connected: self.state.is_connected(),
            reconnect_attempts: self.reconnect_attempts,
            max_reconnect_attempts: self.ctx.config.reconnect.max_attempts,
            auto_reconnect: self.auto_reconnect,
            last_connected_at: self.last_connected_at,
            addon: self.addon.as_ref().map(AutomationAddon::status),
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Records a transition and persists the status projection.
    async fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.state_tx.send_replace(state);

        let status = ConnectionStatus::new(state, self.last_connected_at);
        if let Err(e) = self
            .ctx
            .store
            .upsert_account_status(self.account.id(), status)
            .await
        {
            warn!(account = %self.account.id(), state = %state, error = %e, "Failed to persist status");
        }
    }
}

async fn next_event(link: &mut Option<Link>) -> Option<ClientEvent> {
    match link {
        Some(link) => link.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn notify(sender: &mpsc::WeakSender<SessionCommand>, cmd: SessionCommand) {
    if let Some(tx) = sender.upgrade() {
        let _ = tx.send(cmd).await;
    }
}

/// Hands an open result to the actor, closing the connection if nobody
/// is left to own it.
async fn deliver_opened(
    sender: &mpsc::WeakSender<SessionCommand>,
    generation: u64,
    result: Result<ClientConnection, ClientError>,
) {
    let Some(tx) = sender.upgrade() else {
        if let Ok(conn) = result {
            conn.handle.close("session closed");
        }
        return;
    };

    if let Err(mpsc::error::SendError(SessionCommand::Opened {
        result: Ok(conn), ..
    })) = tx.send(SessionCommand::Opened { generation, result }).await
    {
        conn.handle.close("session closed");
    }
}

fn failure_message(err: &ConnectError) -> String {
    match err {
        ConnectError::ConnectTimeout(d) => format!("Connection timeout after {}s", d.as_secs()),
        ConnectError::Kicked(reason) => format!("Kicked: {reason}"),
        ConnectError::ClientError(detail) => format!("Error: {detail}"),
        other => other.to_string(),
    }
}

// ============================================================================
// Addon Chat Route
// ============================================================================

/// Routes addon chat through the actor so only the actor touches the handle.
struct Outbox {
    sender: mpsc::WeakSender<SessionCommand>,
}

#[async_trait]
impl ChatSink for Outbox {
    async fn send(&self, text: &str) -> Result<(), AddonError> {
        let closed = || AddonError::ChatFailed("session closed".to_string());

        let tx = self.sender.upgrade().ok_or_else(closed)?;
        let (respond_to, rx) = oneshot::channel();
        tx.send(SessionCommand::Chat {
            text: text.to_string(),
            respond_to,
        })
        .await
        .map_err(|_| closed())?;
        drop(tx);

        rx.await
            .map_err(|_| closed())?
            .map_err(|e| AddonError::ChatFailed(e.to_string()))
    }
}
