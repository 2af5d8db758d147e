//! Scripted fakes for the game client, shared by the integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::{Credentials, FleetConfig, LogLevel, ServerConfig};
use fleet_protocol::{
    ClientConnection, ClientError, ClientEvent, ClientHandle, ConnectRequest, GameClient,
    MovementFlag, PlayerDiscovery,
};
use fleetd::store::MemoryStore;
use fleetd::EngineContext;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ============================================================================
// Scripts
// ============================================================================

/// What one `open` call does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Open succeeds and the player spawns immediately.
    Spawn,
    /// Open fails.
    Refuse(String),
    /// Open succeeds, then the server kicks.
    Kick(String),
    /// Open succeeds and nothing else ever happens.
    Hang,
}

// ============================================================================
// Fake Handle
// ============================================================================

pub struct FakeHandle {
    username: String,
    entity: AtomicBool,
    closed: AtomicBool,
    chats: Mutex<Vec<String>>,
    flags: Mutex<Vec<(MovementFlag, bool)>>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl FakeHandle {
    /// Pushes an event onto this connection's stream.
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub fn chats(&self) -> Vec<String> {
        self.chats.lock().unwrap().clone()
    }

    pub fn flags(&self) -> Vec<(MovementFlag, bool)> {
        self.flags.lock().unwrap().clone()
    }

    pub fn set_entity(&self, present: bool) {
        self.entity.store(present, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl ClientHandle for FakeHandle {
    fn username(&self) -> Option<String> {
        Some(self.username.clone())
    }

    fn has_entity(&self) -> bool {
        self.entity.load(Ordering::SeqCst)
    }

    fn chat(&self, text: &str) -> Result<(), ClientError> {
        if self.is_closed() {
            return Err(ClientError::NotConnected);
        }
        self.chats.lock().unwrap().push(text.to_string());
        Ok(())
    }

    fn set_movement_flag(&self, flag: MovementFlag, on: bool) -> Result<(), ClientError> {
        self.flags.lock().unwrap().push((flag, on));
        Ok(())
    }

    fn close(&self, _reason: &str) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Fake Client
// ============================================================================

/// Plays queued scripts in order, then `fallback` forever.
pub struct FakeClient {
    username: String,
    scripts: Mutex<VecDeque<Script>>,
    fallback: Script,
    opens: Mutex<Vec<Instant>>,
    servers: Mutex<Vec<ServerConfig>>,
    refused: Mutex<HashSet<String>>,
    handles: Mutex<Vec<(String, Arc<FakeHandle>)>>,
}

impl FakeClient {
    pub fn new(scripts: Vec<Script>, fallback: Script) -> Arc<Self> {
        Self::named("botty", scripts, fallback)
    }

    pub fn named(username: &str, scripts: Vec<Script>, fallback: Script) -> Arc<Self> {
        Arc::new(Self {
            username: username.to_string(),
            scripts: Mutex::new(scripts.into()),
            fallback,
            opens: Mutex::new(Vec::new()),
            servers: Mutex::new(Vec::new()),
            refused: Mutex::new(HashSet::new()),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Instants at which `open` was called.
    pub fn opens(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    /// Gaps between consecutive opens.
    pub fn open_gaps(&self) -> Vec<Duration> {
        self.opens()
            .windows(2)
            .map(|pair| pair[1].duration_since(pair[0]))
            .collect()
    }

    /// Servers requested, in open order.
    pub fn servers(&self) -> Vec<ServerConfig> {
        self.servers.lock().unwrap().clone()
    }

    /// Refuses every open for `account` until [`FakeClient::admit`].
    pub fn refuse(&self, account: &str) {
        self.refused.lock().unwrap().insert(account.to_string());
    }

    pub fn admit(&self, account: &str) {
        self.refused.lock().unwrap().remove(account);
    }

    /// Handle of the most recent successful open.
    pub fn last_handle(&self) -> Arc<FakeHandle> {
        self.handles
            .lock()
            .unwrap()
            .last()
            .map(|(_, handle)| handle.clone())
            .expect("no connection was opened")
    }

    /// Handle of the most recent successful open for `account`.
    pub fn handle_for(&self, account: &str) -> Arc<FakeHandle> {
        self.handles
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == account)
            .map(|(_, handle)| handle.clone())
            .expect("no connection was opened for account")
    }

    pub fn handle_count(&self) -> usize {
        self.handles.lock().unwrap().len()
    }
}

#[async_trait]
impl GameClient for FakeClient {
    async fn open(&self, request: ConnectRequest) -> Result<ClientConnection, ClientError> {
        self.opens.lock().unwrap().push(Instant::now());
        self.servers.lock().unwrap().push(request.server.clone());

        let account = request.credentials.id.as_str().to_string();
        if self.refused.lock().unwrap().contains(&account) {
            return Err(ClientError::Connect("refused".to_string()));
        }
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        if let Script::Refuse(reason) = &script {
            return Err(ClientError::Connect(reason.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Arc::new(FakeHandle {
            username: self.username.clone(),
            entity: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            chats: Mutex::new(Vec::new()),
            flags: Mutex::new(Vec::new()),
            events: tx,
        });

        match script {
            Script::Spawn => {
                handle.emit(ClientEvent::Login);
                handle.emit(ClientEvent::Spawn);
            }
            Script::Kick(reason) => handle.emit(ClientEvent::Kicked { reason }),
            Script::Hang | Script::Refuse(_) => {}
        }

        self.handles.lock().unwrap().push((account, handle.clone()));
        Ok(ClientConnection {
            handle,
            events: rx,
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub const ACCOUNT: &str = "bot@x.com";

/// Config with deterministic timers: spawn delay 10s, keepalive every 45s.
pub fn test_config() -> FleetConfig {
    let mut config = FleetConfig::default();
    config.connect.spawn_delay_min_secs = 10;
    config.connect.spawn_delay_max_secs = 10;
    config.keepalive.min_interval_secs = 45;
    config.keepalive.max_interval_secs = 45;
    config.addon.team_join_min_delay_ms = 1000;
    config.addon.team_join_max_delay_ms = 1000;
    config
}

pub fn store_with(ids: &[&str]) -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_accounts(
        ids.iter().map(|id| Credentials::new(*id, "secret")),
    ))
}

pub fn context(
    client: Arc<FakeClient>,
    store: Arc<MemoryStore>,
    config: FleetConfig,
) -> EngineContext {
    EngineContext::new(client, store, config).unwrap()
}

pub fn context_with_discovery(
    client: Arc<FakeClient>,
    store: Arc<MemoryStore>,
    config: FleetConfig,
    discovery: Arc<dyn PlayerDiscovery>,
) -> EngineContext {
    EngineContext::new(client, store, config)
        .unwrap()
        .with_discovery(discovery)
}

/// Log messages at `level`, oldest first.
pub async fn messages_at(store: &MemoryStore, level: LogLevel) -> Vec<String> {
    store
        .logs()
        .await
        .into_iter()
        .filter(|entry| entry.level == level)
        .map(|entry| entry.message)
        .collect()
}

/// Lets spawned tasks run without advancing the clock meaningfully.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
