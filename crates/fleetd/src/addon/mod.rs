//! Automation addon attached to a connected session.
//!
//! The addon owns four behaviors that share one player ledger:
//!
//! - discovery scan (`mode = scraping`), see [`discovery`]
//! - mass messaging (`mode = messaging`), see [`messaging`]
//! - team-join auto-reply (independent of mode), see [`team_join`]
//! - command loop (independent of mode), see [`command_loop`]
//!
//! Long-running passes run as scheduler tasks and check the mode between
//! steps, so changing the mode from outside stops them cooperatively.
//! Every task the addon starts is tracked in its [`TaskSet`] and cancelled
//! by [`AutomationAddon::teardown`].
//!
//! # Locking
//!
//! State lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. The addon lock may be taken before the chat bus lock, never
//! the other way round.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Poisoned locks are recovered with `into_inner`

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use fleet_core::{player_key, AccountId, AddonConfig, AddonMode, AddonStatus, CommandLoopStatus};
use fleet_protocol::PlayerDiscovery;
use thiserror::Error;
use tracing::debug;

use crate::events::{ChatBus, SubscriptionId};
use crate::journal::Journal;
use crate::scheduler::{ScheduledTask, Scheduler, TaskSet};

pub mod command_loop;
pub mod discovery;
pub mod messaging;
pub mod team_join;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddonError {
    /// Discovery and messaging are exclusive; one is already running.
    #[error("addon is busy ({0})")]
    Busy(AddonMode),

    #[error("no players discovered yet")]
    NoPlayersDiscovered,

    #[error("message list is empty")]
    NoMessages,

    #[error("command is empty")]
    EmptyCommand,

    #[error("loop interval {got}s is below the minimum of {min}s")]
    IntervalTooShort { min: u64, got: u64 },

    /// A chat send through the session failed.
    #[error("chat failed: {0}")]
    ChatFailed(String),
}

// ============================================================================
// Chat Output
// ============================================================================

/// Where the addon sends chat lines.
///
/// The session implements this by routing the text through its own actor,
/// so the addon never touches the client handle.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), AddonError>;
}

// ============================================================================
// State
// ============================================================================

pub(crate) struct TeamJoin {
    pub subscription: SubscriptionId,
    pub messages: Vec<String>,
}

pub(crate) struct CommandLoop {
    pub command: String,
    pub interval_secs: u64,
    pub task: ScheduledTask,
}

#[derive(Default)]
pub(crate) struct AddonState {
    pub mode: AddonMode,
    /// Bumped whenever a pass starts or is stopped; a pass only acts while
    /// the run id it started with is current.
    pub run_id: u64,
    pub discovered: BTreeSet<String>,
    /// Lowercased names.
    pub processed: HashSet<String>,
    pub team_join: Option<TeamJoin>,
    pub command_loop: Option<CommandLoop>,
    pub tasks: TaskSet,
}

impl AddonState {
    pub fn is_running(&self, mode: AddonMode, run: u64) -> bool {
        self.mode == mode && self.run_id == run
    }

    /// Enters `mode` for a new pass and returns its run id.
    pub fn begin(&mut self, mode: AddonMode) -> u64 {
        self.mode = mode;
        self.run_id += 1;
        self.run_id
    }

    /// Returns to idle if `run` is still the current pass.
    pub fn finish(&mut self, run: u64) -> bool {
        if self.run_id != run {
            return false;
        }
        self.mode = AddonMode::Idle;
        true
    }
}

pub(crate) struct Shared {
    pub account: AccountId,
    pub self_key: String,
    pub config: AddonConfig,
    pub scheduler: Scheduler,
    pub chat: Arc<dyn ChatSink>,
    pub journal: Journal,
    pub discovery: Arc<dyn PlayerDiscovery>,
    pub bus: ChatBus,
    state: Mutex<AddonState>,
}

impl Shared {
    pub fn lock(&self) -> MutexGuard<'_, AddonState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ============================================================================
// Addon
// ============================================================================

/// Everything an addon needs from its session.
pub struct AddonParts {
    pub account: AccountId,
    /// In-game name of the bot; never messaged by its own passes.
    pub self_name: String,
    pub config: AddonConfig,
    pub scheduler: Scheduler,
    pub chat: Arc<dyn ChatSink>,
    pub journal: Journal,
    pub discovery: Arc<dyn PlayerDiscovery>,
    pub bus: ChatBus,
}

/// The automation layer of one connected session.
///
/// Created on spawn, torn down (and dropped) when the session leaves
/// `Connected`.
pub struct AutomationAddon {
    shared: Arc<Shared>,
}

impl AutomationAddon {
    pub fn new(parts: AddonParts) -> Self {
        Self {
            shared: Arc::new(Shared {
                self_key: player_key(&parts.self_name),
                account: parts.account,
                config: parts.config,
                scheduler: parts.scheduler,
                chat: parts.chat,
                journal: parts.journal,
                discovery: parts.discovery,
                bus: parts.bus,
                state: Mutex::new(AddonState::default()),
            }),
        }
    }

    pub fn account(&self) -> &AccountId {
        &self.shared.account
    }

    pub fn mode(&self) -> AddonMode {
        self.shared.lock().mode
    }

    /// Snapshot for reporting.
    pub fn status(&self) -> AddonStatus {
        let state = self.shared.lock();
        AddonStatus {
            mode: state.mode,
            discovered: state.discovered.len(),
            processed: state.processed.len(),
            team_join_enabled: state.team_join.is_some(),
            team_join_messages: state.team_join.as_ref().map_or(0, |tj| tj.messages.len()),
            command_loop: state.command_loop.as_ref().map(|lp| CommandLoopStatus {
                command: lp.command.clone(),
                interval_secs: lp.interval_secs,
            }),
        }
    }

    /// Names found by the last discovery pass, sorted.
    pub fn discovered_players(&self) -> Vec<String> {
        self.shared.lock().discovered.iter().cloned().collect()
    }

    /// True if `name` (any case) has been messaged since the last discovery.
    pub fn is_processed(&self, name: &str) -> bool {
        self.shared.lock().processed.contains(&player_key(name))
    }

    /// Number of addon tasks still pending (passes, replies, the loop).
    pub fn active_tasks(&self) -> usize {
        let state = self.shared.lock();
        state.tasks.active() + usize::from(state.command_loop.is_some())
    }

    /// Stops every behavior and cancels every task. Idempotent.
    pub fn teardown(&self) {
        let mut state = self.shared.lock();

        if let Some(lp) = state.command_loop.take() {
            lp.task.cancel();
        }
        if let Some(tj) = state.team_join.take() {
            self.shared.bus.unsubscribe(tj.subscription);
        }
        let cancelled = state.tasks.cancel_all();

        state.discovered.clear();
        state.processed.clear();
        state.mode = AddonMode::Idle;
        state.run_id += 1;

        debug!(account = %self.shared.account, cancelled, "Addon torn down");
    }

    /// Gives tests direct access to the player ledger.
    #[cfg(test)]
    pub(crate) fn seed_discovered<I: IntoIterator<Item = String>>(&self, names: I) {
        self.shared.lock().discovered.extend(names);
    }
}

impl Drop for AutomationAddon {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for AutomationAddon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationAddon")
            .field("account", &self.shared.account)
            .field("status", &self.status())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::fixture;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_teardown_resets_everything() {
        let fx = fixture("Bot");
        fx.addon
            .seed_discovered(["alex1".to_string(), "steve2".to_string()]);
        fx.addon
            .enable_team_join(vec!["welcome".to_string()])
            .unwrap();
        fx.addon.start_command_loop("afk 33", 300).await.unwrap();
        assert_eq!(fx.bus.subscriber_count(), 1);

        fx.addon.teardown();

        let status = fx.addon.status();
        assert_eq!(status, AddonStatus::default());
        assert_eq!(fx.bus.subscriber_count(), 0);
        assert_eq!(fx.addon.active_tasks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_unsubscribes() {
        let fx = fixture("Bot");
        fx.addon.enable_team_join(vec!["hi".to_string()]).unwrap();
        let bus = fx.bus.clone();
        drop(fx);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
