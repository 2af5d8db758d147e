//! Read-only session snapshots for reporting consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, AddonStatus, ConnectionState};

/// Snapshot of one session, as returned by the registry.
///
/// Carries no reference to the live client handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub account_id: AccountId,
    pub state: ConnectionState,
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub auto_reconnect: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,

    /// Present only while connected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addon: Option<AddonStatus>,
}

impl SessionView {
    /// View of a session whose actor is gone.
    pub fn gone(account_id: AccountId) -> Self {
        Self {
            account_id,
            state: ConnectionState::Disconnected,
            connected: false,
            reconnect_attempts: 0,
            max_reconnect_attempts: 0,
            auto_reconnect: false,
            last_connected_at: None,
            addon: None,
        }
    }

    /// One-line summary for logs and the CLI.
    pub fn summary(&self) -> String {
        let mut line = format!("{} {}", self.account_id, self.state);
        if self.state.is_pending() && self.reconnect_attempts > 0 {
            line.push_str(&format!(
                " (retry {}/{})",
                self.reconnect_attempts, self.max_reconnect_attempts
            ));
        }
        if let Some(addon) = &self.addon {
            line.push_str(&format!(
                " addon={} players={}/{}",
                addon.mode, addon.processed, addon.discovered
            ));
            if let Some(lp) = &addon.command_loop {
                line.push_str(&format!(" loop=/{} every {}s", lp.command, lp.interval_secs));
            }
        }
        line
    }
}
