//! Mass messaging: one templated message per discovered player.

use std::sync::Arc;
use std::time::Duration;

use fleet_core::{format_command, player_key, AddonMode};
use rand::seq::SliceRandom;
use tokio::time::sleep;
use tracing::{debug, info};

use super::{AddonError, AutomationAddon, Shared};

impl AutomationAddon {
    /// Starts a messaging pass over the discovered players.
    ///
    /// `template` may contain `{player}` and `{message}`; messages are used
    /// round-robin in a shuffled order. Returns the number of players in the
    /// pass snapshot.
    pub async fn start_mass_message(
        &self,
        template: &str,
        messages: Vec<String>,
        delay: Duration,
    ) -> Result<usize, AddonError> {
        let mut messages: Vec<String> = messages
            .into_iter()
            .filter(|m| !m.trim().is_empty())
            .collect();
        if messages.is_empty() {
            return Err(AddonError::NoMessages);
        }
        messages.shuffle(&mut rand::thread_rng());

        let (run, players) = {
            let mut state = self.shared.lock();
            if !state.mode.is_idle() {
                return Err(AddonError::Busy(state.mode));
            }
            if state.discovered.is_empty() {
                return Err(AddonError::NoPlayersDiscovered);
            }
            let players: Vec<String> = state.discovered.iter().cloned().collect();
            (state.begin(AddonMode::Messaging), players)
        };

        let count = players.len();
        info!(account = %self.shared.account, players = count, "Mass messaging started");
        self.shared
            .journal
            .info(&format!("Mass messaging started: {count} players"))
            .await;

        let pass = Pass {
            template: template.to_string(),
            messages,
            players,
            delay,
        };
        let task = self
            .shared
            .scheduler
            .spawn(run_messaging(self.shared.clone(), run, pass));
        self.shared.lock().tasks.track(task);
        Ok(count)
    }

    /// Aborts a running messaging pass. Returns false if none was running.
    pub async fn stop_mass_message(&self) -> bool {
        let processed = {
            let mut state = self.shared.lock();
            if state.mode != AddonMode::Messaging {
                return false;
            }
            let run = state.run_id;
            state.finish(run);
            state.run_id += 1;
            state.processed.len()
        };

        self.shared
            .journal
            .info(&format!("Mass messaging stopped: {processed} players processed"))
            .await;
        true
    }
}

struct Pass {
    template: String,
    messages: Vec<String>,
    players: Vec<String>,
    delay: Duration,
}

async fn run_messaging(shared: Arc<Shared>, run: u64, pass: Pass) {
    let mut index = 0usize;
    let mut sent = 0usize;

    for player in &pass.players {
        let key = player_key(player);
        {
            let state = shared.lock();
            if !state.is_running(AddonMode::Messaging, run) {
                debug!(account = %shared.account, "Messaging pass aborted");
                return;
            }
            if key == shared.self_key || state.processed.contains(&key) {
                continue;
            }
        }

        let Some(message) = pass.messages.get(index % pass.messages.len()) else {
            break;
        };
        let text = format_command(&pass.template, player, message);

        match shared.chat.send(&text).await {
            Ok(()) => {
                shared.lock().processed.insert(key);
                index += 1;
                sent += 1;
                shared
                    .journal
                    .info(&format!("Mass message sent to {player}: {message}"))
                    .await;
            }
            Err(e) => {
                shared
                    .journal
                    .error(&format!("Failed to message {player}: {e}"))
                    .await;
            }
        }

        sleep(pass.delay).await;
    }

    if !shared.lock().finish(run) {
        return;
    }

    info!(account = %shared.account, sent, "Mass messaging completed");
    shared
        .journal
        .success(&format!("Mass messaging completed: {sent} messages sent"))
        .await;
}
