//! Discovery scan: probe one prefix per alphabet character for player names.

use std::sync::Arc;

use fleet_core::AddonMode;
use fleet_protocol::DiscoveryError;
use tokio::time::sleep;
use tracing::{debug, info};

use super::{AddonError, AutomationAddon, Shared};

impl AutomationAddon {
    /// Starts a discovery pass, clearing both player sets first.
    pub async fn start_discovery(&self) -> Result<(), AddonError> {
        let run = {
            let mut state = self.shared.lock();
            if !state.mode.is_idle() {
                return Err(AddonError::Busy(state.mode));
            }
            state.discovered.clear();
            state.processed.clear();
            state.begin(AddonMode::Scraping)
        };

        info!(account = %self.shared.account, "Player discovery started");
        self.shared.journal.info("Player discovery started").await;

        let task = self
            .shared
            .scheduler
            .spawn(run_discovery(self.shared.clone(), run));
        self.shared.lock().tasks.track(task);
        Ok(())
    }

    /// Aborts a running discovery pass. Returns false if none was running.
    pub async fn stop_discovery(&self) -> bool {
        let found = {
            let mut state = self.shared.lock();
            if state.mode != AddonMode::Scraping {
                return false;
            }
            let run = state.run_id;
            state.finish(run);
            state.run_id += 1;
            state.discovered.len()
        };

        self.shared
            .journal
            .info(&format!("Player discovery stopped: {found} players found"))
            .await;
        true
    }
}

async fn run_discovery(shared: Arc<Shared>, run: u64) {
    let step = shared.config.discovery_step();
    let prefixes: Vec<String> = shared
        .config
        .discovery_alphabet
        .chars()
        .map(String::from)
        .collect();

    for prefix in prefixes {
        if !shared.lock().is_running(AddonMode::Scraping, run) {
            debug!(account = %shared.account, "Discovery pass aborted");
            return;
        }

        match shared.discovery.query_completions(&prefix).await {
            Ok(names) => {
                let mut state = shared.lock();
                if !state.is_running(AddonMode::Scraping, run) {
                    return;
                }
                state
                    .discovered
                    .extend(names.into_iter().filter(|n| !n.trim().is_empty()));
            }
            Err(DiscoveryError::Unsupported) => {
                let finished = shared.lock().finish(run);
                if finished {
                    shared
                        .journal
                        .warning("Player discovery unavailable: no completion source")
                        .await;
                }
                return;
            }
            Err(e) => {
                debug!(account = %shared.account, prefix = %prefix, error = %e, "Completion query failed");
                shared
                    .journal
                    .warning(&format!("Discovery query failed: {e}"))
                    .await;
            }
        }

        sleep(step).await;
    }

    let found = {
        let mut state = shared.lock();
        if !state.finish(run) {
            return;
        }
        state.discovered.len()
    };

    info!(account = %shared.account, found, "Player discovery completed");
    shared
        .journal
        .success(&format!("Player discovery completed: {found} players found"))
        .await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fleet_core::{AddonMode, LogLevel};
    use fleet_protocol::{LogQuery, Store, StaticRoster};
    use tokio::time::sleep;

    use crate::addon::testing::{fixture, fixture_with};
    use crate::addon::AddonError;

    #[tokio::test(start_paused = true)]
    async fn test_discovery_collects_matches_and_returns_to_idle() {
        let roster = Arc::new(StaticRoster::new(["alex1", "steve2", "Zed_9"]));
        let fx = fixture_with("Bot", roster);

        fx.addon.start_discovery().await.unwrap();
        assert_eq!(fx.addon.mode(), AddonMode::Scraping);

        // 37 prefixes at 200ms each
        sleep(Duration::from_secs(10)).await;

        assert_eq!(fx.addon.mode(), AddonMode::Idle);
        assert_eq!(
            fx.addon.discovered_players(),
            vec!["Zed_9".to_string(), "alex1".to_string(), "steve2".to_string()]
        );

        let logs = fx.store.query_logs(&LogQuery::default()).await.unwrap();
        let last = logs.last().unwrap();
        assert_eq!(last.level, LogLevel::Success);
        assert_eq!(last.message, "Player discovery completed: 3 players found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_discovery_clears_previous_ledger() {
        let fx = fixture_with("Bot", Arc::new(StaticRoster::new(["alex1"])));
        fx.addon.seed_discovered(["old".to_string()]);

        fx.addon.start_discovery().await.unwrap();
        sleep(Duration::from_secs(10)).await;

        assert_eq!(fx.addon.discovered_players(), vec!["alex1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_stop_aborts_pass() {
        let fx = fixture_with("Bot", Arc::new(StaticRoster::new(["alex1", "zed"])));

        fx.addon.start_discovery().await.unwrap();
        sleep(Duration::from_millis(500)).await;
        assert!(fx.addon.stop_discovery().await);
        assert_eq!(fx.addon.mode(), AddonMode::Idle);

        sleep(Duration::from_secs(10)).await;
        // "z" was never probed
        assert_eq!(fx.addon.discovered_players(), vec!["alex1".to_string()]);
        assert!(!fx.addon.stop_discovery().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_source_ends_pass() {
        let fx = fixture("Bot");
        fx.addon.start_discovery().await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(fx.addon.mode(), AddonMode::Idle);
        let logs = fx.store.query_logs(&LogQuery::default()).await.unwrap();
        assert!(logs
            .iter()
            .any(|e| e.level == LogLevel::Warning && e.message.contains("unavailable")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_discovery_is_busy() {
        let fx = fixture_with("Bot", Arc::new(StaticRoster::new(["alex1"])));
        fx.addon.start_discovery().await.unwrap();
        assert_eq!(
            fx.addon.start_discovery().await,
            Err(AddonError::Busy(AddonMode::Scraping))
        );
    }
}
