//! Repeating command: one active loop per session.

use std::time::Duration;

use tracing::info;

use super::{AddonError, AutomationAddon, CommandLoop};
use crate::scheduler::Tick;

impl AutomationAddon {
    /// Sends `/command` every `interval_secs`, first after one interval.
    ///
    /// A running loop is cancelled before the new one is registered.
    pub async fn start_command_loop(
        &self,
        command: &str,
        interval_secs: u64,
    ) -> Result<(), AddonError> {
        let command = command.trim();
        let command = command.strip_prefix('/').unwrap_or(command).trim().to_string();
        if command.is_empty() {
            return Err(AddonError::EmptyCommand);
        }
        let min = self.shared.config.min_loop_interval_secs;
        if interval_secs < min {
            return Err(AddonError::IntervalTooShort {
                min,
                got: interval_secs,
            });
        }

        {
            let mut state = self.shared.lock();
            if let Some(previous) = state.command_loop.take() {
                previous.task.cancel();
            }

            let shared = self.shared.clone();
            let text = format!("/{command}");
            let interval = Duration::from_secs(interval_secs);
            let task = self.shared.scheduler.every(
                move || interval,
                move || {
                    let shared = shared.clone();
                    let text = text.clone();
                    async move {
                        match shared.chat.send(&text).await {
                            Ok(()) => {
                                shared
                                    .journal
                                    .info(&format!("Loop command executed: {text}"))
                                    .await;
                            }
                            Err(e) => {
                                shared
                                    .journal
                                    .error(&format!("Loop command failed: {e}"))
                                    .await;
                            }
                        }
                        Tick::Continue
                    }
                },
            );

            state.command_loop = Some(CommandLoop {
                command: command.clone(),
                interval_secs,
                task,
            });
        }

        info!(account = %self.shared.account, command = %command, interval_secs, "Command loop started");
        self.shared
            .journal
            .info(&format!("Command loop started: /{command} every {interval_secs}s"))
            .await;
        Ok(())
    }

    /// Stops the loop. No-op (returns false) when none is active.
    pub async fn stop_command_loop(&self) -> bool {
        let previous = self.shared.lock().command_loop.take();
        let Some(previous) = previous else {
            return false;
        };
        previous.task.cancel();

        self.shared
            .journal
            .info(&format!("Command loop stopped: /{}", previous.command))
            .await;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use crate::addon::testing::fixture;
    use crate::addon::AddonError;

    #[tokio::test(start_paused = true)]
    async fn test_loop_sends_at_interval() {
        let fx = fixture("Bot");
        fx.addon.start_command_loop("/afk 33", 300).await.unwrap();

        sleep(Duration::from_secs(299)).await;
        assert!(fx.sink.sent().is_empty());

        sleep(Duration::from_secs(302)).await;
        assert_eq!(fx.sink.sent(), vec!["/afk 33".to_string(), "/afk 33".to_string()]);

        let status = fx.addon.status();
        let lp = status.command_loop.unwrap();
        assert_eq!(lp.command, "afk 33");
        assert_eq!(lp.interval_secs, 300);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_loop() {
        let fx = fixture("Bot");
        fx.addon.start_command_loop("spawn", 10).await.unwrap();
        fx.addon.start_command_loop("home", 10).await.unwrap();
        assert_eq!(fx.addon.active_tasks(), 1);

        sleep(Duration::from_secs(25)).await;
        assert_eq!(fx.sink.sent(), vec!["/home".to_string(), "/home".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_noop_when_inactive() {
        let fx = fixture("Bot");
        assert!(!fx.addon.stop_command_loop().await);

        fx.addon.start_command_loop("afk", 5).await.unwrap();
        assert!(fx.addon.stop_command_loop().await);
        sleep(Duration::from_secs(30)).await;
        assert!(fx.sink.sent().is_empty());
        assert!(!fx.addon.status().command_loop_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation() {
        let fx = fixture("Bot");
        assert_eq!(
            fx.addon.start_command_loop(" / ", 60).await,
            Err(AddonError::EmptyCommand)
        );
        assert_eq!(
            fx.addon.start_command_loop("afk", 2).await,
            Err(AddonError::IntervalTooShort { min: 5, got: 2 })
        );
    }
}
