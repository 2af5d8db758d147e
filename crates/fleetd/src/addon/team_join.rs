//! Team-join auto-reply.

use std::sync::{Arc, Weak};

use fleet_core::{parse_team_join, player_key};
use rand::seq::SliceRandom;
use tracing::debug;

use super::{AddonError, AutomationAddon, Shared, TeamJoin};
use crate::events::ChatLine;
use crate::scheduler::jitter;

impl AutomationAddon {
    /// Replies to `<name> joined the team` lines with a random message.
    ///
    /// Replaces any previous subscription.
    pub fn enable_team_join(&self, messages: Vec<String>) -> Result<(), AddonError> {
        let messages: Vec<String> = messages
            .into_iter()
            .filter(|m| !m.trim().is_empty())
            .collect();
        if messages.is_empty() {
            return Err(AddonError::NoMessages);
        }

        let mut state = self.shared.lock();
        if let Some(previous) = state.team_join.take() {
            self.shared.bus.unsubscribe(previous.subscription);
        }

        let weak = Arc::downgrade(&self.shared);
        let subscription = self
            .shared
            .bus
            .subscribe(move |line| on_chat(&weak, line));

        debug!(
            account = %self.shared.account,
            subscription = %subscription,
            messages = messages.len(),
            "Team-join replies enabled"
        );
        state.team_join = Some(TeamJoin {
            subscription,
            messages,
        });
        Ok(())
    }

    /// Removes the subscription. Returns false if replies were not enabled.
    pub fn disable_team_join(&self) -> bool {
        let mut state = self.shared.lock();
        match state.team_join.take() {
            Some(tj) => {
                self.shared.bus.unsubscribe(tj.subscription);
                debug!(account = %self.shared.account, "Team-join replies disabled");
                true
            }
            None => false,
        }
    }
}

fn on_chat(weak: &Weak<Shared>, line: &ChatLine) {
    let Some(shared) = weak.upgrade() else {
        return;
    };
    let Some(name) = parse_team_join(&line.message) else {
        return;
    };
    if player_key(name) == shared.self_key {
        return;
    }

    let reply = {
        let state = shared.lock();
        state
            .team_join
            .as_ref()
            .and_then(|tj| tj.messages.choose(&mut rand::thread_rng()).cloned())
    };
    let Some(reply) = reply else {
        return;
    };

    let (min, max) = shared.config.team_join_delay_range();
    let delay = jitter(min, max);
    let player = name.to_string();
    let sender = shared.clone();

    let task = shared.scheduler.after(delay, move || async move {
        match sender.chat.send(&reply).await {
            Ok(()) => {
                sender
                    .journal
                    .info(&format!("Team join reply sent to {player}: {reply}"))
                    .await;
            }
            Err(e) => {
                sender
                    .journal
                    .error(&format!("Team join reply to {player} failed: {e}"))
                    .await;
            }
        }
    });
    shared.lock().tasks.track(task);
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use crate::addon::testing::fixture;
    use crate::addon::AddonError;
    use crate::events::ChatLine;

    #[tokio::test(start_paused = true)]
    async fn test_reply_after_delay() {
        let fx = fixture("Bot");
        fx.addon
            .enable_team_join(vec!["welcome!".to_string(), "hey".to_string()])
            .unwrap();

        fx.bus.publish(&ChatLine::new("server", "alex1 joined the team"));

        sleep(Duration::from_millis(900)).await;
        assert!(fx.sink.sent().is_empty());

        sleep(Duration::from_millis(2200)).await;
        let sent = fx.sink.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0] == "welcome!" || sent[0] == "hey");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_other_lines_and_self() {
        let fx = fixture("Bot");
        fx.addon.enable_team_join(vec!["hi".to_string()]).unwrap();

        fx.bus.publish(&ChatLine::new("alex1", "hello everyone"));
        fx.bus.publish(&ChatLine::new("server", "bot joined the team"));
        sleep(Duration::from_secs(5)).await;

        assert!(fx.sink.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reenable_replaces_subscription() {
        let fx = fixture("Bot");
        fx.addon.enable_team_join(vec!["one".to_string()]).unwrap();
        fx.addon.enable_team_join(vec!["two".to_string()]).unwrap();
        assert_eq!(fx.bus.subscriber_count(), 1);

        fx.bus.publish(&ChatLine::new("server", "steve2 joined the team"));
        sleep(Duration::from_secs(4)).await;

        assert_eq!(fx.sink.sent(), vec!["two".to_string()]);
        assert_eq!(fx.addon.status().team_join_messages, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enable_then_disable_leaves_no_subscription() {
        let fx = fixture("Bot");
        fx.addon
            .enable_team_join(vec!["m1".to_string(), "m2".to_string()])
            .unwrap();
        assert!(fx.addon.disable_team_join());
        assert_eq!(fx.bus.subscriber_count(), 0);
        assert!(!fx.addon.status().team_join_enabled);
        assert!(!fx.addon.disable_team_join());
    }

    #[test]
    fn test_empty_messages_rejected() {
        let fx = fixture("Bot");
        assert_eq!(
            fx.addon.enable_team_join(vec![" ".to_string()]),
            Err(AddonError::NoMessages)
        );
    }
}
