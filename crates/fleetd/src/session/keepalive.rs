//! Idle keepalive: a short jump at a jittered interval.
//!
//! The repeating task only asks the actor for a pulse; the actor owns the
//! client handle and decides whether the pulse happened, should be retried
//! soon (no entity yet) or the task should stop (stale generation).

use fleet_core::KeepaliveConfig;
use tokio::sync::{mpsc, oneshot};

use super::commands::SessionCommand;
use crate::scheduler::{jitter, ScheduledTask, Scheduler, Tick};

pub(crate) fn start(
    scheduler: &Scheduler,
    config: &KeepaliveConfig,
    sender: mpsc::WeakSender<SessionCommand>,
    generation: u64,
) -> ScheduledTask {
    let (min, max) = config.interval_range();

    scheduler.every(
        move || jitter(min, max),
        move || {
            let sender = sender.clone();
            async move {
                let Some(tx) = sender.upgrade() else {
                    return Tick::Stop;
                };
                let (respond_to, rx) = oneshot::channel();
                let sent = tx
                    .send(SessionCommand::KeepalivePulse {
                        generation,
                        respond_to,
                    })
                    .await;
                drop(tx);
                if sent.is_err() {
                    return Tick::Stop;
                }
                rx.await.unwrap_or(Tick::Stop)
            }
        },
    )
}
