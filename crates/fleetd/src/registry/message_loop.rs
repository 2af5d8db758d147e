//! Registry-level message loops: a chat line re-sent to every connected
//! session at its own interval.

use std::time::Duration;

use fleet_core::{ChatMessage, LogLevel};
use tracing::debug;

use super::commands::RegistryError;
use super::handle::RegistryHandle;
use crate::scheduler::{ScheduledTask, Tick};

/// One looping broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopMessage {
    pub text: String,
    pub interval: Duration,
}

impl LoopMessage {
    pub fn new(text: impl Into<String>, interval: Duration) -> Self {
        Self {
            text: text.into(),
            interval,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), RegistryError> {
        if self.text.trim().is_empty() {
            return Err(RegistryError::InvalidMessageLoop(
                "message is empty".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(RegistryError::InvalidMessageLoop(format!(
                "interval for '{}' must be greater than 0",
                self.text
            )));
        }
        Ok(())
    }
}

impl From<&ChatMessage> for LoopMessage {
    fn from(message: &ChatMessage) -> Self {
        Self::new(message.text.clone(), Duration::from_secs(message.interval_secs))
    }
}

/// Starts the repeating task for one loop. First send after one interval.
pub(crate) fn start(registry: RegistryHandle, message: LoopMessage) -> ScheduledTask {
    let interval = message.interval;
    let text = message.text;
    let scheduler = registry.scheduler().clone();

    scheduler.every(
        move || interval,
        move || {
            let registry = registry.clone();
            let text = text.clone();
            async move {
                let sessions = match registry.sessions().await {
                    Ok(sessions) => sessions,
                    Err(_) => return Tick::Stop,
                };

                for session in sessions.into_iter().filter(|s| s.is_connected()) {
                    let (level, entry) = match session.send_chat(&text).await {
                        Ok(()) => (LogLevel::Info, format!("Loop message sent: {text}")),
                        Err(e) => (LogLevel::Error, format!("Loop message failed: {e}")),
                    };
                    registry.log(session.account(), level, &entry).await;
                }
                debug!(text = %text, "Message loop fired");
                Tick::Continue
            }
        },
    )
}
