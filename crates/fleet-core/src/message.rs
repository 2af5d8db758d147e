//! Stored chat messages used by registry message loops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Interval used when a message is added without one.
pub const DEFAULT_MESSAGE_INTERVAL_SECS: u64 = 60;

/// Identifier of a stored chat message, assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatMessageId(u64);

impl ChatMessageId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// The id following this one.
    #[must_use]
    pub fn next(&self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for ChatMessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat line operators keep in the store for looping broadcasts.
///
/// Only enabled messages are picked up when loops start from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: ChatMessageId,
    pub text: String,
    pub interval_secs: u64,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

fn enabled_default() -> bool {
    true
}

impl ChatMessage {
    /// A new enabled message. Fails on empty text or a zero interval.
    pub fn new(
        id: ChatMessageId,
        text: impl Into<String>,
        interval_secs: u64,
    ) -> DomainResult<Self> {
        let text = text.into();
        validate_text(&text)?;
        validate_interval(interval_secs)?;
        Ok(Self {
            id,
            text,
            interval_secs,
            enabled: true,
            created_at: Utc::now(),
        })
    }

    /// Applies `update` to a copy of this message, validating changed fields.
    pub fn updated(&self, update: &ChatMessageUpdate) -> DomainResult<Self> {
        let mut next = self.clone();
        if let Some(text) = &update.text {
            validate_text(text)?;
            next.text = text.clone();
        }
        if let Some(interval) = update.interval_secs {
            validate_interval(interval)?;
            next.interval_secs = interval;
        }
        if let Some(enabled) = update.enabled {
            next.enabled = enabled;
        }
        Ok(next)
    }
}

/// Partial edit of a stored message. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatMessageUpdate {
    pub text: Option<String>,
    pub interval_secs: Option<u64>,
    pub enabled: Option<bool>,
}

impl ChatMessageUpdate {
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.interval_secs.is_none() && self.enabled.is_none()
    }
}

fn validate_text(text: &str) -> DomainResult<()> {
    if text.trim().is_empty() {
        return Err(DomainError::InvalidFieldValue {
            field: "message".to_string(),
            value: text.to_string(),
            expected: "non-empty text".to_string(),
        });
    }
    Ok(())
}

fn validate_interval(interval_secs: u64) -> DomainResult<()> {
    if interval_secs == 0 {
        return Err(DomainError::InvalidFieldValue {
            field: "interval_secs".to_string(),
            value: "0".to_string(),
            expected: "> 0".to_string(),
        });
    }
    Ok(())
}
