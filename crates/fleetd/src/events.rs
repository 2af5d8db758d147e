//! Chat event subscriptions.
//!
//! A session publishes every chat line it receives on its [`ChatBus`].
//! Listeners register with [`ChatBus::subscribe`] and keep the returned
//! [`SubscriptionId`]; revoking it with [`ChatBus::unsubscribe`] is the only
//! way a listener goes away.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::trace;

/// One chat line as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub username: String,
    pub message: String,
}

impl ChatLine {
    pub fn new(username: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            message: message.into(),
        }
    }
}

/// Revocation handle for one subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub type ChatHandler = Arc<dyn Fn(&ChatLine) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    handlers: HashMap<SubscriptionId, ChatHandler>,
}

/// Per-session fan-out of chat lines. Cheap to clone.
#[derive(Clone, Default)]
pub struct ChatBus {
    inner: Arc<Mutex<Subscribers>>,
}

impl fmt::Debug for ChatBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ChatBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ChatLine) + Send + Sync + 'static,
    {
        let mut subs = self.lock();
        subs.next_id += 1;
        let id = SubscriptionId(subs.next_id);
        subs.handlers.insert(id, Arc::new(handler));
        trace!(subscription = %id, "Chat subscription added");
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.lock().handlers.remove(&id).is_some();
        if removed {
            trace!(subscription = %id, "Chat subscription removed");
        }
        removed
    }

    /// Delivers `line` to every current subscriber.
    ///
    /// Handlers run outside the lock, so a handler may subscribe or
    /// unsubscribe without deadlocking.
    pub fn publish(&self, line: &ChatLine) {
        let handlers: Vec<ChatHandler> = self.lock().handlers.values().cloned().collect();
        for handler in handlers {
            handler(line);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().handlers.len()
    }

    /// Drops every subscription.
    pub fn clear(&self) {
        self.lock().handlers.clear();
    }
}
