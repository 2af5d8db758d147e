//! Per-account writer for the persistent log sink.

use std::sync::Arc;

use fleet_core::{AccountId, LogLevel};
use fleet_protocol::Store;
use tracing::warn;

/// Writes log entries for one account.
///
/// Sink failures are traced and swallowed; logging never fails an operation.
#[derive(Clone)]
pub struct Journal {
    account: AccountId,
    store: Arc<dyn Store>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl Journal {
    pub fn new(account: AccountId, store: Arc<dyn Store>) -> Self {
        Self { account, store }
    }

    pub fn account(&self) -> &AccountId {
        &self.account
    }

    pub async fn record(&self, level: LogLevel, message: &str) {
        if let Err(e) = self.store.append_log(&self.account, level, message).await {
            warn!(
                account = %self.account,
                level = level.as_str(),
                error = %e,
                "Failed to write log entry"
            );
        }
    }

    pub async fn info(&self, message: &str) {
        self.record(LogLevel::Info, message).await;
    }

    pub async fn success(&self, message: &str) {
        self.record(LogLevel::Success, message).await;
    }

    pub async fn warning(&self, message: &str) {
        self.record(LogLevel::Warning, message).await;
    }

    pub async fn error(&self, message: &str) {
        self.record(LogLevel::Error, message).await;
    }
}
