//! Contract with the persistent store (accounts, server config, chat
//! messages, log sink).

use async_trait::async_trait;
use fleet_core::{
    Account, AccountId, ChatMessage, ChatMessageId, ChatMessageUpdate, ConnectionStatus,
    Credentials, DomainError, LogEntry, LogLevel, ServerConfig,
};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("account already exists: {0}")]
    AccountExists(AccountId),

    #[error("chat message not found: {0}")]
    MessageNotFound(ChatMessageId),

    /// A value was rejected before anything was written.
    #[error(transparent)]
    Invalid(#[from] DomainError),

    #[error("storage I/O failed: {0}")]
    Io(String),

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn io<E: std::fmt::Display>(err: E) -> Self {
        Self::Io(err.to_string())
    }
}

/// Filter for reading back the log sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    pub account: Option<AccountId>,
    pub min_level: Option<LogLevel>,
    /// Most recent N entries (after filtering); `None` returns all.
    pub limit: Option<usize>,
}

impl LogQuery {
    pub fn recent(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn for_account(mut self, account: AccountId) -> Self {
        self.account = Some(account);
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(account) = &self.account {
            if &entry.account != account {
                return false;
            }
        }
        if let Some(min) = self.min_level {
            if entry.level < min {
                return false;
            }
        }
        true
    }
}

/// The persistent store.
///
/// The engine only writes the status projection and log entries; account
/// management methods exist for administration tools.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    async fn get_account(&self, id: &AccountId) -> Result<Account, StoreError>;

    async fn add_account(&self, credentials: Credentials) -> Result<Account, StoreError>;

    async fn remove_account(&self, id: &AccountId) -> Result<(), StoreError>;

    async fn upsert_account_status(
        &self,
        id: &AccountId,
        status: ConnectionStatus,
    ) -> Result<(), StoreError>;

    async fn append_log(
        &self,
        id: &AccountId,
        level: LogLevel,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Entries oldest first.
    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StoreError>;

    async fn clear_logs(&self) -> Result<usize, StoreError>;

    /// `None` when no server has been configured yet.
    async fn get_server_config(&self) -> Result<Option<ServerConfig>, StoreError>;

    async fn set_server_config(&self, config: ServerConfig) -> Result<(), StoreError>;

    /// Every stored chat message, in id order.
    async fn list_chat_messages(&self) -> Result<Vec<ChatMessage>, StoreError>;

    /// Stores a new enabled message under a fresh id.
    async fn add_chat_message(
        &self,
        text: &str,
        interval_secs: u64,
    ) -> Result<ChatMessage, StoreError>;

    /// Returns the message as stored after the edit.
    async fn update_chat_message(
        &self,
        id: ChatMessageId,
        update: ChatMessageUpdate,
    ) -> Result<ChatMessage, StoreError>;

    async fn remove_chat_message(&self, id: ChatMessageId) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_query_matches() {
        let entry = LogEntry::new(AccountId::new("a@x.com"), LogLevel::Warning, "slow");

        assert!(LogQuery::default().matches(&entry));
        assert!(LogQuery::default()
            .for_account(AccountId::new("a@x.com"))
            .matches(&entry));
        assert!(!LogQuery::default()
            .for_account(AccountId::new("b@x.com"))
            .matches(&entry));

        let errors_only = LogQuery {
            min_level: Some(LogLevel::Error),
            ..LogQuery::default()
        };
        assert!(!errors_only.matches(&entry));
    }

    #[test]
    fn test_store_error_display() {
        assert_eq!(
            StoreError::AccountNotFound(AccountId::new("a@x.com")).to_string(),
            "account not found: a@x.com"
        );
        assert_eq!(StoreError::io("disk full").to_string(), "storage I/O failed: disk full");
        assert_eq!(
            StoreError::MessageNotFound(ChatMessageId::new(4)).to_string(),
            "chat message not found: 4"
        );
    }
}
