//! In-process store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use fleet_core::{
    Account, AccountId, ChatMessage, ChatMessageId, ChatMessageUpdate, ConnectionStatus,
    Credentials, LogEntry, LogLevel, ServerConfig,
};
use fleet_protocol::{LogQuery, Store, StoreError};
use tokio::sync::Mutex;

use super::select_logs;

#[derive(Default)]
struct Inner {
    accounts: BTreeMap<AccountId, Account>,
    logs: Vec<LogEntry>,
    server: Option<ServerConfig>,
    messages: BTreeMap<ChatMessageId, ChatMessage>,
    /// Ids are never reused, even after removal.
    last_message_id: Option<ChatMessageId>,
}

/// A [`Store`] kept entirely in memory. Accounts list in id order.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store preloaded with accounts.
    pub fn with_accounts<I: IntoIterator<Item = Credentials>>(accounts: I) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|c| (c.id.clone(), Account::new(c)))
            .collect();
        Self {
            inner: Mutex::new(Inner {
                accounts,
                ..Inner::default()
            }),
        }
    }

    /// Every log entry, oldest first.
    pub async fn logs(&self) -> Vec<LogEntry> {
        self.inner.lock().await.logs.clone()
    }

    /// Status last written for `id`.
    pub async fn status_of(&self, id: &AccountId) -> Option<ConnectionStatus> {
        self.inner.lock().await.accounts.get(id).map(|a| a.status)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.inner.lock().await.accounts.values().cloned().collect())
    }

    async fn get_account(&self, id: &AccountId) -> Result<Account, StoreError> {
        self.inner
            .lock()
            .await
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(id.clone()))
    }

    async fn add_account(&self, credentials: Credentials) -> Result<Account, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.accounts.contains_key(&credentials.id) {
            return Err(StoreError::AccountExists(credentials.id));
        }
        let account = Account::new(credentials);
        inner.accounts.insert(account.id().clone(), account.clone());
        Ok(account)
    }

    async fn remove_account(&self, id: &AccountId) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .accounts
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::AccountNotFound(id.clone()))
    }

    async fn upsert_account_status(
        &self,
        id: &AccountId,
        status: ConnectionStatus,
    ) -> Result<(), StoreError> {
        match self.inner.lock().await.accounts.get_mut(id) {
            Some(account) => {
                account.status = status;
                Ok(())
            }
            None => Err(StoreError::AccountNotFound(id.clone())),
        }
    }

    async fn append_log(
        &self,
        id: &AccountId,
        level: LogLevel,
        message: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .logs
            .push(LogEntry::new(id.clone(), level, message));
        Ok(())
    }

    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StoreError> {
        Ok(select_logs(self.inner.lock().await.logs.iter(), query))
    }

    async fn clear_logs(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().await;
        let count = inner.logs.len();
        inner.logs.clear();
        Ok(count)
    }

    async fn get_server_config(&self) -> Result<Option<ServerConfig>, StoreError> {
        Ok(self.inner.lock().await.server.clone())
    }

    async fn set_server_config(&self, config: ServerConfig) -> Result<(), StoreError> {
        self.inner.lock().await.server = Some(config);
        Ok(())
    }

    async fn list_chat_messages(&self) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self.inner.lock().await.messages.values().cloned().collect())
    }

    async fn add_chat_message(
        &self,
        text: &str,
        interval_secs: u64,
    ) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.lock().await;
        let id = inner
            .last_message_id
            .map_or(ChatMessageId::new(1), |id| id.next());
        let message = ChatMessage::new(id, text, interval_secs)?;
        inner.last_message_id = Some(id);
        inner.messages.insert(id, message.clone());
        Ok(message)
    }

    async fn update_chat_message(
        &self,
        id: ChatMessageId,
        update: ChatMessageUpdate,
    ) -> Result<ChatMessage, StoreError> {
        let mut inner = self.inner.lock().await;
        let current = inner
            .messages
            .get(&id)
            .ok_or(StoreError::MessageNotFound(id))?;
        let updated = current.updated(&update)?;
        inner.messages.insert(id, updated.clone());
        Ok(updated)
    }

    async fn remove_chat_message(&self, id: ChatMessageId) -> Result<(), StoreError> {
        self.inner
            .lock()
            .await
            .messages
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::MessageNotFound(id))
    }
}
