//! File-backed store under a data directory.
//!
//! ```text
//! <data_dir>/state.json   accounts (with status), server config, chat messages
//! <data_dir>/logs.jsonl   one LogEntry per line, append-only
//! ```
//!
//! The state document is cached in memory. A mutation edits a copy, writes
//! it (via a temp file and rename), and replaces the cache only once the
//! write succeeded. Unparseable log lines are skipped.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use fleet_core::{
    Account, AccountId, ChatMessage, ChatMessageId, ChatMessageUpdate, ConnectionStatus,
    Credentials, LogEntry, LogLevel, ServerConfig,
};
use fleet_protocol::{LogQuery, Store, StoreError};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::select_logs;

pub const STATE_FILE: &str = "state.json";
pub const LOG_FILE: &str = "logs.jsonl";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateDoc {
    #[serde(default)]
    accounts: Vec<Account>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server: Option<ServerConfig>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
    /// Highest id ever handed out; ids are not reused after removal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_message_id: Option<ChatMessageId>,
}

impl StateDoc {
    fn position(&self, id: &AccountId) -> Option<usize> {
        self.accounts.iter().position(|a| a.id() == id)
    }

    fn message_mut(&mut self, id: ChatMessageId) -> Result<&mut ChatMessage, StoreError> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StoreError::MessageNotFound(id))
    }
}

pub struct FileStore {
    dir: PathBuf,
    state: Mutex<StateDoc>,
    /// Serializes appends and rewrites of the log file.
    log_lock: Mutex<()>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("dir", &self.dir).finish()
    }
}

impl FileStore {
    /// Opens (creating if needed) the store in `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(StoreError::io)?;

        let state_path = dir.join(STATE_FILE);
        let state = match fs::read_to_string(&state_path).await {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| StoreError::Corrupt(format!("{}: {e}", state_path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateDoc::default(),
            Err(e) => return Err(StoreError::io(e)),
        };

        debug!(dir = %dir.display(), "File store opened");
        Ok(Self {
            dir,
            state: Mutex::new(state),
            log_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(LOG_FILE)
    }

    /// Runs `change` against a copy of the state and persists the copy.
    ///
    /// The cache keeps its previous contents when `change` or the write fails.
    async fn commit<T, F>(&self, change: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StateDoc) -> Result<T, StoreError>,
    {
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        let out = change(&mut next)?;
        self.persist(&next).await?;
        *state = next;
        Ok(out)
    }

    async fn persist(&self, doc: &StateDoc) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(doc)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let path = self.dir.join(STATE_FILE);
        let tmp = self.dir.join(format!("{STATE_FILE}.tmp"));

        fs::write(&tmp, content).await.map_err(StoreError::io)?;
        fs::rename(&tmp, &path).await.map_err(StoreError::io)
    }

    async fn read_logs(&self) -> Result<Vec<LogEntry>, StoreError> {
        let content = match fs::read_to_string(self.log_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(e)),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable log line");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.state.lock().await.accounts.clone())
    }

    async fn get_account(&self, id: &AccountId) -> Result<Account, StoreError> {
        let state = self.state.lock().await;
        state
            .position(id)
            .and_then(|i| state.accounts.get(i))
            .cloned()
            .ok_or_else(|| StoreError::AccountNotFound(id.clone()))
    }

    async fn add_account(&self, credentials: Credentials) -> Result<Account, StoreError> {
        self.commit(|state| {
            if state.position(&credentials.id).is_some() {
                return Err(StoreError::AccountExists(credentials.id));
            }
            let account = Account::new(credentials);
            state.accounts.push(account.clone());
            Ok(account)
        })
        .await
    }

    async fn remove_account(&self, id: &AccountId) -> Result<(), StoreError> {
        self.commit(|state| {
            let index = state
                .position(id)
                .ok_or_else(|| StoreError::AccountNotFound(id.clone()))?;
            state.accounts.remove(index);
            Ok(())
        })
        .await
    }

    async fn upsert_account_status(
        &self,
        id: &AccountId,
        status: ConnectionStatus,
    ) -> Result<(), StoreError> {
        self.commit(|state| {
            let account = state
                .accounts
                .iter_mut()
                .find(|a| a.id() == id)
                .ok_or_else(|| StoreError::AccountNotFound(id.clone()))?;
            account.status = status;
            Ok(())
        })
        .await
    }

    async fn append_log(
        &self,
        id: &AccountId,
        level: LogLevel,
        message: &str,
    ) -> Result<(), StoreError> {
        let entry = LogEntry::new(id.clone(), level, message);
        let mut line =
            serde_json::to_string(&entry).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        line.push('\n');

        let _guard = self.log_lock.lock().await;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .await
            .map_err(StoreError::io)?;
        file.write_all(line.as_bytes())
            .await
            .map_err(StoreError::io)?;
        file.flush().await.map_err(StoreError::io)
    }

    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, StoreError> {
        let _guard = self.log_lock.lock().await;
        let entries = self.read_logs().await?;
        Ok(select_logs(entries.iter(), query))
    }

    async fn clear_logs(&self) -> Result<usize, StoreError> {
        let _guard = self.log_lock.lock().await;
        let count = self.read_logs().await?.len();
        match fs::remove_file(self.log_path()).await {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(StoreError::io(e)),
        }
    }

    async fn get_server_config(&self) -> Result<Option<ServerConfig>, StoreError> {
        Ok(self.state.lock().await.server.clone())
    }

    async fn set_server_config(&self, config: ServerConfig) -> Result<(), StoreError> {
        self.commit(|state| {
            state.server = Some(config);
            Ok(())
        })
        .await
    }

    async fn list_chat_messages(&self) -> Result<Vec<ChatMessage>, StoreError> {
        let mut messages = self.state.lock().await.messages.clone();
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    async fn add_chat_message(
        &self,
        text: &str,
        interval_secs: u64,
    ) -> Result<ChatMessage, StoreError> {
        self.commit(|state| {
            // Documents written before ids were tracked only carry the messages
            let highest = state.messages.iter().map(|m| m.id).max();
            let id = state
                .last_message_id
                .max(highest)
                .map_or(ChatMessageId::new(1), |id| id.next());
            let message = ChatMessage::new(id, text, interval_secs)?;
            state.last_message_id = Some(id);
            state.messages.push(message.clone());
            Ok(message)
        })
        .await
    }

    async fn update_chat_message(
        &self,
        id: ChatMessageId,
        update: ChatMessageUpdate,
    ) -> Result<ChatMessage, StoreError> {
        self.commit(|state| {
            let message = state.message_mut(id)?;
            *message = message.updated(&update)?;
            Ok(message.clone())
        })
        .await
    }

    async fn remove_chat_message(&self, id: ChatMessageId) -> Result<(), StoreError> {
        self.commit(|state| {
            let before = state.messages.len();
            state.messages.retain(|m| m.id != id);
            if state.messages.len() == before {
                return Err(StoreError::MessageNotFound(id));
            }
            Ok(())
        })
        .await
    }
}
