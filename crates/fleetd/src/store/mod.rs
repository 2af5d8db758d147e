//! [`Store`](fleet_protocol::Store) implementations.
//!
//! - [`MemoryStore`] keeps everything in process
//! - [`FileStore`] keeps a JSON state document and a JSON-lines log file

mod file;
mod memory;

pub use file::{FileStore, LOG_FILE, STATE_FILE};
pub use memory::MemoryStore;

use fleet_core::LogEntry;
use fleet_protocol::LogQuery;

/// Applies `query` to entries given oldest first; keeps the newest `limit`.
pub(crate) fn select_logs<'a, I>(entries: I, query: &LogQuery) -> Vec<LogEntry>
where
    I: Iterator<Item = &'a LogEntry>,
{
    let mut selected: Vec<LogEntry> = entries.filter(|e| query.matches(e)).cloned().collect();
    if let Some(limit) = query.limit {
        let skip = selected.len().saturating_sub(limit);
        selected.drain(..skip);
    }
    selected
}
