//! fleet core - shared types for supervising automated game-client sessions
//!
//! This crate provides the domain types shared between the engine
//! (`fleetd`), the capability contracts (`fleet-protocol`) and the CLI.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod account;
pub mod automation;
pub mod config;
pub mod error;
pub mod message;
pub mod status;
pub mod view;

// Re-exports for convenience
pub use account::{Account, AccountId, Credentials, ServerConfig, DEFAULT_SERVER_PORT};
pub use automation::{
    format_command, is_duplicate_login, parse_team_join, player_key, AddonMode, AddonStatus,
    CommandLoopStatus,
};
pub use config::{
    AddonConfig, ConnectConfig, ConnectMode, FleetConfig, KeepaliveConfig, ReconnectPolicy,
};
pub use error::{DomainError, DomainResult};
pub use message::{
    ChatMessage, ChatMessageId, ChatMessageUpdate, DEFAULT_MESSAGE_INTERVAL_SECS,
};
pub use status::{ConnectionState, ConnectionStatus, LogEntry, LogLevel};
pub use view::SessionView;
