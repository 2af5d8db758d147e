//! fleetd - session engine for supervised game-client bots
//!
//! This crate provides the runtime for the fleet supervisor:
//! - `session` - One actor per account: connect, spawn, keepalive, backoff
//! - `addon` - Per-session automation (discovery, mass messaging, team-join, command loop)
//! - `registry` - Account to session map, bulk operations, message loops
//! - `scheduler` - Cancellable one-shot and repeating timers
//! - `store` - File and in-memory implementations of the persistent store
//! - `checker` - Bulk credential validation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          fleetd                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ RegistryHandle  │────▶│     RegistryActor           │   │
//! │  │  (bulk ops)     │     │  (account → session map)    │   │
//! │  └────────┬────────┘     └─────────────────────────────┘   │
//! │           │                                                 │
//! │           │ per account                                     │
//! │           ▼                                                 │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  SessionActor   │────▶│     AutomationAddon         │   │
//! │  │ (state machine) │     │  (while connected)          │   │
//! │  └────────┬────────┘     └─────────────────────────────┘   │
//! │           │ timers                                          │
//! │           ▼                                                 │
//! │  ┌─────────────────┐                                        │
//! │  │    Scheduler    │                                        │
//! │  └─────────────────┘                                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod addon;
pub mod checker;
pub mod context;
pub mod events;
pub mod journal;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod store;

pub use addon::{AddonError, AutomationAddon};
pub use context::EngineContext;
pub use registry::{spawn_registry, RegistryError, RegistryHandle};
pub use session::{spawn_session, ConnectError, SessionError, SessionHandle};
