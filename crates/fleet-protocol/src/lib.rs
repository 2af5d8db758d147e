//! Capability contracts for fleet's external collaborators
//!
//! The engine is written against these traits only:
//! - [`GameClient`] / [`ClientHandle`] - the game-protocol client
//! - [`Store`] - accounts, server config, chat messages and the persistent log sink
//! - [`Authenticator`] - credential validation
//! - [`PlayerDiscovery`] - name completion for the discovery scan

pub mod auth;
pub mod client;
pub mod discovery;
pub mod store;

pub use auth::{AuthError, Authenticator};
pub use client::{
    ClientConnection, ClientError, ClientEvent, ClientHandle, ConnectRequest, GameClient,
    MovementFlag,
};
pub use discovery::{DiscoveryError, NoDiscovery, PlayerDiscovery, StaticRoster};
pub use store::{LogQuery, Store, StoreError};
