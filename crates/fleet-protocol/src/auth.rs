//! Contract with the authentication service used to validate credentials.

use async_trait::async_trait;
use fleet_core::Credentials;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The service answered and rejected the credentials.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The service could not be reached or failed.
    #[error("authentication service failed: {0}")]
    Service(String),
}

/// Validates a credential pair by acquiring a token for it.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `Ok(())` when a token was obtained.
    async fn validate(&self, credentials: &Credentials) -> Result<(), AuthError>;
}
