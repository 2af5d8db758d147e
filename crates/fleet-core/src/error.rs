//! Domain-specific error types following panic-free policy.

use crate::AccountId;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Account not found in the store
    #[error("Account not found: {account_id}")]
    AccountNotFound { account_id: AccountId },

    /// Account already exists
    #[error("Account already exists: {account_id}")]
    AccountAlreadyExists { account_id: AccountId },

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },

    /// Malformed `email:password` line
    #[error("Invalid credential line '{line}': {reason}")]
    InvalidCredentialLine { line: String, reason: String },

    /// Parse error for incoming data
    #[error("Failed to parse {field}: {reason}")]
    ParseError { field: String, reason: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
