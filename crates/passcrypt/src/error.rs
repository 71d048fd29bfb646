//! Error types for the vault.

use passcrypt_core::{CoreError, KeyId};
use passcrypt_perms::PermsError;
use passcrypt_store::StoreError;
use thiserror::Error;

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Permission error.
    #[error("permission error: {0}")]
    Permission(#[from] PermsError),

    /// Key or message error.
    #[error("crypto error: {0}")]
    Core(#[from] CoreError),

    /// Configuration did not parse.
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),

    /// No key in the session answers to this id.
    #[error("key not found: {0}")]
    KeyNotFound(KeyId),

    /// None of the session's keys can read this file.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A blocking key task did not complete.
    #[error("background task failed: {0}")]
    Task(String),
}

impl VaultError {
    /// Whether supplying a passphrase (again) could resolve this.
    pub fn needs_passphrase(&self) -> bool {
        match self {
            VaultError::Permission(err) => err.needs_passphrase(),
            VaultError::Core(CoreError::InvalidPassphrase | CoreError::KeyLocked(_)) => true,
            _ => false,
        }
    }
}

/// Result type for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;
