//! Error types for passcrypt core.

use thiserror::Error;

use crate::keyid::KeyId;

/// Core errors that can occur while handling keys and messages.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid key id: {0:?}")]
    InvalidKeyId(String),

    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("key {0} is locked")]
    KeyLocked(KeyId),

    #[error("key {0} has no secret material")]
    PublicKeyOnly(KeyId),

    #[error("invalid passphrase")]
    InvalidPassphrase,
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
