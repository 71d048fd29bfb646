//! Error types for the store module.

use passcrypt_core::CoreError;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No file, directory or key at this location.
    #[error("not found: {0}")]
    NotFound(String),

    /// A file operation addressed a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// A directory operation addressed a file.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A permission change did not carry a file it affects.
    #[error("permission change is missing file {0}")]
    MissingFile(String),

    /// A permission change carried a file it does not affect.
    #[error("permission change carries unaffected file {0}")]
    UnexpectedFile(String),

    /// The backend refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// A key with this id already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller may not touch this resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Stored or received data is malformed.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The request never reached the backend or the reply was lost.
    #[error("transport error: {0}")]
    Transport(String),

    /// Key or message decoding failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
