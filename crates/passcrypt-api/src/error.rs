//! Error types for the REST layer.

use thiserror::Error;

use passcrypt_store::StoreError;

/// Errors that can occur at the REST boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Body did not parse as the expected JSON shape.
    #[error("invalid body: {0}")]
    Json(#[from] serde_json::Error),

    /// Response disagrees with itself (e.g. declared vs. header recipients).
    #[error("contract violation: {0}")]
    Contract(String),

    /// The server answered with a non-success status.
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    /// Request could not be delivered.
    #[error("transport error: {0}")]
    Transport(String),

    /// No route for this method and path.
    #[error("no route for {method} {path}")]
    NoRoute { method: String, path: String },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Ciphertext or key id failed to parse.
    #[error("core error: {0}")]
    Core(#[from] passcrypt_core::CoreError),
}

/// Result type for REST operations.
pub type Result<T> = std::result::Result<T, ApiError>;

impl From<ApiError> for StoreError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Store(inner) => inner,
            ApiError::Core(inner) => StoreError::Core(inner),
            ApiError::Status { status, body } => status_error(status, body),
            ApiError::Json(e) => StoreError::InvalidData(e.to_string()),
            ApiError::Contract(msg) => StoreError::InvalidData(msg),
            other => StoreError::Transport(other.to_string()),
        }
    }
}

/// Map a non-success status onto the store error taxonomy.
pub fn status_error(status: u16, body: String) -> StoreError {
    match status {
        404 => StoreError::NotFound(body),
        409 => StoreError::Conflict(body),
        403 => StoreError::Forbidden(body),
        _ => StoreError::Rejected(format!("{status}: {body}")),
    }
}

/// Status code a server answers with for a store error.
pub fn error_status(err: &StoreError) -> u16 {
    match err {
        StoreError::NotFound(_) => 404,
        StoreError::Conflict(_) => 409,
        StoreError::Forbidden(_) => 403,
        StoreError::Transport(_) => 502,
        _ => 400,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_round_trips_kind() {
        for err in [
            StoreError::NotFound("a".into()),
            StoreError::Conflict("b".into()),
            StoreError::Forbidden("c".into()),
        ] {
            let status = error_status(&err);
            let back = status_error(status, err.to_string());
            assert_eq!(std::mem::discriminant(&back), std::mem::discriminant(&err));
        }
        assert!(matches!(
            status_error(400, "bad".into()),
            StoreError::Rejected(msg) if msg.contains("bad")
        ));
        assert!(matches!(status_error(500, String::new()), StoreError::Rejected(_)));
    }
}
