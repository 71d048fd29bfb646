//! Error types for the permissions module.

use thiserror::Error;

use passcrypt_core::{CoreError, KeyId};
use passcrypt_store::StoreError;

/// A requested change the access list cannot take.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Revoking an id that is not in the access list.
    #[error("{0} is not in the access list")]
    NotAMember(KeyId),

    /// Revoking the only remaining recipient.
    #[error("{0} is the last recipient and cannot be revoked")]
    LastRecipient(KeyId),
}

/// Errors that can occur during permission operations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The passphrase did not unlock the key.
    #[error("invalid passphrase")]
    InvalidPassphrase,

    /// A private key is needed but still protected.
    #[error("key {0} is locked")]
    KeyLocked(KeyId),

    /// Decryption failed.
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Encryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// No private key from the current access list is available.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Public keys that could not be found locally or in the directory.
    #[error("missing public keys: {0:?}")]
    MissingKeys(Vec<KeyId>),

    /// The change violates the access list policy.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The backend refused or failed the final write.
    #[error("persist failed: {0}")]
    Persist(#[source] StoreError),

    /// The backend's change list does not match the target path.
    #[error("inconsistent change list: {0}")]
    InconsistentChangeList(String),

    /// The cascade already ran to completion.
    #[error("cascade already finished")]
    Finished,

    /// A fetch failed before anything was written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Core error.
    #[error("core error: {0}")]
    Core(CoreError),
}

impl PermsError {
    /// Whether asking the user for a (new) passphrase could resolve this.
    pub fn needs_passphrase(&self) -> bool {
        matches!(self, PermsError::InvalidPassphrase | PermsError::KeyLocked(_))
    }

    /// Whether the caller lacks the key needed to make the change.
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            PermsError::Authorization(_) | PermsError::InvalidPassphrase | PermsError::KeyLocked(_)
        )
    }
}

impl From<CoreError> for PermsError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidPassphrase => PermsError::InvalidPassphrase,
            CoreError::KeyLocked(id) => PermsError::KeyLocked(id),
            CoreError::Decryption(msg) => PermsError::Decryption(msg),
            CoreError::Encryption(msg) => PermsError::Encryption(msg),
            other => PermsError::Core(other),
        }
    }
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_into_taxonomy() {
        let id = KeyId::from_u64(7);
        assert!(matches!(
            PermsError::from(CoreError::InvalidPassphrase),
            PermsError::InvalidPassphrase
        ));
        assert!(matches!(
            PermsError::from(CoreError::KeyLocked(id)),
            PermsError::KeyLocked(k) if k == id
        ));
        assert!(matches!(
            PermsError::from(CoreError::Decryption("x".into())),
            PermsError::Decryption(_)
        ));
        assert!(matches!(
            PermsError::from(CoreError::MalformedKey("x".into())),
            PermsError::Core(_)
        ));
    }

    #[test]
    fn test_classification() {
        assert!(PermsError::InvalidPassphrase.needs_passphrase());
        assert!(PermsError::InvalidPassphrase.is_authorization());
        assert!(!PermsError::Authorization("none".into()).needs_passphrase());
        assert!(!PermsError::MissingKeys(vec![]).is_authorization());
        assert!(!PermsError::from(PolicyError::LastRecipient(KeyId::from_u64(1))).needs_passphrase());
    }
}
