//! User sessions.
//!
//! A session is the user's identity plus the keys loaded for them. It is
//! created at login and torn down at logout; nothing about the current user
//! lives anywhere else.

use std::sync::Arc;

use tracing::{debug, info, warn};

use passcrypt_core::{KeyMaterial, KeyRing};
use passcrypt_store::{KeyRecord, KeyStore};

use crate::error::Result;

/// Who is logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user_id: String,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// A logged-in user and their keys.
#[derive(Debug)]
pub struct Session {
    identity: UserIdentity,
    keyring: Arc<KeyRing>,
}

impl Session {
    /// Load the user's keys from `key_store`.
    ///
    /// Keys that fail to parse, or that do not answer to the id they are
    /// stored under, are skipped with a warning.
    pub async fn establish<K>(identity: UserIdentity, key_store: &K) -> Result<Self>
    where
        K: KeyStore + ?Sized,
    {
        let keyring = Arc::new(KeyRing::new());
        let user = identity.user_id.as_str();

        // Public first, so a private copy of the same key replaces it.
        let public = key_store.list_public_keys(user).await?;
        let private = key_store.list_private_keys(user).await?;
        let mut loaded = 0usize;
        for record in public.iter().chain(&private) {
            if let Some(key) = load_key(record) {
                keyring.insert(key);
                loaded += 1;
            }
        }

        info!(user, keys = loaded, "session established");
        Ok(Self { identity, keyring })
    }

    /// An empty session, for callers that manage keys themselves.
    pub fn with_keyring(identity: UserIdentity, keyring: Arc<KeyRing>) -> Self {
        Self { identity, keyring }
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn keyring(&self) -> &Arc<KeyRing> {
        &self.keyring
    }

    /// Forget every key, including unlocked copies held by other handles to
    /// the keyring.
    pub fn close(self) {
        debug!(user = %self.identity.user_id, "closing session");
        self.keyring.clear();
    }
}

fn load_key(record: &KeyRecord) -> Option<KeyMaterial> {
    match KeyMaterial::parse(&record.armored) {
        Ok(key) if key.has_key_id(record.key_id) => Some(key),
        Ok(key) => {
            warn!(
                stored_as = %record.key_id,
                actual = %key.primary_key_id(),
                "skipping key stored under a foreign id"
            );
            None
        }
        Err(e) => {
            warn!(key = %record.key_id, error = %e, "skipping malformed key");
            None
        }
    }
}
