//! The Vault: unified API for passcrypt.
//!
//! Brings a backend, a user session and the permission cascade together.
//! Every operation acts as the session's user.

use std::sync::Arc;

use tracing::{debug, info};
use zeroize::Zeroizing;

use passcrypt_core::{CryptoEngine, KeyId, KeyKind, KeyMaterial, KeyRing};
use passcrypt_perms::{Authorization, CascadeOutcome, PermissionCascade, RecipientResolver};
use passcrypt_store::path::ancestors_or_self;
use passcrypt_store::{
    normalize_path, Backend, DeleteOutcome, DirEntry, PassStoreExt, PermissionSet, StoreError,
    WriteMode,
};

use crate::config::VaultConfig;
use crate::error::{Result, VaultError};
use crate::session::{Session, UserIdentity};

/// A logged-in view of an encrypted store.
pub struct Vault<B: ?Sized> {
    backend: Arc<B>,
    session: Session,
    resolver: RecipientResolver,
    engine: CryptoEngine,
    config: VaultConfig,
}

impl<B> Vault<B>
where
    B: Backend + ?Sized + 'static,
{
    /// Log in: establish a session for `identity` against `backend`.
    pub async fn open(backend: Arc<B>, identity: UserIdentity, config: VaultConfig) -> Result<Self> {
        let session = Session::establish(identity, backend.as_ref()).await?;
        Ok(Self::with_session(backend, session, config))
    }

    /// Use an existing session.
    pub fn with_session(backend: Arc<B>, session: Session, config: VaultConfig) -> Self {
        let resolver = RecipientResolver::new(session.keyring().clone());
        Self {
            backend,
            session,
            resolver,
            engine: CryptoEngine::new(),
            config,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keyring(&self) -> &Arc<KeyRing> {
        self.session.keyring()
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Log out, forgetting every key.
    pub fn logout(self) {
        self.session.close();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Key Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Private keys loaded in this session.
    pub fn keys(&self) -> Vec<Arc<KeyMaterial>> {
        self.keyring().private_keys()
    }

    /// Generate a key for the session user, protect it and upload it.
    ///
    /// The returned key is unlocked and cached for the session.
    pub async fn generate_key(&self, passphrase: &str) -> Result<Arc<KeyMaterial>> {
        let user = self.session.user_id().to_string();
        let secret = Zeroizing::new(passphrase.to_string());
        let protected = blocking(move || {
            let fresh = KeyMaterial::generate(&user)?;
            Ok(fresh.protect(secret.as_bytes())?)
        })
        .await?;
        self.add_key(&protected).await?;
        self.unlock_in_keyring(Arc::new(protected), passphrase).await
    }

    /// Upload a private key and its public half.
    pub async fn add_key(&self, key: &KeyMaterial) -> Result<()> {
        if !key.is_private() {
            return Err(VaultError::InvalidOperation(
                "add_key needs a private key; use add_public_key".into(),
            ));
        }
        let id = key.primary_key_id();
        let user = self.session.user_id();
        self.backend
            .store_private_key(user, id, key.to_armored().as_bytes(), WriteMode::Create)
            .await?;
        self.backend
            .store_public_key(user, id, key.to_public().to_armored().as_bytes())
            .await?;
        self.keyring().insert(key.clone());
        info!(user, key = %id, "key added");
        Ok(())
    }

    /// Upload a public key under the session user.
    pub async fn add_public_key(&self, key: &KeyMaterial) -> Result<()> {
        let public = key.to_public();
        let id = public.primary_key_id();
        self.backend
            .store_public_key(self.session.user_id(), id, public.to_armored().as_bytes())
            .await?;
        self.keyring().insert(public);
        Ok(())
    }

    /// Overwrite a stored private key with new material for the same id.
    pub async fn replace_key(&self, key: &KeyMaterial) -> Result<()> {
        if !key.is_private() {
            return Err(VaultError::InvalidOperation(
                "replace_key needs a private key".into(),
            ));
        }
        let id = key.primary_key_id();
        let user = self.session.user_id();
        self.backend
            .store_private_key(user, id, key.to_armored().as_bytes(), WriteMode::Replace)
            .await?;

        // Subkeys may have changed, so the public half is re-published.
        let public = key.to_public();
        match self.backend.delete_key(user, KeyKind::Public, id).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.backend
            .store_public_key(user, id, public.to_armored().as_bytes())
            .await?;
        self.keyring().insert(key.clone());
        info!(user, key = %id, "key replaced");
        Ok(())
    }

    /// Delete a key from the backend and the session.
    pub async fn remove_key(&self, id: KeyId) -> Result<()> {
        let key = self
            .keyring()
            .find_by_key_id(id)
            .ok_or(VaultError::KeyNotFound(id))?;
        let primary = key.primary_key_id();
        let user = self.session.user_id();
        if key.is_private() {
            self.backend.delete_key(user, KeyKind::Private, primary).await?;
        }
        match self.backend.delete_key(user, KeyKind::Public, primary).await {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }
        self.keyring().remove(primary);
        info!(user, key = %primary, "key removed");
        Ok(())
    }

    /// Unlock a session key for the rest of the session.
    pub async fn unlock(&self, id: KeyId, passphrase: &str) -> Result<Arc<KeyMaterial>> {
        let key = self.private_key(id)?;
        self.unlock_in_keyring(key, passphrase).await
    }

    /// Re-protect a key under a new passphrase and store it.
    pub async fn change_passphrase(&self, id: KeyId, old: &str, new: &str) -> Result<()> {
        let key = self.private_key(id)?;
        let old = Zeroizing::new(old.to_string());
        let new = Zeroizing::new(new.to_string());
        let protected = blocking(move || {
            let unlocked = key.unlock(old.as_bytes())?;
            Ok(unlocked.protect(new.as_bytes())?)
        })
        .await?;
        self.replace_key(&protected).await?;
        debug!(key = %id, "passphrase changed");
        Ok(())
    }

    /// Add a fresh encryption subkey to a key and store the result.
    ///
    /// Returns the new subkey's id. Files encrypted afterwards for this key
    /// use the new subkey; existing files stay readable through the old one.
    pub async fn add_subkey(&self, id: KeyId, passphrase: &str) -> Result<KeyId> {
        let key = self.private_key(id)?;
        let secret = Zeroizing::new(passphrase.to_string());
        let extended = blocking(move || {
            let unlocked = key.unlock(secret.as_bytes())?;
            Ok(unlocked.add_encryption_subkey()?.protect(secret.as_bytes())?)
        })
        .await?;
        self.replace_key(&extended).await?;
        let subkey = extended.encryption_key_id();
        self.unlock_in_keyring(Arc::new(extended), passphrase).await?;
        Ok(subkey)
    }

    /// Unlock through the session keyring so the clear copy is cached.
    async fn unlock_in_keyring(&self, key: Arc<KeyMaterial>, passphrase: &str) -> Result<Arc<KeyMaterial>> {
        let keyring = Arc::clone(self.keyring());
        let secret = Zeroizing::new(passphrase.to_string());
        blocking(move || Ok(keyring.unlock(&key, secret.as_bytes())?)).await
    }

    fn private_key(&self, id: KeyId) -> Result<Arc<KeyMaterial>> {
        self.keyring()
            .find_by_key_id(id)
            .filter(|key| key.is_private())
            .ok_or(VaultError::KeyNotFound(id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // File Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Directory listing.
    pub async fn list(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = normalize_path(path);
        debug!(%path, "listing directory");
        Ok(self.backend.get(&path).await?.into_dir(&path)?)
    }

    /// Every file at or beneath `path`.
    pub async fn list_files(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.backend.list_files(path).await?)
    }

    /// Decrypt a file with the first session key among its recipients.
    ///
    /// That key must already be unlocked, see [`Vault::unlock`].
    pub async fn read_file(&self, path: &str) -> Result<Zeroizing<Vec<u8>>> {
        let record = self.backend.get_file(path).await?;
        let index = self.keyring().private_key_index();
        let key = self
            .resolver
            .resolve_decryption_key(&record.object, &index)
            .ok_or_else(|| {
                VaultError::NotAuthorized(format!("no session key can read {}", record.path))
            })?;
        let key = if key.is_unlocked() {
            key
        } else {
            self.keyring()
                .unlocked(key.primary_key_id())
                .ok_or(passcrypt_core::CoreError::KeyLocked(key.primary_key_id()))?
        };
        Ok(Zeroizing::new(self.engine.decrypt(&record.object, &key)?))
    }

    /// Encrypt `plaintext` for the access list `path` inherits and store it.
    pub async fn write_file(&self, path: &str, plaintext: &[u8], message: Option<&str>) -> Result<()> {
        let path = normalize_path(path);
        let access = self.inherited_access(&path).await?;
        if access.is_empty() {
            return Err(VaultError::InvalidOperation(format!(
                "no access list covers {path:?}"
            )));
        }
        let recipients = self
            .resolver
            .resolve_public_keys(&access, self.backend.as_ref())
            .await?;
        let object = self.engine.encrypt(plaintext, recipients.iter())?;
        let message = message.unwrap_or(self.config.default_message.as_str());
        self.backend.put(&path, &object, message).await?;
        debug!(%path, recipients = object.recipients().len(), "file written");
        Ok(())
    }

    /// Delete a file.
    pub async fn delete_file(&self, path: &str) -> Result<DeleteOutcome> {
        Ok(self.backend.delete(path).await?)
    }

    /// Access list and change list of a path.
    pub async fn permissions(&self, path: &str) -> Result<PermissionSet> {
        Ok(self.backend.get_permissions(path).await?)
    }

    /// Let `id` read everything under `path`.
    pub async fn grant(&self, path: &str, id: KeyId, auth: Authorization) -> Result<CascadeOutcome> {
        Ok(self.cascade().grant(path, id, auth).await?)
    }

    /// Stop `id` from reading anything under `path`.
    pub async fn revoke(&self, path: &str, id: KeyId, auth: Authorization) -> Result<CascadeOutcome> {
        Ok(self.cascade().revoke(path, id, auth).await?)
    }

    fn cascade(&self) -> PermissionCascade<B> {
        PermissionCascade::new(self.backend.clone(), self.keyring().clone())
            .with_config(self.config.cascade.clone())
    }

    /// Access list of the nearest existing ancestor-or-self.
    async fn inherited_access(&self, path: &str) -> Result<Vec<KeyId>> {
        for candidate in ancestors_or_self(path) {
            match self.backend.get_permissions(candidate).await {
                Ok(set) => return Ok(set.access),
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(Vec::new())
    }
}

/// Run passphrase work on the blocking pool; the S2K derivation is CPU-bound.
async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| VaultError::Task(format!("spawn_blocking failed: {}", e)))?
}
