//! The permission cascade.
//!
//! One grant or revoke on a path re-encrypts every file the change affects
//! for the new access list and persists the list together with the new
//! ciphertexts in a single backend call. Nothing is written before that
//! call, so a failure at any earlier point leaves the store untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use passcrypt_core::{CryptoEngine, EncryptedObject, KeyId, KeyMaterial, KeyRing};
use passcrypt_store::path::is_within;
use passcrypt_store::{
    normalize_path, KeyDirectory, PassStore, PassStoreExt, PermissionChange, PermissionSet,
    PermissionStore, StoreError,
};

use crate::error::{PermsError, Result};
use crate::grant::PermissionChangeRequest;
use crate::resolver::RecipientResolver;
use crate::state::{CascadeState, StateLog};

/// What the cascade needs from a backend.
pub trait CascadeStore: PassStore + PermissionStore + KeyDirectory {}

impl<T: PassStore + PermissionStore + KeyDirectory + ?Sized> CascadeStore for T {}

/// How far to trust the backend's change list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeListCheck {
    /// Use it as given.
    Off,
    /// Every listed path must be the target or lie beneath it, once.
    #[default]
    Contained,
    /// As `Contained`, and every file under the target encrypted for the
    /// current access list must be listed.
    Complete,
}

/// Cascade tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Files re-encrypted at once.
    pub max_concurrency: usize,

    pub change_list_check: ChangeListCheck,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            change_list_check: ChangeListCheck::Contained,
        }
    }
}

impl CascadeConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_change_list_check(mut self, check: ChangeListCheck) -> Self {
        self.change_list_check = check;
        self
    }
}

/// Asks the user for a key's passphrase.
#[async_trait]
pub trait PassphrasePrompt: Send + Sync {
    /// `None` means the user cancelled.
    async fn passphrase(&self, key: &KeyMaterial) -> Option<Zeroizing<String>>;
}

/// How the cascade proves the caller may change a path.
#[derive(Clone)]
pub enum Authorization {
    /// Use a key the session already holds unlocked.
    Session,
    /// Use this unlocked private key.
    Key(Arc<KeyMaterial>),
    /// Unlock the session's key with this passphrase.
    Passphrase(Zeroizing<String>),
    /// Ask for the passphrase when it is needed.
    Prompt(Arc<dyn PassphrasePrompt>),
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Authorization::Session => f.write_str("Session"),
            Authorization::Key(key) => f.debug_tuple("Key").field(&key.primary_key_id()).finish(),
            Authorization::Passphrase(_) => f.write_str("Passphrase(..)"),
            Authorization::Prompt(_) => f.write_str("Prompt(..)"),
        }
    }
}

/// Result of a finished cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CascadeOutcome {
    pub path: String,
    /// Access list after the change.
    pub access: Vec<KeyId>,
    /// Files written with new ciphertexts.
    pub reencrypted: Vec<String>,
    /// False when the request needed no change.
    pub changed: bool,
}

/// Runs one permission change against a backend.
///
/// Single use: once it reaches `Done` or `Failed`, further runs return
/// [`PermsError::Finished`].
pub struct PermissionCascade<S: ?Sized> {
    store: Arc<S>,
    resolver: RecipientResolver,
    engine: CryptoEngine,
    config: CascadeConfig,
    log: StateLog,
}

impl<S> PermissionCascade<S>
where
    S: CascadeStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, keyring: Arc<KeyRing>) -> Self {
        Self {
            store,
            resolver: RecipientResolver::new(keyring),
            engine: CryptoEngine::new(),
            config: CascadeConfig::default(),
            log: StateLog::new(),
        }
    }

    pub fn with_config(mut self, config: CascadeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn state(&self) -> CascadeState {
        self.log.current()
    }

    /// Every state visited, starting with `Idle`.
    pub fn history(&self) -> &[CascadeState] {
        self.log.history()
    }

    /// Add `id` to the access list of `path`.
    pub async fn grant(&mut self, path: &str, id: KeyId, auth: Authorization) -> Result<CascadeOutcome> {
        self.run(path, PermissionChangeRequest::Grant(id), auth).await
    }

    /// Remove `id` from the access list of `path`.
    pub async fn revoke(&mut self, path: &str, id: KeyId, auth: Authorization) -> Result<CascadeOutcome> {
        self.run(path, PermissionChangeRequest::Revoke(id), auth).await
    }

    pub async fn run(
        &mut self,
        path: &str,
        request: PermissionChangeRequest,
        auth: Authorization,
    ) -> Result<CascadeOutcome> {
        if self.state() != CascadeState::Idle {
            return Err(PermsError::Finished);
        }
        let path = normalize_path(path);
        match self.execute(&path, request, auth).await {
            Ok(outcome) => {
                info!(
                    path = %outcome.path,
                    ?request,
                    changed = outcome.changed,
                    files = outcome.reencrypted.len(),
                    "permission change complete"
                );
                Ok(outcome)
            }
            Err(err) => {
                self.log.advance(CascadeState::Failed);
                info!(%path, ?request, error = %err, "permission change failed");
                Err(err)
            }
        }
    }

    async fn execute(
        &mut self,
        path: &str,
        request: PermissionChangeRequest,
        auth: Authorization,
    ) -> Result<CascadeOutcome> {
        self.log.advance(CascadeState::FetchingPermission);
        let set = self.store.get_permissions(path).await?;

        let Some(access) = request.apply(&set.access)? else {
            self.log.advance(CascadeState::Done);
            return Ok(CascadeOutcome {
                path: path.to_string(),
                access: set.access,
                reencrypted: Vec::new(),
                changed: false,
            });
        };
        let change = self.checked_change_list(path, &set)?;

        self.log.advance(CascadeState::AuthorizingKey);
        let key = self.authorize(&set.access, auth).await?;

        self.log.advance(CascadeState::Reencrypting);
        if self.config.change_list_check == ChangeListCheck::Complete {
            self.audit_change_list(path, &set, &change).await?;
        }
        let recipients = self
            .resolver
            .resolve_public_keys(&access, self.store.as_ref())
            .await?;
        let files = self.reencrypt(&change, &key, &recipients).await?;

        self.log.advance(CascadeState::Persisting);
        let reencrypted: Vec<String> = files.keys().cloned().collect();
        let change = PermissionChange {
            access: access.clone(),
            files,
        };
        self.persist(path, change).await?;

        self.log.advance(CascadeState::Done);
        Ok(CascadeOutcome {
            path: path.to_string(),
            access,
            reencrypted,
            changed: true,
        })
    }

    /// Normalized change list, checked per the configured mode.
    fn checked_change_list(&self, path: &str, set: &PermissionSet) -> Result<Vec<String>> {
        let change: Vec<String> = set.change.iter().map(|p| normalize_path(p)).collect();
        if self.config.change_list_check == ChangeListCheck::Off {
            return Ok(change);
        }

        let mut seen = BTreeSet::new();
        for file in &change {
            if !is_within(file, path) {
                warn!(%path, %file, "change list names a file outside the target");
                return Err(PermsError::InconsistentChangeList(format!(
                    "{file} is not under {path:?}"
                )));
            }
            if !seen.insert(file.as_str()) {
                warn!(%path, %file, "change list names a file twice");
                return Err(PermsError::InconsistentChangeList(format!(
                    "{file} listed twice"
                )));
            }
        }
        Ok(change)
    }

    /// Look for files the backend left out of the change list.
    async fn audit_change_list(&self, path: &str, set: &PermissionSet, change: &[String]) -> Result<()> {
        let current = self
            .resolver
            .resolve_public_keys(&set.access, self.store.as_ref())
            .await?;
        let expected = encryption_ids(&current);
        let listed: BTreeSet<&str> = change.iter().map(String::as_str).collect();

        for file in self.store.list_files(path).await? {
            if listed.contains(file.as_str()) {
                continue;
            }
            let record = self.store.get_file(&file).await?;
            if record.object.recipients() == expected.as_slice() {
                warn!(%path, %file, "change list omits a file encrypted for the current access list");
                return Err(PermsError::InconsistentChangeList(format!(
                    "{file} is encrypted for the access list of {path:?} but not listed"
                )));
            }
        }
        Ok(())
    }

    /// An unlocked private key from the current access list.
    async fn authorize(&self, access: &[KeyId], auth: Authorization) -> Result<Arc<KeyMaterial>> {
        let keyring = self.resolver.keyring();
        match auth {
            Authorization::Key(key) => {
                if !key.is_private() {
                    return Err(PermsError::Authorization(
                        "a public key cannot authorize a change".into(),
                    ));
                }
                if !access.iter().any(|id| key.has_key_id(*id)) {
                    return Err(PermsError::Authorization(format!(
                        "key {} is not in the access list",
                        key.primary_key_id()
                    )));
                }
                if !key.is_unlocked() {
                    return Err(PermsError::KeyLocked(key.primary_key_id()));
                }
                keyring.remember_unlocked(key.clone());
                Ok(key)
            }
            Authorization::Session => {
                if let Some(key) = access.iter().find_map(|id| keyring.unlocked(*id)) {
                    return Ok(key);
                }
                let candidate = self.candidate(access)?;
                if candidate.is_unlocked() {
                    keyring.remember_unlocked(candidate.clone());
                    return Ok(candidate);
                }
                Err(PermsError::KeyLocked(candidate.primary_key_id()))
            }
            Authorization::Passphrase(passphrase) => {
                if let Some(key) = access.iter().find_map(|id| keyring.unlocked(*id)) {
                    return Ok(key);
                }
                let candidate = self.candidate(access)?;
                unlock_blocking(keyring, candidate, passphrase).await
            }
            Authorization::Prompt(prompt) => {
                if let Some(key) = access.iter().find_map(|id| keyring.unlocked(*id)) {
                    return Ok(key);
                }
                let candidate = self.candidate(access)?;
                if candidate.is_unlocked() {
                    keyring.remember_unlocked(candidate.clone());
                    return Ok(candidate);
                }
                debug!(key = %candidate.primary_key_id(), "prompting for passphrase");
                let passphrase = prompt.passphrase(&candidate).await.ok_or_else(|| {
                    PermsError::Authorization("passphrase prompt cancelled".into())
                })?;
                unlock_blocking(keyring, candidate, passphrase).await
            }
        }
    }

    /// First private key in access-list order.
    fn candidate(&self, access: &[KeyId]) -> Result<Arc<KeyMaterial>> {
        let index = self.resolver.keyring().private_key_index();
        access
            .iter()
            .find_map(|id| index.get(id))
            .cloned()
            .ok_or_else(|| {
                PermsError::Authorization("no private key for the current access list".into())
            })
    }

    async fn reencrypt(
        &self,
        change: &[String],
        key: &Arc<KeyMaterial>,
        recipients: &[KeyMaterial],
    ) -> Result<BTreeMap<String, EncryptedObject>> {
        let expected = encryption_ids(recipients);
        let mut files = BTreeMap::new();

        // Bounded fan-out: one chunk of files in flight at a time.
        for chunk in change.chunks(self.config.max_concurrency.max(1)) {
            let futures: Vec<_> = chunk
                .iter()
                .map(|file| self.reencrypt_file(file, key, recipients, &expected))
                .collect();
            for result in join_all(futures).await {
                let (file, object) = result?;
                files.insert(file, object);
            }
        }
        Ok(files)
    }

    async fn reencrypt_file(
        &self,
        file: &str,
        key: &KeyMaterial,
        recipients: &[KeyMaterial],
        expected: &[KeyId],
    ) -> Result<(String, EncryptedObject)> {
        let record = self.store.get_file(file).await?;
        let plaintext = Zeroizing::new(self.engine.decrypt(&record.object, key)?);
        let object = self.engine.encrypt(&plaintext, recipients.iter())?;
        if object.recipients() != expected {
            return Err(PermsError::Encryption(format!(
                "{file}: header lists {:?}, expected {:?}",
                object.recipients(),
                expected
            )));
        }
        debug!(%file, "re-encrypted");
        Ok((file.to_string(), object))
    }

    /// The one write. Runs detached so dropping the caller cannot cut it
    /// short.
    async fn persist(&self, path: &str, change: PermissionChange) -> Result<()> {
        let store = Arc::clone(&self.store);
        let target = path.to_string();
        let handle = tokio::spawn(async move { store.apply_permissions(&target, &change).await });
        match handle.await {
            Ok(result) => result.map_err(PermsError::Persist),
            Err(e) => Err(PermsError::Persist(StoreError::Transport(e.to_string()))),
        }
    }
}

/// Unlock on the blocking pool; the S2K derivation is CPU-bound.
async fn unlock_blocking(
    keyring: &Arc<KeyRing>,
    candidate: Arc<KeyMaterial>,
    passphrase: Zeroizing<String>,
) -> Result<Arc<KeyMaterial>> {
    let keyring = Arc::clone(keyring);
    tokio::task::spawn_blocking(move || keyring.unlock(&candidate, passphrase.as_bytes()))
        .await
        .map_err(|e| PermsError::Authorization(format!("unlock task failed: {e}")))?
        .map_err(PermsError::from)
}

/// Encryption subkey ids in recipient order, as `encrypt` writes them.
fn encryption_ids(keys: &[KeyMaterial]) -> Vec<KeyId> {
    let mut seen = BTreeSet::new();
    keys.iter()
        .map(KeyMaterial::encryption_key_id)
        .filter(|id| seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use passcrypt_core::CoreError;
    use passcrypt_store::{
        DeleteOutcome, KeyRecord, KeyStore, MemoryBackend, Operation, PassEntry,
    };
    use CascadeState::*;

    const SECRET: &[u8] = b"correct horse battery staple";

    fn key(seed: u8) -> KeyMaterial {
        KeyMaterial::from_seed(&format!("user{seed}"), &[seed; 32], 1_700_000_000).unwrap()
    }

    struct World {
        backend: Arc<MemoryBackend>,
        a: KeyMaterial,
        b: KeyMaterial,
        c: KeyMaterial,
    }

    impl World {
        /// `docs` readable by `access`, with two files and a shadowed subdirectory.
        async fn new(access: &[u8]) -> Self {
            let backend = Arc::new(MemoryBackend::new());
            let (a, b, c) = (key(1), key(2), key(3));
            for k in [&a, &b, &c] {
                backend
                    .store_public_key(
                        k.user_id(),
                        k.primary_key_id(),
                        k.to_public().to_armored().as_bytes(),
                    )
                    .await
                    .unwrap();
            }
            let world = Self { backend, a, b, c };
            let readers: Vec<&KeyMaterial> = access.iter().map(|s| world.key(*s)).collect();
            world
                .backend
                .set_access("docs", readers.iter().map(|k| k.primary_key_id()).collect());
            for file in ["docs/report.gpg", "docs/team/plan.gpg"] {
                world.write(file, &readers).await;
            }
            world
                .backend
                .set_access("docs/private", vec![world.c.primary_key_id()]);
            world.write("docs/private/salary.gpg", &[&world.c]).await;
            world
        }

        fn key(&self, seed: u8) -> &KeyMaterial {
            match seed {
                1 => &self.a,
                2 => &self.b,
                _ => &self.c,
            }
        }

        async fn write(&self, path: &str, readers: &[&KeyMaterial]) {
            let publics: Vec<KeyMaterial> = readers.iter().map(|k| k.to_public()).collect();
            let obj = CryptoEngine::new().encrypt(SECRET, publics.iter()).unwrap();
            self.backend.put(path, &obj, "seed").await.unwrap();
        }

        fn cascade(&self, keys: impl IntoIterator<Item = KeyMaterial>) -> PermissionCascade<MemoryBackend> {
            PermissionCascade::new(self.backend.clone(), Arc::new(KeyRing::with_keys(keys)))
        }

        async fn read_as(&self, path: &str, key: &KeyMaterial) -> std::result::Result<Vec<u8>, CoreError> {
            let record = self.backend.get_file(path).await.unwrap();
            CryptoEngine::new().decrypt(&record.object, key)
        }
    }

    #[tokio::test]
    async fn test_grant_reencrypts_for_new_access() {
        let w = World::new(&[1]).await;
        let mut cascade = w.cascade([w.a.clone()]);
        let outcome = cascade
            .grant("/docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.access, vec![w.a.primary_key_id(), w.b.primary_key_id()]);
        assert_eq!(
            outcome.reencrypted,
            vec!["docs/report.gpg".to_string(), "docs/team/plan.gpg".to_string()]
        );
        assert_eq!(
            cascade.history(),
            &[Idle, FetchingPermission, AuthorizingKey, Reencrypting, Persisting, Done]
        );
        assert_eq!(w.backend.public_key_requests(), 1);

        for file in ["docs/report.gpg", "docs/team/plan.gpg"] {
            assert_eq!(w.read_as(file, &w.a).await.unwrap(), SECRET);
            assert_eq!(w.read_as(file, &w.b).await.unwrap(), SECRET);
            assert!(matches!(w.read_as(file, &w.c).await, Err(CoreError::Decryption(_))));
        }
        let header = w.backend.get_file("docs/report.gpg").await.unwrap();
        assert_eq!(
            header.object.recipients(),
            &[w.a.encryption_key_id(), w.b.encryption_key_id()]
        );
    }

    #[tokio::test]
    async fn test_revoke_removes_reader() {
        let w = World::new(&[1, 2]).await;
        let mut cascade = w.cascade([w.a.clone()]);
        let outcome = cascade
            .revoke("docs", w.a.primary_key_id(), Authorization::Session)
            .await
            .unwrap();

        assert_eq!(outcome.access, vec![w.b.primary_key_id()]);
        assert!(matches!(
            w.read_as("docs/report.gpg", &w.a).await,
            Err(CoreError::Decryption(_))
        ));
        assert_eq!(w.read_as("docs/report.gpg", &w.b).await.unwrap(), SECRET);
    }

    #[tokio::test]
    async fn test_shadowed_directory_untouched() {
        let w = World::new(&[1]).await;
        let before = w.backend.snapshot();
        w.cascade([w.a.clone()])
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap();
        let after = w.backend.snapshot();
        assert_eq!(
            before.files["docs/private/salary.gpg"],
            after.files["docs/private/salary.gpg"]
        );
        assert_ne!(before.files["docs/report.gpg"], after.files["docs/report.gpg"]);
        assert_eq!(after.access["docs/private"], vec![w.c.primary_key_id()]);
    }

    #[tokio::test]
    async fn test_revoke_last_recipient_changes_nothing() {
        let w = World::new(&[1]).await;
        let before = w.backend.snapshot();
        let mut cascade = w.cascade([w.a.clone()]);
        let err = cascade
            .revoke("docs", w.a.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();

        assert!(matches!(err, PermsError::Policy(PolicyError::LastRecipient(_))));
        assert_eq!(cascade.history(), &[Idle, FetchingPermission, Failed]);
        assert_eq!(w.backend.snapshot(), before);
    }

    #[tokio::test]
    async fn test_revoke_non_member() {
        let w = World::new(&[1]).await;
        let err = w
            .cascade([w.a.clone()])
            .revoke("docs", w.c.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::Policy(PolicyError::NotAMember(_))));
    }

    #[tokio::test]
    async fn test_grant_existing_is_noop() {
        let w = World::new(&[1, 2]).await;
        let commits = w.backend.commits().len();
        let mut cascade = w.cascade(Vec::new());
        let outcome = cascade
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap();

        assert!(!outcome.changed);
        assert!(outcome.reencrypted.is_empty());
        assert_eq!(cascade.history(), &[Idle, FetchingPermission, Done]);
        assert_eq!(w.backend.commits().len(), commits);
    }

    #[tokio::test]
    async fn test_persist_failure_changes_nothing() {
        let w = World::new(&[1]).await;
        let before = w.backend.snapshot();
        w.backend.fail_next(Operation::ApplyPermissions);

        let mut cascade = w.cascade([w.a.clone()]);
        let err = cascade
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();

        assert!(matches!(err, PermsError::Persist(_)));
        assert_eq!(cascade.history().last(), Some(&Failed));
        assert!(cascade.history().contains(&Persisting));
        assert_eq!(w.backend.snapshot(), before);
    }

    #[tokio::test]
    async fn test_unreadable_file_aborts_before_writes() {
        let w = World::new(&[1]).await;
        // Inherits the docs list but was written for C alone.
        w.write("docs/x.gpg", &[&w.c]).await;
        let before = w.backend.snapshot();

        let mut cascade = w.cascade([w.a.clone()]);
        let err = cascade
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();

        assert!(matches!(err, PermsError::Decryption(_)));
        assert!(!cascade.history().contains(&Persisting));
        assert_eq!(
            cascade.history(),
            &[Idle, FetchingPermission, AuthorizingKey, Reencrypting, Failed]
        );
        assert_eq!(w.backend.snapshot(), before);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_before_writes() {
        let w = World::new(&[1]).await;
        let before = w.backend.snapshot();
        w.backend.fail_next(Operation::Get);

        let mut cascade = w.cascade([w.a.clone()]);
        let err = cascade
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();

        assert!(matches!(err, PermsError::Store(StoreError::Rejected(_))));
        assert!(!cascade.history().contains(&Persisting));
        assert_eq!(cascade.history().last(), Some(&Failed));
        assert_eq!(w.backend.snapshot(), before);
    }

    #[tokio::test]
    async fn test_missing_key_aborts_before_writes() {
        let w = World::new(&[1]).await;
        let before = w.backend.snapshot();
        let ghost = KeyId::from_u64(0x0BAD_F00D);
        let err = w
            .cascade([w.a.clone()])
            .grant("docs", ghost, Authorization::Session)
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::MissingKeys(ids) if ids == vec![ghost]));
        assert_eq!(w.backend.snapshot(), before);
    }

    #[tokio::test]
    async fn test_wrong_passphrase_is_distinguishable() {
        let w = World::new(&[1]).await;
        let locked = w.a.protect(b"open sesame").unwrap();

        let mut cascade = w.cascade([locked.clone()]);
        let err = cascade
            .grant("docs", w.b.primary_key_id(), Authorization::Passphrase(Zeroizing::new("nope".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::InvalidPassphrase));
        assert!(err.needs_passphrase());
        assert_eq!(cascade.history(), &[Idle, FetchingPermission, AuthorizingKey, Failed]);

        let outcome = w
            .cascade([locked])
            .grant(
                "docs",
                w.b.primary_key_id(),
                Authorization::Passphrase(Zeroizing::new("open sesame".into())),
            )
            .await
            .unwrap();
        assert!(outcome.changed);
    }

    #[tokio::test]
    async fn test_session_requires_unlocked_key() {
        let w = World::new(&[1]).await;
        let locked = w.a.protect(b"pw").unwrap();
        let err = w
            .cascade([locked.clone()])
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::KeyLocked(id) if id == w.a.primary_key_id()));

        // Once unlocked in the session keyring, no passphrase is needed.
        let keyring = Arc::new(KeyRing::with_keys([locked.clone()]));
        keyring.unlock(&locked, b"pw").unwrap();
        PermissionCascade::new(w.backend.clone(), keyring)
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_key_for_access_list() {
        let w = World::new(&[1]).await;
        let before = w.backend.snapshot();
        let err = w
            .cascade([w.c.clone()])
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::Authorization(_)));
        assert!(!err.needs_passphrase());

        let err = w
            .cascade(Vec::new())
            .grant("docs", w.b.primary_key_id(), Authorization::Key(Arc::new(w.c.clone())))
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::Authorization(_)));
        assert_eq!(w.backend.snapshot(), before);
    }

    #[tokio::test]
    async fn test_explicit_key() {
        let w = World::new(&[1]).await;
        w.cascade(Vec::new())
            .grant("docs", w.b.primary_key_id(), Authorization::Key(Arc::new(w.a.clone())))
            .await
            .unwrap();
        assert_eq!(w.read_as("docs/report.gpg", &w.b).await.unwrap(), SECRET);
    }

    struct FixedPrompt(Option<&'static str>);

    #[async_trait]
    impl PassphrasePrompt for FixedPrompt {
        async fn passphrase(&self, _key: &KeyMaterial) -> Option<Zeroizing<String>> {
            self.0.map(|p| Zeroizing::new(p.to_string()))
        }
    }

    #[tokio::test]
    async fn test_prompt() {
        let w = World::new(&[1]).await;
        let locked = w.a.protect(b"asked").unwrap();

        let err = w
            .cascade([locked.clone()])
            .grant("docs", w.b.primary_key_id(), Authorization::Prompt(Arc::new(FixedPrompt(None))))
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::Authorization(_)));

        w.cascade([locked])
            .grant(
                "docs",
                w.b.primary_key_id(),
                Authorization::Prompt(Arc::new(FixedPrompt(Some("asked")))),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_single_use() {
        let w = World::new(&[1]).await;
        let mut cascade = w.cascade([w.a.clone()]);
        cascade
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap();
        let again = cascade
            .grant("docs", w.c.primary_key_id(), Authorization::Session)
            .await;
        assert!(matches!(again, Err(PermsError::Finished)));
    }

    #[tokio::test]
    async fn test_serial_fan_out() {
        let w = World::new(&[1]).await;
        for i in 0..5 {
            w.write(&format!("docs/bulk/{i}.gpg"), &[&w.a]).await;
        }
        let outcome = w
            .cascade([w.a.clone()])
            .with_config(CascadeConfig::default().with_max_concurrency(1))
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap();
        assert_eq!(outcome.reencrypted.len(), 7);
        for i in 0..5 {
            let path = format!("docs/bulk/{i}.gpg");
            assert_eq!(w.read_as(&path, &w.b).await.unwrap(), SECRET);
        }
    }

    #[tokio::test]
    async fn test_single_file_target() {
        let w = World::new(&[1]).await;
        let outcome = w
            .cascade([w.a.clone()])
            .grant("docs/report.gpg", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap();
        assert_eq!(outcome.reencrypted, vec!["docs/report.gpg".to_string()]);
        assert_eq!(w.read_as("docs/report.gpg", &w.b).await.unwrap(), SECRET);
        assert!(w.read_as("docs/team/plan.gpg", &w.b).await.is_err());
    }

    /// Backend that misreports the change list.
    struct Tampered {
        inner: MemoryBackend,
        tamper: fn(&mut Vec<String>),
    }

    #[async_trait]
    impl PassStore for Tampered {
        async fn get(&self, path: &str) -> passcrypt_store::Result<PassEntry> {
            self.inner.get(path).await
        }
        async fn put(&self, path: &str, object: &EncryptedObject, message: &str) -> passcrypt_store::Result<()> {
            self.inner.put(path, object, message).await
        }
        async fn delete(&self, path: &str) -> passcrypt_store::Result<DeleteOutcome> {
            self.inner.delete(path).await
        }
    }

    #[async_trait]
    impl PermissionStore for Tampered {
        async fn get_permissions(&self, path: &str) -> passcrypt_store::Result<PermissionSet> {
            let mut set = self.inner.get_permissions(path).await?;
            (self.tamper)(&mut set.change);
            Ok(set)
        }
        async fn apply_permissions(&self, path: &str, change: &PermissionChange) -> passcrypt_store::Result<()> {
            self.inner.apply_permissions(path, change).await
        }
    }

    #[async_trait]
    impl KeyDirectory for Tampered {
        async fn fetch_public_keys(&self, ids: &[KeyId]) -> passcrypt_store::Result<Vec<KeyRecord>> {
            self.inner.fetch_public_keys(ids).await
        }
    }

    async fn tampered(tamper: fn(&mut Vec<String>)) -> (Arc<Tampered>, KeyMaterial, KeyMaterial) {
        let w = World::new(&[1]).await;
        let inner = Arc::try_unwrap(w.backend).ok().unwrap();
        (Arc::new(Tampered { inner, tamper }), w.a, w.b)
    }

    #[tokio::test]
    async fn test_change_list_outside_target_rejected() {
        let (store, a, b) = tampered(|change| change.push("web/site.gpg".into())).await;
        let before = store.inner.snapshot();
        let err = PermissionCascade::new(store.clone(), Arc::new(KeyRing::with_keys([a])))
            .grant("docs", b.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::InconsistentChangeList(_)));
        assert_eq!(store.inner.snapshot(), before);
    }

    #[tokio::test]
    async fn test_change_list_duplicate_rejected() {
        let (store, a, b) = tampered(|change| {
            let first = change[0].clone();
            change.push(format!("/{first}"));
        })
        .await;
        let err = PermissionCascade::new(store, Arc::new(KeyRing::with_keys([a])))
            .grant("docs", b.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::InconsistentChangeList(_)));
    }

    #[tokio::test]
    async fn test_incomplete_change_list() {
        fn drop_last(change: &mut Vec<String>) {
            change.pop();
        }

        // Contained mode trusts the list; the backend then refuses the write.
        let (store, a, b) = tampered(drop_last).await;
        let err = PermissionCascade::new(store, Arc::new(KeyRing::with_keys([a])))
            .grant("docs", b.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::Persist(StoreError::MissingFile(_))));

        // Complete mode catches it before anything is re-encrypted.
        let (store, a, b) = tampered(drop_last).await;
        let config = CascadeConfig::default().with_change_list_check(ChangeListCheck::Complete);
        let mut cascade = PermissionCascade::new(store, Arc::new(KeyRing::with_keys([a])))
            .with_config(config);
        let err = cascade
            .grant("docs", b.primary_key_id(), Authorization::Session)
            .await
            .unwrap_err();
        assert!(matches!(err, PermsError::InconsistentChangeList(_)));
        assert!(!cascade.history().contains(&Persisting));
    }

    #[tokio::test]
    async fn test_complete_mode_accepts_honest_list() {
        let w = World::new(&[1]).await;
        let config = CascadeConfig::default().with_change_list_check(ChangeListCheck::Complete);
        let outcome = w
            .cascade([w.a.clone()])
            .with_config(config)
            .grant("docs", w.b.primary_key_id(), Authorization::Session)
            .await
            .unwrap();
        assert_eq!(outcome.reencrypted.len(), 2);
    }

    #[test]
    fn test_config_from_json() {
        let config: CascadeConfig =
            serde_json::from_str(r#"{"change_list_check":"complete"}"#).unwrap();
        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.change_list_check, ChangeListCheck::Complete);
    }
}
