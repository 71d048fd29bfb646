//! In-memory implementation of every collaborator trait.
//!
//! Mirrors the server's semantics closely enough to drive end-to-end tests:
//! access lists are inherited from the nearest ancestor-or-self that records
//! one, a directory with its own list shadows the subtree beneath it, and
//! permission changes are applied all-or-nothing.
//!
//! A handle obtained through [`MemoryBackend::as_user`] acts for one user
//! and may only write, delete or change permissions where one of that
//! user's public keys is on the access list. A handle from
//! [`MemoryBackend::new`] is administrative and unchecked.
//!
//! All data is lost when the backend is dropped. Thread-safe via RwLock.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use passcrypt_core::{EncryptedObject, KeyId, KeyKind};

use crate::error::{Result, StoreError};
use crate::path::{self, FILE_SUFFIX};
use crate::traits::{KeyDirectory, KeyStore, PassStore, PermissionStore};
use crate::types::{
    DeleteOutcome, DirEntry, EntryKind, FileRecord, KeyRecord, PassEntry, PermissionChange,
    PermissionSet, WriteMode,
};

/// Operations that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Put,
    Delete,
    GetPermissions,
    ApplyPermissions,
    FetchPublicKeys,
    StoreKey,
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub message: String,
    pub paths: Vec<String>,
}

/// Files and access lists at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub files: BTreeMap<String, Bytes>,
    pub access: BTreeMap<String, Vec<KeyId>>,
}

/// In-memory backend.
pub struct MemoryBackend {
    inner: Arc<RwLock<MemoryBackendInner>>,

    /// Acting user, `None` for the administrative handle.
    actor: Option<String>,
}

#[derive(Default)]
struct MemoryBackendInner {
    /// Encrypted files by normalized path.
    files: BTreeMap<String, EncryptedObject>,

    /// Recorded access lists by directory (or file) path.
    access: BTreeMap<String, Vec<KeyId>>,

    /// Private keys by owner and id.
    private_keys: BTreeMap<(String, KeyId), Bytes>,

    /// Public keys by id, with their owner.
    public_keys: BTreeMap<KeyId, (String, Bytes)>,

    /// Write log.
    commits: Vec<Commit>,

    /// Pending one-shot failures.
    failures: Vec<Operation>,

    /// Number of public key fetches served.
    public_key_requests: usize,
}

impl MemoryBackendInner {
    fn take_failure(&mut self, op: Operation) -> Result<()> {
        if let Some(pos) = self.failures.iter().position(|f| *f == op) {
            self.failures.remove(pos);
            debug!(?op, "injected backend failure");
            return Err(StoreError::Rejected(format!("injected failure for {op:?}")));
        }
        Ok(())
    }

    fn is_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Forbidden unless one of `actor`'s public keys may read `path`.
    fn require_member(&self, actor: Option<&str>, path: &str) -> Result<()> {
        let Some(user) = actor else {
            return Ok(());
        };
        let access = self.access_for(path);
        let member = self
            .public_keys
            .iter()
            .any(|(id, (owner, _))| owner == user && access.contains(id));
        if !member {
            debug!(%user, %path, "user is not on the access list");
            return Err(StoreError::Forbidden(format!(
                "{user} may not modify /{path}"
            )));
        }
        Ok(())
    }

    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = format!("{path}/");
        self.files.keys().any(|p| p.starts_with(&prefix))
            || self
                .access
                .keys()
                .any(|p| p == path || p.starts_with(&prefix))
    }

    fn access_for(&self, path: &str) -> Vec<KeyId> {
        path::ancestors_or_self(path)
            .find_map(|p| self.access.get(p))
            .cloned()
            .unwrap_or_default()
    }

    /// Files a change at `path` affects.
    fn change_list(&self, path: &str) -> Vec<String> {
        if self.is_file(path) {
            return vec![path.to_string()];
        }
        self.files
            .keys()
            .filter(|file| path::is_within(file, path))
            .filter(|file| !self.is_shadowed(file, path))
            .cloned()
            .collect()
    }

    /// Whether something strictly below `root` and at or above `file`
    /// records its own access list.
    fn is_shadowed(&self, file: &str, root: &str) -> bool {
        path::ancestors_or_self(file)
            .take_while(|p| *p != root)
            .any(|p| self.access.contains_key(p))
    }

    fn listing(&self, dir: &str) -> Vec<DirEntry> {
        let mut children: BTreeMap<String, EntryKind> = BTreeMap::new();
        let candidates = self
            .files
            .keys()
            .map(|p| (p, EntryKind::File))
            .chain(self.access.keys().map(|p| (p, EntryKind::Dir)));

        for (full, kind) in candidates {
            if full == dir || !path::is_within(full, dir) {
                continue;
            }
            let rest = if dir.is_empty() {
                full.as_str()
            } else {
                &full[dir.len() + 1..]
            };
            let (name, kind) = match rest.split_once('/') {
                Some((first, _)) => (first, EntryKind::Dir),
                None => (rest, kind),
            };
            if path::is_hidden(name) {
                continue;
            }
            if kind == EntryKind::File && !name.ends_with(FILE_SUFFIX) {
                continue;
            }
            // An access record on a file path is not a directory.
            if kind == EntryKind::Dir && rest == name && self.is_file(full) {
                continue;
            }
            children.entry(name.to_string()).or_insert(kind);
        }

        children
            .into_iter()
            .map(|(name, kind)| {
                let full = path::join(dir, &name);
                let display = match kind {
                    EntryKind::File => path::display_name(&name).to_string(),
                    EntryKind::Dir => name,
                };
                DirEntry {
                    name: display,
                    path: full,
                    kind,
                }
            })
            .collect()
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MemoryBackendInner::default())),
            actor: None,
        }
    }

    /// A handle on the same data that acts as `user`.
    pub fn as_user(&self, user: &str) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            actor: Some(user.to_string()),
        }
    }

    /// The acting user, if this handle is scoped to one.
    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    /// Record an access list directly, without re-encrypting anything.
    pub fn set_access(&self, path: &str, access: Vec<KeyId>) {
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.access.insert(path::normalize_path(path), access);
    }

    /// Make the next call of `op` fail with a rejection.
    pub fn fail_next(&self, op: Operation) {
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.failures.push(op);
    }

    /// Number of public key fetches served so far.
    pub fn public_key_requests(&self) -> usize {
        self.inner
            .read()
            .expect("backend lock poisoned")
            .public_key_requests
    }

    /// Write log, oldest first.
    pub fn commits(&self) -> Vec<Commit> {
        self.inner.read().expect("backend lock poisoned").commits.clone()
    }

    /// Files and access lists as they are now.
    pub fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read().expect("backend lock poisoned");
        Snapshot {
            files: inner
                .files
                .iter()
                .map(|(p, obj)| (p.clone(), obj.to_bytes()))
                .collect(),
            access: inner.access.clone(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PassStore for MemoryBackend {
    async fn get(&self, path: &str) -> Result<PassEntry> {
        let path = path::normalize_path(path);
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.take_failure(Operation::Get)?;

        if let Some(object) = inner.files.get(&path) {
            return Ok(PassEntry::File(FileRecord::new(path, object.clone())));
        }
        if inner.is_dir(&path) {
            return Ok(PassEntry::Dir(inner.listing(&path)));
        }
        Err(StoreError::NotFound(path))
    }

    async fn put(&self, path: &str, object: &EncryptedObject, message: &str) -> Result<()> {
        let path = path::normalize_path(path);
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.take_failure(Operation::Put)?;

        if path.is_empty() || inner.is_dir(&path) {
            return Err(StoreError::IsADirectory(path));
        }
        if let Some(parent) = path::parent(&path) {
            if let Some(blocking) = path::ancestors_or_self(parent).find(|p| inner.is_file(p)) {
                return Err(StoreError::NotADirectory(blocking.to_string()));
            }
        }
        inner.require_member(self.actor(), &path)?;

        debug!(%path, "storing file");
        inner.files.insert(path.clone(), object.clone());
        inner.commits.push(Commit {
            message: message.to_string(),
            paths: vec![path],
        });
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<DeleteOutcome> {
        let path = path::normalize_path(path);
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.take_failure(Operation::Delete)?;

        if !inner.is_file(&path) {
            if inner.is_dir(&path) {
                return Err(StoreError::IsADirectory(path));
            }
            return Err(StoreError::NotFound(path));
        }
        inner.require_member(self.actor(), &path)?;
        inner.files.remove(&path);
        inner.access.remove(&path);
        inner.commits.push(Commit {
            message: format!("Delete {path}"),
            paths: vec![path.clone()],
        });

        match path::parent(&path) {
            Some(parent) if !parent.is_empty() && !inner.is_dir(parent) => {
                Ok(DeleteOutcome::ParentRemoved)
            }
            _ => Ok(DeleteOutcome::Deleted),
        }
    }
}

#[async_trait]
impl PermissionStore for MemoryBackend {
    async fn get_permissions(&self, path: &str) -> Result<PermissionSet> {
        let path = path::normalize_path(path);
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.take_failure(Operation::GetPermissions)?;

        if !inner.is_file(&path) && !inner.is_dir(&path) {
            return Err(StoreError::NotFound(path));
        }
        Ok(PermissionSet {
            access: inner.access_for(&path),
            change: inner.change_list(&path),
        })
    }

    async fn apply_permissions(&self, path: &str, change: &PermissionChange) -> Result<()> {
        let path = path::normalize_path(path);
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.take_failure(Operation::ApplyPermissions)?;

        if !inner.is_file(&path) && !inner.is_dir(&path) {
            return Err(StoreError::NotFound(path));
        }
        inner.require_member(self.actor(), &path)?;
        if change.access.is_empty() {
            debug!(%path, "rejecting empty access list");
            return Err(StoreError::Rejected("access list is empty".into()));
        }

        let expected: BTreeSet<String> = inner.change_list(&path).into_iter().collect();
        let mut provided = BTreeMap::new();
        for (file, object) in &change.files {
            let file = path::normalize_path(file);
            if !expected.contains(&file) {
                debug!(%path, %file, "rejecting unaffected file");
                return Err(StoreError::UnexpectedFile(file));
            }
            provided.insert(file, object.clone());
        }
        if let Some(missing) = expected.iter().find(|f| !provided.contains_key(*f)) {
            debug!(%path, file = %missing, "rejecting incomplete change");
            return Err(StoreError::MissingFile(missing.clone()));
        }

        debug!(%path, files = provided.len(), "applying permission change");
        inner.access.insert(path.clone(), change.access.clone());
        let paths: Vec<String> = provided.keys().cloned().collect();
        inner.files.extend(provided);
        inner.commits.push(Commit {
            message: format!("Update permissions for /{path}"),
            paths,
        });
        Ok(())
    }
}

#[async_trait]
impl KeyDirectory for MemoryBackend {
    async fn fetch_public_keys(&self, ids: &[KeyId]) -> Result<Vec<KeyRecord>> {
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.take_failure(Operation::FetchPublicKeys)?;
        inner.public_key_requests += 1;

        let mut seen = BTreeSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| {
                inner.public_keys.get(id).map(|(user, body)| KeyRecord {
                    key_id: *id,
                    user: Some(user.clone()),
                    armored: body.clone(),
                })
            })
            .collect())
    }
}

#[async_trait]
impl KeyStore for MemoryBackend {
    async fn list_private_keys(&self, user: &str) -> Result<Vec<KeyRecord>> {
        let inner = self.inner.read().expect("backend lock poisoned");
        Ok(inner
            .private_keys
            .iter()
            .filter(|((owner, _), _)| owner == user)
            .map(|((owner, id), body)| KeyRecord {
                key_id: *id,
                user: Some(owner.clone()),
                armored: body.clone(),
            })
            .collect())
    }

    async fn list_public_keys(&self, user: &str) -> Result<Vec<KeyRecord>> {
        let inner = self.inner.read().expect("backend lock poisoned");
        Ok(inner
            .public_keys
            .iter()
            .filter(|(_, (owner, _))| owner == user)
            .map(|(id, (owner, body))| KeyRecord {
                key_id: *id,
                user: Some(owner.clone()),
                armored: body.clone(),
            })
            .collect())
    }

    async fn store_private_key(
        &self,
        user: &str,
        id: KeyId,
        body: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.take_failure(Operation::StoreKey)?;

        let slot = (user.to_string(), id);
        let exists = inner.private_keys.contains_key(&slot);
        match (mode, exists) {
            (WriteMode::Create, true) => {
                return Err(StoreError::Conflict(format!("private key {id} exists")))
            }
            (WriteMode::Replace, false) => {
                return Err(StoreError::NotFound(format!("private key {id}")))
            }
            _ => {}
        }
        inner.private_keys.insert(slot, Bytes::copy_from_slice(body));
        Ok(())
    }

    async fn store_public_key(&self, user: &str, id: KeyId, body: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().expect("backend lock poisoned");
        inner.take_failure(Operation::StoreKey)?;

        if let Some((owner, existing)) = inner.public_keys.get(&id) {
            if owner != user {
                return Err(StoreError::Forbidden(format!(
                    "public key {id} belongs to another user"
                )));
            }
            if existing.as_ref() != body {
                return Err(StoreError::Conflict(format!("public key {id} exists")));
            }
            return Ok(());
        }
        inner
            .public_keys
            .insert(id, (user.to_string(), Bytes::copy_from_slice(body)));
        Ok(())
    }

    async fn delete_key(&self, user: &str, kind: KeyKind, id: KeyId) -> Result<()> {
        let mut inner = self.inner.write().expect("backend lock poisoned");
        match kind {
            KeyKind::Private => inner
                .private_keys
                .remove(&(user.to_string(), id))
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(format!("private key {id}"))),
            KeyKind::Public => {
                match inner.public_keys.get(&id) {
                    None => return Err(StoreError::NotFound(format!("public key {id}"))),
                    Some((owner, _)) if owner != user => {
                        return Err(StoreError::Forbidden(format!(
                            "public key {id} belongs to another user"
                        )))
                    }
                    Some(_) => {}
                }
                inner.public_keys.remove(&id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::PassStoreExt;
    use passcrypt_core::{CryptoEngine, KeyMaterial};

    fn object_for(key: &KeyMaterial) -> EncryptedObject {
        CryptoEngine::new()
            .encrypt(b"secret", [&key.to_public()])
            .unwrap()
    }

    fn key(seed: u8) -> KeyMaterial {
        KeyMaterial::from_seed(&format!("user{seed}"), &[seed; 32], 1_700_000_000).unwrap()
    }

    async fn seeded() -> (MemoryBackend, EncryptedObject) {
        let backend = MemoryBackend::new();
        let obj = object_for(&key(1));
        backend.set_access("/", vec![KeyId::from_u64(0xA)]);
        for p in [
            "docs/report.gpg",
            "docs/notes.gpg",
            "docs/private/salary.gpg",
            "docs/.hidden.gpg",
            "docs/readme.txt",
            "web/site.gpg",
        ] {
            backend.put(p, &obj, "seed").await.unwrap();
        }
        backend.set_access("docs/private", vec![KeyId::from_u64(0xC)]);
        (backend, obj)
    }

    #[tokio::test]
    async fn test_listing_hides_dotfiles_and_strips_suffix() {
        let (backend, _) = seeded().await;
        let entries = backend.get("/docs").await.unwrap().into_dir("docs").unwrap();
        let names: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.kind)).collect();
        assert_eq!(
            names,
            vec![
                ("notes", EntryKind::File),
                ("private", EntryKind::Dir),
                ("report", EntryKind::File),
            ]
        );
        assert_eq!(entries[0].path, "docs/notes.gpg");
    }

    #[tokio::test]
    async fn test_get_file_and_missing() {
        let (backend, obj) = seeded().await;
        let record = backend.get_file("/docs/report.gpg").await.unwrap();
        assert_eq!(record.object, obj);
        assert_eq!(record.name(), "report");
        record.verify_recipients().unwrap();

        assert!(matches!(
            backend.get("docs/nope.gpg").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            backend.get_file("docs").await,
            Err(StoreError::IsADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_access_is_inherited() {
        let (backend, _) = seeded().await;
        let docs = backend.get_permissions("docs").await.unwrap();
        assert_eq!(docs.access, vec![KeyId::from_u64(0xA)]);

        let salary = backend
            .get_permissions("docs/private/salary.gpg")
            .await
            .unwrap();
        assert_eq!(salary.access, vec![KeyId::from_u64(0xC)]);
        assert_eq!(salary.change, vec!["docs/private/salary.gpg".to_string()]);
    }

    #[tokio::test]
    async fn test_change_list_skips_shadowed_directories() {
        let (backend, _) = seeded().await;
        let docs = backend.get_permissions("/docs/").await.unwrap();
        assert_eq!(
            docs.change,
            vec![
                "docs/.hidden.gpg".to_string(),
                "docs/notes.gpg".to_string(),
                "docs/readme.txt".to_string(),
                "docs/report.gpg".to_string(),
            ]
        );

        let private = backend.get_permissions("docs/private").await.unwrap();
        assert_eq!(private.change, vec!["docs/private/salary.gpg".to_string()]);
    }

    #[tokio::test]
    async fn test_apply_is_all_or_nothing() {
        let (backend, obj) = seeded().await;
        let before = backend.snapshot();
        let new_access = vec![KeyId::from_u64(0xA), KeyId::from_u64(0xB)];

        // Missing a file.
        let mut files = BTreeMap::new();
        files.insert("docs/report.gpg".to_string(), obj.clone());
        let change = PermissionChange {
            access: new_access.clone(),
            files: files.clone(),
        };
        assert!(matches!(
            backend.apply_permissions("docs/private/..", &change).await,
            Err(StoreError::MissingFile(_))
        ));

        // Carrying a shadowed file.
        files.insert("docs/private/salary.gpg".to_string(), obj.clone());
        let change = PermissionChange {
            access: new_access.clone(),
            files,
        };
        assert!(matches!(
            backend.apply_permissions("docs", &change).await,
            Err(StoreError::UnexpectedFile(_))
        ));

        // Empty access.
        assert!(matches!(
            backend
                .apply_permissions("docs", &PermissionChange::default())
                .await,
            Err(StoreError::Rejected(_))
        ));

        assert_eq!(backend.snapshot(), before);
    }

    #[tokio::test]
    async fn test_apply_writes_access_and_files() {
        let (backend, _) = seeded().await;
        let fresh = object_for(&key(2));
        let set = backend.get_permissions("docs").await.unwrap();
        let change = PermissionChange {
            access: vec![KeyId::from_u64(0xB)],
            files: set
                .change
                .iter()
                .map(|p| (p.clone(), fresh.clone()))
                .collect(),
        };
        backend.apply_permissions("docs", &change).await.unwrap();

        let after = backend.get_permissions("docs/report.gpg").await.unwrap();
        assert_eq!(after.access, vec![KeyId::from_u64(0xB)]);
        assert_eq!(backend.get_file("docs/report.gpg").await.unwrap().object, fresh);
        // Untouched outside the change list.
        assert_ne!(backend.get_file("web/site.gpg").await.unwrap().object, fresh);
        assert_eq!(
            backend.commits().last().unwrap().message,
            "Update permissions for /docs"
        );
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let (backend, _) = seeded().await;
        backend.fail_next(Operation::GetPermissions);
        assert!(backend.get_permissions("docs").await.is_err());
        assert!(backend.get_permissions("docs").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_reports_parent_removal() {
        let backend = MemoryBackend::new();
        let obj = object_for(&key(1));
        backend.put("a/only.gpg", &obj, "").await.unwrap();
        backend.put("b/one.gpg", &obj, "").await.unwrap();
        backend.put("b/two.gpg", &obj, "").await.unwrap();

        assert_eq!(
            backend.delete("a/only.gpg").await.unwrap(),
            DeleteOutcome::ParentRemoved
        );
        assert_eq!(backend.delete("b/one.gpg").await.unwrap(), DeleteOutcome::Deleted);
        assert!(matches!(
            backend.delete("b/one.gpg").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_rejects_directories() {
        let (backend, obj) = seeded().await;
        assert!(matches!(
            backend.put("docs", &obj, "").await,
            Err(StoreError::IsADirectory(_))
        ));
        assert!(matches!(
            backend.put("docs/report.gpg/x.gpg", &obj, "").await,
            Err(StoreError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_list_files_walks_subtree() {
        let (backend, _) = seeded().await;
        let files = backend.list_files("docs").await.unwrap();
        assert_eq!(
            files,
            vec![
                "docs/notes.gpg".to_string(),
                "docs/report.gpg".to_string(),
                "docs/private/salary.gpg".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_key_store_modes() {
        let backend = MemoryBackend::new();
        let id = KeyId::from_u64(0xAB);
        backend
            .store_private_key("alice", id, b"v1", WriteMode::Create)
            .await
            .unwrap();
        assert!(matches!(
            backend
                .store_private_key("alice", id, b"v2", WriteMode::Create)
                .await,
            Err(StoreError::Conflict(_))
        ));
        backend
            .store_private_key("alice", id, b"v2", WriteMode::Replace)
            .await
            .unwrap();
        assert!(matches!(
            backend
                .store_private_key("bob", id, b"v2", WriteMode::Replace)
                .await,
            Err(StoreError::NotFound(_))
        ));

        let listed = backend.list_private_keys("alice").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].armored.as_ref(), b"v2");
        assert!(backend.list_private_keys("bob").await.unwrap().is_empty());

        backend
            .delete_key("alice", KeyKind::Private, id)
            .await
            .unwrap();
        assert!(backend.list_private_keys("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_public_key_directory() {
        let backend = MemoryBackend::new();
        let a = KeyId::from_u64(0xA);
        backend.store_public_key("alice", a, b"pub-a").await.unwrap();
        // Same body again is fine, a different one conflicts.
        backend.store_public_key("alice", a, b"pub-a").await.unwrap();
        assert!(matches!(
            backend.store_public_key("alice", a, b"other").await,
            Err(StoreError::Conflict(_))
        ));
        assert!(matches!(
            backend.delete_key("mallory", KeyKind::Public, a).await,
            Err(StoreError::Forbidden(_))
        ));

        let found = backend
            .fetch_public_keys(&[a, KeyId::from_u64(0xF), a])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].user.as_deref(), Some("alice"));
        assert_eq!(backend.public_key_requests(), 1);
    }

    #[tokio::test]
    async fn test_non_member_cannot_modify() {
        let (admin, obj) = seeded().await;
        admin
            .store_public_key("alice", KeyId::from_u64(0xA), b"pub-a")
            .await
            .unwrap();
        admin
            .store_public_key("carol", KeyId::from_u64(0xC), b"pub-c")
            .await
            .unwrap();
        let before = admin.snapshot();
        let carol = admin.as_user("carol");
        assert_eq!(carol.actor(), Some("carol"));

        let set = carol.get_permissions("docs").await.unwrap();
        let change = PermissionChange {
            access: vec![KeyId::from_u64(0xC)],
            files: set.change.iter().map(|p| (p.clone(), obj.clone())).collect(),
        };
        assert!(matches!(
            carol.apply_permissions("docs", &change).await,
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            carol.delete("docs/report.gpg").await,
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            carol.put("docs/new.gpg", &obj, "").await,
            Err(StoreError::Forbidden(_))
        ));
        assert_eq!(admin.snapshot(), before);

        // Carol is on the list below docs/private.
        carol.put("docs/private/bonus.gpg", &obj, "").await.unwrap();
        assert_eq!(
            carol.delete("docs/private/bonus.gpg").await.unwrap(),
            DeleteOutcome::Deleted
        );

        let alice = admin.as_user("alice");
        alice.apply_permissions("docs", &change).await.unwrap();
        assert_eq!(
            admin.get_permissions("docs").await.unwrap().access,
            vec![KeyId::from_u64(0xC)]
        );
    }

    #[tokio::test]
    async fn test_delete_checks_existence_before_membership() {
        let (admin, _) = seeded().await;
        let stranger = admin.as_user("mallory");
        assert!(matches!(
            stranger.delete("docs/nope.gpg").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            stranger.delete("docs").await,
            Err(StoreError::IsADirectory(_))
        ));
    }
}
