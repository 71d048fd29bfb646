//! Collaborator traits.
//!
//! The vault and the permission cascade never talk to a backend directly;
//! they go through these traits. [`MemoryBackend`](crate::MemoryBackend)
//! implements all of them in-process, and `passcrypt-api` implements them
//! over REST.

use async_trait::async_trait;
use passcrypt_core::{EncryptedObject, KeyId, KeyKind};

use crate::error::Result;
use crate::path;
use crate::types::{
    DeleteOutcome, EntryKind, FileRecord, KeyRecord, PassEntry, PermissionChange, PermissionSet,
    WriteMode,
};

/// Encrypted file storage.
#[async_trait]
pub trait PassStore: Send + Sync {
    /// Fetch a file or a directory listing.
    async fn get(&self, path: &str) -> Result<PassEntry>;

    /// Create or overwrite a file.
    async fn put(&self, path: &str, object: &EncryptedObject, message: &str) -> Result<()>;

    /// Delete a file.
    async fn delete(&self, path: &str) -> Result<DeleteOutcome>;
}

/// Access lists and atomic permission changes.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Current access list and the files a change would touch.
    async fn get_permissions(&self, path: &str) -> Result<PermissionSet>;

    /// Replace the access list and every affected file in one step.
    ///
    /// All-or-nothing: on error, nothing was written.
    async fn apply_permissions(&self, path: &str, change: &PermissionChange) -> Result<()>;
}

/// Public key lookup.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Fetch public keys in one request. Unknown ids are left out.
    async fn fetch_public_keys(&self, ids: &[KeyId]) -> Result<Vec<KeyRecord>>;
}

/// Per-user key storage.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn list_private_keys(&self, user: &str) -> Result<Vec<KeyRecord>>;

    async fn list_public_keys(&self, user: &str) -> Result<Vec<KeyRecord>>;

    async fn store_private_key(
        &self,
        user: &str,
        id: KeyId,
        body: &[u8],
        mode: WriteMode,
    ) -> Result<()>;

    async fn store_public_key(&self, user: &str, id: KeyId, body: &[u8]) -> Result<()>;

    async fn delete_key(&self, user: &str, kind: KeyKind, id: KeyId) -> Result<()>;
}

/// Everything a vault needs from a backend.
pub trait Backend: PassStore + PermissionStore + KeyDirectory + KeyStore {}

impl<T: PassStore + PermissionStore + KeyDirectory + KeyStore + ?Sized> Backend for T {}

/// Extension trait for common store patterns.
pub trait PassStoreExt: PassStore {
    /// Fetch a path that must be a file.
    fn get_file(&self, path: &str) -> impl std::future::Future<Output = Result<FileRecord>> + Send;

    /// Every file at or beneath `path`.
    ///
    /// Depth first; a directory's files come before its subdirectories.
    fn list_files(&self, path: &str)
        -> impl std::future::Future<Output = Result<Vec<String>>> + Send;
}

impl<S: PassStore + ?Sized> PassStoreExt for S {
    async fn get_file(&self, path: &str) -> Result<FileRecord> {
        self.get(path).await?.into_file(path)
    }

    async fn list_files(&self, path: &str) -> Result<Vec<String>> {
        let root = path::normalize_path(path);
        let mut files = Vec::new();
        let mut pending = vec![root];

        while let Some(current) = pending.pop() {
            match self.get(&current).await? {
                PassEntry::File(record) => files.push(record.path),
                PassEntry::Dir(entries) => {
                    let mut dirs = Vec::new();
                    for entry in entries {
                        match entry.kind {
                            EntryKind::File => files.push(entry.path),
                            EntryKind::Dir => dirs.push(entry.path),
                        }
                    }
                    // Reverse so the stack pops directories in listing order.
                    pending.extend(dirs.into_iter().rev());
                }
            }
        }
        Ok(files)
    }
}
