//! Data model shared by every backend.

use std::collections::BTreeMap;

use bytes::Bytes;
use passcrypt_core::{EncryptedObject, KeyId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::path;

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Dir,
    File,
}

/// One child in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// Display name (no `.gpg` suffix for files).
    pub name: String,
    /// Full normalized path.
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

/// An encrypted file with its declared recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub object: EncryptedObject,
    /// Recipients as declared by the backend.
    pub recipients: Vec<KeyId>,
}

impl FileRecord {
    /// Build a record whose declared recipients come from the header.
    pub fn new(path: impl Into<String>, object: EncryptedObject) -> Self {
        let recipients = object.recipients().to_vec();
        Self {
            path: path.into(),
            object,
            recipients,
        }
    }

    /// Display name of the file.
    pub fn name(&self) -> &str {
        path::display_name(&self.path)
    }

    /// Check that the declared recipients equal the header recipients.
    pub fn verify_recipients(&self) -> Result<()> {
        if self.recipients == self.object.recipients() {
            Ok(())
        } else {
            Err(StoreError::InvalidData(format!(
                "{}: declared recipients {:?} differ from header {:?}",
                self.path,
                self.recipients,
                self.object.recipients()
            )))
        }
    }
}

/// What lives at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassEntry {
    Dir(Vec<DirEntry>),
    File(FileRecord),
}

impl PassEntry {
    pub fn into_file(self, path: &str) -> Result<FileRecord> {
        match self {
            PassEntry::File(record) => Ok(record),
            PassEntry::Dir(_) => Err(StoreError::IsADirectory(path.to_string())),
        }
    }

    pub fn into_dir(self, path: &str) -> Result<Vec<DirEntry>> {
        match self {
            PassEntry::Dir(entries) => Ok(entries),
            PassEntry::File(_) => Err(StoreError::NotADirectory(path.to_string())),
        }
    }
}

/// Access list and affected files for a path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet {
    /// Keys allowed to read, in recorded order.
    pub access: Vec<KeyId>,
    /// Files a change at this path must re-encrypt.
    pub change: Vec<String>,
}

/// A permission change, persisted as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionChange {
    pub access: Vec<KeyId>,
    pub files: BTreeMap<String, EncryptedObject>,
}

/// Result of deleting a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The file was the last entry of its directory, which went with it.
    ParentRemoved,
}

/// A stored key as served by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    pub key_id: KeyId,
    pub user: Option<String>,
    /// Key body, armored or binary as uploaded.
    pub armored: Bytes,
}

/// Create-or-replace semantics for key uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail with a conflict if the key exists.
    Create,
    /// Fail with not-found unless the key exists.
    Replace,
}
