//! # passcrypt store
//!
//! Storage collaborators for passcrypt. The vault and the permission cascade
//! are written against the traits here and never against a concrete backend.
//!
//! ## Key Types
//!
//! - [`PassStore`] - Encrypted file storage
//! - [`PermissionStore`] - Access lists and atomic permission changes
//! - [`KeyDirectory`] - Batched public key lookup
//! - [`KeyStore`] - Per-user key upload, listing and deletion
//! - [`MemoryBackend`] - In-process implementation of all of the above
//!
//! ## Design Notes
//!
//! - **Inherited access**: a path's access list is the one recorded on its
//!   nearest ancestor-or-self
//! - **Shadowing**: a directory with its own list is left out of changes
//!   made above it
//! - **All-or-nothing**: a permission change must carry exactly the files it
//!   affects or nothing is written
//! - **Membership**: writes, deletes and permission changes are refused
//!   (`Forbidden`) unless the acting user holds a key on the path's list

pub mod error;
pub mod memory;
pub mod path;
pub mod traits;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::{Commit, MemoryBackend, Operation, Snapshot};
pub use path::normalize_path;
pub use traits::{Backend, KeyDirectory, KeyStore, PassStore, PassStoreExt, PermissionStore};
pub use types::{
    DeleteOutcome, DirEntry, EntryKind, FileRecord, KeyRecord, PassEntry, PermissionChange,
    PermissionSet, WriteMode,
};
