//! # passcrypt
//!
//! A client-side encrypted file store. Files are encrypted to the keys on
//! their path's access list before they leave the client; the server only
//! ever sees ciphertext, key ids, public keys and passphrase-protected
//! private keys.
//!
//! ## Overview
//!
//! - **Keys**: each user holds passphrase-protected private keys; public
//!   halves are published to a key directory
//! - **Access lists**: recorded per directory (or file) and inherited by
//!   everything beneath, unless a deeper directory records its own
//! - **Cascades**: granting or revoking re-encrypts every affected file and
//!   persists the result in one all-or-nothing request
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use passcrypt::{Authorization, KeyId, UserIdentity, Vault, VaultConfig};
//! use passcrypt::store::MemoryBackend;
//!
//! async fn example(bob: KeyId) -> passcrypt::Result<()> {
//!     let admin = MemoryBackend::new();
//!     let backend = Arc::new(admin.as_user("alice"));
//!     let vault = Vault::open(backend, UserIdentity::new("alice"), VaultConfig::default()).await?;
//!
//!     let key = vault.generate_key("correct horse").await?;
//!     admin.set_access("docs", vec![key.primary_key_id()]);
//!     vault.write_file("docs/report.gpg", b"hunter2", None).await?;
//!     vault.grant("docs", bob, Authorization::Session).await?;
//!     vault.logout();
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `passcrypt::core` - Keys, key ids, messages and the crypto engine
//! - `passcrypt::store` - Collaborator traits and the in-memory backend
//! - `passcrypt::api` - REST contract, client and loopback transport
//! - `passcrypt::perms` - Grant/revoke and the permission cascade

pub mod config;
pub mod error;
pub mod session;
pub mod vault;

// Re-export component crates
pub use passcrypt_api as api;
pub use passcrypt_core as core;
pub use passcrypt_perms as perms;
pub use passcrypt_store as store;

// Re-export main types for convenience
pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use session::{Session, UserIdentity};
pub use vault::Vault;

pub use passcrypt_core::{CryptoEngine, EncryptedObject, KeyId, KeyMaterial, KeyRing};
pub use passcrypt_perms::{
    Authorization, CascadeConfig, CascadeOutcome, ChangeListCheck, PassphrasePrompt, PermsError,
};
