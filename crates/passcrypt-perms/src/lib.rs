//! # passcrypt permissions
//!
//! Grant and revoke with re-encryption.
//!
//! ## Overview
//!
//! Access to a path is a list of key ids recorded on the path or inherited
//! from its nearest ancestor. Every file is encrypted to exactly the keys on
//! its list, so changing a list means re-encrypting every file it covers.
//! [`PermissionCascade`] does that as one unit:
//!
//! 1. **FetchingPermission**: read the access list and the change list
//! 2. **AuthorizingKey**: obtain an unlocked private key from the current list
//! 3. **Reencrypting**: decrypt each affected file and encrypt it for the new
//!    list, a bounded number at a time
//! 4. **Persisting**: write the list and every new ciphertext in one request
//!
//! ## Key Types
//!
//! - [`PermissionCascade`] - The state machine
//! - [`RecipientResolver`] - Key id to key lookup with batched directory fetches
//! - [`PermissionChangeRequest`] - Grant/revoke policy
//! - [`Authorization`] - Where the authorizing key comes from
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use passcrypt_core::{KeyId, KeyRing};
//! use passcrypt_perms::{Authorization, PermissionCascade};
//! use passcrypt_store::MemoryBackend;
//!
//! async fn example(
//!     backend: Arc<MemoryBackend>,
//!     keyring: Arc<KeyRing>,
//!     bob: KeyId,
//! ) -> passcrypt_perms::Result<()> {
//!     let mut cascade = PermissionCascade::new(backend, keyring);
//!     let outcome = cascade.grant("docs", bob, Authorization::Session).await?;
//!     println!("re-encrypted {} files", outcome.reencrypted.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Nothing before persist**: every failure before the final request
//!   leaves the backend as it was
//! - **Detached persist**: the final request runs on its own task, so a
//!   dropped caller cannot leave it half sent
//! - **Blocking unlock**: passphrase unlocks run on the blocking pool

pub mod cascade;
pub mod error;
pub mod grant;
pub mod resolver;
pub mod state;

pub use cascade::{
    Authorization, CascadeConfig, CascadeOutcome, CascadeStore, ChangeListCheck,
    PassphrasePrompt, PermissionCascade,
};
pub use error::{PermsError, PolicyError, Result};
pub use grant::PermissionChangeRequest;
pub use resolver::RecipientResolver;
pub use state::{CascadeState, StateLog};
