//! # passcrypt testkit
//!
//! Testing utilities for passcrypt.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Fixed inputs with expected outputs for the key id
//!   text form and the fingerprint to key id mapping
//! - **Generators**: Proptest strategies for key ids, keys and store paths
//! - **Fixtures**: Users with deterministic keys sharing one backend
//!
//! ## Golden Vectors
//!
//! ```rust
//! use passcrypt_testkit::vectors::{key_id_vectors, check_key_id_vectors};
//!
//! assert!(check_key_id_vectors().iter().all(|(_, ok, _)| *ok));
//! println!("{} key id vectors", key_id_vectors().len());
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use passcrypt_testkit::generators::{key_id, key_id_spelling};
//!
//! proptest! {
//!     #[test]
//!     fn any_spelling_parses_back((id, text) in key_id_spelling()) {
//!         prop_assert_eq!(passcrypt_core::KeyId::parse(&text).unwrap(), id);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use passcrypt_testkit::fixtures::VaultFixture;
//!
//! # async fn demo() -> passcrypt::Result<()> {
//! let fixture = VaultFixture::new(&["alice", "bob"]).await?;
//! fixture.share("team", &["alice"]);
//! fixture.vault("alice").write_file("team/wifi.gpg", b"hunter2", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{TestUser, VaultFixture, FIXTURE_CREATED};
pub use generators::{key_id, key_material, store_path};
pub use vectors::{fingerprint_vectors, key_id_vectors, FingerprintVector, KeyIdVector};
