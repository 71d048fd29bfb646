//! # passcrypt core
//!
//! Key handling and encryption for passcrypt: canonical key ids, key
//! material, multi-recipient encryption and the session keyring.
//!
//! Keys and messages are standard OpenPGP, handled through
//! `sequoia-openpgp`. Stores written by other OpenPGP tools (for example
//! `gpg --encrypt` output and `gpg --export-secret-keys` keys) read back
//! unchanged, and everything written here reads back in those tools.
//!
//! This crate does no I/O. Storage and transport live in `passcrypt-store`
//! and `passcrypt-api`.
//!
//! ## Key Types
//!
//! - [`KeyId`] - Canonical 64-bit OpenPGP key identifier
//! - [`KeyMaterial`] - A parsed public or private key
//! - [`EncryptedObject`] - Ciphertext with a readable recipient header
//! - [`CryptoEngine`] - Stateless encrypt/decrypt
//! - [`KeyRing`] - Per-session key store with an unlocked-key cache

pub mod engine;
pub mod error;
pub mod key;
pub mod keyid;
pub mod keyring;
pub mod message;

pub use engine::CryptoEngine;
pub use error::{CoreError, Result};
pub use key::{ComponentKey, KeyKind, KeyMaterial};
pub use keyid::{canonicalize, KeyId};
pub use keyring::{KeyRing, PrivateKeyIndex};
pub use message::EncryptedObject;
pub use sequoia_openpgp::Fingerprint;
