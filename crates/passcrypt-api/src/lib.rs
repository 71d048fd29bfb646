//! # passcrypt api
//!
//! The REST contract between a passcrypt client and its server.
//!
//! ## Overview
//!
//! [`RestClient`] implements the store collaborator traits by speaking JSON
//! over a [`Transport`]. [`LoopbackTransport`] serves a
//! [`MemoryBackend`](passcrypt_store::MemoryBackend) over the same contract
//! in-process, so both sides can be exercised without a network.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use passcrypt_api::{LoopbackTransport, RestClient};
//! use passcrypt_store::{MemoryBackend, PassStore};
//!
//! async fn example() -> passcrypt_store::Result<()> {
//!     let backend = Arc::new(MemoryBackend::new().as_user("alice"));
//!     let transport = LoopbackTransport::with_base_path(backend, "/api");
//!     let client = RestClient::new(transport).with_base_path("/api");
//!     let entry = client.get("docs").await?;
//!     println!("{entry:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Routes
//!
//! ```text
//! GET    /pass/{path}                     file or directory listing
//! POST   /pass/{path}                     store file
//! DELETE /pass/{path}                     delete file (404 + parentRemoved)
//! GET    /passPerm/{path}                 access list and change list
//! POST   /passPerm/{path}                 apply a permission change
//! GET    /publicKey?ids=A,B               batched public key lookup
//! GET    /user/{user}/privateKey          list private keys
//! POST   /user/{user}/privateKey/{id}     create private key
//! PUT    /user/{user}/privateKey/{id}     replace private key
//! GET    /user/{user}/publicKey           list public keys
//! POST   /user/{user}/publicKey/{id}      store public key
//! DELETE /user/{user}/{kind}Key/{id}      delete key
//! ```

pub mod client;
pub mod error;
pub mod messages;
pub mod transport;

pub use client::RestClient;
pub use error::{ApiError, Result};
pub use messages::{
    ApplyPermissionsRequest, Base64Blob, KeyEntry, PassResponse, StoreFileRequest,
    DEFAULT_COMMIT_MESSAGE,
};
pub use transport::{memory::LoopbackTransport, HttpRequest, HttpResponse, Method, Transport};
