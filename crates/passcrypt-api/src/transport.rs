//! Transport abstraction for the REST contract.
//!
//! A transport delivers one request and returns one response. Implementations
//! may use any HTTP stack; the crate ships an in-process loopback that serves
//! a [`MemoryBackend`](passcrypt_store::MemoryBackend) for tests.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

/// One request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Route including any base path, e.g. `/api/pass/docs/report.gpg`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First query value for `key`.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// One response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, lossy.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport trait for delivering REST requests.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a request and wait for its response.
    ///
    /// Non-success statuses are returned as responses, not errors; only a
    /// failure to deliver is an error.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        (**self).send(request).await
    }
}

/// An in-process transport for testing.
///
/// Routes requests straight into a [`MemoryBackend`], speaking the same JSON
/// bodies and status codes a real server would.
pub mod memory {
    use super::*;
    use std::sync::{Arc, Mutex};

    use passcrypt_core::{KeyId, KeyKind};
    use passcrypt_store::{
        DeleteOutcome, KeyDirectory, KeyStore, MemoryBackend, PassStore, PermissionStore,
        WriteMode,
    };
    use serde::Serialize;
    use tracing::debug;

    use crate::error::{error_status, ApiError};
    use crate::messages::{
        decode_id_list, ApplyPermissionsRequest, DeleteResponse, KeyEntry, PassResponse,
        PrivateKeyList, PublicKeyMap, StoreFileRequest,
    };

    /// Serves a [`MemoryBackend`] over the REST contract.
    pub struct LoopbackTransport {
        backend: Arc<MemoryBackend>,
        base_path: String,
        log: Mutex<Vec<(Method, String)>>,
    }

    impl LoopbackTransport {
        pub fn new(backend: Arc<MemoryBackend>) -> Self {
            Self::with_base_path(backend, "")
        }

        /// Serve every route under `base_path` (e.g. `/api`).
        pub fn with_base_path(backend: Arc<MemoryBackend>, base_path: &str) -> Self {
            Self {
                backend,
                base_path: base_path.trim_end_matches('/').to_string(),
                log: Mutex::new(Vec::new()),
            }
        }

        pub fn backend(&self) -> &Arc<MemoryBackend> {
            &self.backend
        }

        /// Every request served so far, as `(method, path)`.
        pub fn requests(&self) -> Vec<(Method, String)> {
            self.log.lock().expect("request log poisoned").clone()
        }

        /// Serve one request.
        pub async fn handle(&self, request: &HttpRequest) -> HttpResponse {
            self.log
                .lock()
                .expect("request log poisoned")
                .push((request.method, request.path.clone()));

            match self.route(request).await {
                Ok(response) => response,
                Err(err) => {
                    let status = match &err {
                        ApiError::Store(inner) => error_status(inner),
                        ApiError::NoRoute { .. } => 404,
                        _ => 400,
                    };
                    debug!(method = %request.method, path = %request.path, status, error = %err, "request rejected");
                    HttpResponse::status(status, err.to_string())
                }
            }
        }

        async fn route(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, ApiError> {
            let no_route = || ApiError::NoRoute {
                method: request.method.to_string(),
                path: request.path.clone(),
            };
            let route = request
                .path
                .strip_prefix(self.base_path.as_str())
                .ok_or_else(no_route)?
                .trim_start_matches('/');

            if let Some(path) = under(route, "pass") {
                return self.pass(request, path).await;
            }
            if let Some(path) = under(route, "passPerm") {
                return self.perm(request, path).await;
            }
            if route == "publicKey" && request.method == Method::Get {
                let ids = decode_id_list(request.query_param("ids").unwrap_or(""))?;
                let keys = self.backend.fetch_public_keys(&ids).await?;
                let map: PublicKeyMap = keys
                    .iter()
                    .map(|record| (record.key_id, KeyEntry::from_record(record)))
                    .collect();
                return json(&map);
            }
            if let Some(rest) = under(route, "user") {
                let (user, rest) = rest.split_once('/').ok_or_else(no_route)?;
                let (kind, id) = match rest.split_once('/') {
                    Some((kind, id)) => (kind, Some(KeyId::parse(id)?)),
                    None => (rest, None),
                };
                let kind = match kind {
                    "privateKey" => KeyKind::Private,
                    "publicKey" => KeyKind::Public,
                    _ => return Err(no_route()),
                };
                return self.keys(request, user, kind, id).await;
            }
            Err(no_route())
        }

        async fn pass(
            &self,
            request: &HttpRequest,
            path: &str,
        ) -> std::result::Result<HttpResponse, ApiError> {
            match request.method {
                Method::Get => {
                    let entry = self.backend.get(path).await?;
                    json(&PassResponse::from_entry(&entry))
                }
                Method::Post => {
                    let body: StoreFileRequest = serde_json::from_slice(&request.body)?;
                    let object =
                        passcrypt_core::EncryptedObject::parse(body.contents.clone().into_inner())?;
                    self.backend
                        .put(path, &object, body.commit_message())
                        .await?;
                    Ok(HttpResponse::ok(Bytes::new()))
                }
                Method::Delete => match self.backend.delete(path).await? {
                    DeleteOutcome::Deleted => Ok(HttpResponse::ok(Bytes::new())),
                    DeleteOutcome::ParentRemoved => Ok(HttpResponse::status(
                        404,
                        serde_json::to_vec(&DeleteResponse {
                            parent_removed: true,
                        })?,
                    )),
                },
                Method::Put => Err(ApiError::NoRoute {
                    method: request.method.to_string(),
                    path: request.path.clone(),
                }),
            }
        }

        async fn perm(
            &self,
            request: &HttpRequest,
            path: &str,
        ) -> std::result::Result<HttpResponse, ApiError> {
            match request.method {
                Method::Get => json(&self.backend.get_permissions(path).await?),
                Method::Post => {
                    let body: ApplyPermissionsRequest = serde_json::from_slice(&request.body)?;
                    let change = body.into_change()?;
                    self.backend.apply_permissions(path, &change).await?;
                    Ok(HttpResponse::ok(Bytes::new()))
                }
                _ => Err(ApiError::NoRoute {
                    method: request.method.to_string(),
                    path: request.path.clone(),
                }),
            }
        }

        async fn keys(
            &self,
            request: &HttpRequest,
            user: &str,
            kind: KeyKind,
            id: Option<KeyId>,
        ) -> std::result::Result<HttpResponse, ApiError> {
            match (request.method, kind, id) {
                (Method::Get, KeyKind::Private, None) => {
                    let keys = self.backend.list_private_keys(user).await?;
                    let list: PrivateKeyList = keys.iter().map(KeyEntry::from_record).collect();
                    json(&list)
                }
                (Method::Get, KeyKind::Public, None) => {
                    let keys = self.backend.list_public_keys(user).await?;
                    let map: PublicKeyMap = keys
                        .iter()
                        .map(|record| (record.key_id, KeyEntry::from_record(record)))
                        .collect();
                    json(&map)
                }
                (Method::Post, KeyKind::Private, Some(id)) => {
                    self.backend
                        .store_private_key(user, id, &request.body, WriteMode::Create)
                        .await?;
                    Ok(HttpResponse::ok(Bytes::new()))
                }
                (Method::Put, KeyKind::Private, Some(id)) => {
                    self.backend
                        .store_private_key(user, id, &request.body, WriteMode::Replace)
                        .await?;
                    Ok(HttpResponse::ok(Bytes::new()))
                }
                (Method::Post, KeyKind::Public, Some(id)) => {
                    self.backend.store_public_key(user, id, &request.body).await?;
                    Ok(HttpResponse::ok(Bytes::new()))
                }
                (Method::Delete, kind, Some(id)) => {
                    self.backend.delete_key(user, kind, id).await?;
                    Ok(HttpResponse::ok(Bytes::new()))
                }
                _ => Err(ApiError::NoRoute {
                    method: request.method.to_string(),
                    path: request.path.clone(),
                }),
            }
        }
    }

    #[async_trait]
    impl Transport for LoopbackTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
            Ok(self.handle(&request).await)
        }
    }

    /// `route` with `prefix` stripped, if the route lives under it.
    fn under<'a>(route: &'a str, prefix: &str) -> Option<&'a str> {
        if route == prefix {
            return Some("");
        }
        route.strip_prefix(prefix)?.strip_prefix('/')
    }

    fn json<T: Serialize>(value: &T) -> std::result::Result<HttpResponse, ApiError> {
        Ok(HttpResponse::ok(serde_json::to_vec(value)?))
    }
}
