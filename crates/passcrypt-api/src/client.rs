//! REST client implementing the store collaborator traits.

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use passcrypt_core::{EncryptedObject, KeyId, KeyKind};
use passcrypt_store::{
    normalize_path, DeleteOutcome, KeyDirectory, KeyRecord, KeyStore, PassEntry, PassStore,
    PermissionChange, PermissionSet, PermissionStore, Result, StoreError, WriteMode,
};

use crate::error::{status_error, ApiError};
use crate::messages::{
    encode_id_list, ApplyPermissionsRequest, Base64Blob, DeleteResponse, PassResponse,
    PrivateKeyList, PublicKeyMap, StoreFileRequest,
};
use crate::transport::{HttpRequest, HttpResponse, Method, Transport};

/// Talks to a passcrypt server through a [`Transport`].
pub struct RestClient<T> {
    transport: T,
    base_path: String,
}

impl<T: Transport> RestClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            base_path: String::new(),
        }
    }

    /// Prefix every route with `base_path` (e.g. `/api`).
    pub fn with_base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.trim_end_matches('/').to_string();
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn route(&self, route: &str) -> String {
        format!("{}/{}", self.base_path, route)
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.transport.send(request).await.map_err(StoreError::from)
    }

    /// Send and require a 2xx answer. A 404 is reported against `subject`.
    async fn call(&self, request: HttpRequest, subject: &str) -> Result<HttpResponse> {
        let method = request.method;
        let response = self.send(request).await?;
        if response.is_success() {
            return Ok(response);
        }
        debug!(%method, subject, status = response.status, "server rejected request");
        Err(match response.status {
            404 => StoreError::NotFound(subject.to_string()),
            status => status_error(status, response.text()),
        })
    }

    async fn call_json<R: DeserializeOwned>(
        &self,
        request: HttpRequest,
        subject: &str,
    ) -> Result<R> {
        let response = self.call(request, subject).await?;
        decode(&response.body)
    }

    fn key_route(&self, user: &str, kind: KeyKind, id: Option<KeyId>) -> String {
        let kind = match kind {
            KeyKind::Private => "privateKey",
            KeyKind::Public => "publicKey",
        };
        match id {
            Some(id) => self.route(&format!("user/{user}/{kind}/{}", id.canonical())),
            None => self.route(&format!("user/{user}/{kind}")),
        }
    }
}

fn decode<R: DeserializeOwned>(body: &[u8]) -> Result<R> {
    serde_json::from_slice(body).map_err(|e| ApiError::from(e).into())
}

fn encode<V: Serialize>(value: &V) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ApiError::from(e).into())
}

#[async_trait]
impl<T: Transport> PassStore for RestClient<T> {
    async fn get(&self, path: &str) -> Result<PassEntry> {
        let path = normalize_path(path);
        let request = HttpRequest::new(Method::Get, self.route(&format!("pass/{path}")));
        let response: PassResponse = self.call_json(request, &path).await?;
        Ok(response.into_entry()?)
    }

    async fn put(&self, path: &str, object: &EncryptedObject, message: &str) -> Result<()> {
        let path = normalize_path(path);
        let body = encode(&StoreFileRequest {
            path: path.clone(),
            contents: Base64Blob(object.to_bytes()),
            message: message.to_string(),
        })?;
        let request =
            HttpRequest::new(Method::Post, self.route(&format!("pass/{path}"))).with_body(body);
        self.call(request, &path).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<DeleteOutcome> {
        let path = normalize_path(path);
        let request = HttpRequest::new(Method::Delete, self.route(&format!("pass/{path}")));
        let response = self.send(request).await?;
        if response.is_success() {
            return Ok(DeleteOutcome::Deleted);
        }
        if response.status == 404 {
            return match serde_json::from_slice::<DeleteResponse>(&response.body) {
                Ok(DeleteResponse {
                    parent_removed: true,
                }) => Ok(DeleteOutcome::ParentRemoved),
                _ => Err(StoreError::NotFound(path)),
            };
        }
        Err(status_error(response.status, response.text()))
    }
}

#[async_trait]
impl<T: Transport> PermissionStore for RestClient<T> {
    async fn get_permissions(&self, path: &str) -> Result<PermissionSet> {
        let path = normalize_path(path);
        let request = HttpRequest::new(Method::Get, self.route(&format!("passPerm/{path}")));
        self.call_json(request, &path).await
    }

    async fn apply_permissions(&self, path: &str, change: &PermissionChange) -> Result<()> {
        let path = normalize_path(path);
        let body = encode(&ApplyPermissionsRequest::from_change(change))?;
        let request = HttpRequest::new(Method::Post, self.route(&format!("passPerm/{path}")))
            .with_body(body);
        self.call(request, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl<T: Transport> KeyDirectory for RestClient<T> {
    async fn fetch_public_keys(&self, ids: &[KeyId]) -> Result<Vec<KeyRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = HttpRequest::new(Method::Get, self.route("publicKey"))
            .with_query("ids", encode_id_list(ids));
        let map: PublicKeyMap = self.call_json(request, "publicKey").await?;
        Ok(map
            .into_iter()
            .map(|(id, entry)| entry.into_record(id))
            .collect())
    }
}

#[async_trait]
impl<T: Transport> KeyStore for RestClient<T> {
    async fn list_private_keys(&self, user: &str) -> Result<Vec<KeyRecord>> {
        let request = HttpRequest::new(Method::Get, self.key_route(user, KeyKind::Private, None));
        let list: PrivateKeyList = self.call_json(request, user).await?;
        list.into_iter()
            .map(|entry| {
                let id = entry.key.ok_or_else(|| {
                    StoreError::InvalidData("private key entry without a key id".into())
                })?;
                Ok(entry.into_record(id))
            })
            .collect()
    }

    async fn list_public_keys(&self, user: &str) -> Result<Vec<KeyRecord>> {
        let request = HttpRequest::new(Method::Get, self.key_route(user, KeyKind::Public, None));
        let map: PublicKeyMap = self.call_json(request, user).await?;
        Ok(map
            .into_iter()
            .map(|(id, entry)| entry.into_record(id))
            .collect())
    }

    async fn store_private_key(
        &self,
        user: &str,
        id: KeyId,
        body: &[u8],
        mode: WriteMode,
    ) -> Result<()> {
        let method = match mode {
            WriteMode::Create => Method::Post,
            WriteMode::Replace => Method::Put,
        };
        let request = HttpRequest::new(method, self.key_route(user, KeyKind::Private, Some(id)))
            .with_body(Bytes::copy_from_slice(body));
        self.call(request, &format!("private key {id}")).await?;
        Ok(())
    }

    async fn store_public_key(&self, user: &str, id: KeyId, body: &[u8]) -> Result<()> {
        let request =
            HttpRequest::new(Method::Post, self.key_route(user, KeyKind::Public, Some(id)))
                .with_body(Bytes::copy_from_slice(body));
        self.call(request, &format!("public key {id}")).await?;
        Ok(())
    }

    async fn delete_key(&self, user: &str, kind: KeyKind, id: KeyId) -> Result<()> {
        let request = HttpRequest::new(Method::Delete, self.key_route(user, kind, Some(id)));
        self.call(request, &format!("key {id}")).await?;
        Ok(())
    }
}
