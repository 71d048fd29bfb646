//! REST request and response bodies.
//!
//! JSON on the wire. Ciphertexts and key bodies travel base64 encoded; key
//! ids travel in canonical form and are canonicalized again on the way in.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use passcrypt_core::{EncryptedObject, KeyId};
use passcrypt_store::{DirEntry, FileRecord, KeyRecord, PassEntry, PermissionChange};

use crate::error::{ApiError, Result};

/// Default commit message for writes that do not carry one.
pub const DEFAULT_COMMIT_MESSAGE: &str = "Update passwords";

/// Binary data carried as a base64 string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Base64Blob(pub Bytes);

impl Base64Blob {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn into_inner(self) -> Bytes {
        self.0
    }
}

impl Serialize for Base64Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Base64Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.trim())
            .map(|bytes| Self(Bytes::from(bytes)))
            .map_err(serde::de::Error::custom)
    }
}

/// `GET /pass/{path}` on a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirResponse {
    pub children: Vec<DirEntry>,
}

/// `GET /pass/{path}` on a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: String,
    pub contents: Base64Blob,
    pub recipients: Vec<KeyId>,
}

/// Either shape of `GET /pass/{path}`, decided once at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PassResponse {
    Dir(DirResponse),
    File(FileResponse),
}

impl PassResponse {
    pub fn from_entry(entry: &PassEntry) -> Self {
        match entry {
            PassEntry::Dir(children) => PassResponse::Dir(DirResponse {
                children: children.clone(),
            }),
            PassEntry::File(record) => PassResponse::File(FileResponse {
                name: Some(record.name().to_string()),
                path: record.path.clone(),
                contents: Base64Blob(record.object.to_bytes()),
                recipients: record.recipients.clone(),
            }),
        }
    }

    /// Convert to the tagged entry, checking declared recipients against
    /// the ciphertext header.
    pub fn into_entry(self) -> Result<PassEntry> {
        match self {
            PassResponse::Dir(dir) => Ok(PassEntry::Dir(dir.children)),
            PassResponse::File(file) => {
                let object = EncryptedObject::parse(file.contents.into_inner())?;
                let record = FileRecord {
                    path: file.path,
                    object,
                    recipients: file.recipients,
                };
                record
                    .verify_recipients()
                    .map_err(|e| ApiError::Contract(e.to_string()))?;
                Ok(PassEntry::File(record))
            }
        }
    }
}

/// `POST /pass/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFileRequest {
    pub path: String,
    pub contents: Base64Blob,
    #[serde(default)]
    pub message: String,
}

impl StoreFileRequest {
    pub fn commit_message(&self) -> &str {
        if self.message.is_empty() {
            DEFAULT_COMMIT_MESSAGE
        } else {
            &self.message
        }
    }
}

/// `POST /passPerm/{path}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyPermissionsRequest {
    pub access: Vec<KeyId>,
    pub files: BTreeMap<String, Base64Blob>,
}

impl ApplyPermissionsRequest {
    pub fn from_change(change: &PermissionChange) -> Self {
        Self {
            access: change.access.clone(),
            files: change
                .files
                .iter()
                .map(|(path, obj)| (path.clone(), Base64Blob(obj.to_bytes())))
                .collect(),
        }
    }

    pub fn into_change(self) -> Result<PermissionChange> {
        let files = self
            .files
            .into_iter()
            .map(|(path, blob)| Ok((path, EncryptedObject::parse(blob.into_inner())?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(PermissionChange {
            access: self.access,
            files,
        })
    }
}

/// A key as served by the key endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyId>,
    #[serde(default)]
    pub user: Option<String>,
    pub armored: Base64Blob,
}

impl KeyEntry {
    pub fn from_record(record: &KeyRecord) -> Self {
        Self {
            key: Some(record.key_id),
            user: record.user.clone(),
            armored: Base64Blob(record.armored.clone()),
        }
    }

    /// The id comes from the map key when the entry does not repeat it.
    pub fn into_record(self, fallback: KeyId) -> KeyRecord {
        KeyRecord {
            key_id: self.key.unwrap_or(fallback),
            user: self.user,
            armored: self.armored.into_inner(),
        }
    }
}

/// `GET /publicKey` and `GET /user/{user}/publicKey`.
pub type PublicKeyMap = BTreeMap<KeyId, KeyEntry>;

/// `GET /user/{user}/privateKey`.
pub type PrivateKeyList = Vec<KeyEntry>;

/// Body of a `404` reply to `DELETE /pass/{path}` when the parent went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub parent_removed: bool,
}

/// Encode ids for the `ids` query parameter.
pub fn encode_id_list(ids: &[KeyId]) -> String {
    ids.iter()
        .map(KeyId::canonical)
        .collect::<Vec<_>>()
        .join(",")
}

/// Decode the `ids` query parameter. Empty items are skipped.
pub fn decode_id_list(text: &str) -> Result<Vec<KeyId>> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| KeyId::parse(s).map_err(ApiError::from))
        .collect()
}
