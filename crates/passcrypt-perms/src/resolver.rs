//! Recipient resolution.
//!
//! Maps key ids to usable keys: private keys for decrypting a file, public
//! keys for encrypting one. Public keys not held locally come from the
//! directory in a single batched request.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::debug;

use passcrypt_core::{EncryptedObject, KeyId, KeyMaterial, KeyRing, PrivateKeyIndex};
use passcrypt_store::KeyDirectory;

use crate::error::{PermsError, Result};

/// Resolves key ids against a session keyring and a key directory.
#[derive(Debug, Clone)]
pub struct RecipientResolver {
    keyring: Arc<KeyRing>,
}

impl RecipientResolver {
    pub fn new(keyring: Arc<KeyRing>) -> Self {
        Self { keyring }
    }

    pub fn keyring(&self) -> &Arc<KeyRing> {
        &self.keyring
    }

    /// The private key for the first header recipient present in `index`.
    pub fn resolve_decryption_key(
        &self,
        obj: &EncryptedObject,
        index: &PrivateKeyIndex,
    ) -> Option<Arc<KeyMaterial>> {
        obj.recipients()
            .iter()
            .find_map(|id| index.get(id))
            .cloned()
    }

    /// Public keys for `ids`, in input order with duplicates removed.
    ///
    /// Ids unknown locally are fetched in one request and cached in the
    /// keyring. A fetched key that does not parse, or does not answer to the
    /// requested id, counts as missing. Fails without a partial result if
    /// anything is missing.
    pub async fn resolve_public_keys<D>(&self, ids: &[KeyId], directory: &D) -> Result<Vec<KeyMaterial>>
    where
        D: KeyDirectory + ?Sized,
    {
        let mut seen = BTreeSet::new();
        let ids: Vec<KeyId> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let mut resolved: HashMap<KeyId, KeyMaterial> = HashMap::new();
        let mut unknown = Vec::new();
        for id in &ids {
            match self.keyring.find_by_key_id(*id) {
                Some(key) => {
                    resolved.insert(*id, key.to_public());
                }
                None => unknown.push(*id),
            }
        }

        if !unknown.is_empty() {
            debug!(count = unknown.len(), "fetching public keys");
            let records = directory.fetch_public_keys(&unknown).await?;
            for record in records {
                let key = match KeyMaterial::parse(&record.armored) {
                    Ok(key) => key,
                    Err(e) => {
                        debug!(key = %record.key_id, error = %e, "ignoring unparseable public key");
                        continue;
                    }
                };
                let answers: Vec<KeyId> = unknown
                    .iter()
                    .copied()
                    .filter(|id| key.has_key_id(*id))
                    .collect();
                if answers.is_empty() {
                    debug!(key = %record.key_id, "ignoring public key with mismatched id");
                    continue;
                }
                let key = self.keyring.cache_public(&key);
                for id in answers {
                    resolved.entry(id).or_insert_with(|| key.to_public());
                }
            }
        }

        let missing: Vec<KeyId> = ids
            .iter()
            .copied()
            .filter(|id| !resolved.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(PermsError::MissingKeys(missing));
        }

        Ok(ids
            .iter()
            .filter_map(|id| resolved.remove(id))
            .collect())
    }
}
