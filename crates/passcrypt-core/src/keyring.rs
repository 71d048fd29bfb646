//! Session keyring.
//!
//! Holds the session's private keys (locked or unlocked) and the public keys
//! learned from the key directory. Every component id of a key resolves to
//! the same entry, and a private key shadows the public copy of itself.
//!
//! Built fresh for each session and never written to disk.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use sequoia_openpgp::Fingerprint;

use crate::error::Result;
use crate::key::{KeyKind, KeyMaterial};
use crate::keyid::KeyId;

/// Private keys by every id they answer to.
pub type PrivateKeyIndex = HashMap<KeyId, Arc<KeyMaterial>>;

/// Thread-safe keyring with an unlocked-key cache.
pub struct KeyRing {
    inner: RwLock<KeyRingInner>,
}

#[derive(Default)]
struct KeyRingInner {
    /// Loaded keys, one entry per key and kind.
    keys: BTreeMap<(Fingerprint, KeyKind), Arc<KeyMaterial>>,

    /// Id lookup; private entries win over public ones.
    by_id: HashMap<KeyId, Arc<KeyMaterial>>,

    /// Cached private index, dropped whenever the key list changes.
    private_index: Option<Arc<PrivateKeyIndex>>,

    /// Unlocked private keys by primary fingerprint.
    unlocked: HashMap<Fingerprint, Arc<KeyMaterial>>,
}

impl KeyRingInner {
    fn rebuild(&mut self) {
        self.by_id.clear();
        // Public entries first so that private entries overwrite them.
        let ordered = self
            .keys
            .iter()
            .filter(|((_, kind), _)| *kind == KeyKind::Public)
            .chain(
                self.keys
                    .iter()
                    .filter(|((_, kind), _)| *kind == KeyKind::Private),
            );
        for (_, key) in ordered {
            for id in key.key_ids() {
                self.by_id.insert(id, Arc::clone(key));
            }
        }
        self.private_index = None;
    }
}

impl KeyRing {
    /// Create an empty keyring.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(KeyRingInner::default()),
        }
    }

    /// Create a keyring holding `keys`.
    pub fn with_keys(keys: impl IntoIterator<Item = KeyMaterial>) -> Self {
        let ring = Self::new();
        for key in keys {
            ring.insert(key);
        }
        ring
    }

    /// Add or replace a key.
    ///
    /// Replacing a private key drops its unlocked copy, since the new
    /// material may carry different subkeys.
    pub fn insert(&self, key: KeyMaterial) -> Arc<KeyMaterial> {
        let key = Arc::new(key);
        let mut inner = self.inner.write().expect("keyring lock poisoned");
        let fingerprint = key.fingerprint();
        let stale = key.is_private()
            && inner
                .unlocked
                .get(&fingerprint)
                .map_or(false, |cached| cached.key_ids() != key.key_ids());
        if stale {
            inner.unlocked.remove(&fingerprint);
        }
        inner
            .keys
            .insert((fingerprint, key.kind()), Arc::clone(&key));
        inner.rebuild();
        key
    }

    /// Remember a public key fetched from the directory.
    ///
    /// Private keys passed here are stored as their public half.
    pub fn cache_public(&self, key: &KeyMaterial) -> Arc<KeyMaterial> {
        if key.is_private() {
            self.insert(key.to_public())
        } else {
            self.insert(key.clone())
        }
    }

    /// Remove every entry for the key that answers to `id`.
    pub fn remove(&self, id: KeyId) -> Option<Arc<KeyMaterial>> {
        let mut inner = self.inner.write().expect("keyring lock poisoned");
        let key = inner.by_id.get(&id).cloned()?;
        let fingerprint = key.fingerprint();
        inner.keys.remove(&(fingerprint.clone(), KeyKind::Public));
        inner.keys.remove(&(fingerprint.clone(), KeyKind::Private));
        inner.unlocked.remove(&fingerprint);
        inner.rebuild();
        Some(key)
    }

    /// Find a key by any of its ids.
    pub fn find_by_key_id(&self, id: KeyId) -> Option<Arc<KeyMaterial>> {
        let inner = self.inner.read().expect("keyring lock poisoned");
        inner.by_id.get(&id).cloned()
    }

    /// Index of the private keys, built at most once per key-list version.
    pub fn private_key_index(&self) -> Arc<PrivateKeyIndex> {
        {
            let inner = self.inner.read().expect("keyring lock poisoned");
            if let Some(index) = &inner.private_index {
                return Arc::clone(index);
            }
        }

        let mut inner = self.inner.write().expect("keyring lock poisoned");
        if let Some(index) = &inner.private_index {
            return Arc::clone(index);
        }
        let mut index = PrivateKeyIndex::new();
        for ((_, kind), key) in &inner.keys {
            if *kind == KeyKind::Private {
                for id in key.key_ids() {
                    index.insert(id, Arc::clone(key));
                }
            }
        }
        let index = Arc::new(index);
        inner.private_index = Some(Arc::clone(&index));
        index
    }

    /// Unlock `key`, caching the result for the rest of the session.
    ///
    /// An unlocked key or an already cached one is returned without touching
    /// the passphrase. Concurrent unlocks of the same key converge on the
    /// first cached value.
    pub fn unlock(&self, key: &KeyMaterial, passphrase: &[u8]) -> Result<Arc<KeyMaterial>> {
        let fingerprint = key.fingerprint();
        if let Some(cached) = self.cached_unlocked(key) {
            return Ok(cached);
        }

        let unlocked = if key.is_unlocked() {
            key.clone()
        } else {
            key.unlock(passphrase)?
        };

        let mut inner = self.inner.write().expect("keyring lock poisoned");
        let entry = inner
            .unlocked
            .entry(fingerprint)
            .or_insert_with(|| Arc::new(unlocked));
        Ok(Arc::clone(entry))
    }

    /// Cache a key that is already unlocked.
    pub fn remember_unlocked(&self, key: Arc<KeyMaterial>) {
        if !key.is_unlocked() {
            return;
        }
        let mut inner = self.inner.write().expect("keyring lock poisoned");
        inner.unlocked.insert(key.fingerprint(), key);
    }

    /// The unlocked copy of the key answering to `id`, if any.
    pub fn unlocked(&self, id: KeyId) -> Option<Arc<KeyMaterial>> {
        let inner = self.inner.read().expect("keyring lock poisoned");
        inner
            .unlocked
            .values()
            .find(|key| key.has_key_id(id))
            .cloned()
    }

    fn cached_unlocked(&self, key: &KeyMaterial) -> Option<Arc<KeyMaterial>> {
        let inner = self.inner.read().expect("keyring lock poisoned");
        inner
            .unlocked
            .get(&key.fingerprint())
            .filter(|cached| cached.key_ids() == key.key_ids())
            .cloned()
    }

    /// Loaded private keys in fingerprint order.
    pub fn private_keys(&self) -> Vec<Arc<KeyMaterial>> {
        self.keys_of_kind(KeyKind::Private)
    }

    /// Loaded public keys in fingerprint order.
    pub fn public_keys(&self) -> Vec<Arc<KeyMaterial>> {
        self.keys_of_kind(KeyKind::Public)
    }

    fn keys_of_kind(&self, wanted: KeyKind) -> Vec<Arc<KeyMaterial>> {
        let inner = self.inner.read().expect("keyring lock poisoned");
        inner
            .keys
            .iter()
            .filter(|((_, kind), _)| *kind == wanted)
            .map(|(_, key)| Arc::clone(key))
            .collect()
    }

    /// Number of loaded keys, counting a key's public and private copies
    /// separately.
    pub fn len(&self) -> usize {
        self.inner.read().expect("keyring lock poisoned").keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every key, including unlocked copies.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("keyring lock poisoned");
        *inner = KeyRingInner::default();
    }
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("keyring lock poisoned");
        f.debug_struct("KeyRing")
            .field("keys", &inner.keys.len())
            .field("unlocked", &inner.unlocked.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn key(seed: u8) -> KeyMaterial {
        KeyMaterial::from_seed(&format!("user{seed}"), &[seed; 32], 1_700_000_000).unwrap()
    }

    fn locked(seed: u8, passphrase: &str) -> KeyMaterial {
        key(seed).protect(passphrase.as_bytes()).unwrap()
    }

    #[test]
    fn test_find_by_any_component_id() {
        let a = key(1);
        let ring = KeyRing::with_keys([a.clone()]);

        for id in a.key_ids() {
            let found = ring.find_by_key_id(id).unwrap();
            assert_eq!(found.fingerprint(), a.fingerprint());
        }
        assert!(ring.find_by_key_id(KeyId::from_u64(42)).is_none());
    }

    #[test]
    fn test_private_shadows_public() {
        let a = key(1);
        let ring = KeyRing::new();
        ring.cache_public(&a);
        assert!(!ring.find_by_key_id(a.primary_key_id()).unwrap().is_private());

        ring.insert(a.clone());
        assert!(ring.find_by_key_id(a.primary_key_id()).unwrap().is_private());
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.public_keys().len(), 1);
        assert_eq!(ring.private_keys().len(), 1);
    }

    #[test]
    fn test_private_index_cached_and_rebuilt() {
        let ring = KeyRing::with_keys([key(1)]);
        let first = ring.private_key_index();
        let second = ring.private_key_index();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);

        let b = key(2);
        ring.insert(b.clone());
        let rebuilt = ring.private_key_index();
        assert!(!Arc::ptr_eq(&first, &rebuilt));
        assert!(rebuilt.contains_key(&b.encryption_key_id()));

        ring.remove(b.primary_key_id());
        assert!(!ring.private_key_index().contains_key(&b.primary_key_id()));
    }

    #[test]
    fn test_public_keys_not_in_private_index() {
        let ring = KeyRing::new();
        ring.cache_public(&key(3));
        assert!(ring.private_key_index().is_empty());
    }

    #[test]
    fn test_unlock_cached_by_fingerprint() {
        let a = locked(1, "pw");
        let ring = KeyRing::with_keys([a.clone()]);

        let first = ring.unlock(&a, b"pw").unwrap();
        assert!(first.is_unlocked());
        assert!(!a.is_unlocked());

        // Cached: the passphrase is not consulted again.
        let second = ring.unlock(&a, b"wrong").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(ring.unlocked(a.encryption_key_id()).is_some());
    }

    #[test]
    fn test_unlock_wrong_passphrase() {
        let a = locked(1, "pw");
        let ring = KeyRing::with_keys([a.clone()]);
        assert!(matches!(
            ring.unlock(&a, b"nope"),
            Err(CoreError::InvalidPassphrase)
        ));
        assert!(ring.unlocked(a.primary_key_id()).is_none());
    }

    #[test]
    fn test_unlock_already_unlocked_key() {
        let a = key(1);
        let ring = KeyRing::new();
        let unlocked = ring.unlock(&a, b"").unwrap();
        assert_eq!(unlocked.to_bytes(), a.to_bytes());
    }

    #[test]
    fn test_concurrent_unlock_is_idempotent() {
        let a = Arc::new(locked(4, "pw"));
        let ring = Arc::new(KeyRing::with_keys([(*a).clone()]));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ring = Arc::clone(&ring);
                let a = Arc::clone(&a);
                std::thread::spawn(move || ring.unlock(&a, b"pw").unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let cached = ring.unlocked(a.primary_key_id()).unwrap();
        for result in results {
            assert_eq!(result.fingerprint(), cached.fingerprint());
        }
    }

    #[test]
    fn test_replacing_key_with_new_subkey_drops_unlocked_copy() {
        let a = key(1);
        let ring = KeyRing::with_keys([a.clone()]);
        ring.unlock(&a, b"").unwrap();

        let extended = a.add_encryption_subkey().unwrap();
        ring.insert(extended.clone());
        assert!(ring.unlocked(extended.encryption_key_id()).is_none());
    }

    #[test]
    fn test_clear() {
        let ring = KeyRing::with_keys([key(1), key(2)]);
        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.private_key_index().is_empty());
    }
}
