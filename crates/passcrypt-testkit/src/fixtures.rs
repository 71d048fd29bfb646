//! Test fixtures and helpers.
//!
//! A handful of users, each with one deterministic key, logged in against a
//! shared in-memory backend.

use std::sync::Arc;

use passcrypt::{KeyId, KeyMaterial, UserIdentity, Vault, VaultConfig};
use passcrypt_store::MemoryBackend;

/// Creation time stamped on every fixture key.
pub const FIXTURE_CREATED: u32 = 1_700_000_000;

/// A user with a deterministic key.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub name: String,
    pub passphrase: String,
    /// Unprotected private key.
    pub key: KeyMaterial,
}

impl TestUser {
    /// Derive a user from a one-byte seed. The passphrase is `"{name} pw"`.
    pub fn new(name: &str, seed: u8) -> Self {
        Self {
            name: name.to_string(),
            passphrase: format!("{name} pw"),
            key: KeyMaterial::from_seed(name, &[seed; 32], FIXTURE_CREATED)
                .expect("fixture key builds"),
        }
    }

    pub fn id(&self) -> KeyId {
        self.key.primary_key_id()
    }

    pub fn public(&self) -> KeyMaterial {
        self.key.to_public()
    }

    /// The key as it would be uploaded: protected by its passphrase.
    pub fn protected(&self) -> KeyMaterial {
        self.key
            .protect(self.passphrase.as_bytes())
            .expect("fixture key protects")
    }
}

/// Several logged-in users sharing one backend.
pub struct VaultFixture {
    pub backend: Arc<MemoryBackend>,
    users: Vec<(TestUser, Vault<MemoryBackend>)>,
}

impl VaultFixture {
    /// Log in every named user, upload their keys and unlock them.
    pub async fn new(names: &[&str]) -> passcrypt::Result<Self> {
        let backend = Arc::new(MemoryBackend::new());
        let mut users = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let user = TestUser::new(name, i as u8 + 1);
            let vault = Vault::open(backend.clone(), UserIdentity::new(*name), Self::config()).await?;
            vault.add_key(&user.protected()).await?;
            vault.unlock(user.id(), &user.passphrase).await?;
            users.push((user, vault));
        }
        Ok(Self { backend, users })
    }

    /// Vault settings used by every fixture session.
    pub fn config() -> VaultConfig {
        VaultConfig::default()
    }

    pub fn user(&self, name: &str) -> &TestUser {
        &self.entry(name).0
    }

    pub fn vault(&self, name: &str) -> &Vault<MemoryBackend> {
        &self.entry(name).1
    }

    pub fn id(&self, name: &str) -> KeyId {
        self.user(name).id()
    }

    /// Seed an access list for `path` naming the given users.
    pub fn share(&self, path: &str, names: &[&str]) {
        let ids = names.iter().map(|name| self.id(name)).collect();
        self.backend.set_access(path, ids);
    }

    /// A second, fresh session for `name`: keys loaded but locked.
    pub async fn relogin(&self, name: &str) -> passcrypt::Result<Vault<MemoryBackend>> {
        Vault::open(self.backend.clone(), UserIdentity::new(name), Self::config()).await
    }

    fn entry(&self, name: &str) -> &(TestUser, Vault<MemoryBackend>) {
        self.users
            .iter()
            .find(|(user, _)| user.name == name)
            .unwrap_or_else(|| panic!("no fixture user named {name}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passcrypt::Authorization;

    #[test]
    fn test_users_are_deterministic() {
        let a1 = TestUser::new("alice", 1);
        let a2 = TestUser::new("alice", 1);
        let b = TestUser::new("bob", 2);
        assert_eq!(a1.id(), a2.id());
        assert_ne!(a1.id(), b.id());
        assert!(!a1.public().is_private());
        assert!(a1.protected().is_private());
        assert!(!a1.protected().is_unlocked());
    }

    #[tokio::test]
    async fn test_fixture_users_can_share() {
        let fixture = VaultFixture::new(&["alice", "bob"]).await.unwrap();
        fixture.share("team", &["alice"]);

        let alice = fixture.vault("alice");
        alice.write_file("team/wifi.gpg", b"hunter2", None).await.unwrap();
        alice
            .grant("team", fixture.id("bob"), Authorization::Session)
            .await
            .unwrap();

        let bytes = fixture.vault("bob").read_file("team/wifi.gpg").await.unwrap();
        assert_eq!(bytes.as_slice(), b"hunter2");
    }

    #[tokio::test]
    async fn test_relogin_starts_locked() {
        let fixture = VaultFixture::new(&["alice"]).await.unwrap();
        fixture.share("team", &["alice"]);
        fixture
            .vault("alice")
            .write_file("team/a.gpg", b"x", None)
            .await
            .unwrap();

        let again = fixture.relogin("alice").await.unwrap();
        let err = again.read_file("team/a.gpg").await.unwrap_err();
        assert!(err.needs_passphrase());
    }
}
