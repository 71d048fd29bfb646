//! Key material.
//!
//! A key is an OpenPGP certificate: an EdDSA primary that certifies the user
//! id, plus one or more ECDH (Curve25519) subkeys flagged for encryption.
//! Private keys are transferable secret keys whose secrets are protected
//! with the standard S2K passphrase scheme, so keys exported by other
//! OpenPGP tools load unchanged.
//!
//! The encoding a key was loaded from is kept. Unlocking decrypts the
//! secrets in memory only; [`KeyMaterial::to_bytes`] still returns the
//! protected form.

use bytes::Bytes;
use sequoia_openpgp as openpgp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use zeroize::Zeroizing;

use openpgp::cert::{CertBuilder, CipherSuite};
use openpgp::crypto::{KeyPair, Password};
use openpgp::packet::key::{Key4, PrimaryRole, SecretParts, SubordinateRole};
use openpgp::packet::signature::SignatureBuilder;
use openpgp::packet::{Key, Signature, UserID};
use openpgp::parse::Parse;
use openpgp::policy::StandardPolicy;
use openpgp::serialize::SerializeInto;
use openpgp::serialize::stream::Recipient;
use openpgp::types::{Curve, HashAlgorithm, KeyFlags, SignatureType, SymmetricAlgorithm};
use openpgp::{Cert, Fingerprint, Packet};

use crate::error::{CoreError, Result};
use crate::keyid::KeyId;

pub(crate) const POLICY: &StandardPolicy = &StandardPolicy::new();

/// Whether a key carries secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Public,
    Private,
}

/// Public summary of one encryption subkey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentKey {
    key_id: KeyId,
    fingerprint: Fingerprint,
    created: u32,
}

impl ComponentKey {
    pub fn key_id(&self) -> KeyId {
        self.key_id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Creation time in seconds since the epoch.
    pub fn created(&self) -> u32 {
        self.created
    }
}

#[derive(Clone)]
struct Encoding {
    binary: Bytes,
    armored: Arc<str>,
}

impl Encoding {
    fn of(cert: &Cert) -> Result<Self> {
        let (binary, armored) = if cert.is_tsk() {
            (cert.as_tsk().to_vec(), cert.as_tsk().armored().to_vec())
        } else {
            (cert.to_vec(), cert.armored().to_vec())
        };
        let armored = String::from_utf8(armored.map_err(malformed)?).map_err(malformed)?;
        Ok(Self {
            binary: Bytes::from(binary.map_err(malformed)?),
            armored: armored.into(),
        })
    }
}

/// A parsed key, public or private.
///
/// Cloning is cheap relative to parsing; the keyring shares instances behind
/// `Arc`. Unlocking produces a new value and leaves the original untouched.
#[derive(Clone)]
pub struct KeyMaterial {
    cert: Cert,
    kind: KeyKind,
    user_id: String,
    subkeys: Vec<ComponentKey>,
    encryption: usize,
    encoded: Encoding,
    public: Encoding,
}

impl KeyMaterial {
    /// Generate a fresh private key with one encryption subkey.
    pub fn generate(user_id: &str) -> Result<Self> {
        let (cert, _revocation) = CertBuilder::new()
            .set_cipher_suite(CipherSuite::Cv25519)
            .add_userid(user_id)
            .add_transport_encryption_subkey()
            .generate()
            .map_err(malformed)?;
        Self::from_cert(cert)
    }

    /// Derive a private key deterministically from a seed.
    ///
    /// Key ids and fingerprints depend only on `seed` and `created`.
    /// Signatures carry a random salt, so encodings differ between calls.
    pub fn from_seed(user_id: &str, seed: &[u8; 32], created: u32) -> Result<Self> {
        let at = system_time(created);
        let signing_seed = Zeroizing::new(blake3::derive_key("passcrypt-primary-seed-v1", seed));
        let encryption_seed =
            Zeroizing::new(blake3::derive_key("passcrypt-subkey-seed-v1", seed));

        let primary: Key<SecretParts, PrimaryRole> =
            Key4::<SecretParts, PrimaryRole>::import_secret_ed25519(&signing_seed[..], at)
                .map_err(malformed)?
                .into();
        let subkey: Key<SecretParts, SubordinateRole> =
            Key4::<SecretParts, SubordinateRole>::import_secret_cv25519(
                &encryption_seed[..],
                HashAlgorithm::SHA256,
                SymmetricAlgorithm::AES256,
                at,
            )
            .map_err(malformed)?
            .into();

        let mut signer = primary.clone().into_keypair().map_err(malformed)?;
        let stub = Cert::from_packets(std::iter::once(Packet::from(primary.clone())))
            .map_err(malformed)?;

        let user_id = UserID::from(user_id);
        let certification = SignatureBuilder::new(SignatureType::PositiveCertification)
            .set_signature_creation_time(at)
            .and_then(|b| b.set_key_flags(KeyFlags::empty().set_certification().set_signing()))
            .and_then(|b| user_id.bind(&mut signer, &stub, b))
            .map_err(malformed)?;
        let binding = bind_encryption_subkey(&subkey, &mut signer, &stub, at)?;

        let packets: Vec<Packet> = vec![
            primary.into(),
            user_id.into(),
            certification.into(),
            subkey.into(),
            binding.into(),
        ];
        Self::from_cert(Cert::from_packets(packets.into_iter()).map_err(malformed)?)
    }

    /// Parse armored or binary key material.
    ///
    /// Accepts any single OpenPGP certificate, such as the output of
    /// `gpg --export` or `gpg --export-secret-keys`, with or without armor.
    pub fn parse(data: &[u8]) -> Result<Self> {
        Self::from_cert(Cert::from_bytes(data).map_err(malformed)?)
    }

    /// Parse an armored key block.
    pub fn from_armored(text: &str) -> Result<Self> {
        Self::parse(text.as_bytes())
    }

    fn from_cert(cert: Cert) -> Result<Self> {
        let encoded = Encoding::of(&cert)?;
        let public = if cert.is_tsk() {
            Encoding::of(&cert.clone().strip_secret_key_material())?
        } else {
            encoded.clone()
        };
        Self::assemble(cert, encoded, public)
    }

    fn assemble(cert: Cert, encoded: Encoding, public: Encoding) -> Result<Self> {
        let at = reference_time(&cert);
        let valid = cert.with_policy(POLICY, at).map_err(malformed)?;
        let user_id = valid
            .primary_userid()
            .map(|uid| String::from_utf8_lossy(uid.userid().value()).into_owned())
            .map_err(malformed)?;

        let subkeys: Vec<ComponentKey> = valid
            .keys()
            .subkeys()
            .supported()
            .alive()
            .revoked(false)
            .for_transport_encryption()
            .map(|ka| ComponentKey {
                key_id: KeyId::from(&ka.key().keyid()),
                fingerprint: ka.key().fingerprint(),
                created: unix_secs(ka.key().creation_time()),
            })
            .collect();

        // Newest wins; among equals, the last one bound.
        let encryption = subkeys
            .iter()
            .enumerate()
            .max_by_key(|(index, s)| (s.created, *index))
            .map(|(index, _)| index)
            .ok_or_else(|| CoreError::MalformedKey("key has no encryption subkey".into()))?;

        let kind = if cert.is_tsk() {
            KeyKind::Private
        } else {
            KeyKind::Public
        };
        Ok(Self {
            cert,
            kind,
            user_id,
            subkeys,
            encryption,
            encoded,
            public,
        })
    }

    /// The binary encoding this key was loaded from or built as.
    ///
    /// For an unlocked key this is still the protected encoding.
    pub fn to_bytes(&self) -> Bytes {
        self.encoded.binary.clone()
    }

    pub fn to_armored(&self) -> String {
        self.encoded.armored.to_string()
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn is_private(&self) -> bool {
        self.kind == KeyKind::Private
    }

    /// Whether every secret is available in the clear.
    pub fn is_unlocked(&self) -> bool {
        self.is_private()
            && self
                .cert
                .keys()
                .secret()
                .all(|ka| !ka.key().secret().is_encrypted())
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.cert.fingerprint()
    }

    pub fn primary_key_id(&self) -> KeyId {
        KeyId::from(&self.cert.keyid())
    }

    /// Every id this key answers to: the primary first, then subkeys.
    pub fn key_ids(&self) -> Vec<KeyId> {
        self.cert
            .keys()
            .map(|ka| KeyId::from(&ka.key().keyid()))
            .collect()
    }

    pub fn has_key_id(&self, id: KeyId) -> bool {
        self.cert
            .keys()
            .any(|ka| KeyId::from(&ka.key().keyid()) == id)
    }

    /// Usable encryption subkeys, in certificate order.
    pub fn subkeys(&self) -> &[ComponentKey] {
        &self.subkeys
    }

    /// The subkey new messages are encrypted to: the newest one.
    pub fn encryption_key(&self) -> &ComponentKey {
        &self.subkeys[self.encryption]
    }

    pub fn encryption_key_id(&self) -> KeyId {
        self.encryption_key().key_id()
    }

    /// Strip all secret material.
    pub fn to_public(&self) -> Self {
        Self {
            cert: self.cert.clone().strip_secret_key_material(),
            kind: KeyKind::Public,
            user_id: self.user_id.clone(),
            subkeys: self.subkeys.clone(),
            encryption: self.encryption,
            encoded: self.public.clone(),
            public: self.public.clone(),
        }
    }

    /// Decrypt every protected secret with `passphrase`.
    ///
    /// Returns a new unlocked instance; `self` is left as it was. An already
    /// unlocked key is returned as a clone.
    pub fn unlock(&self, passphrase: &[u8]) -> Result<Self> {
        self.require_private()?;
        if self.is_unlocked() {
            return Ok(self.clone());
        }

        let password = Password::from(passphrase.to_vec());
        let primary = self.cert.fingerprint();
        let mut packets = Vec::new();
        for ka in self.cert.keys().secret() {
            let key = ka.key().clone();
            if !key.secret().is_encrypted() {
                continue;
            }
            let is_primary = key.fingerprint() == primary;
            let key = key
                .decrypt_secret(&password)
                .map_err(|_| CoreError::InvalidPassphrase)?;
            packets.push(secret_packet(key, is_primary));
        }
        let cert = self.cert.clone().insert_packets(packets).map_err(malformed)?;

        Ok(Self {
            cert,
            ..self.clone()
        })
    }

    /// Seal every secret under `passphrase`, producing a new encoding.
    pub fn protect(&self, passphrase: &[u8]) -> Result<Self> {
        self.require_unlocked()?;
        let password = Password::from(passphrase.to_vec());
        let primary = self.cert.fingerprint();
        let mut packets = Vec::new();
        for ka in self.cert.keys().secret() {
            let key = ka.key().clone();
            let is_primary = key.fingerprint() == primary;
            let key = key.encrypt_secret(&password).map_err(malformed)?;
            packets.push(secret_packet(key, is_primary));
        }
        Self::from_cert(self.cert.clone().insert_packets(packets).map_err(malformed)?)
    }

    /// Add a fresh encryption subkey that becomes the encryption target.
    ///
    /// The key must be unlocked. The result is not passphrase protected; call
    /// [`KeyMaterial::protect`] before storing it.
    pub fn add_encryption_subkey(&self) -> Result<Self> {
        self.require_unlocked()?;
        let primary = self
            .cert
            .primary_key()
            .key()
            .clone()
            .parts_into_secret()
            .map_err(malformed)?;
        let mut signer = primary.into_keypair().map_err(malformed)?;

        let newest = self
            .cert
            .keys()
            .map(|ka| unix_secs(ka.key().creation_time()))
            .max()
            .unwrap_or(0);
        let at = system_time(now_secs().max(newest.saturating_add(1)));

        let mut fresh = Key4::<SecretParts, SubordinateRole>::generate_ecc(false, Curve::Cv25519)
            .map_err(malformed)?;
        fresh.set_creation_time(at).map_err(malformed)?;
        let subkey: Key<SecretParts, SubordinateRole> = fresh.into();
        let binding = bind_encryption_subkey(&subkey, &mut signer, &self.cert, at)?;

        let cert = self
            .cert
            .clone()
            .insert_packets(vec![Packet::from(subkey), binding.into()])
            .map_err(malformed)?;
        Self::from_cert(cert)
    }

    /// Recipient entry for the current encryption subkey.
    pub(crate) fn encryption_recipient(&self) -> Option<Recipient<'_>> {
        let target = self.encryption_key_id();
        self.cert
            .keys()
            .with_policy(POLICY, reference_time(&self.cert))
            .supported()
            .for_transport_encryption()
            .find(|ka| KeyId::from(&ka.key().keyid()) == target)
            .map(Into::into)
    }

    /// Key pairs for every secret held in the clear.
    pub(crate) fn decryption_keys(&self) -> Result<Vec<(KeyId, Fingerprint, KeyPair)>> {
        self.require_unlocked()?;
        self.cert
            .keys()
            .unencrypted_secret()
            .map(|ka| {
                let key = ka.key();
                let pair = key
                    .clone()
                    .into_keypair()
                    .map_err(|e| CoreError::Decryption(e.to_string()))?;
                Ok((KeyId::from(&key.keyid()), key.fingerprint(), pair))
            })
            .collect()
    }

    fn require_private(&self) -> Result<()> {
        if self.is_private() {
            Ok(())
        } else {
            Err(CoreError::PublicKeyOnly(self.primary_key_id()))
        }
    }

    fn require_unlocked(&self) -> Result<()> {
        self.require_private()?;
        if self.is_unlocked() {
            Ok(())
        } else {
            Err(CoreError::KeyLocked(self.primary_key_id()))
        }
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("kind", &self.kind)
            .field("user_id", &self.user_id)
            .field("key_ids", &self.key_ids())
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

fn bind_encryption_subkey(
    subkey: &Key<SecretParts, SubordinateRole>,
    signer: &mut KeyPair,
    cert: &Cert,
    at: SystemTime,
) -> Result<Signature> {
    let flags = KeyFlags::empty()
        .set_transport_encryption()
        .set_storage_encryption();
    SignatureBuilder::new(SignatureType::SubkeyBinding)
        .set_signature_creation_time(at)
        .and_then(|b| b.set_key_flags(flags))
        .and_then(|b| subkey.bind(signer, cert, b))
        .map_err(malformed)
}

fn secret_packet(
    key: Key<SecretParts, openpgp::packet::key::UnspecifiedRole>,
    primary: bool,
) -> Packet {
    if primary {
        key.role_into_primary().into()
    } else {
        key.role_into_subordinate().into()
    }
}

/// Policy time for a certificate: now, or later if a component is dated
/// ahead of the local clock.
fn reference_time(cert: &Cert) -> SystemTime {
    let now = SystemTime::now();
    cert.keys()
        .map(|ka| ka.key().creation_time())
        .max()
        .map_or(now, |newest| newest.max(now))
}

fn malformed(e: impl fmt::Display) -> CoreError {
    CoreError::MalformedKey(e.to_string())
}

fn system_time(secs: u32) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(u64::from(secs))
}

fn unix_secs(time: SystemTime) -> u32 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u32::try_from(d.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn now_secs() -> u32 {
    unix_secs(SystemTime::now())
}
