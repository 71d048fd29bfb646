//! Multi-recipient encryption.
//!
//! A random session key encrypts the payload once inside an integrity
//! protected data packet; each recipient gets the session key wrapped to
//! its encryption subkey in a PKESK packet. Output is plain OpenPGP and is
//! readable by any conforming implementation.

use sequoia_openpgp as openpgp;
use std::io::{Read, Write};

use openpgp::crypto::{KeyPair, SessionKey};
use openpgp::packet::{PKESK, SKESK};
use openpgp::parse::stream::{
    DecryptionHelper, DecryptorBuilder, MessageStructure, VerificationHelper,
};
use openpgp::parse::Parse;
use openpgp::serialize::stream::{Encryptor2, LiteralWriter, Message, Recipient};
use openpgp::types::SymmetricAlgorithm;
use openpgp::{Cert, Fingerprint, KeyHandle};

use crate::error::{CoreError, Result};
use crate::key::{KeyMaterial, POLICY};
use crate::keyid::KeyId;
use crate::message::EncryptedObject;

/// Stateless encrypt/decrypt over key handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct CryptoEngine;

impl CryptoEngine {
    pub fn new() -> Self {
        Self
    }

    /// Encrypt `plaintext` so that every key in `recipients` can read it.
    ///
    /// Recipients must be public keys. Each key is addressed through its
    /// current encryption subkey; repeated keys are encrypted to once.
    pub fn encrypt<'a, I>(&self, plaintext: &[u8], recipients: I) -> Result<EncryptedObject>
    where
        I: IntoIterator<Item = &'a KeyMaterial>,
    {
        let mut ids: Vec<KeyId> = Vec::new();
        let mut targets: Vec<Recipient<'a>> = Vec::new();
        for key in recipients {
            if key.is_private() {
                return Err(CoreError::Encryption(format!(
                    "recipient {} is not a public key",
                    key.primary_key_id()
                )));
            }
            let id = key.encryption_key_id();
            if ids.contains(&id) {
                continue;
            }
            let target = key.encryption_recipient().ok_or_else(|| {
                CoreError::Encryption(format!(
                    "key {} has no usable encryption subkey",
                    key.primary_key_id()
                ))
            })?;
            ids.push(id);
            targets.push(target);
        }
        if targets.is_empty() {
            return Err(CoreError::Encryption("no recipients".into()));
        }

        let mut sink = Vec::with_capacity(plaintext.len() + targets.len() * 120 + 64);
        {
            let message = Message::new(&mut sink);
            let message = Encryptor2::for_recipients(message, targets)
                .build()
                .map_err(encryption_error)?;
            let mut literal = LiteralWriter::new(message)
                .build()
                .map_err(encryption_error)?;
            literal
                .write_all(plaintext)
                .map_err(|e| CoreError::Encryption(e.to_string()))?;
            literal.finalize().map_err(encryption_error)?;
        }

        Ok(EncryptedObject::from_parts(sink, ids))
    }

    /// Decrypt with an unlocked private key.
    ///
    /// The key must hold the secret for one of the header recipients. `key`
    /// is never modified.
    pub fn decrypt(&self, obj: &EncryptedObject, key: &KeyMaterial) -> Result<Vec<u8>> {
        if !key.is_private() {
            return Err(CoreError::Decryption(format!(
                "key {} has no secret material",
                key.primary_key_id()
            )));
        }
        if !key.is_unlocked() {
            return Err(CoreError::KeyLocked(key.primary_key_id()));
        }
        let addressed = obj
            .recipients()
            .iter()
            .any(|id| id.is_wildcard() || key.has_key_id(*id));
        if !addressed {
            return Err(CoreError::Decryption(format!(
                "key {} is not a recipient",
                key.primary_key_id()
            )));
        }

        let helper = Helper {
            keys: key.decryption_keys()?,
        };
        let mut decryptor = DecryptorBuilder::from_bytes(obj.as_bytes())
            .and_then(|builder| builder.with_policy(POLICY, None, helper))
            .map_err(decryption_error)?;

        let mut plaintext = Vec::new();
        decryptor
            .read_to_end(&mut plaintext)
            .map_err(|e| CoreError::Decryption(e.to_string()))?;
        Ok(plaintext)
    }

    /// Recipients from the header, without decrypting.
    pub fn list_recipients(&self, obj: &EncryptedObject) -> Vec<KeyId> {
        obj.recipients().to_vec()
    }
}

fn encryption_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::Encryption(e.to_string())
}

fn decryption_error(e: impl std::fmt::Display) -> CoreError {
    CoreError::Decryption(e.to_string())
}

/// Hands the key's clear secrets to the streaming decryptor.
struct Helper {
    keys: Vec<(KeyId, Fingerprint, KeyPair)>,
}

impl VerificationHelper for Helper {
    fn get_certs(&mut self, _ids: &[KeyHandle]) -> openpgp::Result<Vec<Cert>> {
        Ok(Vec::new())
    }

    fn check(&mut self, _structure: MessageStructure) -> openpgp::Result<()> {
        // Messages are encrypted, not signed.
        Ok(())
    }
}

impl DecryptionHelper for Helper {
    fn decrypt<D>(
        &mut self,
        pkesks: &[PKESK],
        _skesks: &[SKESK],
        sym_algo: Option<SymmetricAlgorithm>,
        mut decrypt: D,
    ) -> openpgp::Result<Option<Fingerprint>>
    where
        D: FnMut(SymmetricAlgorithm, &SessionKey) -> bool,
    {
        for pkesk in pkesks {
            let recipient = KeyId::from(pkesk.recipient());
            for (id, fingerprint, pair) in self.keys.iter_mut() {
                if !recipient.is_wildcard() && recipient != *id {
                    continue;
                }
                if let Some((algo, session_key)) = pkesk.decrypt(pair, sym_algo) {
                    if decrypt(algo, &session_key) {
                        return Ok(Some(fingerprint.clone()));
                    }
                }
            }
        }
        Err(openpgp::Error::MissingSessionKey("no session key could be recovered".into()).into())
    }
}
