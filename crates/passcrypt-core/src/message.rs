//! Encrypted objects.
//!
//! A message is a standard OpenPGP encrypted message: one public-key
//! encrypted session key packet per recipient followed by an integrity
//! protected data packet. Recipients are readable from the header without
//! any key material, whatever packet header format the writer used.

use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use sequoia_openpgp as openpgp;

use openpgp::parse::{PacketParser, PacketParserResult, Parse};
use openpgp::Packet;

use crate::error::{CoreError, Result};
use crate::keyid::KeyId;

/// Immutable ciphertext with its recipient list.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedObject {
    bytes: Bytes,
    recipients: Vec<KeyId>,
}

impl EncryptedObject {
    /// Parse the header of a binary message.
    ///
    /// Session key packets must all precede the single encrypted data
    /// packet. Password-encrypted session keys are skipped.
    pub fn parse(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        let recipients = scan_header(&bytes)?;
        Ok(Self { bytes, recipients })
    }

    pub(crate) fn from_parts(bytes: Vec<u8>, recipients: Vec<KeyId>) -> Self {
        Self {
            bytes: Bytes::from(bytes),
            recipients,
        }
    }

    /// Recipients in header order.
    pub fn recipients(&self) -> &[KeyId] {
        &self.recipients
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Transport encoding.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| CoreError::MalformedMessage(format!("invalid base64: {e}")))?;
        Self::parse(bytes)
    }
}

impl std::fmt::Debug for EncryptedObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedObject")
            .field("len", &self.bytes.len())
            .field("recipients", &self.recipients)
            .finish()
    }
}

fn malformed(e: impl std::fmt::Display) -> CoreError {
    CoreError::MalformedMessage(e.to_string())
}

fn scan_header(bytes: &[u8]) -> Result<Vec<KeyId>> {
    let mut recipients = Vec::new();
    let mut saw_data = false;
    let mut ppr = PacketParser::from_bytes(bytes).map_err(malformed)?;

    while let PacketParserResult::Some(pp) = ppr {
        match &pp.packet {
            Packet::PKESK(pkesk) if !saw_data => recipients.push(KeyId::from(pkesk.recipient())),
            Packet::SKESK(_) if !saw_data => {}
            Packet::SEIP(_) | Packet::AED(_) if !saw_data => saw_data = true,
            other => {
                return Err(CoreError::MalformedMessage(format!(
                    "unexpected {} packet",
                    other.tag()
                )))
            }
        }
        // Siblings only: the encrypted container is never opened here.
        ppr = pp.next().map_err(malformed)?.1;
    }

    if !saw_data {
        return Err(CoreError::MalformedMessage("missing data packet".into()));
    }
    if recipients.is_empty() {
        return Err(CoreError::MalformedMessage("message has no recipients".into()));
    }
    Ok(recipients)
}
