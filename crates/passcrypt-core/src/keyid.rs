//! Canonical key identifiers.
//!
//! A [`KeyId`] is a 64-bit identifier. Its canonical text form is upper-case
//! hex with leading zero nibbles stripped, so `"00ab12"` and `"AB12"` name the
//! same key. Every id that crosses a boundary (message headers, REST
//! parameters, display) goes through this type.
//!
//! The value is the OpenPGP key id: the low 64 bits of a v4 fingerprint.

use sequoia_openpgp as openpgp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// Number of hex nibbles in a full fingerprint.
const FINGERPRINT_NIBBLES: usize = 40;

/// A canonical 64-bit key identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u64);

impl KeyId {
    /// Create from the raw 64-bit value.
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw 64-bit value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Create from 8 big-endian bytes (the on-wire form).
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Get the 8 big-endian bytes.
    pub const fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// The all-zero id an anonymous recipient is addressed by.
    pub const fn is_wildcard(&self) -> bool {
        self.0 == 0
    }

    /// Parse an id received from an external source.
    ///
    /// Accepts surrounding whitespace, an optional `0x` prefix, any letter
    /// case and leading zero padding. A full 40-nibble fingerprint is reduced
    /// to its low 64 bits.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if hex_part.is_empty() || !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidKeyId(input.to_string()));
        }

        if hex_part.len() == FINGERPRINT_NIBBLES {
            let low = &hex_part[FINGERPRINT_NIBBLES - 16..];
            return u64::from_str_radix(low, 16)
                .map(Self)
                .map_err(|_| CoreError::InvalidKeyId(input.to_string()));
        }

        let significant = hex_part.trim_start_matches('0');
        if significant.len() > 16 {
            return Err(CoreError::InvalidKeyId(input.to_string()));
        }
        if significant.is_empty() {
            return Ok(Self(0));
        }

        u64::from_str_radix(significant, 16)
            .map(Self)
            .map_err(|_| CoreError::InvalidKeyId(input.to_string()))
    }

    /// The canonical text form.
    pub fn canonical(&self) -> String {
        format!("{:X}", self.0)
    }
}

/// Canonicalize a key id string without keeping the parsed value.
pub fn canonicalize(input: &str) -> Result<String> {
    KeyId::parse(input).map(|id| id.canonical())
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({:X})", self.0)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

impl FromStr for KeyId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<u64> for KeyId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<&openpgp::KeyID> for KeyId {
    fn from(id: &openpgp::KeyID) -> Self {
        // Longer ids keep their low 64 bits, like fingerprints do.
        let raw = id.as_bytes();
        let tail = &raw[raw.len().saturating_sub(8)..];
        let mut bytes = [0u8; 8];
        bytes[8 - tail.len()..].copy_from_slice(tail);
        Self::from_bytes(bytes)
    }
}

impl From<KeyId> for openpgp::KeyID {
    fn from(id: KeyId) -> Self {
        openpgp::KeyID::from_bytes(&id.to_bytes())
    }
}

impl Serialize for KeyId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical())
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        KeyId::parse(&s).map_err(serde::de::Error::custom)
    }
}
