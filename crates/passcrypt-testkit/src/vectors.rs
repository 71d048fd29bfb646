//! Golden test vectors for deterministic verification.
//!
//! Other clients of the same server must agree on these encodings: key ids
//! are compared as canonical text, and a key id is the low 64 bits of its
//! OpenPGP v4 fingerprint.

use serde::{Deserialize, Serialize};

use passcrypt_core::KeyId;

/// A key id spelling and the canonical form it must reduce to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyIdVector {
    pub name: String,
    pub input: String,
    /// `None` if the input must be rejected.
    pub canonical: Option<String>,
}

/// A v4 fingerprint and the key id it names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintVector {
    pub name: String,
    pub fingerprint: String,
    pub key_id: String,
}
const KEY_ID_VECTORS: &str = r#"[
    {"name": "canonical",         "input": "1A2B3C4D5E6F7081",  "canonical": "1A2B3C4D5E6F7081"},
    {"name": "lowercase",         "input": "1a2b3c4d5e6f7081",  "canonical": "1A2B3C4D5E6F7081"},
    {"name": "leading zeros",     "input": "00000000000ABC",    "canonical": "ABC"},
    {"name": "zero padded short", "input": "0000000000000ABC",  "canonical": "ABC"},
    {"name": "hex prefix",        "input": "0xdeadbeef",        "canonical": "DEADBEEF"},
    {"name": "whitespace",        "input": "  42\n",            "canonical": "42"},
    {"name": "all zeros",         "input": "0000",              "canonical": "0"},
    {"name": "fingerprint",       "input": "0123456789ABCDEF0123FEDCBA9876543210AAAA", "canonical": "BA9876543210AAAA"},
    {"name": "too long",          "input": "1FFFFFFFFFFFFFFFF", "canonical": null},
    {"name": "not hex",           "input": "XYZ",               "canonical": null},
    {"name": "empty",             "input": "",                  "canonical": null}
]"#;

/// All key id vectors.
pub fn key_id_vectors() -> Vec<KeyIdVector> {
    serde_json::from_str(KEY_ID_VECTORS).expect("key id vectors are valid JSON")
}

/// Fingerprints of keys made by gpg, with the ids gpg reports for them.
pub fn fingerprint_vectors() -> Vec<FingerprintVector> {
    [
        (
            "gpg ed25519 primary",
            "B9E5C77103500A666D284B6B40CED576BBA2FB12",
            "40CED576BBA2FB12",
        ),
        (
            "leading zero id",
            "0D1E2F3A4B5C6D7E8F90A1B2003C4D5E6F708192",
            "3C4D5E6F708192",
        ),
        (
            "lowercase",
            "b9e5c77103500a666d284b6b40ced576bba2fb12",
            "40CED576BBA2FB12",
        ),
    ]
    .into_iter()
    .map(|(name, fingerprint, key_id)| FingerprintVector {
        name: name.to_string(),
        fingerprint: fingerprint.to_string(),
        key_id: key_id.to_string(),
    })
    .collect()
}

/// Check every key id vector, reporting `(name, matches, actual)`.
pub fn check_key_id_vectors() -> Vec<(String, bool, Option<String>)> {
    key_id_vectors()
        .into_iter()
        .map(|v| {
            let actual = KeyId::parse(&v.input).ok().map(|id| id.canonical());
            (v.name, actual == v.canonical, actual)
        })
        .collect()
}

/// Key id taken from the raw fingerprint bytes, independent of the parser.
pub fn key_id_from_fingerprint_bytes(fingerprint: &str) -> Option<KeyId> {
    let bytes = hex::decode(fingerprint).ok()?;
    let tail: [u8; 8] = bytes.get(bytes.len().checked_sub(8)?..)?.try_into().ok()?;
    Some(KeyId::from_u64(u64::from_be_bytes(tail)))
}
