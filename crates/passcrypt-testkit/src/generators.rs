//! Proptest generators for property-based testing.

use proptest::prelude::*;

use passcrypt_core::{KeyId, KeyMaterial};

/// Generate a random key id.
pub fn key_id() -> impl Strategy<Value = KeyId> {
    any::<u64>().prop_map(KeyId::from_u64)
}

/// Generate a key id together with one of its accepted spellings:
/// any case, optional `0x` prefix, zero padding and surrounding blanks.
pub fn key_id_spelling() -> impl Strategy<Value = (KeyId, String)> {
    (any::<u64>(), any::<bool>(), any::<bool>(), 0usize..8, any::<bool>()).prop_map(
        |(raw, lower, prefix, pad, blanks)| {
            let digits = if lower {
                format!("{raw:x}")
            } else {
                format!("{raw:X}")
            };
            let mut text = format!("{}{}", "0".repeat(pad), digits);
            if prefix {
                text.insert_str(0, "0x");
            }
            if blanks {
                text = format!("  {text}\n");
            }
            (KeyId::from_u64(raw), text)
        },
    )
}

/// Generate an unprotected private key from a random seed.
pub fn key_material() -> impl Strategy<Value = KeyMaterial> {
    (user_name(), any::<[u8; 32]>()).prop_map(|(user, seed)| {
        KeyMaterial::from_seed(&user, &seed, crate::FIXTURE_CREATED).expect("seeded key builds")
    })
}

/// Generate a user name.
pub fn user_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,15}".prop_map(String::from)
}

/// Generate a normalized store path of one to four segments.
pub fn store_path() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z0-9][a-z0-9._-]{0,11}", 1..=4).prop_map(|segments| segments.join("/"))
}

/// Generate secret bytes of at most `max_len`.
pub fn secret(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}
