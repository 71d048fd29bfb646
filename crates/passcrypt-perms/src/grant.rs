//! Grant and revoke requests.
//!
//! A request is pure policy: given the current access list it either yields
//! the next list, reports that nothing needs to change, or refuses.

use serde::{Deserialize, Serialize};

use passcrypt_core::KeyId;

use crate::error::PolicyError;

/// A change to one path's access list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "key", rename_all = "lowercase")]
pub enum PermissionChangeRequest {
    /// Add a key to the access list.
    Grant(KeyId),

    /// Remove a key from the access list.
    Revoke(KeyId),
}

impl PermissionChangeRequest {
    /// The key being granted or revoked.
    pub fn key_id(&self) -> KeyId {
        match self {
            PermissionChangeRequest::Grant(id) | PermissionChangeRequest::Revoke(id) => *id,
        }
    }

    /// The access list after this change.
    ///
    /// `Ok(None)` means the list already satisfies the request.
    pub fn apply(&self, access: &[KeyId]) -> Result<Option<Vec<KeyId>>, PolicyError> {
        match *self {
            PermissionChangeRequest::Grant(id) => {
                if access.contains(&id) {
                    return Ok(None);
                }
                let mut next = access.to_vec();
                next.push(id);
                Ok(Some(next))
            }
            PermissionChangeRequest::Revoke(id) => {
                if !access.contains(&id) {
                    return Err(PolicyError::NotAMember(id));
                }
                let next: Vec<KeyId> = access.iter().copied().filter(|k| *k != id).collect();
                if next.is_empty() {
                    return Err(PolicyError::LastRecipient(id));
                }
                Ok(Some(next))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const A: KeyId = KeyId::from_u64(0xA);
    const B: KeyId = KeyId::from_u64(0xB);
    const C: KeyId = KeyId::from_u64(0xC);

    #[test]
    fn test_grant_appends() {
        let next = PermissionChangeRequest::Grant(B).apply(&[A]).unwrap();
        assert_eq!(next, Some(vec![A, B]));
    }

    #[test]
    fn test_grant_existing_is_noop() {
        assert_eq!(PermissionChangeRequest::Grant(A).apply(&[A, B]).unwrap(), None);
    }

    #[test]
    fn test_revoke() {
        let next = PermissionChangeRequest::Revoke(A).apply(&[A, B]).unwrap();
        assert_eq!(next, Some(vec![B]));
        assert_eq!(
            PermissionChangeRequest::Revoke(C).apply(&[A, B]),
            Err(PolicyError::NotAMember(C))
        );
        assert_eq!(
            PermissionChangeRequest::Revoke(A).apply(&[A]),
            Err(PolicyError::LastRecipient(A))
        );
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&PermissionChangeRequest::Grant(B)).unwrap();
        assert_eq!(json, r#"{"op":"grant","key":"B"}"#);
        let back: PermissionChangeRequest = serde_json::from_str(r#"{"op":"revoke","key":"000b"}"#).unwrap();
        assert_eq!(back, PermissionChangeRequest::Revoke(B));
    }

    proptest! {
        #[test]
        fn test_grant_then_revoke_restores(ids in proptest::collection::btree_set(1u64..1000, 1..6), new in 1000u64..2000) {
            let access: Vec<KeyId> = ids.into_iter().map(KeyId::from_u64).collect();
            let id = KeyId::from_u64(new);
            let granted = PermissionChangeRequest::Grant(id).apply(&access).unwrap().unwrap();
            prop_assert_eq!(granted.last(), Some(&id));
            let revoked = PermissionChangeRequest::Revoke(id).apply(&granted).unwrap().unwrap();
            prop_assert_eq!(revoked, access);
        }
    }
}
