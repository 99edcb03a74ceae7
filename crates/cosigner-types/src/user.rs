//! Caller-side key ownership and recorded signatures

use cosigner_crypto::PublicKeyId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a user owning keys
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

/// Identifier of a stored user key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKeyId(pub u64);

/// Identifier of a pending transaction record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionRecordId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for UserKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for TransactionRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A key held by a user
///
/// The id belongs to the caller's key store; key trees only ever record the
/// raw `public_key`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserKey {
    pub id: UserKeyId,
    pub user_id: UserId,
    pub public_key: PublicKeyId,
}

/// A signature already applied to a transaction
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub public_key: PublicKeyId,
}

impl From<&UserKey> for SignatureRecord {
    fn from(key: &UserKey) -> Self {
        Self {
            public_key: key.public_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_key_json_shape() {
        let json = r#"{"id": 7, "user_id": 2, "public_key": "0xAABB"}"#;
        let key: UserKey = serde_json::from_str(json).unwrap();
        assert_eq!(key.id, UserKeyId(7));
        assert_eq!(key.user_id, UserId(2));
        assert_eq!(key.public_key.to_hex(), "aabb");

        let record = SignatureRecord::from(&key);
        assert_eq!(record.public_key, key.public_key);
    }
}
