//! Public key representations

use crate::key_tree::KeyStructureError;
use ed25519_dalek::VerifyingKey as Ed25519PubKey;
use k256::ecdsa::VerifyingKey as Secp256k1PubKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ED25519_KEY_LEN: usize = 32;
const SECP256K1_COMPRESSED_KEY_LEN: usize = 33;

/// Canonical encoding of a single public key
///
/// Equality is byte-exact: two encodings of the same curve point are
/// different ids. The text form is lowercase hex of the raw bytes.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKeyId(Vec<u8>);

impl PublicKeyId {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse the raw hex form, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self, KeyStructureError> {
        let s = s.trim();
        let s = s.strip_prefix("0x").unwrap_or(s);
        if s.is_empty() {
            return Err(KeyStructureError::InvalidHex("empty public key".to_string()));
        }
        let bytes = hex::decode(s).map_err(|e| KeyStructureError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Display for PublicKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKeyId({})", self.to_hex())
    }
}

impl FromStr for PublicKeyId {
    type Err = KeyStructureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicKeyId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKeyId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKeyId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Supported public key types
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PublicKey {
    Ed25519(Ed25519PubKey),
    EcdsaSecp256k1(Secp256k1PubKey),
}

impl PublicKey {
    /// Parse a 32-byte Ed25519 key
    pub fn from_ed25519_bytes(bytes: &[u8]) -> Result<Self, KeyStructureError> {
        let raw: &[u8; ED25519_KEY_LEN] = bytes.try_into().map_err(|_| {
            KeyStructureError::InvalidPublicKey(format!(
                "ed25519 key must be {ED25519_KEY_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        let key = Ed25519PubKey::from_bytes(raw)
            .map_err(|e| KeyStructureError::InvalidPublicKey(e.to_string()))?;
        Ok(PublicKey::Ed25519(key))
    }

    /// Parse a compressed SEC1 secp256k1 key
    ///
    /// Uncompressed points are rejected so that the id stays byte-identical
    /// to the encoding found on the wire.
    pub fn from_secp256k1_bytes(bytes: &[u8]) -> Result<Self, KeyStructureError> {
        if bytes.len() != SECP256K1_COMPRESSED_KEY_LEN {
            return Err(KeyStructureError::InvalidPublicKey(format!(
                "ecdsa secp256k1 key must be {SECP256K1_COMPRESSED_KEY_LEN} compressed bytes, got {}",
                bytes.len()
            )));
        }
        let key = Secp256k1PubKey::from_sec1_bytes(bytes)
            .map_err(|e| KeyStructureError::InvalidPublicKey(e.to_string()))?;
        Ok(PublicKey::EcdsaSecp256k1(key))
    }

    /// Recover a typed key from a raw id, telling the algorithms apart by length
    pub fn from_id(id: &PublicKeyId) -> Result<Self, KeyStructureError> {
        match id.as_bytes().len() {
            ED25519_KEY_LEN => Self::from_ed25519_bytes(id.as_bytes()),
            SECP256K1_COMPRESSED_KEY_LEN => Self::from_secp256k1_bytes(id.as_bytes()),
            n => Err(KeyStructureError::InvalidPublicKey(format!(
                "cannot infer key type from {n} bytes"
            ))),
        }
    }

    /// Raw key bytes (compressed for secp256k1)
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            PublicKey::Ed25519(key) => key.as_bytes().to_vec(),
            PublicKey::EcdsaSecp256k1(key) => key.to_encoded_point(true).as_bytes().to_vec(),
        }
    }

    pub fn id(&self) -> PublicKeyId {
        PublicKeyId(self.to_bytes())
    }

    /// Algorithm name as used by mirror node responses
    pub fn algorithm(&self) -> &'static str {
        match self {
            PublicKey::Ed25519(_) => "ED25519",
            PublicKey::EcdsaSecp256k1(_) => "ECDSA_SECP256K1",
        }
    }
}
