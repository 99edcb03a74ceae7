//! Hierarchical threshold key structures
//!
//! A [`KeyTree`] is either a single public key, an M-of-N threshold over
//! nested trees, or an [`UnsignedKey`] that no signature can ever satisfy
//! (contract ids in account keys). Trees are immutable once built; every constructor checks
//! the threshold invariant and the nesting depth so that the recursive
//! algorithms in this crate never see a malformed or unbounded structure.

use crate::keys::{PublicKey, PublicKeyId};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Default cap on threshold nesting
pub const MAX_KEY_DEPTH: usize = 20;

/// Errors raised while building or decoding a key structure
#[derive(Error, Debug)]
pub enum KeyStructureError {
    #[error("invalid threshold {threshold} for {children} keys")]
    InvalidThreshold { threshold: usize, children: usize },

    #[error("empty key list")]
    EmptyKeyList,

    #[error("key nesting exceeds depth limit of {limit}")]
    DepthExceeded { limit: usize },

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl From<KeyStructureError> for cosigner_errors::Error {
    fn from(err: KeyStructureError) -> Self {
        cosigner_errors::Error::MalformedKeyStructure(err.to_string())
    }
}

/// A single key or a threshold over sub-keys
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyTree {
    Leaf(PublicKeyId),
    Threshold(ThresholdKey),
    /// Counts as a child of its threshold node but never signs
    Unsigned(UnsignedKey),
}

/// A key position held by something other than a signing key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnsignedKey {
    Contract { shard: i64, realm: i64, num: i64 },
    DelegatableContract { shard: i64, realm: i64, num: i64 },
}

impl fmt::Display for UnsignedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnsignedKey::Contract { shard, realm, num } => {
                write!(f, "contract {shard}.{realm}.{num}")
            }
            UnsignedKey::DelegatableContract { shard, realm, num } => {
                write!(f, "delegatable contract {shard}.{realm}.{num}")
            }
        }
    }
}

/// M-of-N node of a [`KeyTree`]
///
/// Satisfied when at least `threshold` of `keys` are satisfied. The order of
/// `keys` is preserved and drives tie-breaks in covering selection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ThresholdKey {
    threshold: usize,
    keys: Vec<KeyTree>,
    #[serde(skip)]
    depth: usize,
}

impl ThresholdKey {
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn keys(&self) -> &[KeyTree] {
        &self.keys
    }
}

impl KeyTree {
    pub fn leaf(key: PublicKeyId) -> Self {
        KeyTree::Leaf(key)
    }

    /// Build an M-of-N node, enforcing `1 <= threshold <= keys.len()` and
    /// the default depth cap
    pub fn threshold(keys: Vec<KeyTree>, threshold: usize) -> Result<Self, KeyStructureError> {
        Self::threshold_with_limit(keys, threshold, MAX_KEY_DEPTH)
    }

    /// Build an M-of-N node with an explicit depth cap
    pub fn threshold_with_limit(
        keys: Vec<KeyTree>,
        threshold: usize,
        max_depth: usize,
    ) -> Result<Self, KeyStructureError> {
        if keys.is_empty() {
            return Err(KeyStructureError::EmptyKeyList);
        }
        if threshold == 0 || threshold > keys.len() {
            return Err(KeyStructureError::InvalidThreshold {
                threshold,
                children: keys.len(),
            });
        }

        let depth = 1 + keys.iter().map(KeyTree::depth).max().unwrap_or(0);
        if depth > max_depth {
            return Err(KeyStructureError::DepthExceeded { limit: max_depth });
        }

        Ok(KeyTree::Threshold(ThresholdKey {
            threshold,
            keys,
            depth,
        }))
    }

    /// Build an N-of-N node where every key must sign
    pub fn key_list(keys: Vec<KeyTree>) -> Result<Self, KeyStructureError> {
        let threshold = keys.len();
        Self::threshold(keys, threshold)
    }

    pub fn unsigned(key: UnsignedKey) -> Self {
        KeyTree::Unsigned(key)
    }

    /// Threshold nesting depth; leaves have depth 0
    pub fn depth(&self) -> usize {
        match self {
            KeyTree::Leaf(_) | KeyTree::Unsigned(_) => 0,
            KeyTree::Threshold(node) => node.depth,
        }
    }

    pub fn as_leaf(&self) -> Option<&PublicKeyId> {
        match self {
            KeyTree::Leaf(key) => Some(key),
            KeyTree::Threshold(_) | KeyTree::Unsigned(_) => None,
        }
    }

    /// Threshold of this node; leaves count as 1-of-1
    pub fn threshold_of(&self) -> usize {
        match self {
            KeyTree::Leaf(_) | KeyTree::Unsigned(_) => 1,
            KeyTree::Threshold(node) => node.threshold,
        }
    }

    /// Every distinct leaf key in depth-first order of first appearance
    pub fn flatten(&self) -> Vec<PublicKeyId> {
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        self.collect_leaves(&mut seen, &mut keys);
        keys
    }

    fn collect_leaves<'a>(
        &'a self,
        seen: &mut HashSet<&'a PublicKeyId>,
        out: &mut Vec<PublicKeyId>,
    ) {
        match self {
            KeyTree::Leaf(key) => {
                if seen.insert(key) {
                    out.push(key.clone());
                }
            }
            KeyTree::Threshold(node) => {
                for child in &node.keys {
                    child.collect_leaves(seen, out);
                }
            }
            KeyTree::Unsigned(_) => {}
        }
    }

    /// Number of distinct signing keys
    pub fn leaf_count(&self) -> usize {
        self.flatten().len()
    }

    /// Whether `key` appears as a leaf anywhere in the tree
    pub fn contains(&self, key: &PublicKeyId) -> bool {
        match self {
            KeyTree::Leaf(leaf) => leaf == key,
            KeyTree::Threshold(node) => node.keys.iter().any(|child| child.contains(key)),
            KeyTree::Unsigned(_) => false,
        }
    }
}

impl From<PublicKeyId> for KeyTree {
    fn from(key: PublicKeyId) -> Self {
        KeyTree::Leaf(key)
    }
}

impl From<UnsignedKey> for KeyTree {
    fn from(key: UnsignedKey) -> Self {
        KeyTree::Unsigned(key)
    }
}

impl From<PublicKey> for KeyTree {
    fn from(key: PublicKey) -> Self {
        KeyTree::Leaf(key.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(n: u8) -> PublicKeyId {
        PublicKeyId::from_bytes(vec![n; 32])
    }

    fn leaf(n: u8) -> KeyTree {
        KeyTree::leaf(k(n))
    }

    #[test]
    fn test_threshold_invariant() {
        assert!(matches!(
            KeyTree::threshold(vec![], 1),
            Err(KeyStructureError::EmptyKeyList)
        ));
        assert!(matches!(
            KeyTree::threshold(vec![leaf(1), leaf(2)], 0),
            Err(KeyStructureError::InvalidThreshold {
                threshold: 0,
                children: 2
            })
        ));
        assert!(matches!(
            KeyTree::threshold(vec![leaf(1), leaf(2)], 3),
            Err(KeyStructureError::InvalidThreshold {
                threshold: 3,
                children: 2
            })
        ));
        assert!(KeyTree::threshold(vec![leaf(1), leaf(2)], 2).is_ok());
    }

    #[test]
    fn test_key_list_requires_all() {
        let tree = KeyTree::key_list(vec![leaf(1), leaf(2), leaf(3)]).unwrap();
        assert_eq!(tree.threshold_of(), 3);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn test_depth_cap() {
        let mut tree = leaf(1);
        for _ in 0..MAX_KEY_DEPTH {
            tree = KeyTree::threshold(vec![tree], 1).unwrap();
        }
        assert_eq!(tree.depth(), MAX_KEY_DEPTH);

        let err = KeyTree::threshold(vec![tree.clone()], 1).unwrap_err();
        assert!(matches!(err, KeyStructureError::DepthExceeded { limit: 20 }));

        assert!(KeyTree::threshold_with_limit(vec![leaf(1)], 1, 0).is_err());
    }

    #[test]
    fn test_flatten_dedups_preserving_first_seen_order() {
        let inner = KeyTree::threshold(vec![leaf(2), leaf(1), leaf(3)], 1).unwrap();
        let tree = KeyTree::threshold(vec![leaf(1), inner, leaf(2), leaf(4)], 2).unwrap();

        assert_eq!(tree.flatten(), vec![k(1), k(2), k(3), k(4)]);
        assert_eq!(tree.leaf_count(), 4);
    }

    #[test]
    fn test_unsigned_child_counts_toward_threshold_only() {
        let id = UnsignedKey::Contract {
            shard: 0,
            realm: 0,
            num: 1001,
        };
        let contract = KeyTree::unsigned(id);
        let tree = KeyTree::threshold(vec![contract.clone(), leaf(1)], 2).unwrap();

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.flatten(), vec![k(1)]);
        assert_eq!(tree.leaf_count(), 1);
        assert!(tree.contains(&k(1)));
        assert!(contract.as_leaf().is_none());
        assert_eq!(contract.leaf_count(), 0);
        assert_eq!(id.to_string(), "contract 0.0.1001");
    }

    #[test]
    fn test_contains() {
        let inner = KeyTree::threshold(vec![leaf(2), leaf(3)], 1).unwrap();
        let tree = KeyTree::threshold(vec![leaf(1), inner], 2).unwrap();

        assert!(tree.contains(&k(1)));
        assert!(tree.contains(&k(3)));
        assert!(!tree.contains(&k(4)));
        assert!(leaf(5).contains(&k(5)));
    }

    #[test]
    fn test_serialize_shape() {
        let tree = KeyTree::threshold(vec![leaf(1)], 1).unwrap();
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["threshold"]["threshold"], 1);
        assert_eq!(json["threshold"]["keys"][0]["leaf"], k(1).to_hex());
        assert!(json["threshold"].get("depth").is_none());

        let contract = KeyTree::unsigned(UnsignedKey::DelegatableContract {
            shard: 0,
            realm: 0,
            num: 7,
        });
        let json = serde_json::to_value(&contract).unwrap();
        assert_eq!(json["unsigned"]["kind"], "delegatable_contract");
        assert_eq!(json["unsigned"]["num"], 7);
    }
}
