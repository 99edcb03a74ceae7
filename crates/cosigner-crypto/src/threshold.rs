//! Threshold satisfaction

use crate::key_tree::KeyTree;
use crate::keys::PublicKeyId;
use std::collections::HashSet;

/// Whether the signatures in `satisfied` authorize `tree`
///
/// A leaf is satisfied when its key is in the set; a threshold node when at
/// least `threshold` of its children are. Unsigned keys are never satisfied.
/// The result does not depend on the order of children.
pub fn is_satisfied(tree: &KeyTree, satisfied: &HashSet<PublicKeyId>) -> bool {
    match tree {
        KeyTree::Leaf(key) => satisfied.contains(key),
        KeyTree::Unsigned(_) => false,
        KeyTree::Threshold(node) => {
            let mut count = 0;
            for child in node.keys() {
                if is_satisfied(child, satisfied) {
                    count += 1;
                    if count >= node.threshold() {
                        return true;
                    }
                }
            }
            false
        }
    }
}

impl KeyTree {
    /// See [`is_satisfied`]
    pub fn is_satisfied_by(&self, satisfied: &HashSet<PublicKeyId>) -> bool {
        is_satisfied(self, satisfied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_tree::UnsignedKey;

    fn k(n: u8) -> PublicKeyId {
        PublicKeyId::from_bytes(vec![n; 32])
    }

    fn leaf(n: u8) -> KeyTree {
        KeyTree::leaf(k(n))
    }

    fn set(ids: &[u8]) -> HashSet<PublicKeyId> {
        ids.iter().copied().map(k).collect()
    }

    #[test]
    fn test_leaf() {
        assert!(is_satisfied(&leaf(1), &set(&[1])));
        assert!(!is_satisfied(&leaf(1), &set(&[2])));
        assert!(!is_satisfied(&leaf(1), &set(&[])));
    }

    #[test]
    fn test_two_of_three() {
        let tree = KeyTree::threshold(vec![leaf(1), leaf(2), leaf(3)], 2).unwrap();
        assert!(!is_satisfied(&tree, &set(&[1])));
        assert!(is_satisfied(&tree, &set(&[1, 3])));
        assert!(is_satisfied(&tree, &set(&[1, 2, 3])));
        assert!(!is_satisfied(&tree, &set(&[4, 5])));
    }

    #[test]
    fn test_nested_threshold() {
        let inner = KeyTree::threshold(vec![leaf(2), leaf(3)], 2).unwrap();
        let tree = KeyTree::threshold(vec![leaf(1), inner], 2).unwrap();

        assert!(!is_satisfied(&tree, &set(&[1, 2])));
        assert!(is_satisfied(&tree, &set(&[1, 2, 3])));
        assert!(tree.is_satisfied_by(&set(&[1, 2, 3])));
    }

    #[test]
    fn test_unsigned_child_never_satisfies() {
        let contract = KeyTree::unsigned(UnsignedKey::Contract {
            shard: 0,
            realm: 0,
            num: 9,
        });
        let either = KeyTree::threshold(vec![contract.clone(), leaf(1)], 1).unwrap();
        assert!(is_satisfied(&either, &set(&[1])));

        let both = KeyTree::threshold(vec![contract.clone(), leaf(1)], 2).unwrap();
        assert!(!is_satisfied(&both, &set(&[1])));
        assert!(!is_satisfied(&contract, &set(&[1])));
    }

    #[test]
    fn test_duplicate_leaves_count_per_branch() {
        let tree = KeyTree::threshold(vec![leaf(1), leaf(1)], 2).unwrap();
        assert!(is_satisfied(&tree, &set(&[1])));
    }
}
