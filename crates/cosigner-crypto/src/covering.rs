//! Covering subset selection
//!
//! Shortens a key list down to keys that are enough to satisfy a tree. The
//! walk is greedy and order-stable rather than globally minimal: at each
//! threshold node, available direct leaves are taken first in child order,
//! then the remaining slots go to the nested branches with the fewest keys.
//! Identical inputs always yield the identical sequence.

use crate::key_tree::{KeyTree, ThresholdKey};
use crate::keys::PublicKeyId;
use std::collections::HashSet;
use tracing::trace;

/// Select keys from `available` sufficient to satisfy `tree`
///
/// Returns `None` when `available` cannot satisfy the tree. The result never
/// lists a key twice.
pub fn select_covering(
    tree: &KeyTree,
    available: &HashSet<PublicKeyId>,
) -> Option<Vec<PublicKeyId>> {
    let keys = match tree {
        KeyTree::Leaf(key) => return available.contains(key).then(|| vec![key.clone()]),
        KeyTree::Threshold(node) => cover_threshold(node, available)?,
        KeyTree::Unsigned(_) => return None,
    };

    let mut seen = HashSet::with_capacity(keys.len());
    Some(keys.into_iter().filter(|key| seen.insert(key.clone())).collect())
}

fn cover_threshold(
    node: &ThresholdKey,
    available: &HashSet<PublicKeyId>,
) -> Option<Vec<PublicKeyId>> {
    let threshold = node.threshold();

    let mut accepted = Vec::new();
    for key in node.keys().iter().filter_map(KeyTree::as_leaf) {
        if available.contains(key) {
            accepted.push(key.clone());
            if accepted.len() == threshold {
                return Some(accepted);
            }
        }
    }

    let mut nested: Vec<Vec<PublicKeyId>> = node
        .keys()
        .iter()
        .filter_map(|child| match child {
            KeyTree::Threshold(inner) => cover_threshold(inner, available),
            KeyTree::Leaf(_) | KeyTree::Unsigned(_) => None,
        })
        .collect();

    if accepted.len() + nested.len() < threshold {
        trace!(
            threshold,
            leaves = accepted.len(),
            branches = nested.len(),
            "threshold cannot be covered"
        );
        return None;
    }

    // stable: equal-length branches keep child order
    nested.sort_by_key(Vec::len);
    let remaining = threshold - accepted.len();
    accepted.extend(nested.into_iter().take(remaining).flatten());
    Some(accepted)
}

impl KeyTree {
    /// See [`select_covering`]
    pub fn covering_keys(&self, available: &HashSet<PublicKeyId>) -> Option<Vec<PublicKeyId>> {
        select_covering(self, available)
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
    fn test_two_of_three_with_first_and_last() {
        let tree = KeyTree::threshold(vec![leaf(1), leaf(2), leaf(3)], 2).unwrap();
        assert_eq!(select_covering(&tree, &set(&[1, 3])), Some(vec![k(1), k(3)]));
    }

    #[test]
    fn test_two_of_three_unsatisfiable() {
        let tree = KeyTree::threshold(vec![leaf(1), leaf(2), leaf(3)], 2).unwrap();
        assert_eq!(select_covering(&tree, &set(&[1])), None);
    }

    #[test]
    fn test_nested_branch_fills_remaining_slot() {
        let inner = KeyTree::threshold(vec![leaf(2), leaf(3)], 1).unwrap();
        let tree = KeyTree::threshold(vec![leaf(1), inner], 2).unwrap();
        assert_eq!(select_covering(&tree, &set(&[1, 2])), Some(vec![k(1), k(2)]));
    }

    #[test]
    fn test_stops_at_threshold_leaves() {
        let tree = KeyTree::threshold(vec![leaf(1), leaf(2), leaf(3), leaf(4)], 2).unwrap();
        assert_eq!(
            select_covering(&tree, &set(&[1, 2, 3, 4])),
            Some(vec![k(1), k(2)])
        );
    }

    #[test]
    fn test_leaves_preferred_over_nested() {
        let inner = KeyTree::threshold(vec![leaf(5)], 1).unwrap();
        let tree = KeyTree::threshold(vec![inner, leaf(1)], 1).unwrap();
        assert_eq!(select_covering(&tree, &set(&[1, 5])), Some(vec![k(1)]));
    }

    #[test]
    fn test_smallest_nested_branch_first() {
        let large = KeyTree::threshold(vec![leaf(1), leaf(2), leaf(3)], 3).unwrap();
        let small = KeyTree::threshold(vec![leaf(4), leaf(5)], 1).unwrap();
        let tree = KeyTree::threshold(vec![large, small], 1).unwrap();

        assert_eq!(
            select_covering(&tree, &set(&[1, 2, 3, 4, 5])),
            Some(vec![k(4)])
        );
    }

    #[test]
    fn test_equal_length_branches_keep_child_order() {
        let a = KeyTree::threshold(vec![leaf(1)], 1).unwrap();
        let b = KeyTree::threshold(vec![leaf(2)], 1).unwrap();
        let tree = KeyTree::threshold(vec![a, b], 1).unwrap();
        assert_eq!(select_covering(&tree, &set(&[1, 2])), Some(vec![k(1)]));
    }

    #[test]
    fn test_unsatisfiable_nested_branch_is_dropped() {
        let dead = KeyTree::threshold(vec![leaf(7), leaf(8)], 2).unwrap();
        let live = KeyTree::threshold(vec![leaf(2), leaf(3)], 2).unwrap();
        let tree = KeyTree::threshold(vec![leaf(1), dead, live], 2).unwrap();

        assert_eq!(
            select_covering(&tree, &set(&[1, 2, 3, 7])),
            Some(vec![k(1), k(2), k(3)])
        );
    }

    #[test]
    fn test_duplicate_key_listed_once() {
        let inner = KeyTree::threshold(vec![leaf(1), leaf(2)], 2).unwrap();
        let tree = KeyTree::threshold(vec![leaf(1), inner], 2).unwrap();
        assert_eq!(select_covering(&tree, &set(&[1, 2])), Some(vec![k(1), k(2)]));
    }

    #[test]
    fn test_unsigned_child_is_never_selected() {
        let contract = KeyTree::unsigned(UnsignedKey::Contract {
            shard: 0,
            realm: 0,
            num: 1001,
        });
        let tree = KeyTree::threshold(vec![contract.clone(), leaf(1), leaf(2)], 2).unwrap();

        assert_eq!(select_covering(&tree, &set(&[1, 2])), Some(vec![k(1), k(2)]));
        assert_eq!(select_covering(&tree, &set(&[1])), None);
        assert_eq!(select_covering(&contract, &set(&[1])), None);
    }

    #[test]
    fn test_top_level_leaf() {
        assert_eq!(select_covering(&leaf(1), &set(&[1])), Some(vec![k(1)]));
        assert_eq!(leaf(1).covering_keys(&set(&[2])), None);
    }
}
