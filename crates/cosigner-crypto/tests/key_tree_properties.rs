use cosigner_crypto::{
    decode_key, encode_key, is_satisfied, select_covering, KeyTree, PublicKeyId, UnsignedKey,
};
use proptest::collection::{hash_set, vec};
use proptest::prelude::*;
use std::collections::HashSet;

const POOL: u8 = 8;

fn key(n: u8) -> PublicKeyId {
    PublicKeyId::from_bytes(vec![n; 32])
}

fn key_tree() -> impl Strategy<Value = KeyTree> {
    let signing = (0..POOL).prop_map(|n| KeyTree::leaf(key(n)));
    let contract = (1000..1003i64).prop_map(|num| {
        KeyTree::unsigned(UnsignedKey::Contract {
            shard: 0,
            realm: 0,
            num,
        })
    });
    let leaf = prop_oneof![4 => signing, 1 => contract];
    leaf.prop_recursive(4, 48, 4, |inner| {
        vec(inner, 1..5)
            .prop_flat_map(|children| {
                let n = children.len();
                (Just(children), 1..=n)
            })
            .prop_map(|(children, threshold)| {
                KeyTree::threshold(children, threshold).expect("generated threshold is in range")
            })
    })
}

fn key_set() -> impl Strategy<Value = HashSet<PublicKeyId>> {
    hash_set((0..POOL).prop_map(key), 0..5)
}

proptest! {
    #[test]
    fn flatten_lists_each_leaf_once(tree in key_tree()) {
        let flat = tree.flatten();
        let unique: HashSet<_> = flat.iter().collect();
        prop_assert_eq!(unique.len(), flat.len());

        for n in 0..POOL {
            prop_assert_eq!(tree.contains(&key(n)), flat.contains(&key(n)));
        }
    }

    #[test]
    fn satisfaction_is_monotonic(tree in key_tree(), base in key_set(), extra in key_set()) {
        let widened: HashSet<_> = base.union(&extra).cloned().collect();
        if is_satisfied(&tree, &base) {
            prop_assert!(is_satisfied(&tree, &widened));
        }
    }

    #[test]
    fn covering_exists_iff_satisfied(tree in key_tree(), available in key_set()) {
        match select_covering(&tree, &available) {
            None => prop_assert!(!is_satisfied(&tree, &available)),
            Some(keys) => {
                let chosen: HashSet<_> = keys.iter().cloned().collect();
                prop_assert_eq!(chosen.len(), keys.len());
                prop_assert!(chosen.is_subset(&available));
                prop_assert!(is_satisfied(&tree, &chosen));
            }
        }
    }

    #[test]
    fn covering_is_deterministic(tree in key_tree(), available in key_set()) {
        prop_assert_eq!(
            select_covering(&tree, &available),
            select_covering(&tree.clone(), &available.clone())
        );
    }

    #[test]
    fn covering_never_exceeds_flattened_keys(tree in key_tree()) {
        let all: HashSet<_> = tree.flatten().into_iter().collect();
        // only contract slots can leave a tree unsatisfiable by its own keys
        if let Some(keys) = select_covering(&tree, &all) {
            prop_assert!(keys.len() <= all.len());
        }
    }

    #[test]
    fn contract_only_tree_never_satisfied(tree in key_tree()) {
        let everything: HashSet<_> = (0..POOL).map(key).collect();
        if tree.flatten().is_empty() {
            prop_assert!(!is_satisfied(&tree, &everything));
            prop_assert!(select_covering(&tree, &everything).is_none());
        }
    }
}

#[test]
fn wire_round_trip_keeps_satisfaction() {
    use ed25519_dalek::SigningKey;

    let ids: Vec<PublicKeyId> = (1..=4u8)
        .map(|seed| {
            PublicKeyId::from_bytes(
                SigningKey::from_bytes(&[seed; 32])
                    .verifying_key()
                    .as_bytes()
                    .to_vec(),
            )
        })
        .collect();

    let nested = KeyTree::threshold(
        vec![KeyTree::leaf(ids[2].clone()), KeyTree::leaf(ids[3].clone())],
        2,
    )
    .unwrap();
    let tree = KeyTree::threshold(
        vec![KeyTree::leaf(ids[0].clone()), KeyTree::leaf(ids[1].clone()), nested],
        2,
    )
    .unwrap();

    let decoded = decode_key(&encode_key(&tree).unwrap()).unwrap();
    let signed: HashSet<_> = [ids[0].clone(), ids[2].clone(), ids[3].clone()].into();

    assert_eq!(decoded, tree);
    assert!(is_satisfied(&decoded, &signed));
    assert_eq!(
        select_covering(&decoded, &signed),
        Some(vec![ids[0].clone(), ids[2].clone(), ids[3].clone()])
    );
}
