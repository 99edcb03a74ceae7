//! Protobuf wire encoding of key structures
//!
//! Mirrors the `Key`, `ThresholdKey` and `KeyList` messages of the ledger's
//! basic types. Ed25519 and compressed secp256k1 keys become signing leaves
//! and contract ids become [`UnsignedKey`] leaves. RSA-3072 and ECDSA-384
//! are recognised so that they fail with a precise error instead of a
//! generic decode failure.

use crate::key_tree::{KeyStructureError, KeyTree, UnsignedKey, MAX_KEY_DEPTH};
use crate::keys::PublicKey;
use prost::Message;

/// Protobuf representation of a key
#[derive(Clone, PartialEq, Message)]
pub struct KeyProto {
    #[prost(oneof = "key_proto::Key", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub key: Option<key_proto::Key>,
}

/// Nested module for key variants
pub mod key_proto {
    use super::*;

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Key {
        #[prost(message, tag = "1")]
        ContractId(ContractIdProto),
        #[prost(bytes = "vec", tag = "2")]
        Ed25519(Vec<u8>),
        #[prost(bytes = "vec", tag = "3")]
        Rsa3072(Vec<u8>),
        #[prost(bytes = "vec", tag = "4")]
        Ecdsa384(Vec<u8>),
        #[prost(message, tag = "5")]
        ThresholdKey(ThresholdKeyProto),
        #[prost(message, tag = "6")]
        KeyList(KeyListProto),
        #[prost(bytes = "vec", tag = "7")]
        EcdsaSecp256k1(Vec<u8>),
        #[prost(message, tag = "8")]
        DelegatableContractId(ContractIdProto),
    }
}

/// Protobuf representation of a threshold key
#[derive(Clone, PartialEq, Message)]
pub struct ThresholdKeyProto {
    #[prost(uint32, tag = "1")]
    pub threshold: u32,
    #[prost(message, optional, tag = "2")]
    pub keys: Option<KeyListProto>,
}

/// Protobuf representation of a key list
#[derive(Clone, PartialEq, Message)]
pub struct KeyListProto {
    #[prost(message, repeated, tag = "1")]
    pub keys: Vec<KeyProto>,
}

/// Protobuf representation of a contract id
#[derive(Clone, PartialEq, Message)]
pub struct ContractIdProto {
    #[prost(int64, tag = "1")]
    pub shard_num: i64,
    #[prost(int64, tag = "2")]
    pub realm_num: i64,
    #[prost(int64, tag = "3")]
    pub contract_num: i64,
}

/// Decode a protobuf-encoded key with the default depth cap
pub fn decode_key(bytes: &[u8]) -> Result<KeyTree, KeyStructureError> {
    decode_key_with_limit(bytes, MAX_KEY_DEPTH)
}

/// Decode a protobuf-encoded key, rejecting nesting deeper than `max_depth`
pub fn decode_key_with_limit(bytes: &[u8], max_depth: usize) -> Result<KeyTree, KeyStructureError> {
    let proto = KeyProto::decode(bytes)?;
    key_from_proto(&proto, max_depth)
}

/// Decode a hex string holding a protobuf-encoded key
pub fn decode_key_hex(s: &str, max_depth: usize) -> Result<KeyTree, KeyStructureError> {
    let s = s.trim();
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| KeyStructureError::InvalidHex(e.to_string()))?;
    decode_key_with_limit(&bytes, max_depth)
}

/// Convert an already-decoded protobuf key
pub fn key_from_proto(proto: &KeyProto, max_depth: usize) -> Result<KeyTree, KeyStructureError> {
    convert(proto, 0, max_depth)
}

fn convert(proto: &KeyProto, level: usize, max_depth: usize) -> Result<KeyTree, KeyStructureError> {
    use key_proto::Key;

    match proto.key.as_ref() {
        Some(Key::Ed25519(bytes)) => Ok(PublicKey::from_ed25519_bytes(bytes)?.into()),
        Some(Key::EcdsaSecp256k1(bytes)) => Ok(PublicKey::from_secp256k1_bytes(bytes)?.into()),
        Some(Key::ThresholdKey(threshold_key)) => {
            let keys = threshold_key
                .keys
                .as_ref()
                .map(|list| list.keys.as_slice())
                .unwrap_or(&[]);
            let children = convert_children(keys, level, max_depth)?;
            KeyTree::threshold_with_limit(children, threshold_key.threshold as usize, max_depth)
        }
        Some(Key::KeyList(list)) => {
            let children = convert_children(&list.keys, level, max_depth)?;
            let threshold = children.len();
            KeyTree::threshold_with_limit(children, threshold, max_depth)
        }
        Some(Key::ContractId(id)) => Ok(KeyTree::unsigned(UnsignedKey::Contract {
            shard: id.shard_num,
            realm: id.realm_num,
            num: id.contract_num,
        })),
        Some(Key::DelegatableContractId(id)) => {
            Ok(KeyTree::unsigned(UnsignedKey::DelegatableContract {
                shard: id.shard_num,
                realm: id.realm_num,
                num: id.contract_num,
            }))
        }
        Some(Key::Rsa3072(_)) => Err(unsupported("RSA-3072")),
        Some(Key::Ecdsa384(_)) => Err(unsupported("ECDSA-384")),
        None => Err(unsupported("empty key")),
    }
}

fn convert_children(
    keys: &[KeyProto],
    level: usize,
    max_depth: usize,
) -> Result<Vec<KeyTree>, KeyStructureError> {
    // a threshold node at `level` makes the whole tree at least `level + 1` deep
    if level >= max_depth {
        return Err(KeyStructureError::DepthExceeded { limit: max_depth });
    }
    keys.iter()
        .map(|key| convert(key, level + 1, max_depth))
        .collect()
}

fn unsupported(kind: &str) -> KeyStructureError {
    KeyStructureError::UnsupportedKeyType(kind.to_string())
}

/// Convert a tree to its protobuf form; threshold nodes become `ThresholdKey`
pub fn key_to_proto(tree: &KeyTree) -> Result<KeyProto, KeyStructureError> {
    use key_proto::Key;

    let key = match tree {
        KeyTree::Leaf(id) => match PublicKey::from_id(id)? {
            PublicKey::Ed25519(_) => Key::Ed25519(id.as_bytes().to_vec()),
            PublicKey::EcdsaSecp256k1(_) => Key::EcdsaSecp256k1(id.as_bytes().to_vec()),
        },
        KeyTree::Threshold(node) => Key::ThresholdKey(ThresholdKeyProto {
            threshold: node.threshold() as u32,
            keys: Some(KeyListProto {
                keys: node
                    .keys()
                    .iter()
                    .map(key_to_proto)
                    .collect::<Result<_, _>>()?,
            }),
        }),
        KeyTree::Unsigned(UnsignedKey::Contract { shard, realm, num }) => {
            Key::ContractId(contract_id(*shard, *realm, *num))
        }
        KeyTree::Unsigned(UnsignedKey::DelegatableContract { shard, realm, num }) => {
            Key::DelegatableContractId(contract_id(*shard, *realm, *num))
        }
    };

    Ok(KeyProto { key: Some(key) })
}

fn contract_id(shard_num: i64, realm_num: i64, contract_num: i64) -> ContractIdProto {
    ContractIdProto {
        shard_num,
        realm_num,
        contract_num,
    }
}

/// Encode a tree to protobuf bytes
pub fn encode_key(tree: &KeyTree) -> Result<Vec<u8>, KeyStructureError> {
    Ok(key_to_proto(tree)?.encode_to_vec())
}

/// Encode a tree to hex of its protobuf bytes
pub fn encode_key_hex(tree: &KeyTree) -> Result<String, KeyStructureError> {
    Ok(hex::encode(encode_key(tree)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::PublicKeyId;
    use ed25519_dalek::SigningKey as Ed25519PrivKey;
    use k256::ecdsa::SigningKey as Secp256k1PrivKey;

    fn ed25519(seed: u8) -> Vec<u8> {
        Ed25519PrivKey::from_bytes(&[seed; 32])
            .verifying_key()
            .as_bytes()
            .to_vec()
    }

    fn secp256k1(seed: u8) -> Vec<u8> {
        Secp256k1PrivKey::from_slice(&[seed; 32])
            .unwrap()
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    fn ed_proto(seed: u8) -> KeyProto {
        KeyProto {
            key: Some(key_proto::Key::Ed25519(ed25519(seed))),
        }
    }

    fn threshold_proto(threshold: u32, keys: Vec<KeyProto>) -> KeyProto {
        KeyProto {
            key: Some(key_proto::Key::ThresholdKey(ThresholdKeyProto {
                threshold,
                keys: Some(KeyListProto { keys }),
            })),
        }
    }

    #[test]
    fn test_decode_single_keys() {
        let tree = decode_key(&ed_proto(1).encode_to_vec()).unwrap();
        assert_eq!(tree, KeyTree::leaf(PublicKeyId::from_bytes(ed25519(1))));

        let proto = KeyProto {
            key: Some(key_proto::Key::EcdsaSecp256k1(secp256k1(2))),
        };
        let tree = decode_key(&proto.encode_to_vec()).unwrap();
        assert_eq!(tree.flatten(), vec![PublicKeyId::from_bytes(secp256k1(2))]);
    }

    #[test]
    fn test_decode_threshold_and_key_list() {
        let list = KeyProto {
            key: Some(key_proto::Key::KeyList(KeyListProto {
                keys: vec![ed_proto(3), ed_proto(4)],
            })),
        };
        let proto = threshold_proto(1, vec![ed_proto(1), list]);

        let tree = decode_key(&proto.encode_to_vec()).unwrap();
        assert_eq!(tree.threshold_of(), 1);
        assert_eq!(tree.depth(), 2);
        match &tree {
            KeyTree::Threshold(node) => assert_eq!(node.keys()[1].threshold_of(), 2),
            _ => panic!("expected threshold node"),
        }
    }

    #[test]
    fn test_reject_zero_and_oversized_threshold() {
        let zero = threshold_proto(0, vec![ed_proto(1)]);
        assert!(matches!(
            decode_key(&zero.encode_to_vec()),
            Err(KeyStructureError::InvalidThreshold { .. })
        ));

        let oversized = threshold_proto(3, vec![ed_proto(1), ed_proto(2)]);
        assert!(matches!(
            decode_key(&oversized.encode_to_vec()),
            Err(KeyStructureError::InvalidThreshold {
                threshold: 3,
                children: 2
            })
        ));
    }

    #[test]
    fn test_reject_empty_lists() {
        let empty = threshold_proto(1, vec![]);
        assert!(decode_key(&empty.encode_to_vec()).is_err());

        let empty_list = KeyProto {
            key: Some(key_proto::Key::KeyList(KeyListProto { keys: vec![] })),
        };
        assert!(matches!(
            decode_key(&empty_list.encode_to_vec()),
            Err(KeyStructureError::EmptyKeyList)
        ));
    }

    #[test]
    fn test_contract_id_beside_user_key() {
        let contract = KeyProto {
            key: Some(key_proto::Key::ContractId(contract_id(0, 0, 1001))),
        };
        let proto = threshold_proto(1, vec![contract, ed_proto(1)]);

        let tree = decode_key(&proto.encode_to_vec()).unwrap();
        let user = PublicKeyId::from_bytes(ed25519(1));
        assert_eq!(tree.flatten(), vec![user.clone()]);
        assert!(tree.contains(&user));
        match &tree {
            KeyTree::Threshold(node) => assert_eq!(
                node.keys()[0],
                KeyTree::unsigned(UnsignedKey::Contract {
                    shard: 0,
                    realm: 0,
                    num: 1001
                })
            ),
            _ => panic!("expected threshold node"),
        }

        assert_eq!(decode_key(&encode_key(&tree).unwrap()).unwrap(), tree);
    }

    #[test]
    fn test_delegatable_contract_alone_never_signs() {
        let proto = KeyProto {
            key: Some(key_proto::Key::DelegatableContractId(contract_id(0, 0, 5))),
        };
        let tree = decode_key(&proto.encode_to_vec()).unwrap();
        assert!(tree.flatten().is_empty());
        assert!(!tree.is_satisfied_by(&Default::default()));
    }

    #[test]
    fn test_reject_unsupported_and_garbage() {
        let rsa = KeyProto {
            key: Some(key_proto::Key::Rsa3072(vec![1; 384])),
        };
        assert!(matches!(
            decode_key(&rsa.encode_to_vec()),
            Err(KeyStructureError::UnsupportedKeyType(_))
        ));

        assert!(decode_key(&[0xff, 0xff, 0xff]).is_err());
        assert!(decode_key(&[]).is_err());
    }

    #[test]
    fn test_depth_limit_on_decode() {
        let mut proto = ed_proto(1);
        for _ in 0..4 {
            proto = threshold_proto(1, vec![proto]);
        }
        let bytes = proto.encode_to_vec();

        assert_eq!(decode_key_with_limit(&bytes, 4).unwrap().depth(), 4);
        assert!(matches!(
            decode_key_with_limit(&bytes, 3),
            Err(KeyStructureError::DepthExceeded { limit: 3 })
        ));
    }

    #[test]
    fn test_encode_decode_preserves_structure() {
        let inner = KeyTree::threshold(
            vec![
                KeyTree::leaf(PublicKeyId::from_bytes(secp256k1(5))),
                KeyTree::leaf(PublicKeyId::from_bytes(ed25519(6))),
            ],
            1,
        )
        .unwrap();
        let tree =
            KeyTree::threshold(vec![KeyTree::leaf(PublicKeyId::from_bytes(ed25519(7))), inner], 2)
                .unwrap();

        let encoded = encode_key_hex(&tree).unwrap();
        assert_eq!(decode_key_hex(&encoded, MAX_KEY_DEPTH).unwrap(), tree);
    }

    #[test]
    fn test_encode_rejects_unknown_key_length() {
        let tree = KeyTree::leaf(PublicKeyId::from_bytes(vec![1, 2, 3]));
        assert!(matches!(
            encode_key(&tree),
            Err(KeyStructureError::InvalidPublicKey(_))
        ));
    }
}
