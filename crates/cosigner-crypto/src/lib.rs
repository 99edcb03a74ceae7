//! Key structures for multi-party signing
//!
//! This crate provides the public key types, the hierarchical threshold
//! [`KeyTree`], its satisfaction predicate, covering-subset selection and the
//! protobuf wire codec for keys.

pub mod covering;
pub mod key_tree;
pub mod keys;
pub mod proto;
pub mod threshold;

pub use covering::select_covering;
pub use key_tree::{KeyStructureError, KeyTree, ThresholdKey, UnsignedKey, MAX_KEY_DEPTH};
pub use keys::{PublicKey, PublicKeyId};
pub use proto::{
    decode_key, decode_key_hex, decode_key_with_limit, encode_key, encode_key_hex, key_from_proto,
    key_to_proto, KeyProto,
};
pub use threshold::is_satisfied;
