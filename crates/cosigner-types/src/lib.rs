//! Core types for cosigner
//!
//! Account identifiers, caller key ownership, the transaction decoder that
//! extracts signing surfaces from transaction bytes, and configuration.

pub mod account;
pub mod clock;
pub mod config;
pub mod tx;
pub mod user;

pub use account::{AccountId, AccountIdError};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{
    Config, ConfigError, LogConfig, LookupFailurePolicy, MirrorConfig, ResolverConfig,
};
pub use tx::{
    encode_signed_transaction, DecodedTransaction, TransactionEntities, TransactionId,
    TransactionKind, TxDecodeError, TxDecoder,
};
pub use user::{SignatureRecord, TransactionRecordId, UserId, UserKey, UserKeyId};
