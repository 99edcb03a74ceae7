//! Signing-requirement resolution for cosigner
//!
//! Combines the key structures of a decoded transaction with account keys
//! fetched from a mirror node, the signatures already applied and the
//! caller's keys, and reports which caller keys still have to sign.

pub mod fetcher;
pub mod mirror;
pub mod resolver;
pub mod service;
pub mod store;

pub use fetcher::{
    AccountKeyFetcher, AccountKeyInfo, FetchError, MemoryAccountKeyFetcher, MirrorNetwork,
};
pub use mirror::MirrorNodeClient;
pub use resolver::{Entity, EntityReport, SigningReport, SigningRequirementResolver, SkippedAccount};
pub use service::{PendingTransaction, SigningService};
pub use store::{MemorySignerStore, MemoryUserKeyStore, SignerStore, StoreError, UserKeyStore};
