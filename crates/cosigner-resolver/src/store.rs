//! Signature and user key stores

use async_trait::async_trait;
use cosigner_crypto::PublicKeyId;
use cosigner_types::{SignatureRecord, TransactionRecordId, UserId, UserKey};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store backend error:: {0}")]
    Backend(String),

    #[error("store decode error:: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<StoreError> for cosigner_errors::Error {
    fn from(err: StoreError) -> Self {
        cosigner_errors::Error::Store(err.to_string())
    }
}

/// Signatures already applied to pending transactions
#[async_trait]
pub trait SignerStore: Send + Sync {
    /// Keys that already signed the transaction; empty when none are recorded
    async fn signed_keys(
        &self,
        tx: TransactionRecordId,
    ) -> Result<HashSet<PublicKeyId>, StoreError>;
}

/// Keys owned by users
#[async_trait]
pub trait UserKeyStore: Send + Sync {
    async fn keys_for_user(&self, user: UserId) -> Result<Vec<UserKey>, StoreError>;

    async fn all_keys(&self) -> Result<Vec<UserKey>, StoreError>;
}

/// In-memory signer store
#[derive(Default)]
pub struct MemorySignerStore {
    signatures: RwLock<HashMap<TransactionRecordId, Vec<SignatureRecord>>>,
}

impl MemorySignerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, tx: TransactionRecordId, signature: SignatureRecord) {
        self.signatures
            .write()
            .await
            .entry(tx)
            .or_default()
            .push(signature);
    }
}

#[async_trait]
impl SignerStore for MemorySignerStore {
    async fn signed_keys(
        &self,
        tx: TransactionRecordId,
    ) -> Result<HashSet<PublicKeyId>, StoreError> {
        let signatures = self.signatures.read().await;
        Ok(signatures
            .get(&tx)
            .map(|records| records.iter().map(|r| r.public_key.clone()).collect())
            .unwrap_or_default())
    }
}

/// In-memory user key store, keeping insertion order
#[derive(Default)]
pub struct MemoryUserKeyStore {
    keys: RwLock<Vec<UserKey>>,
}

impl MemoryUserKeyStore {
    pub fn new(keys: Vec<UserKey>) -> Self {
        Self {
            keys: RwLock::new(keys),
        }
    }

    /// Load keys from a JSON array of `{id, user_id, public_key}`
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let keys: Vec<UserKey> = serde_json::from_str(json)?;
        Ok(Self::new(keys))
    }

    pub async fn insert(&self, key: UserKey) {
        self.keys.write().await.push(key);
    }
}

#[async_trait]
impl UserKeyStore for MemoryUserKeyStore {
    async fn keys_for_user(&self, user: UserId) -> Result<Vec<UserKey>, StoreError> {
        let keys = self.keys.read().await;
        Ok(keys.iter().filter(|k| k.user_id == user).cloned().collect())
    }

    async fn all_keys(&self) -> Result<Vec<UserKey>, StoreError> {
        Ok(self.keys.read().await.clone())
    }
}
