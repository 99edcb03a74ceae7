//! Account key lookup

use async_trait::async_trait;
use cosigner_crypto::KeyTree;
use cosigner_types::AccountId;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("account not found:: {0}")]
    NotFound(AccountId),

    #[error("http request failed:: {0}")]
    Http(String),

    #[error("invalid response:: {0}")]
    InvalidResponse(String),

    #[error("lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Network whose mirror node answers account lookups
///
/// Either a configured network name (`testnet`) or a base URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MirrorNetwork(String);

impl MirrorNetwork {
    pub fn new(network: impl Into<String>) -> Self {
        Self(network.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MirrorNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MirrorNetwork {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Key metadata of an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountKeyInfo {
    /// `None` for accounts without a key
    pub key: Option<KeyTree>,
    pub receiver_sig_required: bool,
}

/// Source of current account keys
#[async_trait]
pub trait AccountKeyFetcher: Send + Sync {
    async fn fetch_account_key(
        &self,
        account: &AccountId,
        network: &MirrorNetwork,
    ) -> Result<AccountKeyInfo, FetchError>;
}

enum Entry {
    Found(AccountKeyInfo),
    Failing(FetchError),
}

/// In-memory account key table
///
/// Unknown accounts answer `NotFound`. Accounts can be made to fail or to
/// answer slowly. Calls are counted when they start and again when they
/// finish.
#[derive(Default)]
pub struct MemoryAccountKeyFetcher {
    accounts: RwLock<HashMap<AccountId, Entry>>,
    delays: RwLock<HashMap<AccountId, Duration>>,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl MemoryAccountKeyFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: AccountId, key: Option<KeyTree>, receiver_sig_required: bool) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(
                account,
                Entry::Found(AccountKeyInfo {
                    key,
                    receiver_sig_required,
                }),
            );
        }
    }

    pub fn fail(&self, account: AccountId, error: FetchError) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(account, Entry::Failing(error));
        }
    }

    pub fn delay(&self, account: AccountId, delay: Duration) {
        if let Ok(mut delays) = self.delays.write() {
            delays.insert(account, delay);
        }
    }

    /// Number of lookups started so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of lookups that ran to completion
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountKeyFetcher for MemoryAccountKeyFetcher {
    async fn fetch_account_key(
        &self,
        account: &AccountId,
        _network: &MirrorNetwork,
    ) -> Result<AccountKeyInfo, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .delays
            .read()
            .ok()
            .and_then(|delays| delays.get(account).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);

        let accounts = self
            .accounts
            .read()
            .map_err(|e| FetchError::Http(e.to_string()))?;
        match accounts.get(account) {
            Some(Entry::Found(info)) => Ok(info.clone()),
            Some(Entry::Failing(err)) => Err(err.clone()),
            None => Err(FetchError::NotFound(*account)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosigner_crypto::PublicKeyId;

    #[tokio::test]
    async fn test_memory_fetcher() {
        let fetcher = MemoryAccountKeyFetcher::new();
        let account = AccountId::new(0, 0, 1001);
        let key = KeyTree::leaf(PublicKeyId::from_bytes(vec![1; 32]));
        fetcher.insert(account, Some(key.clone()), true);

        let network = MirrorNetwork::from("testnet");
        let info = fetcher.fetch_account_key(&account, &network).await.unwrap();
        assert_eq!(info.key, Some(key));
        assert!(info.receiver_sig_required);

        let missing = AccountId::new(0, 0, 9);
        assert_eq!(
            fetcher.fetch_account_key(&missing, &network).await,
            Err(FetchError::NotFound(missing))
        );
        assert_eq!(fetcher.calls(), 2);
        assert_eq!(fetcher.completed(), 2);
    }

    #[tokio::test]
    async fn test_memory_fetcher_failure() {
        let fetcher = MemoryAccountKeyFetcher::new();
        let account = AccountId::new(0, 0, 7);
        fetcher.fail(account, FetchError::Http("connection refused".into()));

        let result = fetcher
            .fetch_account_key(&account, &MirrorNetwork::from("testnet"))
            .await;
        assert!(matches!(result, Err(FetchError::Http(_))));
    }
}
