//! Signing-requirement resolution
//!
//! Given a decoded transaction, the keys that already signed it and a pool of
//! caller keys, [`SigningRequirementResolver`] works out which caller keys
//! still have to sign. Every entity the transaction touches contributes its
//! own [`KeyTree`]: key structures installed by the transaction itself, the
//! keys of debited accounts and, when the account asks for it, the keys of
//! receiving accounts. Account keys are fetched fresh on every resolution.

use crate::fetcher::{AccountKeyFetcher, AccountKeyInfo, FetchError, MirrorNetwork};
use cosigner_crypto::{KeyTree, PublicKeyId};
use cosigner_errors::{Error, Result};
use cosigner_types::{
    AccountId, Clock, DecodedTransaction, LookupFailurePolicy, ResolverConfig, SystemClock,
    TransactionEntities, TxDecoder, UserKey, UserKeyId,
};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// An authorization surface of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    /// Key structure installed by the transaction, by position
    NewKey { index: usize },
    DebitedAccount { account: AccountId },
    ReceiverAccount { account: AccountId },
}

/// Evaluation of one entity's key tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub entity: Entity,
    /// Whether the signatures already applied satisfy the entity
    pub satisfied: bool,
    /// Small set of keys, drawn from the applied signatures and the caller's
    /// keys, that satisfies the entity; `None` when they cannot
    pub covering: Option<Vec<PublicKeyId>>,
}

/// An account left out of the resolution because its key could not be fetched
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedAccount {
    pub account: AccountId,
    pub reason: String,
}

/// Full outcome of a resolution
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SigningReport {
    /// Caller keys that still have to sign, in caller order
    pub required: Vec<UserKey>,
    pub entities: Vec<EntityReport>,
    pub skipped: Vec<SkippedAccount>,
    pub expired: bool,
}

impl SigningReport {
    fn expired() -> Self {
        Self {
            expired: true,
            ..Self::default()
        }
    }

    /// Whether the applied signatures satisfy every entity that was evaluated
    ///
    /// Expired transactions and resolutions with skipped accounts are never
    /// executable.
    pub fn is_executable(&self) -> bool {
        !self.expired && self.skipped.is_empty() && self.entities.iter().all(|e| e.satisfied)
    }

    pub fn required_ids(&self) -> Vec<UserKeyId> {
        self.required.iter().map(|k| k.id).collect()
    }
}

/// Computes which caller keys still have to sign a transaction
pub struct SigningRequirementResolver {
    fetcher: Arc<dyn AccountKeyFetcher>,
    clock: Arc<dyn Clock>,
    decoder: TxDecoder,
    config: ResolverConfig,
}

impl SigningRequirementResolver {
    pub fn new(fetcher: Arc<dyn AccountKeyFetcher>, config: ResolverConfig) -> Self {
        Self {
            fetcher,
            clock: Arc::new(SystemClock),
            decoder: TxDecoder::with_max_key_depth(config.max_key_depth),
            config,
        }
    }

    /// Replace the clock used for expiry checks
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Caller keys that still have to sign `tx_bytes`
    ///
    /// Expired transactions and empty caller pools resolve to nothing without
    /// any account lookup.
    pub async fn required_keys(
        &self,
        tx_bytes: &[u8],
        network: &MirrorNetwork,
        already_signed: &HashSet<PublicKeyId>,
        caller_keys: &[UserKey],
    ) -> Result<Vec<UserKey>> {
        let decoded = self.decoder.decode(tx_bytes)?;
        if decoded.is_expired(self.clock.as_ref()) {
            debug!(tx = %decoded.transaction_id, "transaction expired");
            return Ok(Vec::new());
        }
        if caller_keys.is_empty() {
            return Ok(Vec::new());
        }

        let report = self
            .evaluate(&decoded.entities, network, already_signed, caller_keys)
            .await?;
        Ok(report.required)
    }

    /// Like [`Self::required_keys`] but with per-entity detail
    pub async fn report(
        &self,
        tx_bytes: &[u8],
        network: &MirrorNetwork,
        already_signed: &HashSet<PublicKeyId>,
        caller_keys: &[UserKey],
    ) -> Result<SigningReport> {
        let decoded = self.decoder.decode(tx_bytes)?;
        self.report_decoded(&decoded, network, already_signed, caller_keys)
            .await
    }

    pub async fn report_decoded(
        &self,
        decoded: &DecodedTransaction,
        network: &MirrorNetwork,
        already_signed: &HashSet<PublicKeyId>,
        caller_keys: &[UserKey],
    ) -> Result<SigningReport> {
        if decoded.is_expired(self.clock.as_ref()) {
            debug!(tx = %decoded.transaction_id, "transaction expired");
            return Ok(SigningReport::expired());
        }
        self.evaluate(&decoded.entities, network, already_signed, caller_keys)
            .await
    }

    /// Evaluate an entity set against the applied signatures and caller keys
    #[instrument(skip_all, fields(network = %network, accounts = entities.accounts().len()))]
    pub async fn evaluate(
        &self,
        entities: &TransactionEntities,
        network: &MirrorNetwork,
        already_signed: &HashSet<PublicKeyId>,
        caller_keys: &[UserKey],
    ) -> Result<SigningReport> {
        let candidates: Vec<&UserKey> = caller_keys
            .iter()
            .filter(|k| !already_signed.contains(&k.public_key))
            .collect();

        let available: HashSet<PublicKeyId> = already_signed
            .iter()
            .cloned()
            .chain(caller_keys.iter().map(|k| k.public_key.clone()))
            .collect();

        let mut marked = HashSet::new();
        let mut report = SigningReport::default();
        let mut check = |entity: Entity, tree: &KeyTree| {
            for key in &candidates {
                if tree.contains(&key.public_key) {
                    marked.insert(key.id);
                }
            }
            report.entities.push(EntityReport {
                entity,
                satisfied: tree.is_satisfied_by(already_signed),
                covering: tree.covering_keys(&available),
            });
        };

        for (index, tree) in entities.new_key_structures.iter().enumerate() {
            check(Entity::NewKey { index }, tree);
        }

        let accounts = entities.accounts();
        let mut lookups = self.fetch_all(&accounts, network).await;

        let mut keys: HashMap<AccountId, AccountKeyInfo> = HashMap::new();
        let mut skipped = Vec::new();
        for account in accounts {
            let result = lookups
                .remove(&account)
                .unwrap_or_else(|| Err(FetchError::Http("lookup did not complete".to_string())));
            match result {
                Ok(info) => {
                    keys.insert(account, info);
                }
                Err(err) => match self.config.on_lookup_failure {
                    LookupFailurePolicy::Fail => {
                        return Err(Error::AccountLookupFailed {
                            account: account.to_string(),
                            reason: err.to_string(),
                        });
                    }
                    LookupFailurePolicy::Skip => {
                        warn!(%account, error = %err, "skipping account after failed key lookup");
                        skipped.push(SkippedAccount {
                            account,
                            reason: err.to_string(),
                        });
                    }
                },
            }
        }

        for account in &entities.debited_accounts {
            match keys.get(account) {
                Some(AccountKeyInfo { key: Some(tree), .. }) => {
                    check(Entity::DebitedAccount { account: *account }, tree)
                }
                Some(AccountKeyInfo { key: None, .. }) => {
                    debug!(%account, "account has no key");
                }
                None => {}
            }
        }

        for account in &entities.receiver_sig_required_accounts {
            match keys.get(account) {
                Some(AccountKeyInfo {
                    key: Some(tree),
                    receiver_sig_required: true,
                }) => check(Entity::ReceiverAccount { account: *account }, tree),
                Some(AccountKeyInfo { key: None, .. }) => {
                    debug!(%account, "account has no key");
                }
                _ => {}
            }
        }

        let mut emitted = HashSet::new();
        report.required = caller_keys
            .iter()
            .filter(|k| marked.contains(&k.id) && emitted.insert(k.id))
            .cloned()
            .collect();
        report.skipped = skipped;

        info!(
            required = report.required.len(),
            entities = report.entities.len(),
            skipped = report.skipped.len(),
            "resolved signing requirements"
        );
        Ok(report)
    }

    /// Fetch every account once, concurrently, bounded by the lookup limit
    async fn fetch_all(
        &self,
        accounts: &[AccountId],
        network: &MirrorNetwork,
    ) -> HashMap<AccountId, std::result::Result<AccountKeyInfo, FetchError>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_lookups.max(1)));
        let limit = self.config.lookup_timeout();
        let mut tasks = JoinSet::new();

        for account in accounts.iter().copied() {
            let fetcher = Arc::clone(&self.fetcher);
            let semaphore = Arc::clone(&semaphore);
            let network = network.clone();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        match tokio::time::timeout(
                            limit,
                            fetcher.fetch_account_key(&account, &network),
                        )
                        .await
                        {
                            Ok(result) => result,
                            Err(_) => Err(FetchError::Timeout(limit)),
                        }
                    }
                    Err(e) => Err(FetchError::Http(e.to_string())),
                };
                (account, result)
            });
        }

        let mut results = HashMap::with_capacity(accounts.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((account, result)) => {
                    results.insert(account, result);
                }
                Err(e) => warn!(error = %e, "account lookup task failed"),
            }
        }
        results
    }
}
