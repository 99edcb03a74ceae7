//! Resolution against stored signatures and user keys

use crate::fetcher::MirrorNetwork;
use crate::resolver::{SigningReport, SigningRequirementResolver};
use crate::store::{SignerStore, UserKeyStore};
use cosigner_errors::Result;
use cosigner_types::{TransactionRecordId, UserId, UserKey, UserKeyId};
use std::sync::Arc;
use tracing::{debug, instrument};

/// A transaction awaiting signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTransaction {
    pub id: TransactionRecordId,
    pub bytes: Vec<u8>,
    pub network: MirrorNetwork,
}

/// Signing service
///
/// Loads already-applied signatures and caller keys from the stores, then
/// delegates to the resolver.
pub struct SigningService {
    resolver: SigningRequirementResolver,
    signers: Arc<dyn SignerStore>,
    user_keys: Arc<dyn UserKeyStore>,
}

impl SigningService {
    pub fn new(
        resolver: SigningRequirementResolver,
        signers: Arc<dyn SignerStore>,
        user_keys: Arc<dyn UserKeyStore>,
    ) -> Self {
        Self {
            resolver,
            signers,
            user_keys,
        }
    }

    pub fn resolver(&self) -> &SigningRequirementResolver {
        &self.resolver
    }

    /// Keys that still have to sign `pending`
    ///
    /// Without explicit caller keys every stored key is considered.
    #[instrument(skip_all, fields(tx = %pending.id))]
    pub async fn keys_required_to_sign(
        &self,
        pending: &PendingTransaction,
        caller_keys: Option<Vec<UserKey>>,
    ) -> Result<Vec<UserKey>> {
        let already_signed = self.signers.signed_keys(pending.id).await?;
        let caller_keys = match caller_keys {
            Some(keys) => keys,
            None => self.user_keys.all_keys().await?,
        };

        self.resolver
            .required_keys(
                &pending.bytes,
                &pending.network,
                &already_signed,
                &caller_keys,
            )
            .await
    }

    /// Ids of the user's keys that still have to sign `pending`
    #[instrument(skip_all, fields(tx = %pending.id, user = %user))]
    pub async fn user_keys_required_to_sign(
        &self,
        pending: &PendingTransaction,
        user: UserId,
    ) -> Result<Vec<UserKeyId>> {
        let keys = self.user_keys.keys_for_user(user).await?;
        if keys.is_empty() {
            debug!("user has no keys");
            return Ok(Vec::new());
        }

        let required = self.keys_required_to_sign(pending, Some(keys)).await?;
        Ok(required.into_iter().map(|k| k.id).collect())
    }

    /// Detailed report for `pending`, using every stored key
    pub async fn signing_report(&self, pending: &PendingTransaction) -> Result<SigningReport> {
        let already_signed = self.signers.signed_keys(pending.id).await?;
        let caller_keys = self.user_keys.all_keys().await?;

        self.resolver
            .report(
                &pending.bytes,
                &pending.network,
                &already_signed,
                &caller_keys,
            )
            .await
    }
}
