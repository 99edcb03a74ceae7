//! Mirror node REST client for account key lookups

use crate::fetcher::{AccountKeyFetcher, AccountKeyInfo, FetchError, MirrorNetwork};
use async_trait::async_trait;
use cosigner_crypto::{decode_key_hex, KeyStructureError, KeyTree, PublicKey, PublicKeyId};
use cosigner_types::{AccountId, MirrorConfig};
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Account record as served by `/api/v1/accounts/{id}`
#[derive(Deserialize, Debug)]
pub struct AccountResponse {
    pub account: Option<String>,
    pub key: Option<MirrorKey>,
    pub receiver_sig_required: Option<bool>,
}

/// Key encoding used by the mirror node
#[derive(Deserialize, Debug)]
pub struct MirrorKey {
    #[serde(rename = "_type")]
    pub key_type: String,
    pub key: String,
}

impl MirrorKey {
    pub fn to_key_tree(&self, max_depth: usize) -> Result<KeyTree, KeyStructureError> {
        match self.key_type.as_str() {
            "ED25519" => {
                let id = PublicKeyId::from_hex(&self.key)?;
                Ok(PublicKey::from_ed25519_bytes(id.as_bytes())?.into())
            }
            "ECDSA_SECP256K1" => {
                let id = PublicKeyId::from_hex(&self.key)?;
                Ok(PublicKey::from_secp256k1_bytes(id.as_bytes())?.into())
            }
            "ProtobufEncoded" => decode_key_hex(&self.key, max_depth),
            other => Err(KeyStructureError::UnsupportedKeyType(other.to_string())),
        }
    }
}

impl AccountResponse {
    /// Convert into lookup metadata; an undecodable key is an invalid response
    pub fn into_key_info(self, max_depth: usize) -> Result<AccountKeyInfo, FetchError> {
        let key = self
            .key
            .map(|k| k.to_key_tree(max_depth))
            .transpose()
            .map_err(|e| FetchError::InvalidResponse(format!("account key: {e}")))?;

        Ok(AccountKeyInfo {
            key,
            receiver_sig_required: self.receiver_sig_required.unwrap_or(false),
        })
    }
}

/// Account key fetcher backed by a mirror node
pub struct MirrorNodeClient {
    config: MirrorConfig,
    max_key_depth: usize,
    http_client: HttpClient,
}

impl MirrorNodeClient {
    pub fn new(config: MirrorConfig, max_key_depth: usize) -> Result<Self, FetchError> {
        let http_client = HttpClient::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(Self {
            config,
            max_key_depth,
            http_client,
        })
    }

    /// Account endpoint URL for a network
    pub fn account_url(
        &self,
        account: &AccountId,
        network: &MirrorNetwork,
    ) -> Result<String, FetchError> {
        let base = self.config.base_url(network.as_str()).ok_or_else(|| {
            FetchError::Http(format!("no mirror node configured for network '{network}'"))
        })?;
        Ok(format!("{base}/api/v1/accounts/{account}"))
    }
}

#[async_trait]
impl AccountKeyFetcher for MirrorNodeClient {
    async fn fetch_account_key(
        &self,
        account: &AccountId,
        network: &MirrorNetwork,
    ) -> Result<AccountKeyInfo, FetchError> {
        let url = self.account_url(account, network)?;
        debug!(%account, %url, "fetching account key");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.config.request_timeout())
                } else {
                    FetchError::Http(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(FetchError::NotFound(*account)),
            status if !status.is_success() => {
                return Err(FetchError::Http(format!("{url} returned {status}")))
            }
            _ => {}
        }

        let body: AccountResponse = response
            .json()
            .await
            .map_err(|e| FetchError::InvalidResponse(e.to_string()))?;

        body.into_key_info(self.max_key_depth)
    }
}
