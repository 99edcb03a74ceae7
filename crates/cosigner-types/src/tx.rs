//! Transaction decoding
//!
//! Turns signed transaction bytes into the set of authorization surfaces the
//! transaction touches: key structures of entities it creates, accounts it
//! debits and accounts it pays into. Only the body fields that carry signing
//! requirements are modelled; unknown fields are skipped by prost.

use crate::account::{AccountId, AccountIdError};
use crate::clock::Clock;
use chrono::{DateTime, Duration, Utc};
use cosigner_crypto::proto::KeyProto;
use cosigner_crypto::{key_from_proto, KeyStructureError, KeyTree, MAX_KEY_DEPTH};
use prost::Message;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Transaction decoding error types
#[derive(Debug, thiserror::Error)]
pub enum TxDecodeError {
    /// Failed to decode protobuf
    #[error("protobuf decode error: {0}")]
    ProtobufError(String),

    /// Missing required fields
    #[error("missing required field: {0}")]
    MissingField(String),

    /// A key carried by the transaction is malformed
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyStructureError),

    #[error(transparent)]
    InvalidAccountId(#[from] AccountIdError),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl From<TxDecodeError> for cosigner_errors::Error {
    fn from(err: TxDecodeError) -> Self {
        match err {
            TxDecodeError::InvalidKey(inner) => inner.into(),
            other => cosigner_errors::Error::MalformedTransaction(other.to_string()),
        }
    }
}

// Protobuf representations of the transaction types

/// Protobuf representation of a signed transaction envelope
#[derive(Clone, PartialEq, Message)]
pub struct SignedTransactionProto {
    #[prost(bytes = "vec", tag = "1")]
    pub body_bytes: Vec<u8>,
}

/// Protobuf representation of a transaction body
#[derive(Clone, PartialEq, Message)]
pub struct TransactionBodyProto {
    #[prost(message, optional, tag = "1")]
    pub transaction_id: Option<TransactionIdProto>,
    #[prost(message, optional, tag = "2")]
    pub node_account_id: Option<AccountIdProto>,
    #[prost(uint64, tag = "3")]
    pub transaction_fee: u64,
    #[prost(message, optional, tag = "4")]
    pub transaction_valid_duration: Option<DurationProto>,
    #[prost(string, tag = "6")]
    pub memo: String,
    #[prost(oneof = "transaction_body_proto::Data", tags = "11, 12, 14, 15")]
    pub data: Option<transaction_body_proto::Data>,
}

/// Nested module for transaction body variants
pub mod transaction_body_proto {
    use super::*;

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "11")]
        CryptoCreateAccount(CryptoCreateProto),
        #[prost(message, tag = "12")]
        CryptoDelete(CryptoDeleteProto),
        #[prost(message, tag = "14")]
        CryptoTransfer(CryptoTransferProto),
        #[prost(message, tag = "15")]
        CryptoUpdateAccount(CryptoUpdateProto),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct TimestampProto {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
    #[prost(int32, tag = "2")]
    pub nanos: i32,
}

#[derive(Clone, PartialEq, Message)]
pub struct DurationProto {
    #[prost(int64, tag = "1")]
    pub seconds: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct AccountIdProto {
    #[prost(int64, tag = "1")]
    pub shard_num: i64,
    #[prost(int64, tag = "2")]
    pub realm_num: i64,
    #[prost(int64, tag = "3")]
    pub account_num: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct TransactionIdProto {
    #[prost(message, optional, tag = "1")]
    pub transaction_valid_start: Option<TimestampProto>,
    #[prost(message, optional, tag = "2")]
    pub account_id: Option<AccountIdProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CryptoCreateProto {
    #[prost(message, optional, tag = "1")]
    pub key: Option<KeyProto>,
    #[prost(uint64, tag = "2")]
    pub initial_balance: u64,
    #[prost(bool, tag = "8")]
    pub receiver_sig_required: bool,
    #[prost(string, tag = "13")]
    pub memo: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct CryptoDeleteProto {
    #[prost(message, optional, tag = "1")]
    pub transfer_account_id: Option<AccountIdProto>,
    #[prost(message, optional, tag = "2")]
    pub delete_account_id: Option<AccountIdProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct AccountAmountProto {
    #[prost(message, optional, tag = "1")]
    pub account_id: Option<AccountIdProto>,
    #[prost(sint64, tag = "2")]
    pub amount: i64,
    #[prost(bool, tag = "3")]
    pub is_approval: bool,
}

#[derive(Clone, PartialEq, Message)]
pub struct TransferListProto {
    #[prost(message, repeated, tag = "1")]
    pub account_amounts: Vec<AccountAmountProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CryptoTransferProto {
    #[prost(message, optional, tag = "1")]
    pub transfers: Option<TransferListProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct CryptoUpdateProto {
    #[prost(message, optional, tag = "2")]
    pub account_id_to_update: Option<AccountIdProto>,
    #[prost(message, optional, tag = "3")]
    pub key: Option<KeyProto>,
}

impl TryFrom<AccountId> for AccountIdProto {
    type Error = AccountIdError;

    /// Fails when a component does not fit the signed wire field
    fn try_from(id: AccountId) -> Result<Self, Self::Error> {
        let field = |v: u64| i64::try_from(v).map_err(|_| AccountIdError(id.to_string()));
        Ok(Self {
            shard_num: field(id.shard)?,
            realm_num: field(id.realm)?,
            account_num: field(id.num)?,
        })
    }
}

impl TryFrom<&AccountIdProto> for AccountId {
    type Error = AccountIdError;

    fn try_from(proto: &AccountIdProto) -> Result<Self, Self::Error> {
        AccountId::from_parts(proto.shard_num, proto.realm_num, proto.account_num)
    }
}

/// Wrap a body into signed transaction bytes
pub fn encode_signed_transaction(body: &TransactionBodyProto) -> Vec<u8> {
    SignedTransactionProto {
        body_bytes: body.encode_to_vec(),
    }
    .encode_to_vec()
}

/// Ledger-level transaction identifier: payer plus valid-start time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TransactionId {
    pub payer: AccountId,
    pub valid_start: DateTime<Utc>,
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}.{:09}",
            self.payer,
            self.valid_start.timestamp(),
            self.valid_start.timestamp_subsec_nanos()
        )
    }
}

/// Operation carried by a transaction body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    AccountCreate,
    AccountDelete,
    Transfer,
    AccountUpdate,
    /// Any body without signing requirements beyond the payer
    Other,
}

/// Authorization surfaces touched by a transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionEntities {
    /// Key structures of entities the transaction creates or installs
    pub new_key_structures: Vec<KeyTree>,
    /// Accounts whose own key must authorize the transaction
    pub debited_accounts: Vec<AccountId>,
    /// Accounts that must sign only if they require signatures on receipt
    pub receiver_sig_required_accounts: Vec<AccountId>,
}

impl TransactionEntities {
    /// Every distinct account across both account lists, debited first
    pub fn accounts(&self) -> Vec<AccountId> {
        let mut seen = HashSet::new();
        self.debited_accounts
            .iter()
            .chain(&self.receiver_sig_required_accounts)
            .filter(|id| seen.insert(**id))
            .copied()
            .collect()
    }

    fn push_debited(&mut self, id: AccountId) {
        if !self.debited_accounts.contains(&id) {
            self.debited_accounts.push(id);
        }
    }

    fn push_receiver(&mut self, id: AccountId) {
        if !self.receiver_sig_required_accounts.contains(&id) {
            self.receiver_sig_required_accounts.push(id);
        }
    }
}

/// Decoded view of a pending transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransaction {
    pub transaction_id: TransactionId,
    pub expires_at: DateTime<Utc>,
    pub memo: String,
    pub kind: TransactionKind,
    pub entities: TransactionEntities,
}

impl DecodedTransaction {
    /// Whether the transaction can no longer reach consensus at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        self.is_expired_at(clock.now())
    }
}

/// Decoder for signed transaction bytes
#[derive(Debug, Clone)]
pub struct TxDecoder {
    max_key_depth: usize,
}

impl TxDecoder {
    pub fn new() -> Self {
        Self {
            max_key_depth: MAX_KEY_DEPTH,
        }
    }

    /// Use a specific nesting cap for key structures found in the body
    pub fn with_max_key_depth(max_key_depth: usize) -> Self {
        Self { max_key_depth }
    }

    /// Decode a signed transaction envelope
    pub fn decode(&self, tx_bytes: &[u8]) -> Result<DecodedTransaction, TxDecodeError> {
        let signed = SignedTransactionProto::decode(tx_bytes).map_err(|e| {
            TxDecodeError::ProtobufError(format!("failed to decode signed transaction: {e}"))
        })?;
        if signed.body_bytes.is_empty() {
            return Err(TxDecodeError::MissingField("body_bytes".to_string()));
        }
        self.decode_body(&signed.body_bytes)
    }

    /// Decode a bare transaction body
    pub fn decode_body(&self, body_bytes: &[u8]) -> Result<DecodedTransaction, TxDecodeError> {
        let body = TransactionBodyProto::decode(body_bytes).map_err(|e| {
            TxDecodeError::ProtobufError(format!("failed to decode transaction body: {e}"))
        })?;

        let tx_id = body
            .transaction_id
            .as_ref()
            .ok_or_else(|| TxDecodeError::MissingField("transaction_id".to_string()))?;
        let payer = tx_id
            .account_id
            .as_ref()
            .ok_or_else(|| TxDecodeError::MissingField("transaction_id.account_id".to_string()))?;
        let payer = AccountId::try_from(payer)?;
        let valid_start = tx_id.transaction_valid_start.as_ref().ok_or_else(|| {
            TxDecodeError::MissingField("transaction_id.transaction_valid_start".to_string())
        })?;
        let valid_start = timestamp_to_datetime(valid_start)?;

        let valid_seconds = body
            .transaction_valid_duration
            .as_ref()
            .map(|d| d.seconds)
            .unwrap_or(0);
        let expires_at = Duration::try_seconds(valid_seconds)
            .filter(|_| valid_seconds >= 0)
            .and_then(|d| valid_start.checked_add_signed(d))
            .ok_or_else(|| {
                TxDecodeError::InvalidTimestamp(format!("invalid valid duration: {valid_seconds}s"))
            })?;

        let mut entities = TransactionEntities::default();
        entities.push_debited(payer);

        let kind = match &body.data {
            Some(transaction_body_proto::Data::CryptoCreateAccount(create)) => {
                let key = create
                    .key
                    .as_ref()
                    .ok_or_else(|| TxDecodeError::MissingField("key".to_string()))?;
                entities
                    .new_key_structures
                    .push(key_from_proto(key, self.max_key_depth)?);
                TransactionKind::AccountCreate
            }
            Some(transaction_body_proto::Data::CryptoDelete(delete)) => {
                if let Some(id) = &delete.delete_account_id {
                    entities.push_debited(AccountId::try_from(id)?);
                }
                if let Some(id) = &delete.transfer_account_id {
                    entities.push_receiver(AccountId::try_from(id)?);
                }
                TransactionKind::AccountDelete
            }
            Some(transaction_body_proto::Data::CryptoTransfer(transfer)) => {
                let amounts = transfer
                    .transfers
                    .as_ref()
                    .map(|list| list.account_amounts.as_slice())
                    .unwrap_or(&[]);
                for amount in amounts {
                    let Some(id) = &amount.account_id else {
                        return Err(TxDecodeError::MissingField(
                            "account_amounts.account_id".to_string(),
                        ));
                    };
                    let id = AccountId::try_from(id)?;
                    match amount.amount {
                        a if a < 0 => entities.push_debited(id),
                        a if a > 0 => entities.push_receiver(id),
                        _ => {}
                    }
                }
                TransactionKind::Transfer
            }
            Some(transaction_body_proto::Data::CryptoUpdateAccount(update)) => {
                let id = update
                    .account_id_to_update
                    .as_ref()
                    .ok_or_else(|| {
                        TxDecodeError::MissingField("account_id_to_update".to_string())
                    })?;
                entities.push_debited(AccountId::try_from(id)?);
                if let Some(key) = &update.key {
                    entities
                        .new_key_structures
                        .push(key_from_proto(key, self.max_key_depth)?);
                }
                TransactionKind::AccountUpdate
            }
            None => TransactionKind::Other,
        };

        Ok(DecodedTransaction {
            transaction_id: TransactionId { payer, valid_start },
            expires_at,
            memo: body.memo,
            kind,
            entities,
        })
    }
}

impl Default for TxDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn timestamp_to_datetime(ts: &TimestampProto) -> Result<DateTime<Utc>, TxDecodeError> {
    u32::try_from(ts.nanos)
        .ok()
        .and_then(|nanos| DateTime::from_timestamp(ts.seconds, nanos))
        .ok_or_else(|| {
            TxDecodeError::InvalidTimestamp(format!("{}s {}ns", ts.seconds, ts.nanos))
        })
}
