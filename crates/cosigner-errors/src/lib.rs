//! Error types shared across the cosigner crates.
//!
//! Each crate keeps its own narrow error enum; this crate defines the error a
//! caller of the resolver actually sees, together with the stage at which a
//! resolution failed and a stable numeric code.

use std::fmt;
use thiserror::Error;

/// Error surfaced by a signing-requirement resolution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A key structure violates the threshold invariant, is empty, nests too
    /// deeply or carries an unusable public key
    #[error("malformed key structure:: {0}")]
    MalformedKeyStructure(String),

    /// Transaction bytes could not be decoded
    #[error("malformed transaction:: {0}")]
    MalformedTransaction(String),

    /// Account metadata could not be fetched
    #[error("account lookup failed:: {account}: {reason}")]
    AccountLookupFailed { account: String, reason: String },

    /// Signer or key store failure
    #[error("store error:: {0}")]
    Store(String),

    /// Invalid configuration
    #[error("invalid config:: {0}")]
    Config(String),
}

/// Result type alias for cosigner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of a resolution at which an error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Decode,
    Lookup,
    Store,
    Config,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Decode => "decode",
            Stage::Lookup => "lookup",
            Stage::Store => "store",
            Stage::Config => "config",
        };
        f.write_str(s)
    }
}

impl Error {
    /// Stage of the resolution that produced this error
    pub fn stage(&self) -> Stage {
        match self {
            Error::MalformedKeyStructure(_) | Error::MalformedTransaction(_) => Stage::Decode,
            Error::AccountLookupFailed { .. } => Stage::Lookup,
            Error::Store(_) => Stage::Store,
            Error::Config(_) => Stage::Config,
        }
    }

    /// Stable numeric code for this error
    pub fn code(&self) -> u32 {
        match self {
            Error::MalformedKeyStructure(_) => codes::MALFORMED_KEY_STRUCTURE,
            Error::MalformedTransaction(_) => codes::MALFORMED_TRANSACTION,
            Error::AccountLookupFailed { .. } => codes::ACCOUNT_LOOKUP_FAILED,
            Error::Store(_) => codes::STORE,
            Error::Config(_) => codes::CONFIG,
        }
    }
}

/// Error codes
pub mod codes {
    /// Malformed key structure, including an exceeded depth cap
    pub const MALFORMED_KEY_STRUCTURE: u32 = 2;
    /// Undecodable transaction
    pub const MALFORMED_TRANSACTION: u32 = 3;
    /// Account metadata lookup failed
    pub const ACCOUNT_LOOKUP_FAILED: u32 = 5;
    /// Store failure
    pub const STORE: u32 = 6;
    /// Invalid configuration
    pub const CONFIG: u32 = 7;
}
