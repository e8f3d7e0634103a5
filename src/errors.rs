//! Typed error unions for each component.
//!
//! Lower layers return one of these enums; orchestrators (`TradeExecutor`,
//! `ExitExecutor`, the lifecycle binary) convert them into user-visible
//! messages only at their boundary, propagating with `?` via `anyhow`
//! everywhere in between.

use thiserror::Error;

/// Credential/vault errors. Surfaced to the user; never retried.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("wallet not found")]
    WalletNotFound,
    #[error("invalid password")]
    InvalidPassword,
    #[error("encryption error: {0}")]
    EncryptionError(String),
    #[error("decryption error: {0}")]
    DecryptionError(String),
    #[error("session expired")]
    SessionExpired,
    #[error("password does not meet policy: {0}")]
    WeakPassword(String),
}

/// Parser errors. Counted but not surfaced to the user.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unrecognized discriminator")]
    UnrecognizedDiscriminator,
    #[error("malformed instruction data")]
    MalformedInstruction,
    #[error("missing expected account at index {0}")]
    MissingAccount(usize),
}

/// Stream source errors. Escalate source health to FAILED.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream error: {0}")]
    StreamError(String),
    #[error("reconnect attempts exhausted")]
    ReconnectExhausted,
}

/// Price feed errors. Soft failures at monitors; hard failures at
/// commission (fall back to floor).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PriceFeedError {
    #[error("price fetch failed: {reason}")]
    PriceFetchFailed { reason: String },
    #[error("circuit open, resets at {reset_at_unix_ms}")]
    CircuitOpen { reset_at_unix_ms: i64 },
    #[error("rate limit exceeded")]
    RateLimitExceeded,
}

/// Trade errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TradeError {
    #[error(transparent)]
    Vault(#[from] VaultError),
    #[error("quote failed")]
    QuoteFailed,
    #[error("swap failed: {reason}")]
    SwapFailed { reason: String },
    #[error("commission calculation failed")]
    CommissionCalculationFailed,
    #[error("invalid token")]
    InvalidToken,
    #[error("rpc error: {0}")]
    RpcError(String),
}

/// Exit executor errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExitError {
    #[error(transparent)]
    Trade(#[from] TradeError),
    #[error("circuit open for user, resets at {reset_at_unix_ms}")]
    CircuitOpen { reset_at_unix_ms: i64 },
    #[error("terminal failure after {attempts} attempt(s): {reason}")]
    Terminal { attempts: u32, reason: String },
}

/// Persistence gateway errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("not found")]
    NotFound,
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// K/V gateway errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("key/value store unavailable: {0}")]
    Unavailable(String),
}
