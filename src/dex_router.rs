//! DEX router capability: the black-box swap surface the Trade Executor
//! and Exit Executor call against.
//!
//! Grounded on `jupiter_executor.rs`'s `ExecutionParams`/`ExecutionResult`
//! shape, generalized behind a trait per Non-goal "does not implement a DEX
//! router; it consumes a routing capability ... as a black box". The one
//! concrete implementation is `jupiter_router::JupiterRouter`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::signature::Keypair;
use thiserror::Error;

/// Priority-fee tier requested for a swap. The router maps this onto
/// whatever priority-fee mechanism it natively supports; a router with no
/// such mechanism is free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityFeeTier {
    Low,
    Medium,
    High,
    Turbo,
}

impl PriorityFeeTier {
    /// Escalates by one tier, saturating at `Turbo`. Used by the Exit
    /// Executor to raise urgency on each retry.
    pub fn escalate(self) -> Self {
        match self {
            PriorityFeeTier::Low => PriorityFeeTier::Medium,
            PriorityFeeTier::Medium => PriorityFeeTier::High,
            PriorityFeeTier::High | PriorityFeeTier::Turbo => PriorityFeeTier::Turbo,
        }
    }
}

impl Default for PriorityFeeTier {
    fn default() -> Self {
        PriorityFeeTier::Medium
    }
}

#[derive(Debug, Clone)]
pub struct SwapRequest {
    pub input_mint: String,
    pub output_mint: String,
    pub amount_in: u64,
    pub user_public_key: String,
    pub slippage_bps: u16,
    pub platform_fee_bps: Option<u16>,
    pub fee_account: Option<String>,
    pub priority_fee_tier: PriorityFeeTier,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapResult {
    pub signature: String,
    pub input_amount: u64,
    pub output_amount: u64,
    pub price_impact_pct: f64,
    pub slot: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub input_amount: u64,
    pub output_amount: u64,
    pub price_impact_pct: f64,
}

/// A swap transaction signed locally but not yet submitted, so the caller
/// can route it through an alternate relay (a Jito bundle) instead of the
/// router's own execute endpoint.
#[derive(Debug, Clone)]
pub struct PreparedSwap {
    pub signed_transaction_b64: String,
    pub expected_output_amount: u64,
    pub price_impact_pct: f64,
}

/// Router-specific failure; `SwapFailed` at the trade executor boundary
/// wraps `reason` from this.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JupiterError {
    #[error("quote request failed: {0}")]
    QuoteFailed(String),
    #[error("swap request failed: {0}")]
    SwapFailed(String),
    #[error("rate limited")]
    RateLimited,
    #[error("http error: {0}")]
    Http(String),
}

#[async_trait]
pub trait DexRouter: Send + Sync {
    async fn get_quote(&self, request: &SwapRequest) -> Result<Quote, JupiterError>;

    /// Execute a swap and collect the configured platform fee on-chain.
    /// `keypair` signs the transaction; zeroizing it afterward on every
    /// exit path is the caller's responsibility, not the router's.
    async fn swap(&self, request: &SwapRequest, keypair: &Keypair) -> Result<SwapResult, JupiterError>;

    /// Builds and locally signs the swap transaction without submitting it.
    /// Used by callers that need to land the swap through a relay other
    /// than the router's own execute endpoint (e.g. a Jito bundle).
    async fn prepare_signed_swap(&self, request: &SwapRequest, keypair: &Keypair) -> Result<PreparedSwap, JupiterError>;

    async fn get_token_price_usd(&self, mint: &str) -> Result<f64, JupiterError>;
}
