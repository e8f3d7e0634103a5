//! Jupiter-backed `DexRouter` implementation: the one concrete swap
//! capability wired into the Trade Executor and Exit Executor.
//!
//! Grounded on `jupiter_executor.rs`'s Ultra-API order/execute flow
//! (`build_order_request`, txid/outAmount extraction) and
//! `jupiter_rate_limiter.rs`'s governor-backed HTTP client with burst
//! protection and exponential backoff, reused here instead of a bare
//! `reqwest::Client` so Jupiter's rate limits are respected the same way
//! the reference bot respects them.

use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use solana_sdk::signature::{Keypair, Signer};
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, warn};

use crate::constants::{SOL_MINT, USDC_MINT};
use crate::dex_router::{DexRouter, JupiterError, PreparedSwap, PriorityFeeTier, Quote, SwapRequest, SwapResult};
use crate::errors::PriceFeedError;
use crate::jupiter_rate_limiter::JupiterRateLimiter;
use crate::price_feed::PriceSource;

/// Maps the router-agnostic priority-fee tier onto Jupiter Ultra API's
/// `priorityLevel` field, which accepts `medium`/`high`/`veryHigh`.
fn priority_level(tier: PriorityFeeTier) -> &'static str {
    match tier {
        PriorityFeeTier::Low => "medium",
        PriorityFeeTier::Medium => "medium",
        PriorityFeeTier::High => "high",
        PriorityFeeTier::Turbo => "veryHigh",
    }
}

pub struct JupiterRouter {
    rate_limiter: JupiterRateLimiter,
}

impl JupiterRouter {
    pub fn new(api_key: String) -> Self {
        Self {
            rate_limiter: JupiterRateLimiter::new(api_key),
        }
    }

    fn order_request(&self, request: &SwapRequest) -> Value {
        let mut payload = serde_json::json!({
            "inputMint": request.input_mint,
            "outputMint": request.output_mint,
            "amount": request.amount_in,
            "slippageBps": request.slippage_bps,
            "taker": request.user_public_key,
            "priorityLevel": priority_level(request.priority_fee_tier),
        });
        if let (Some(bps), Some(account)) = (request.platform_fee_bps, &request.fee_account) {
            payload["platformFeeBps"] = serde_json::json!(bps);
            payload["feeAccount"] = serde_json::json!(account);
        }
        payload
    }

    /// Decodes the unsigned order transaction, signs it with `keypair`, and
    /// re-encodes it, returning the signed transaction alongside the
    /// order's quoted output amount and price impact. Shared by `swap`
    /// (which goes on to submit through `/v1/execute`) and
    /// `prepare_signed_swap` (which hands the signed transaction back to
    /// the caller for submission elsewhere).
    fn sign_order_transaction(&self, order: &Value, keypair: &Keypair) -> Result<(String, u64, f64), JupiterError> {
        let tx_b64 = order
            .get("transaction")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JupiterError::SwapFailed("order response missing transaction".to_string()))?;

        let tx_bytes = base64::engine::general_purpose::STANDARD
            .decode(tx_b64)
            .map_err(|e| JupiterError::SwapFailed(format!("invalid order transaction: {e}")))?;
        let mut tx: VersionedTransaction = bincode::deserialize(&tx_bytes)
            .map_err(|e| JupiterError::SwapFailed(format!("undeserializable order transaction: {e}")))?;

        let message_bytes = tx.message.serialize();
        let signature = keypair.sign_message(&message_bytes);
        if tx.signatures.is_empty() {
            tx.signatures.push(signature);
        } else {
            tx.signatures[0] = signature;
        }

        let signed_b64 = base64::engine::general_purpose::STANDARD.encode(
            bincode::serialize(&tx).map_err(|e| JupiterError::SwapFailed(e.to_string()))?,
        );

        let expected_output_amount = order
            .get("outAmount")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let price_impact_pct = order
            .get("priceImpactPct")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        Ok((signed_b64, expected_output_amount, price_impact_pct))
    }
}

#[async_trait]
impl DexRouter for JupiterRouter {
    async fn get_quote(&self, request: &SwapRequest) -> Result<Quote, JupiterError> {
        let order = self
            .rate_limiter
            .execute_request::<Value>("/v1/order", Some(self.order_request(request)))
            .await
            .map_err(|e| JupiterError::QuoteFailed(e.to_string()))?;

        let input_amount = order
            .get("inAmount")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(request.amount_in);
        let output_amount = order
            .get("outAmount")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| JupiterError::QuoteFailed("missing outAmount".to_string()))?;
        let price_impact_pct = order
            .get("priceImpactPct")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        Ok(Quote {
            input_amount,
            output_amount,
            price_impact_pct,
        })
    }

    /// Ultra API two-step flow: request an order (unsigned transaction),
    /// sign it locally, then submit it for execution. The keypair never
    /// leaves this call frame.
    async fn swap(&self, request: &SwapRequest, keypair: &Keypair) -> Result<SwapResult, JupiterError> {
        let order = self
            .rate_limiter
            .execute_request::<Value>("/v1/order", Some(self.order_request(request)))
            .await
            .map_err(|e| JupiterError::SwapFailed(e.to_string()))?;

        let request_id = order
            .get("requestId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JupiterError::SwapFailed("order response missing requestId".to_string()))?
            .to_string();

        let (signed_b64, _, _) = self.sign_order_transaction(&order, keypair)?;

        let execute_payload = serde_json::json!({
            "signedTransaction": signed_b64,
            "requestId": request_id,
        });

        let result = self
            .rate_limiter
            .execute_request::<Value>("/v1/execute", Some(execute_payload))
            .await
            .map_err(|e| JupiterError::SwapFailed(e.to_string()))?;

        let status = result.get("status").and_then(|v| v.as_str()).unwrap_or("");
        if status != "Success" {
            let reason = result
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown execute failure")
                .to_string();
            warn!(status, reason, "jupiter execute did not succeed");
            return Err(JupiterError::SwapFailed(reason));
        }

        let signature = result
            .get("signature")
            .and_then(|v| v.as_str())
            .ok_or_else(|| JupiterError::SwapFailed("execute response missing signature".to_string()))?
            .to_string();
        let output_amount = result
            .get("outputAmountResult")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .or_else(|| order.get("outAmount").and_then(|v| v.as_str()).and_then(|s| s.parse().ok()))
            .ok_or_else(|| JupiterError::SwapFailed("missing output amount".to_string()))?;
        let input_amount = result
            .get("inputAmountResult")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(request.amount_in);
        let price_impact_pct = order
            .get("priceImpactPct")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);
        let slot = result.get("slot").and_then(|v| v.as_u64()).unwrap_or(0);

        debug!(signature, output_amount, "jupiter swap executed");

        Ok(SwapResult {
            signature,
            input_amount,
            output_amount,
            price_impact_pct,
            slot,
        })
    }

    /// Requests an order and signs it locally, same as `swap`, but returns
    /// before the `/v1/execute` call so the caller can submit the signed
    /// transaction through a relay of its own choosing.
    async fn prepare_signed_swap(&self, request: &SwapRequest, keypair: &Keypair) -> Result<PreparedSwap, JupiterError> {
        let order = self
            .rate_limiter
            .execute_request::<Value>("/v1/order", Some(self.order_request(request)))
            .await
            .map_err(|e| JupiterError::SwapFailed(e.to_string()))?;

        let (signed_transaction_b64, expected_output_amount, price_impact_pct) =
            self.sign_order_transaction(&order, keypair)?;

        Ok(PreparedSwap {
            signed_transaction_b64,
            expected_output_amount,
            price_impact_pct,
        })
    }

    /// No standalone price endpoint is shared with the order/execute base
    /// path, so the price is derived from a nominal quote into USDC (1 SOL
    /// or the token equivalent), same as the reference bot's
    /// `calculate_actual_profit` derives realized price from swap amounts.
    async fn get_token_price_usd(&self, mint: &str) -> Result<f64, JupiterError> {
        let nominal_amount_in = if mint == SOL_MINT {
            crate::constants::SOL_DECIMALS
        } else {
            1_000_000
        };
        let probe = SwapRequest {
            input_mint: mint.to_string(),
            output_mint: USDC_MINT.to_string(),
            amount_in: nominal_amount_in,
            user_public_key: SOL_MINT.to_string(),
            slippage_bps: 50,
            platform_fee_bps: None,
            fee_account: None,
            priority_fee_tier: PriorityFeeTier::default(),
        };
        let quote = self.get_quote(&probe).await?;
        if quote.input_amount == 0 {
            return Err(JupiterError::QuoteFailed("zero input in probe quote".to_string()));
        }
        // USDC has 6 decimals; nominal_amount_in is denominated in the
        // input mint's smallest unit (lamports for SOL).
        let input_units = nominal_amount_in as f64 / crate::constants::SOL_DECIMALS as f64;
        let output_usd = quote.output_amount as f64 / 1_000_000.0;
        Ok(output_usd / input_units)
    }
}

/// `JupiterRouter` doubles as a `PriceSource`: the price feed needs a
/// USD quote for a mint, and `get_token_price_usd` already derives exactly
/// that from a nominal quote.
#[async_trait]
impl PriceSource for JupiterRouter {
    async fn fetch_price(&self, mint: &str) -> Result<f64, PriceFeedError> {
        self.get_token_price_usd(mint)
            .await
            .map_err(|e| PriceFeedError::PriceFetchFailed { reason: e.to_string() })
    }
}
