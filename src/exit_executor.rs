//! Exit Executor: reverses an open position into SOL, retrying with
//! slippage escalation, tripping a per-user circuit breaker on repeated
//! failure, and optionally landing the closing swap through the Jito
//! bundle relay.
//!
//! Grounded on `migration_manager.rs`'s `emergency_exit_token` (the
//! reverse-swap-on-trigger shape) and `error_recovery_manager.rs`'s
//! per-dependency circuit breaker map, rebuilt here on the shared
//! `CircuitBreaker` type keyed per user instead of per RPC dependency,
//! since the invariant being protected is "stop hammering a user's wallet
//! after repeated exit failures", not "stop hammering a downstream
//! service".

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::bundle_relay::JitoBundleRelay;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::ExitExecutorConfig;
use crate::dex_router::PriorityFeeTier;
use crate::domain::{OrderSide, Position, PositionStatus};
use crate::errors::ExitError;
use crate::metrics::Metrics;
use crate::persistence::{PositionRepository, WalletRepository};
use crate::position_monitor::{ExitDispatch, ExitReason};
use crate::trade_executor::{BundleSubmission, TradeExecutor, TradeParams};
use crate::vault::CredentialVault;

/// Looks up a usable signing session for automatic exits. Real deployments
/// back this with a long-lived reuse-mode session minted when the user last
/// interacted with the bot; injected so the exit executor never has to
/// reach into session storage directly.
#[async_trait]
pub trait ExitSessionLookup: Send + Sync {
    async fn session_for_user(&self, user_id: i64) -> Option<(String, String)>; // (session_token, wallet_public_key)
}

pub struct ExitExecutor {
    config: ExitExecutorConfig,
    trade_executor: Arc<TradeExecutor>,
    sessions: Arc<dyn ExitSessionLookup>,
    positions: Arc<dyn PositionRepository>,
    bundle_relay: Option<Arc<JitoBundleRelay>>,
    breakers: Mutex<HashMap<i64, Arc<CircuitBreaker>>>,
    metrics: Arc<Metrics>,
}

impl ExitExecutor {
    pub fn new(
        config: ExitExecutorConfig,
        trade_executor: Arc<TradeExecutor>,
        sessions: Arc<dyn ExitSessionLookup>,
        positions: Arc<dyn PositionRepository>,
        bundle_relay: Option<Arc<JitoBundleRelay>>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            trade_executor,
            sessions,
            positions,
            bundle_relay,
            breakers: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    fn breaker_for(&self, user_id: i64) -> Arc<CircuitBreaker> {
        self.breakers
            .lock()
            .entry(user_id)
            .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.circuit_breaker.clone())))
            .clone()
    }

    /// Exits one position, escalating slippage tolerance by 50% of the base
    /// on each retry up to `max_attempts`. The per-user circuit breaker
    /// guards against hammering a wallet whose exits keep failing for
    /// reasons unrelated to slippage (revoked approval, frozen account).
    pub async fn execute_exit(&self, mut position: Position, reason: ExitReason) -> Result<(), ExitError> {
        self.metrics.exit_attempts_total.inc();
        let breaker = self.breaker_for(position.user_id);
        if !breaker.allow_request() {
            self.metrics.exit_circuit_open_total.inc();
            let reset_at_unix_ms = breaker
                .reset_at()
                .map(|_| chrono::Utc::now().timestamp_millis() + self.config.circuit_breaker.timeout_ms as i64)
                .unwrap_or(0);
            return Err(ExitError::CircuitOpen { reset_at_unix_ms });
        }

        let Some((session_token, wallet_public_key)) = self.sessions.session_for_user(position.user_id).await else {
            breaker.record_failure();
            return Err(ExitError::Terminal {
                attempts: 0,
                reason: "no signing session available for user".to_string(),
            });
        };

        position.status = PositionStatus::Exiting;
        if let Err(e) = self.positions.update(&position).await {
            warn!(position_id = position.id, error = %e, "failed to mark position exiting");
        }

        let bundle = self.bundle_submission_for(&position).await;

        let mut last_reason = String::new();
        let mut priority_fee_tier = PriorityFeeTier::Low;
        for attempt in 0..self.config.max_attempts {
            let slippage_bps = self.config.exit_slippage_bps + (self.config.exit_slippage_bps / 2) * attempt as u16;

            let params = TradeParams {
                user_id: position.user_id,
                session_token: session_token.clone(),
                wallet_public_key: wallet_public_key.clone(),
                input_mint: position.token_mint.clone(),
                output_mint: crate::constants::SOL_MINT.to_string(),
                amount_in: crate::constants::sol_to_lamports(position.entry_amount_out),
                side: OrderSide::Sell,
                slippage_bps: Some(slippage_bps),
                priority_fee_tier,
                bundle: bundle.clone(),
            };
            priority_fee_tier = priority_fee_tier.escalate();

            match self.trade_executor.execute(params).await {
                Ok(result) => {
                    breaker.record_success();
                    position.status = PositionStatus::Closed;
                    if let Err(e) = self.positions.update(&position).await {
                        error!(position_id = position.id, error = %e, "failed to persist closed position");
                    }
                    info!(
                        position_id = position.id,
                        attempt,
                        reason = reason.as_str(),
                        signature = %result.signature,
                        "position exited"
                    );
                    return Ok(());
                }
                Err(e) => {
                    last_reason = e.to_string();
                    warn!(position_id = position.id, attempt, error = %last_reason, "exit attempt failed");
                }
            }
        }

        breaker.record_failure();
        position.status = PositionStatus::Open;
        let _ = self.positions.update(&position).await;
        Err(ExitError::Terminal {
            attempts: self.config.max_attempts,
            reason: last_reason,
        })
    }

    /// Builds the bundle submission to attach to this exit's `TradeParams`,
    /// if `use_jito_exits` is on and a relay is configured. Profit is
    /// estimated from the position's entry price against the current price
    /// feed read; a price-feed miss degrades to a zero estimate rather than
    /// blocking the exit.
    async fn bundle_submission_for(&self, position: &Position) -> Option<BundleSubmission> {
        if !self.config.use_jito_exits {
            return None;
        }
        let relay = self.bundle_relay.clone()?;

        let entry_price = position.entry_price();
        let current_price = if entry_price > 0.0 {
            self.trade_executor
                .price_feed()
                .get_price(&position.token_mint)
                .await
                .unwrap_or(entry_price)
        } else {
            0.0
        };

        let entry_lamports = crate::constants::sol_to_lamports(position.entry_amount_in);
        let growth = if entry_price > 0.0 {
            (current_price / entry_price - 1.0).max(0.0)
        } else {
            0.0
        };
        let estimated_profit_lamports = (entry_lamports as f64 * growth) as u64;
        let fee_percentage = self.trade_executor.commission_bps() as f64 / 10_000.0;

        Some(BundleSubmission {
            relay,
            estimated_profit_lamports,
            fee_percentage,
        })
    }
}

#[async_trait]
impl ExitDispatch for ExitExecutor {
    async fn dispatch_exit(&self, position: Position, reason: ExitReason) {
        let position_id = position.id;
        if let Err(e) = self.execute_exit(position, reason).await {
            error!(position_id, error = %e, "position exit ultimately failed");
        }
    }
}

/// Bridges the credential vault's reuse-mode active session and the
/// persistence gateway's active wallet into the `(session_token,
/// wallet_public_key)` pair automatic exits need, so this is the only place
/// that has to know both live behind the vault and the wallet repository.
pub struct VaultExitSessionLookup<R> {
    vault: Arc<CredentialVault>,
    wallets: Arc<R>,
}

impl<R> VaultExitSessionLookup<R> {
    pub fn new(vault: Arc<CredentialVault>, wallets: Arc<R>) -> Self {
        Self { vault, wallets }
    }
}

#[async_trait]
impl<R: WalletRepository + Send + Sync> ExitSessionLookup for VaultExitSessionLookup<R> {
    async fn session_for_user(&self, user_id: i64) -> Option<(String, String)> {
        let token = self.vault.active_session_token(user_id).await.ok().flatten()?;
        let wallet = self.wallets.active_for_user(user_id).await.ok().flatten()?;
        Some((token, wallet.public_address))
    }
}
