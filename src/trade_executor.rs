//! Trade Executor: the single place a buy or sell actually reaches the
//! chain. Acquires a signing key from the vault for exactly one call, places
//! an order row before submitting, executes through the injected
//! `DexRouter`, and scrubs the key on every exit path.
//!
//! Grounded on `jupiter_executor.rs`'s `execute_swap` control flow
//! (quote -> build request -> submit -> extract result), generalized to go
//! through `DexRouter` instead of calling Jupiter's HTTP API directly, and
//! `database_tracker.rs`'s insert-pending/update-on-completion order
//! lifecycle.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::bundle_relay::JitoBundleRelay;
use crate::config::TradeExecutorConfig;
use crate::dex_router::{DexRouter, PriorityFeeTier, SwapRequest};
use crate::domain::{Order, OrderSide, OrderStatus};
use crate::errors::TradeError;
use crate::metrics::Metrics;
use crate::persistence::OrderRepository;
use crate::price_feed::PriceFeed;
use crate::vault::CredentialVault;

/// Routes the swap through a Jito bundle instead of the router's own
/// execute endpoint. `estimated_profit_lamports`/`fee_percentage` feed
/// `JitoBundleRelay::calculate_tip`.
#[derive(Clone)]
pub struct BundleSubmission {
    pub relay: Arc<JitoBundleRelay>,
    pub estimated_profit_lamports: u64,
    pub fee_percentage: f64,
}

#[derive(Clone)]
pub struct TradeParams {
    pub user_id: i64,
    pub session_token: String,
    pub wallet_public_key: String,
    pub input_mint: String,
    pub output_mint: String,
    pub amount_in: u64,
    pub side: OrderSide,
    pub slippage_bps: Option<u16>,
    pub priority_fee_tier: PriorityFeeTier,
    pub bundle: Option<BundleSubmission>,
}

#[derive(Debug, Clone)]
pub struct TradeResult {
    pub order: Order,
    pub signature: String,
    pub amount_out: u64,
    pub commission_usd: f64,
}

pub struct TradeExecutor {
    config: TradeExecutorConfig,
    vault: Arc<CredentialVault>,
    router: Arc<dyn DexRouter>,
    orders: Arc<dyn OrderRepository>,
    price_feed: Arc<PriceFeed>,
    metrics: Arc<Metrics>,
}

impl TradeExecutor {
    pub fn new(
        config: TradeExecutorConfig,
        vault: Arc<CredentialVault>,
        router: Arc<dyn DexRouter>,
        orders: Arc<dyn OrderRepository>,
        price_feed: Arc<PriceFeed>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            vault,
            router,
            orders,
            price_feed,
            metrics,
        }
    }

    /// Exposes the shared price feed so callers that need their own USD
    /// estimate (the Exit Executor pricing a Jito tip) don't have to hold a
    /// second `PriceFeed` handle of their own.
    pub fn price_feed(&self) -> &Arc<PriceFeed> {
        &self.price_feed
    }

    pub fn commission_bps(&self) -> u16 {
        self.config.commission_bps
    }

    /// Executes one buy or sell. Contract:
    /// 1. acquire a signing key from the vault, scoped to this call
    /// 2. persist a `Pending` order row so the attempt is durable before submission
    /// 3. build the swap request and execute it through the router
    /// 4. on success, price the trade in USD and compute the commission
    /// 5. update the order row with the final status, regardless of outcome
    ///
    /// The signing key is dropped at the end of this function body no
    /// matter which branch returns; there is no code path that keeps it
    /// alive past the swap call.
    pub async fn execute(&self, params: TradeParams) -> Result<TradeResult, TradeError> {
        let started_at = std::time::Instant::now();
        let result = self.execute_inner(params).await;
        self.metrics.trade_latency_seconds.observe(started_at.elapsed().as_secs_f64());
        result
    }

    async fn execute_inner(&self, params: TradeParams) -> Result<TradeResult, TradeError> {
        let signing_key = self.vault.keypair_for_signing(&params.session_token).await?;

        let pending = Order {
            id: 0,
            user_id: params.user_id,
            token_mint: if params.side == OrderSide::Buy {
                params.output_mint.clone()
            } else {
                params.input_mint.clone()
            },
            side: params.side,
            amount_in: params.amount_in as f64,
            status: OrderStatus::Pending,
            signature: None,
            commission_usd: None,
            created_at: chrono::Utc::now(),
        };
        let order = self
            .orders
            .insert(&pending)
            .await
            .map_err(|e| TradeError::RpcError(e.to_string()))?;

        let swap_request = SwapRequest {
            input_mint: params.input_mint.clone(),
            output_mint: params.output_mint.clone(),
            amount_in: params.amount_in,
            user_public_key: params.wallet_public_key.clone(),
            slippage_bps: params.slippage_bps.unwrap_or(self.config.slippage_bps_default),
            platform_fee_bps: self.config.platform_fee().map(|(bps, _)| bps),
            fee_account: self.config.platform_fee().map(|(_, account)| account.to_string()),
            priority_fee_tier: params.priority_fee_tier,
        };

        let keypair = signing_key.keypair();
        let swap_result = match &params.bundle {
            Some(bundle) => self.execute_via_bundle(&swap_request, &keypair, bundle).await,
            None => self.router.swap(&swap_request, &keypair).await,
        };
        drop(keypair);
        drop(signing_key);

        match swap_result {
            Ok(result) => {
                let commission_usd = self.compute_commission(&params, result.output_amount).await;
                self.orders
                    .update_status(order.id, OrderStatus::Filled, Some(result.signature.clone()), Some(commission_usd))
                    .await
                    .map_err(|e| TradeError::RpcError(e.to_string()))?;
                info!(order_id = order.id, signature = %result.signature, "trade filled");
                self.metrics.trades_total.with_label_values(&[params.side.as_str(), "filled"]).inc();
                self.metrics.commission_usd_total.inc_by(commission_usd);
                Ok(TradeResult {
                    order: Order {
                        status: OrderStatus::Filled,
                        signature: Some(result.signature.clone()),
                        commission_usd: Some(commission_usd),
                        ..order
                    },
                    signature: result.signature,
                    amount_out: result.output_amount,
                    commission_usd,
                })
            }
            Err(router_err) => {
                warn!(order_id = order.id, error = %router_err, "trade swap failed");
                self.orders
                    .update_status(order.id, OrderStatus::Failed, None, None)
                    .await
                    .map_err(|e| TradeError::RpcError(e.to_string()))?;
                self.metrics.trades_total.with_label_values(&[params.side.as_str(), "failed"]).inc();
                Err(TradeError::SwapFailed {
                    reason: router_err.to_string(),
                })
            }
        }
    }

    /// Prepares the swap through the router without submitting it, then
    /// lands it via the Jito bundle relay instead of the router's own
    /// execute endpoint. The returned signature is `jito:<bundle_id>` since
    /// a bundle has no single transaction signature to report until it
    /// lands on-chain.
    async fn execute_via_bundle(
        &self,
        swap_request: &SwapRequest,
        keypair: &solana_sdk::signature::Keypair,
        bundle: &BundleSubmission,
    ) -> Result<crate::dex_router::SwapResult, crate::dex_router::JupiterError> {
        let prepared = self.router.prepare_signed_swap(swap_request, keypair).await?;
        // The tip amount the relay would charge for this bundle; no tip-transfer
        // instruction is attached to the prepared transaction here, so the bundle
        // currently rides on the relay's own minimum rather than this computed value.
        let tip_lamports = bundle
            .relay
            .calculate_tip(bundle.estimated_profit_lamports, bundle.fee_percentage)
            .await;
        debug!(tip_lamports, "computed jito tip for bundle exit");

        let bundle_id = bundle
            .relay
            .submit_bundle(vec![prepared.signed_transaction_b64])
            .await
            .map_err(|e| crate::dex_router::JupiterError::SwapFailed(e.to_string()))?;

        Ok(crate::dex_router::SwapResult {
            signature: format!("jito:{bundle_id}"),
            input_amount: swap_request.amount_in,
            output_amount: prepared.expected_output_amount,
            price_impact_pct: prepared.price_impact_pct,
            slot: 0,
        })
    }

    /// Commission is `commission_bps` of the trade's SOL-denominated leg,
    /// converted to USD via the price feed's SOL/USD quote, floored at
    /// `min_commission_usd`. A price-feed failure is a soft failure here:
    /// it falls back to the floor rather than failing the already-filled
    /// trade.
    async fn compute_commission(&self, params: &TradeParams, amount_out: u64) -> f64 {
        let sol_amount = if params.side == OrderSide::Buy {
            params.amount_in as f64 / crate::constants::SOL_DECIMALS as f64
        } else {
            amount_out as f64 / crate::constants::SOL_DECIMALS as f64
        };

        let sol_price_usd = match self.price_feed.get_price(crate::constants::SOL_MINT).await {
            Ok(price) => price,
            Err(e) => {
                error!(error = %e, "commission pricing fell back to floor");
                return self.config.min_commission_usd;
            }
        };

        let usd_value = sol_amount * sol_price_usd;
        let commission = usd_value * (self.config.commission_bps as f64 / 10_000.0);
        commission.max(self.config.min_commission_usd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dex_router::{JupiterError, SwapResult};
    use crate::errors::VaultError;
    use crate::kv_store::InMemoryKvStore;
    use crate::price_feed::PriceSource;
    use crate::vault::{CredentialVault, SessionMode, WalletKeyLookup};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct FakeWallets(String);

    #[async_trait]
    impl WalletKeyLookup for FakeWallets {
        async fn encrypted_blob_for_user(&self, _user_id: i64) -> Result<String, VaultError> {
            Ok(self.0.clone())
        }
    }

    struct FixedPrice(f64);

    #[async_trait]
    impl PriceSource for FixedPrice {
        async fn fetch_price(&self, _mint: &str) -> Result<f64, crate::errors::PriceFeedError> {
            Ok(self.0)
        }
    }

    struct FakeOrders {
        inserted: StdMutex<Vec<Order>>,
        statuses: StdMutex<Vec<(i64, OrderStatus)>>,
        next_id: StdMutex<i64>,
    }

    impl FakeOrders {
        fn new() -> Self {
            Self {
                inserted: StdMutex::new(Vec::new()),
                statuses: StdMutex::new(Vec::new()),
                next_id: StdMutex::new(1),
            }
        }
    }

    #[async_trait]
    impl OrderRepository for FakeOrders {
        async fn insert(&self, order: &Order) -> Result<Order, crate::errors::RepositoryError> {
            let mut id_guard = self.next_id.lock().unwrap();
            let id = *id_guard;
            *id_guard += 1;
            let mut order = order.clone();
            order.id = id;
            self.inserted.lock().unwrap().push(order.clone());
            Ok(order)
        }

        async fn update_status(
            &self,
            order_id: i64,
            status: OrderStatus,
            _signature: Option<String>,
            _commission_usd: Option<f64>,
        ) -> Result<(), crate::errors::RepositoryError> {
            self.statuses.lock().unwrap().push((order_id, status));
            Ok(())
        }

        async fn find_by_id(&self, _order_id: i64) -> Result<Option<Order>, crate::errors::RepositoryError> {
            Ok(None)
        }
    }

    struct FakeRouter {
        result: Result<SwapResult, JupiterError>,
    }

    #[async_trait]
    impl DexRouter for FakeRouter {
        async fn get_quote(&self, _request: &SwapRequest) -> Result<crate::dex_router::Quote, JupiterError> {
            unimplemented!("not exercised by these tests")
        }

        async fn swap(&self, _request: &SwapRequest, _keypair: &solana_sdk::signature::Keypair) -> Result<SwapResult, JupiterError> {
            self.result.clone()
        }

        async fn prepare_signed_swap(
            &self,
            _request: &SwapRequest,
            _keypair: &solana_sdk::signature::Keypair,
        ) -> Result<crate::dex_router::PreparedSwap, JupiterError> {
            unimplemented!("not exercised by these tests")
        }

        async fn get_token_price_usd(&self, _mint: &str) -> Result<f64, JupiterError> {
            unimplemented!("not exercised by these tests")
        }
    }

    fn executor_with(router: FakeRouter, orders: Arc<FakeOrders>) -> (TradeExecutor, Arc<CredentialVault>) {
        let password = "Correct-Horse-Battery-9!";
        let key = [5u8; 32];
        let blob = crate::vault::encrypt_private_key(&key, password).unwrap();
        let kv = InMemoryKvStore::new();
        let metrics = Arc::new(Metrics::new());
        let vault = Arc::new(CredentialVault::new(kv.clone(), Arc::new(FakeWallets(blob)), Default::default()));
        let price_feed = Arc::new(PriceFeed::new(
            Default::default(),
            Arc::new(FixedPrice(150.0)),
            Arc::new(FixedPrice(150.0)),
            kv,
            metrics.clone(),
        ));
        let executor = TradeExecutor::new(
            TradeExecutorConfig::default(),
            vault.clone(),
            Arc::new(router),
            orders,
            price_feed,
            metrics,
        );
        (executor, vault)
    }

    #[tokio::test]
    async fn successful_swap_fills_order_and_computes_commission() {
        let orders = Arc::new(FakeOrders::new());
        let router = FakeRouter {
            result: Ok(SwapResult {
                signature: "sig123".to_string(),
                input_amount: crate::constants::SOL_DECIMALS,
                output_amount: 1_000_000,
                price_impact_pct: 0.1,
                slot: 42,
            }),
        };
        let (executor, vault) = executor_with(router, orders.clone());
        let (token, _) = vault.create_session(1, "Correct-Horse-Battery-9!", SessionMode::Strict).await.unwrap();

        let params = TradeParams {
            user_id: 1,
            session_token: token,
            wallet_public_key: "11111111111111111111111111111111".to_string(),
            input_mint: crate::constants::SOL_MINT.to_string(),
            output_mint: "TOKEN".to_string(),
            amount_in: crate::constants::SOL_DECIMALS,
            side: OrderSide::Buy,
            slippage_bps: None,
            priority_fee_tier: PriorityFeeTier::Medium,
            bundle: None,
        };

        let result = executor.execute(params).await.unwrap();
        assert_eq!(result.signature, "sig123");
        // 1 SOL at $150, 0bps commission default config falls to the floor.
        assert!(result.commission_usd >= executor.config.min_commission_usd);
        assert_eq!(orders.inserted.lock().unwrap().len(), 1);
        assert_eq!(orders.statuses.lock().unwrap(), vec![(1, OrderStatus::Filled)]);
    }

    #[tokio::test]
    async fn router_failure_marks_order_failed() {
        let orders = Arc::new(FakeOrders::new());
        let router = FakeRouter {
            result: Err(JupiterError::SwapFailed("slippage exceeded".to_string())),
        };
        let (executor, vault) = executor_with(router, orders.clone());
        let (token, _) = vault.create_session(1, "Correct-Horse-Battery-9!", SessionMode::Strict).await.unwrap();

        let params = TradeParams {
            user_id: 1,
            session_token: token,
            wallet_public_key: "11111111111111111111111111111111".to_string(),
            input_mint: crate::constants::SOL_MINT.to_string(),
            output_mint: "TOKEN".to_string(),
            amount_in: crate::constants::SOL_DECIMALS,
            side: OrderSide::Buy,
            slippage_bps: None,
            priority_fee_tier: PriorityFeeTier::Medium,
            bundle: None,
        };

        let err = executor.execute(params).await.unwrap_err();
        assert!(matches!(err, TradeError::SwapFailed { .. }));
        assert_eq!(orders.statuses.lock().unwrap(), vec![(1, OrderStatus::Failed)]);
    }

    #[tokio::test]
    async fn missing_session_password_is_invalid_password_and_no_order_is_created() {
        // A session_token present but with no vault-returned password
        // must resolve to InvalidPassword and never create an order.
        let orders = Arc::new(FakeOrders::new());
        let router = FakeRouter {
            result: Err(JupiterError::SwapFailed("unreachable".to_string())),
        };
        let (executor, vault) = executor_with(router, orders.clone());
        let (token, _) = vault.create_session(1, "Correct-Horse-Battery-9!", SessionMode::Strict).await.unwrap();
        // Consume the vaulted password out from under the trade executor.
        vault.fetch_session_password(&token, true).await.unwrap();

        let params = TradeParams {
            user_id: 1,
            session_token: token,
            wallet_public_key: "11111111111111111111111111111111".to_string(),
            input_mint: crate::constants::SOL_MINT.to_string(),
            output_mint: "TOKEN".to_string(),
            amount_in: crate::constants::SOL_DECIMALS,
            side: OrderSide::Buy,
            slippage_bps: None,
            priority_fee_tier: PriorityFeeTier::Medium,
            bundle: None,
        };

        let err = executor.execute(params).await.unwrap_err();
        assert!(matches!(err, TradeError::Vault(VaultError::InvalidPassword)));
        assert!(orders.inserted.lock().unwrap().is_empty());
    }
}
