//! Cross-module integration tests for the pool-sniping core.
//!
//! Unlike the per-module unit tests (each colocated with its component),
//! these wire several components together through their public traits with
//! in-memory/fake collaborators, exercising the full dataflow: detection ->
//! scoring -> bus -> trade -> position -> exit.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use solana_sniper_core::*;

mod support {
    use super::*;

    pub struct FakeWallets(pub String);

    #[async_trait]
    impl vault::WalletKeyLookup for FakeWallets {
        async fn encrypted_blob_for_user(&self, _user_id: i64) -> Result<String, VaultError> {
            Ok(self.0.clone())
        }
    }

    pub struct FixedPrice(pub f64);

    #[async_trait]
    impl price_feed::PriceSource for FixedPrice {
        async fn fetch_price(&self, _mint: &str) -> Result<f64, PriceFeedError> {
            Ok(self.0)
        }
    }

    pub struct FakeOrders {
        pub next_id: StdMutex<i64>,
        pub statuses: StdMutex<Vec<(i64, OrderStatus)>>,
    }

    impl FakeOrders {
        pub fn new() -> Self {
            Self {
                next_id: StdMutex::new(1),
                statuses: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl persistence::OrderRepository for FakeOrders {
        async fn insert(&self, order: &Order) -> Result<Order, RepositoryError> {
            let mut guard = self.next_id.lock().unwrap();
            let id = *guard;
            *guard += 1;
            Ok(Order { id, ..order.clone() })
        }

        async fn update_status(
            &self,
            order_id: i64,
            status: OrderStatus,
            _signature: Option<String>,
            _commission_usd: Option<f64>,
        ) -> Result<(), RepositoryError> {
            self.statuses.lock().unwrap().push((order_id, status));
            Ok(())
        }

        async fn find_by_id(&self, _order_id: i64) -> Result<Option<Order>, RepositoryError> {
            Ok(None)
        }
    }

    pub struct FakePositions {
        pub positions: StdMutex<Vec<Position>>,
    }

    impl FakePositions {
        pub fn new(initial: Position) -> Self {
            Self {
                positions: StdMutex::new(vec![initial]),
            }
        }
    }

    #[async_trait]
    impl persistence::PositionRepository for FakePositions {
        async fn insert(&self, position: &Position) -> Result<Position, RepositoryError> {
            self.positions.lock().unwrap().push(position.clone());
            Ok(position.clone())
        }

        async fn find_open(&self) -> Result<Vec<Position>, RepositoryError> {
            Ok(self
                .positions
                .lock()
                .unwrap()
                .iter()
                .filter(|p| p.status == PositionStatus::Open)
                .cloned()
                .collect())
        }

        async fn update(&self, position: &Position) -> Result<(), RepositoryError> {
            let mut positions = self.positions.lock().unwrap();
            if let Some(slot) = positions.iter_mut().find(|p| p.id == position.id) {
                *slot = position.clone();
            }
            Ok(())
        }
    }

    pub struct FakeRouter {
        pub fill_count: AtomicU32,
    }

    #[async_trait]
    impl DexRouter for FakeRouter {
        async fn get_quote(&self, _request: &SwapRequest) -> Result<Quote, JupiterError> {
            unimplemented!()
        }

        async fn swap(&self, request: &SwapRequest, _keypair: &solana_sdk::signature::Keypair) -> Result<SwapResult, JupiterError> {
            let n = self.fill_count.fetch_add(1, Ordering::SeqCst);
            Ok(SwapResult {
                signature: format!("sig-{n}"),
                input_amount: request.amount_in,
                output_amount: request.amount_in,
                price_impact_pct: 0.05,
                slot: 100 + n as u64,
            })
        }

        async fn get_token_price_usd(&self, _mint: &str) -> Result<f64, JupiterError> {
            Ok(150.0)
        }
    }

    pub struct FakeSessions(pub StdMutex<Option<(String, String)>>);

    #[async_trait]
    impl ExitSessionLookup for FakeSessions {
        async fn session_for_user(&self, _user_id: i64) -> Option<(String, String)> {
            self.0.lock().unwrap().clone()
        }
    }
}

use support::*;

/// Two raw detections for the same token within the duplicate window should
/// collapse into one scored, first-detection event on the bus; a third,
/// outside the window, should be reported as first again.
#[tokio::test]
async fn detection_pipeline_dedupes_and_publishes_scored_events() {
    let kv = InMemoryKvStore::new();
    let bus = EventBus::new(config::EventBusConfig::default(), kv);
    let manager = SourceManager::new(config::SourceManagerConfig {
        duplicate_window_ms: 5_000,
        ..Default::default()
    });

    let mut scored_rx = bus.subscribe_scored();

    let raw = |source: parsers::PoolSource, sig: &str| parsers::RawPoolDetection {
        pool_address: "pool-x".to_string(),
        token_mint_a: "TOKEN".to_string(),
        token_mint_b: constants::SOL_MINT.to_string(),
        source,
        signature: sig.to_string(),
        slot: 1,
        block_time: None,
        quote_kind: parsers::QuoteKind::Sol,
        creator: None,
        meteora_anti_sniper: None,
    };

    let first = manager.process(raw(parsers::PoolSource::RaydiumV4, "sig-1")).unwrap();
    assert!(first.is_first_detection);
    assert!(bus.publish_scored(first).await.unwrap());

    let dup = manager.process(raw(parsers::PoolSource::OrcaWhirlpool, "sig-2")).unwrap();
    assert!(!dup.is_first_detection);
    assert_eq!(dup.also_detected_on, vec![parsers::PoolSource::RaydiumV4]);
    assert!(bus.publish_scored(dup).await.unwrap());

    let first_received = scored_rx.recv().await.unwrap();
    assert_eq!(first_received.raw.signature, "sig-1");
    assert!(first_received.is_first_detection);

    let dup_received = scored_rx.recv().await.unwrap();
    assert_eq!(dup_received.raw.signature, "sig-2");
    assert!(!dup_received.is_first_detection);
}

/// A full buy executed through the trade executor, followed by a stop-loss
/// trigger that the position monitor detects and routes through the exit
/// executor, closing the position and filling a second (sell) order.
#[tokio::test]
async fn open_position_exits_on_stop_loss_trigger() {
    let password = "Correct-Horse-Battery-9!";
    let key_bytes = [11u8; 32];
    let blob = vault::encrypt_private_key(&key_bytes, password).unwrap();

    let kv = InMemoryKvStore::new();
    let wallets = Arc::new(FakeWallets(blob));
    let vault = Arc::new(CredentialVault::new(kv.clone(), wallets, config::VaultConfig::default()));

    let (session_token, _expires) = vault
        .create_session(1, password, vault::SessionMode::Reuse)
        .await
        .unwrap();

    let price_feed = Arc::new(PriceFeed::new(
        config::PriceFeedConfig::default(),
        Arc::new(FixedPrice(80.0)), // price has dropped from entry
        Arc::new(FixedPrice(80.0)),
        kv,
    ));

    let orders = Arc::new(FakeOrders::new());
    let router = Arc::new(FakeRouter {
        fill_count: AtomicU32::new(0),
    });

    let trade_executor = Arc::new(TradeExecutor::new(
        config::TradeExecutorConfig::default(),
        vault.clone(),
        router.clone(),
        orders.clone(),
        price_feed.clone(),
    ));

    // Position was opened at 100.0 (entry_amount_out / entry_amount_in) with
    // a 20% stop-loss; the current price of 80.0 sits exactly on the trigger.
    let position = Position {
        id: 7,
        user_id: 1,
        token_mint: "TOKEN".to_string(),
        entry_amount_in: 1.0,
        entry_amount_out: 100.0,
        tp_pct: Some(50.0),
        sl_pct: Some(20.0),
        trailing_stop_pct: None,
        highest_observed_price: 100.0,
        status: PositionStatus::Open,
    };
    let positions = Arc::new(FakePositions::new(position));

    let sessions = Arc::new(FakeSessions(StdMutex::new(Some((
        session_token,
        "11111111111111111111111111111111".to_string(),
    )))));

    let exit_executor = Arc::new(ExitExecutor::new(
        config::ExitExecutorConfig::default(),
        trade_executor,
        sessions,
        positions.clone(),
        None,
    ));

    let monitor = PositionMonitor::new(
        config::PositionMonitorConfig {
            check_interval_ms: 50,
            max_concurrent_checks: 4,
        },
        positions.clone(),
        price_feed,
        exit_executor,
    );

    monitor.run_once().await.unwrap();
    // Exit dispatch is fired-and-awaited from within the evaluation task;
    // give the spawned task a moment to land its status update.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let stored = positions.positions.lock().unwrap();
    let closed = stored.iter().find(|p| p.id == 7).unwrap();
    assert_eq!(closed.status, PositionStatus::Closed);
    assert_eq!(orders.statuses.lock().unwrap(), vec![(1, OrderStatus::Filled)]);
}
