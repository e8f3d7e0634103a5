use std::sync::Arc;

use clap::Parser;
use solana_sniper_core::bundle_relay::JitoBundleRelay;
use solana_sniper_core::config::AppConfig;
use solana_sniper_core::dexscreener_price_source::DexscreenerPriceSource;
use solana_sniper_core::event_bus::EventBus;
use solana_sniper_core::exit_executor::{ExitExecutor, VaultExitSessionLookup};
use solana_sniper_core::jupiter_router::JupiterRouter;
use solana_sniper_core::kv_store::InMemoryKvStore;
use solana_sniper_core::metrics::Metrics;
use solana_sniper_core::persistence::SqliteRepositories;
use solana_sniper_core::position_monitor::PositionMonitor;
use solana_sniper_core::price_feed::PriceFeed;
use solana_sniper_core::source_manager::SourceManager;
use solana_sniper_core::trade_executor::TradeExecutor;
use solana_sniper_core::vault::{CredentialVault, RepositoryWalletLookup};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Overrides `AppConfig::from_env()`'s env-var lookups with flags, mainly so
/// an operator can point at a full JSON config file without exporting
/// `DATABASE_PATH` etc. individually.
#[derive(Parser, Debug)]
#[command(name = "sniper-core", about = "Solana pool-sniping bot core")]
struct Cli {
    /// Path to a JSON config file overriding every component's defaults.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    /// Override the SQLite database path from `AppConfig`/`DATABASE_PATH`.
    #[arg(long)]
    database_path: Option<String>,
}

/// Process lifecycle: load configuration, construct every component and
/// hand each its dependencies explicitly, run the position monitor loop
/// until shutdown is requested, then let every `Arc` drop.
///
/// Stream ingestion (gRPC/WebSocket transport, the DEX SDK bindings behind
/// `GrpcConnector`/`WebSocketConnector`) is wired by whatever deployment
/// embeds this crate: the connector traits are the seam, and this binary
/// only demonstrates the decision pipeline those sources feed into.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env(),
    };
    if let Some(database_path) = cli.database_path {
        config.database_path = database_path;
    }
    info!(db = %config.database_path, rpc = %config.solana_rpc_endpoint, "starting sniper core");

    let repos = Arc::new(SqliteRepositories::open(&config.database_path)?);
    let kv = InMemoryKvStore::new();
    let metrics = Arc::new(Metrics::new());

    let wallet_lookup = Arc::new(RepositoryWalletLookup::new(repos.clone()));
    let vault = Arc::new(CredentialVault::new(kv.clone(), wallet_lookup, config.vault.clone()));

    let jupiter_api_key = std::env::var("JUPITER_API_KEY").unwrap_or_default();
    let router: Arc<JupiterRouter> = Arc::new(JupiterRouter::new(jupiter_api_key));

    // Dexscreener is the aggregator-style primary price source; the Jupiter
    // routing API (already wired for swaps) backs it up as the fallback.
    let price_feed = Arc::new(PriceFeed::new(
        config.price_feed.clone(),
        Arc::new(DexscreenerPriceSource::new()),
        router.clone(),
        kv.clone(),
        metrics.clone(),
    ));

    let trade_executor = Arc::new(TradeExecutor::new(
        config.trade_executor.clone(),
        vault.clone(),
        router.clone(),
        repos.clone(),
        price_feed.clone(),
        metrics.clone(),
    ));

    let bundle_relay = config
        .exit_executor
        .use_jito_exits
        .then(|| Arc::new(JitoBundleRelay::new(&config.exit_executor)));

    let session_lookup = Arc::new(VaultExitSessionLookup::new(vault.clone(), repos.clone()));
    let exit_executor = Arc::new(ExitExecutor::new(
        config.exit_executor.clone(),
        trade_executor.clone(),
        session_lookup,
        repos.clone(),
        bundle_relay,
        metrics.clone(),
    ));

    let position_monitor = Arc::new(PositionMonitor::new(
        config.position_monitor.clone(),
        repos.clone(),
        price_feed.clone(),
        exit_executor.clone(),
        metrics.clone(),
    ));

    // Constructed and ready for a stream source to publish detections onto;
    // no concrete connector lives in this binary so nothing feeds it yet.
    let _event_bus = EventBus::new(config.event_bus.clone(), kv.clone(), metrics.clone());
    let source_manager = Arc::new(SourceManager::new(config.source_manager.clone(), metrics.clone()));

    let monitor_handle = {
        let position_monitor = position_monitor.clone();
        tokio::spawn(async move { position_monitor.run().await })
    };

    let cleanup_handle = {
        let source_manager = source_manager.clone();
        let interval_ms = config.source_manager.cleanup_interval_ms.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                source_manager.cleanup();
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        result = monitor_handle => {
            if let Err(e) = result {
                warn!(error = %e, "position monitor task ended unexpectedly");
            }
        }
    }
    cleanup_handle.abort();

    info!(snapshot = %metrics.render().len(), "final metrics snapshot length (bytes)");
    Ok(())
}
