//! Solana pool-sniping bot core: credential vault, DEX pool-init parsers,
//! stream ingestion, source scoring/dedup, an in-process event bus, a
//! cached price feed, and the trade/position/exit lifecycle built on top
//! of them.
//!
//! This crate owns detection-through-exit decision logic. It consumes
//! chain data through injected stream sources and a DEX router capability
//! rather than embedding RPC or DEX SDK bindings, and persists through the
//! `persistence` traits rather than owning a particular database beyond
//! the bundled SQLite reference implementation.

pub mod bundle_relay;
pub mod circuit_breaker;
pub mod config;
pub mod constants;
pub mod dex_router;
pub mod dexscreener_price_source;
pub mod domain;
pub mod errors;
pub mod event_bus;
pub mod exit_executor;
pub mod jupiter_rate_limiter;
pub mod jupiter_router;
pub mod kv_store;
pub mod metrics;
pub mod parsers;
pub mod persistence;
pub mod position_monitor;
pub mod price_feed;
pub mod source_manager;
pub mod stream;
pub mod trade_executor;
pub mod vault;

pub use bundle_relay::JitoBundleRelay;
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use config::AppConfig;
pub use dex_router::{DexRouter, JupiterError, PriorityFeeTier, Quote, SwapRequest, SwapResult};
pub use dexscreener_price_source::DexscreenerPriceSource;
pub use domain::{Order, OrderSide, OrderStatus, Position, PositionStatus, User, Wallet};
pub use errors::{ExitError, KvError, ParseError, PriceFeedError, RepositoryError, StreamError, TradeError, VaultError};
pub use event_bus::EventBus;
pub use exit_executor::{ExitExecutor, ExitSessionLookup, VaultExitSessionLookup};
pub use jupiter_router::JupiterRouter;
pub use kv_store::{InMemoryKvStore, KvStore};
pub use metrics::Metrics;
pub use position_monitor::{ExitDispatch, ExitReason, PositionMonitor};
pub use price_feed::{PriceFeed, PriceSource};
pub use source_manager::{ScoredPoolDetection, SourceManager};
pub use stream::{SourceKind, StreamMessage, StreamSource};
pub use trade_executor::{TradeExecutor, TradeParams, TradeResult};
pub use vault::{CredentialVault, RepositoryWalletLookup};
