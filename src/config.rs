//! One enumerated configuration struct per component, favoring a typed
//! struct over config-by-dict. Each struct implements
//! `Default` with the documented defaults and derives `serde::Deserialize`
//! so overrides can be loaded from a config file; `AppConfig::from_env`
//! follows the reference bot's `SharedConfig::from_env()` convention
//! (`dotenvy::dotenv().ok()` then typed env lookups with fallbacks) but
//! rejects unknown top-level keys when loaded from a file instead of
//! silently absorbing them.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::parsers::PoolSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct VaultConfig {
    pub strict_session_ttl_seconds: u64,
    pub reuse_session_ttl_seconds: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            strict_session_ttl_seconds: STRICT_SESSION_TTL_SECONDS,
            reuse_session_ttl_seconds: REUSE_SESSION_TTL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SourceConfig {
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
    pub reconnect_max_attempts: u32,
    pub latency_sample_capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: STREAM_RECONNECT_BASE_DELAY_MS,
            reconnect_max_delay_ms: STREAM_RECONNECT_MAX_DELAY_MS,
            reconnect_max_attempts: STREAM_RECONNECT_MAX_ATTEMPTS,
            latency_sample_capacity: STREAM_LATENCY_SAMPLE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MeteoraAdmissionConfig {
    pub max_total_fee_bps: u32,
    pub max_wait_time_sec: u64,
    pub skip_fee_scheduler: bool,
    pub skip_rate_limiter: bool,
    pub skip_alpha_vault: bool,
    pub allow_unknown_config: bool,
    pub filter_unsafe_meteora: bool,
    pub typical_snipe_amount_sol: f64,
}

impl Default for MeteoraAdmissionConfig {
    fn default() -> Self {
        Self {
            max_total_fee_bps: 500,
            max_wait_time_sec: 300,
            skip_fee_scheduler: false,
            skip_rate_limiter: false,
            skip_alpha_vault: false,
            allow_unknown_config: false,
            filter_unsafe_meteora: true,
            typical_snipe_amount_sol: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SourceManagerConfig {
    pub duplicate_window_ms: u64,
    pub cleanup_interval_ms: u64,
    pub enabled_sources: HashSet<PoolSource>,
    pub latency_warn_ms: u64,
    pub meteora: MeteoraAdmissionConfig,
}

impl Default for SourceManagerConfig {
    fn default() -> Self {
        Self {
            duplicate_window_ms: DEFAULT_DUPLICATE_WINDOW_MS,
            cleanup_interval_ms: DUPLICATE_WINDOW_CLEANUP_INTERVAL_MS,
            enabled_sources: [
                PoolSource::RaydiumV4,
                PoolSource::RaydiumClmm,
                PoolSource::OrcaWhirlpool,
                PoolSource::Meteora,
                PoolSource::PumpFun,
                PoolSource::PumpSwap,
            ]
            .into_iter()
            .collect(),
            latency_warn_ms: 250,
            meteora: MeteoraAdmissionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EventBusConfig {
    pub idempotency_window_ms: u64,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            idempotency_window_ms: EVENT_BUS_IDEMPOTENCY_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_ms: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: CIRCUIT_BREAKER_FAILURE_THRESHOLD,
            timeout_ms: CIRCUIT_BREAKER_TIMEOUT_MS,
            success_threshold: CIRCUIT_BREAKER_SUCCESS_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PriceFeedConfig {
    pub tier1_max_entries: usize,
    pub tier1_ttl_ms: u64,
    pub tier2_ttl_seconds: u64,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
    pub fetch_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_jitter_factor: f64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            tier1_max_entries: PRICE_TIER1_MAX_ENTRIES,
            tier1_ttl_ms: PRICE_TIER1_TTL_MS,
            tier2_ttl_seconds: PRICE_TIER2_TTL_SECONDS,
            rate_limit_requests: PRICE_RATE_LIMIT_REQUESTS,
            rate_limit_window_seconds: PRICE_RATE_LIMIT_WINDOW_SECONDS,
            fetch_timeout_ms: PRICE_FETCH_TIMEOUT_MS,
            retry_attempts: PRICE_RETRY_ATTEMPTS,
            retry_base_delay_ms: PRICE_RETRY_BASE_DELAY_MS,
            retry_jitter_factor: PRICE_RETRY_JITTER_FACTOR,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl PriceFeedConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TradeExecutorConfig {
    pub commission_bps: u16,
    pub min_commission_usd: f64,
    pub platform_fee_bps: Option<u16>,
    pub fee_account: Option<String>,
    pub slippage_bps_default: u16,
}

impl Default for TradeExecutorConfig {
    fn default() -> Self {
        Self {
            commission_bps: DEFAULT_COMMISSION_BPS,
            min_commission_usd: DEFAULT_MIN_COMMISSION_USD,
            platform_fee_bps: None,
            fee_account: None,
            slippage_bps_default: DEFAULT_SLIPPAGE_BPS,
        }
    }
}

impl TradeExecutorConfig {
    /// Platform fee is disabled unless both a bps rate and a fee account are set.
    pub fn platform_fee(&self) -> Option<(u16, &str)> {
        match (self.platform_fee_bps, &self.fee_account) {
            (Some(bps), Some(account)) => Some((bps, account.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PositionMonitorConfig {
    pub check_interval_ms: u64,
    pub max_concurrent_checks: usize,
}

impl Default for PositionMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: POSITION_CHECK_INTERVAL_MS,
            max_concurrent_checks: POSITION_MAX_CONCURRENT_CHECKS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExitExecutorConfig {
    pub max_attempts: u32,
    pub exit_slippage_bps: u16,
    pub circuit_breaker: CircuitBreakerConfig,
    pub use_jito_exits: bool,
    pub jito_block_engine_url: String,
    pub jito_tip_lamports_min: u64,
    pub jito_tip_lamports_max: u64,
}

impl Default for ExitExecutorConfig {
    fn default() -> Self {
        Self {
            max_attempts: EXIT_MAX_ATTEMPTS,
            exit_slippage_bps: 150,
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: EXIT_CIRCUIT_BREAKER_THRESHOLD,
                timeout_ms: EXIT_CIRCUIT_BREAKER_TIMEOUT_MS,
                success_threshold: CIRCUIT_BREAKER_SUCCESS_THRESHOLD,
            },
            use_jito_exits: false,
            jito_block_engine_url: JITO_MAINNET_BLOCK_ENGINE.to_string(),
            jito_tip_lamports_min: MIN_JITO_TIP_LAMPORTS,
            jito_tip_lamports_max: MAX_JITO_TIP_LAMPORTS,
        }
    }
}

/// Top-level configuration, one field per component. Loaded once at process
/// start and handed to each component's constructor; services are
/// explicitly constructed and injected, never looked up through global
/// state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields, default)]
pub struct AppConfig {
    pub vault: VaultConfig,
    pub source: SourceConfig,
    pub source_manager: SourceManagerConfig,
    pub event_bus: EventBusConfig,
    pub price_feed: PriceFeedConfig,
    pub trade_executor: TradeExecutorConfig,
    pub position_monitor: PositionMonitorConfig,
    pub exit_executor: ExitExecutorConfig,

    pub solana_rpc_endpoint: String,
    pub shreds_endpoint: String,
    pub database_path: String,
}

impl AppConfig {
    /// Mirrors the reference bot's `SharedConfig::from_env()`: load a
    /// `.env` file if present, then read typed environment variables with
    /// sensible fallbacks. Unlike the reference bot's single flat struct,
    /// every component gets its own sub-config so unknown/misplaced keys in
    /// a loaded override file fail fast instead of being silently ignored.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut cfg = AppConfig {
            solana_rpc_endpoint: std::env::var("SOLANA_RPC_ENDPOINT")
                .unwrap_or_else(|_| "https://api.mainnet-beta.solana.com".to_string()),
            shreds_endpoint: std::env::var("SHREDS_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:9999".to_string()),
            database_path: std::env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "data/sniper.db".to_string()),
            ..Default::default()
        };

        if let Ok(window) = std::env::var("SNIPER_DUPLICATE_WINDOW_MS") {
            if let Ok(parsed) = window.parse() {
                cfg.source_manager.duplicate_window_ms = parsed;
            }
        }
        if let Ok(jito) = std::env::var("JITO_ENABLED") {
            cfg.exit_executor.use_jito_exits = jito.eq_ignore_ascii_case("true");
        }

        cfg
    }

    /// Loads a full override from a JSON config file. Every sub-struct's
    /// `deny_unknown_fields` means a typo'd key fails to load instead of
    /// being silently ignored; any field left out of the file keeps its
    /// `Default` value courtesy of each struct's `#[serde(default)]`.
    pub fn from_file(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cfg = serde_json::from_str(&raw)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.source_manager.duplicate_window_ms, 5_000);
        assert_eq!(cfg.price_feed.tier1_max_entries, 1_000);
        assert_eq!(cfg.price_feed.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.vault.strict_session_ttl_seconds, 120);
        assert_eq!(cfg.vault.reuse_session_ttl_seconds, 900);
    }

    #[test]
    fn platform_fee_disabled_unless_both_set() {
        let mut cfg = TradeExecutorConfig::default();
        assert!(cfg.platform_fee().is_none());
        cfg.platform_fee_bps = Some(50);
        assert!(cfg.platform_fee().is_none());
        cfg.fee_account = Some("Fee1111111111111111111111111111111111111".to_string());
        assert_eq!(cfg.platform_fee(), Some((50, "Fee1111111111111111111111111111111111111")));
    }
}
