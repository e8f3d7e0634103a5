//! Source Manager: converges concurrent per-source raw detections into
//! scored pool detections — duplicate-window dedupe, priority scoring, and
//! the Meteora anti-sniper admission filter.
//!
//! Grounded on the reputation-table-driven scoring and periodic-cleanup
//! idiom of `mempool_monitor.rs` (`MonitorConfig`/`MonitorStats`, a
//! `tokio::select!`-driven cleanup task), restructured around pool
//! detections. The dedupe/score/filter path itself is synchronous -- no
//! I/O -- so the detection callback stays synchronous with respect to
//! the source thread.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{MeteoraAdmissionConfig, SourceManagerConfig};
use crate::constants::{
    FIRST_BONUS_DUPLICATE, FIRST_BONUS_FIRST, REPUTATION_METEORA, REPUTATION_ORCA_WHIRLPOOL,
    REPUTATION_PUMPSWAP, REPUTATION_PUMP_FUN, REPUTATION_RAYDIUM_CLMM, REPUTATION_RAYDIUM_V4,
    REPUTATION_WEIGHT, TIMING_SCORE_DUPLICATE, TIMING_SCORE_FIRST,
};
use crate::metrics::Metrics;
use crate::parsers::{MeteoraAntiSniperConfig, PoolSource, RawPoolDetection};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ScoredPoolDetection {
    #[serde(flatten)]
    pub raw: RawPoolDetection,
    pub priority_score: u8,
    pub is_first_detection: bool,
    pub also_detected_on: Vec<PoolSource>,
    pub meteora_effective_fee_bps: Option<u32>,
    pub is_safe_to_snipe: bool,
    pub unsafe_reason: Option<String>,
}

fn reputation(source: PoolSource) -> f64 {
    match source {
        PoolSource::RaydiumV4 => REPUTATION_RAYDIUM_V4,
        PoolSource::RaydiumClmm => REPUTATION_RAYDIUM_CLMM,
        PoolSource::OrcaWhirlpool => REPUTATION_ORCA_WHIRLPOOL,
        PoolSource::Meteora => REPUTATION_METEORA,
        PoolSource::PumpFun => REPUTATION_PUMP_FUN,
        PoolSource::PumpSwap => REPUTATION_PUMPSWAP,
    }
}

fn priority_score(source: PoolSource, is_first: bool) -> u8 {
    let first_bonus = if is_first { FIRST_BONUS_FIRST } else { FIRST_BONUS_DUPLICATE };
    let timing = if is_first { TIMING_SCORE_FIRST } else { TIMING_SCORE_DUPLICATE };
    let raw = reputation(source) * REPUTATION_WEIGHT + first_bonus + timing;
    raw.clamp(0.0, 100.0).round() as u8
}

/// Effective total fee (bps) a snipe of `typical_snipe_amount_sol` would
/// pay right now, computed at the configured `typical_snipe_amount_sol` and
/// the current time. Fee-scheduler decay and rate-limiter surcharge
/// formulas are this crate's own, documented in DESIGN.md.
pub fn effective_fee_bps(config: &MeteoraAntiSniperConfig, typical_snipe_amount_sol: f64, now_unix: i64) -> u32 {
    let scheduler_bps = config
        .fee_scheduler
        .as_ref()
        .map(|s| {
            let elapsed = (now_unix - s.launch_time_sec).max(0);
            let periods_elapsed = if s.period_sec == 0 {
                0
            } else {
                (elapsed / s.period_sec as i64).min(s.num_periods as i64)
            };
            let decay = (1.0 - s.reduction_factor).clamp(0.0, 1.0).powi(periods_elapsed as i32);
            (s.cliff_fee_bps as f64 * decay).round() as u32
        })
        .unwrap_or(0);

    let limiter_bps = config
        .rate_limiter
        .as_ref()
        .map(|r| {
            let amount_lamports = crate::constants::sol_to_lamports(typical_snipe_amount_sol);
            if amount_lamports > r.reference_amount_lamports && r.reference_amount_lamports > 0 {
                let excess_ratio = amount_lamports as f64 / r.reference_amount_lamports as f64;
                let extra = (r.fee_increment_bps as f64 * excess_ratio).round() as u32;
                (r.base_fee_bps + extra).min(r.max_fee_bps)
            } else {
                r.base_fee_bps
            }
        })
        .unwrap_or(0);

    scheduler_bps + limiter_bps
}

struct WindowEntry {
    pool_address: String,
    source: PoolSource,
    detected_at: Instant,
}

pub struct SourceManager {
    config: SourceManagerConfig,
    window: Mutex<HashMap<String, Vec<WindowEntry>>>,
    metrics: Arc<Metrics>,
}

impl SourceManager {
    pub fn new(config: SourceManagerConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            config,
            window: Mutex::new(HashMap::new()),
            metrics,
        }
    }

    /// Synchronous hot path: dedupe, score, and apply the Meteora safety
    /// filter. Returns `None` when the detection is filtered out entirely
    /// (rejected Meteora config) rather than merely marked unsafe.
    pub fn process(&self, raw: RawPoolDetection) -> Option<ScoredPoolDetection> {
        if !self.config.enabled_sources.contains(&raw.source) {
            return None;
        }

        let now = Instant::now();
        let window_ms = Duration::from_millis(self.config.duplicate_window_ms);

        let (is_first, also_detected_on) = {
            let mut window = self.window.lock();
            let entries = window.entry(raw.token_mint_a.clone()).or_default();
            entries.retain(|e| now.duration_since(e.detected_at) < window_ms);

            let is_first = entries.is_empty();
            let also_detected_on: Vec<PoolSource> = entries
                .iter()
                .map(|e| e.source)
                .filter(|s| *s != raw.source)
                .collect();

            entries.push(WindowEntry {
                pool_address: raw.pool_address.clone(),
                source: raw.source,
                detected_at: now,
            });
            (is_first, also_detected_on)
        };

        let mut is_safe_to_snipe = true;
        let mut unsafe_reason = None;
        let mut meteora_effective_fee_bps = None;

        if raw.source == PoolSource::Meteora {
            let meteora_cfg = &self.config.meteora;
            match &raw.meteora_anti_sniper {
                None => {
                    if !meteora_cfg.allow_unknown_config {
                        debug!(pool = %raw.pool_address, "meteora detection rejected: no anti-sniper config");
                        self.metrics.meteora_rejected_total.inc();
                        return None;
                    }
                }
                Some(anti_sniper) => {
                    if let Some(reason) = granular_rejection(anti_sniper, meteora_cfg) {
                        debug!(pool = %raw.pool_address, reason, "meteora detection rejected by granular filter");
                        self.metrics.meteora_rejected_total.inc();
                        return None;
                    }
                    let fee_bps =
                        effective_fee_bps(anti_sniper, meteora_cfg.typical_snipe_amount_sol, Utc::now().timestamp());
                    meteora_effective_fee_bps = Some(fee_bps);
                    if fee_bps > meteora_cfg.max_total_fee_bps {
                        is_safe_to_snipe = false;
                        unsafe_reason = Some(format!(
                            "effective fee {fee_bps}bps exceeds max_total_fee_bps {}",
                            meteora_cfg.max_total_fee_bps
                        ));
                        if meteora_cfg.filter_unsafe_meteora {
                            warn!(pool = %raw.pool_address, fee_bps, "unsafe meteora detection dropped");
                            self.metrics.meteora_rejected_total.inc();
                            return None;
                        }
                    }
                }
            }
        }

        let score = priority_score(raw.source, is_first);

        self.metrics.detections_scored_total.inc();
        if !is_first {
            self.metrics.detections_duplicate_total.inc();
        }

        Some(ScoredPoolDetection {
            raw,
            priority_score: score,
            is_first_detection: is_first,
            also_detected_on,
            meteora_effective_fee_bps,
            is_safe_to_snipe,
            unsafe_reason,
        })
    }

    /// Prune duplicate-window entries older than the configured window.
    /// Intended to be driven by a periodic 1-second task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window_ms = Duration::from_millis(self.config.duplicate_window_ms);
        let mut window = self.window.lock();
        window.retain(|_, entries| {
            entries.retain(|e| now.duration_since(e.detected_at) < window_ms);
            !entries.is_empty()
        });
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.config.cleanup_interval_ms)
    }
}

fn granular_rejection(config: &MeteoraAntiSniperConfig, cfg: &MeteoraAdmissionConfig) -> Option<&'static str> {
    if cfg.skip_fee_scheduler && config.has_fee_scheduler {
        return Some("skip_fee_scheduler");
    }
    if cfg.skip_rate_limiter && config.has_rate_limiter {
        return Some("skip_rate_limiter");
    }
    if cfg.skip_alpha_vault && config.has_alpha_vault {
        return Some("skip_alpha_vault");
    }
    None
}
