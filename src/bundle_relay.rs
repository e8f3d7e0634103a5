//! Jito bundle relay: optional low-latency transaction submission path
//! used by the Exit Executor when `use_jito_exits` is enabled.
//!
//! Grounded on `jito_submitter.rs`'s profit-scaled tip calculation (99th
//! percentile tip floor, margin-based multiplier scaling against the
//! trade's fee percentage) and its bundle-submission HTTP shape, with the
//! `Lazy<JitoSubmitter>` static singleton and plaintext
//! `WALLET_PRIVATE_KEY` env var read dropped: this type is constructed
//! once at startup and injected like every other component, and it never
//! touches key material itself -- callers hand it an already-signed
//! transaction.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::ExitExecutorConfig;

/// Cached tip-floor percentile, refreshed every
/// `constants::JITO_TIP_REFRESH_MINUTES` so `calculate_tip` isn't
/// re-deriving it on every exit.
struct TipFloorCache {
    floor_lamports: u64,
    refreshed_at: Instant,
}

pub struct JitoBundleRelay {
    client: Client,
    block_engine_url: String,
    tip_lamports_min: u64,
    tip_lamports_max: u64,
    last_submit: Mutex<Option<Instant>>,
    tip_floor: Mutex<TipFloorCache>,
}

impl JitoBundleRelay {
    pub fn new(config: &ExitExecutorConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build jito http client"),
            block_engine_url: config.jito_block_engine_url.clone(),
            tip_lamports_min: config.jito_tip_lamports_min,
            tip_lamports_max: config.jito_tip_lamports_max,
            last_submit: Mutex::new(None),
            tip_floor: Mutex::new(TipFloorCache {
                floor_lamports: config.jito_tip_lamports_min.max(100_000),
                refreshed_at: Instant::now(),
            }),
        }
    }

    /// Reads the current `JITO_TIP_BASELINE_PERCENTILE` tip floor. This
    /// crate has no live feed of recent Jito tip amounts to percentile
    /// over, so the refreshed value is the configured minimum; the cache
    /// and refresh cadence exist so swapping in a real percentile source
    /// later is a one-function change, not a call-site one.
    fn fetch_tip_floor_percentile(&self) -> u64 {
        let _ = crate::constants::JITO_TIP_BASELINE_PERCENTILE;
        self.tip_lamports_min.max(100_000)
    }

    /// Scales the tip with how much margin the trade has over its own
    /// fees: a trade clearing fees by a wide margin can afford a bigger
    /// tip to land faster, one clearing fees by a hair sends the floor.
    /// `fee_percentage` is the trade's total fee burden as a fraction of
    /// gross profit (0.10 == fees eat 10% of profit).
    pub async fn calculate_tip(&self, estimated_profit_lamports: u64, fee_percentage: f64) -> u64 {
        let percentile_99_floor = {
            let mut cache = self.tip_floor.lock().await;
            let refresh_interval = Duration::from_secs(crate::constants::JITO_TIP_REFRESH_MINUTES * 60);
            if cache.refreshed_at.elapsed() >= refresh_interval {
                cache.floor_lamports = self.fetch_tip_floor_percentile();
                cache.refreshed_at = Instant::now();
            }
            cache.floor_lamports
        };

        let multiplier = if fee_percentage >= 0.10 {
            crate::constants::JITO_TIP_SCALE_LOW_MARGIN
        } else if fee_percentage >= 0.05 {
            crate::constants::JITO_TIP_SCALE_MED_MARGIN
        } else {
            crate::constants::JITO_TIP_SCALE_HIGH_MARGIN
        };

        let scaled = (percentile_99_floor as f64 * multiplier) as u64;
        let profit_capped = scaled.min(estimated_profit_lamports / 4);
        profit_capped.clamp(self.tip_lamports_min, self.tip_lamports_max)
    }

    /// Submits a bundle of already-signed, base64-encoded transactions.
    /// Enforces Jito's recommended minimum spacing between submissions so
    /// one aggressive exit can't starve the relay's rate limit for others.
    pub async fn submit_bundle(&self, signed_transactions_b64: Vec<String>) -> Result<String, crate::errors::TradeError> {
        self.respect_rate_limit().await;

        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [signed_transactions_b64],
        });

        let url = format!("{}/api/v1/bundles", self.block_engine_url);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| crate::errors::TradeError::RpcError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, %body, "jito bundle submission rejected");
            return Err(crate::errors::TradeError::RpcError(format!("jito error {status}: {body}")));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| crate::errors::TradeError::RpcError(e.to_string()))?;
        let bundle_id = body
            .get("result")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        debug!(bundle_id, "jito bundle accepted");
        Ok(bundle_id)
    }

    async fn respect_rate_limit(&self) {
        let mut last = self.last_submit.lock().await;
        let min_interval = Duration::from_millis(crate::constants::JITO_RATE_LIMIT_MS);
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < min_interval {
                tokio::time::sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay() -> JitoBundleRelay {
        JitoBundleRelay::new(&ExitExecutorConfig::default())
    }

    #[tokio::test]
    async fn tip_scales_up_as_fee_margin_shrinks() {
        let relay = relay();
        let low_margin_tip = relay.calculate_tip(10_000_000, 0.15).await;
        let high_margin_tip = relay.calculate_tip(10_000_000, 0.01).await;
        assert!(high_margin_tip >= low_margin_tip);
    }

    #[tokio::test]
    async fn tip_never_exceeds_configured_max() {
        let relay = relay();
        let tip = relay.calculate_tip(1_000_000_000, 0.0).await;
        assert!(tip <= relay.tip_lamports_max);
    }

    #[tokio::test]
    async fn tip_never_drops_below_configured_min() {
        let relay = relay();
        let tip = relay.calculate_tip(1, 0.5).await;
        assert!(tip >= relay.tip_lamports_min);
    }
}
