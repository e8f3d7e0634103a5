//! Price Feed: tier-1 bounded LRU (<=1000 entries, 1s TTL) backed by a
//! tier-2 K/V cache (60s TTL), a circuit breaker guarding the upstream
//! fetch, a sliding-window rate limiter, jittered-exponential-backoff
//! retry, and a primary+fallback source pair.
//!
//! Grounded on `route_cache.rs` (cache-entry/TTL/stats shape, rebuilt here
//! on the `lru` crate for true LRU eviction instead of the teacher's manual
//! `min_by_key(last_accessed)` scan), `jupiter_rate_limiter.rs` (governor
//! quota + burst), and `error_recovery_manager.rs` (circuit breaker +
//! retry-policy defaults, `classify_error`-style soft/hard distinction).

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use lru::LruCache;
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::PriceFeedConfig;
use crate::errors::{KvError, PriceFeedError};
use crate::kv_store::{keys, KvStore};
use crate::metrics::Metrics;

#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch the current SOL price for `mint`. Errors are always soft
    /// (retried / failed over), never surfaced raw to callers.
    async fn fetch_price(&self, mint: &str) -> Result<f64, PriceFeedError>;
}

type Limiter = RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>;

struct CacheEntry {
    price_sol: f64,
    cached_at: Instant,
}

pub struct PriceFeed {
    config: PriceFeedConfig,
    primary: Arc<dyn PriceSource>,
    fallback: Arc<dyn PriceSource>,
    kv: Arc<dyn KvStore>,
    tier1: Mutex<LruCache<String, CacheEntry>>,
    breaker: CircuitBreaker,
    limiter: Limiter,
    metrics: Arc<Metrics>,
}

impl PriceFeed {
    pub fn new(
        config: PriceFeedConfig,
        primary: Arc<dyn PriceSource>,
        fallback: Arc<dyn PriceSource>,
        kv: Arc<dyn KvStore>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let capacity = std::num::NonZeroUsize::new(config.tier1_max_entries.max(1)).unwrap();
        let per_second = ((config.rate_limit_requests as f64) / (config.rate_limit_window_seconds.max(1) as f64))
            .ceil()
            .max(1.0) as u32;
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap())
            .allow_burst(NonZeroU32::new(config.rate_limit_requests.max(1)).unwrap());

        Self {
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            limiter: RateLimiter::direct(quota),
            tier1: Mutex::new(LruCache::new(capacity)),
            config,
            primary,
            fallback,
            kv,
            metrics,
        }
    }

    fn record_circuit_state(&self) {
        let value = match self.breaker.state() {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        };
        self.metrics.price_circuit_state.set(value);
    }

    pub async fn get_price(&self, mint: &str) -> Result<f64, PriceFeedError> {
        if let Some(price) = self.tier1_get(mint) {
            self.metrics.price_cache_hits_total.with_label_values(&["tier1"]).inc();
            return Ok(price);
        }
        if let Some(price) = self.tier2_get(mint).await {
            self.metrics.price_cache_hits_total.with_label_values(&["tier2"]).inc();
            self.tier1_put(mint, price);
            return Ok(price);
        }

        if !self.breaker.allow_request() {
            let reset_at_unix_ms = self
                .breaker
                .reset_at()
                .map(|instant| instant_to_unix_ms(instant))
                .unwrap_or(0);
            self.record_circuit_state();
            return Err(PriceFeedError::CircuitOpen { reset_at_unix_ms });
        }

        if self.limiter.check().is_err() {
            return Err(PriceFeedError::RateLimitExceeded);
        }

        let result = match self.fetch_with_retry(&self.primary, mint).await {
            Ok(price) => {
                self.breaker.record_success();
                self.write_through(mint, price).await;
                Ok(price)
            }
            Err(primary_err) => {
                warn!(mint, error = %primary_err, "primary price source exhausted, trying fallback");
                match self.fetch_with_retry(&self.fallback, mint).await {
                    Ok(price) => {
                        self.breaker.record_success();
                        self.write_through(mint, price).await;
                        Ok(price)
                    }
                    Err(fallback_err) => {
                        self.breaker.record_failure();
                        self.metrics.price_fetch_errors_total.inc();
                        Err(fallback_err)
                    }
                }
            }
        };
        self.record_circuit_state();
        result
    }

    /// Drop both cache tiers for `mint`, forcing the next `get_price` to
    /// refetch from upstream.
    pub async fn invalidate_cache(&self, mint: &str) {
        self.tier1.lock().pop(mint);
        let _ = self.kv.delete(&keys::price(mint)).await;
    }

    fn tier1_get(&self, mint: &str) -> Option<f64> {
        let mut tier1 = self.tier1.lock();
        let ttl = Duration::from_millis(self.config.tier1_ttl_ms);
        match tier1.get(mint) {
            Some(entry) if entry.cached_at.elapsed() < ttl => Some(entry.price_sol),
            Some(_) => {
                tier1.pop(mint);
                None
            }
            None => None,
        }
    }

    fn tier1_put(&self, mint: &str, price_sol: f64) {
        self.tier1.lock().put(
            mint.to_string(),
            CacheEntry {
                price_sol,
                cached_at: Instant::now(),
            },
        );
    }

    async fn tier2_get(&self, mint: &str) -> Option<f64> {
        match self.kv.get(&keys::price(mint)).await {
            Ok(Some(raw)) => raw.parse::<f64>().ok(),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "tier-2 price cache unavailable, falling through to upstream");
                None
            }
        }
    }

    async fn write_through(&self, mint: &str, price_sol: f64) {
        self.tier1_put(mint, price_sol);
        let ttl = Duration::from_secs(self.config.tier2_ttl_seconds);
        let _: Result<(), KvError> = self.kv.set_with_ttl(&keys::price(mint), price_sol.to_string(), ttl).await;
    }

    async fn fetch_with_retry(&self, source: &Arc<dyn PriceSource>, mint: &str) -> Result<f64, PriceFeedError> {
        let mut last_err = PriceFeedError::PriceFetchFailed {
            reason: "no attempts made".to_string(),
        };
        for attempt in 0..self.config.retry_attempts {
            match tokio::time::timeout(self.config.fetch_timeout(), source.fetch_price(mint)).await {
                Ok(Ok(price)) => return Ok(price),
                Ok(Err(e)) => last_err = e,
                Err(_) => {
                    last_err = PriceFeedError::PriceFetchFailed {
                        reason: "fetch timed out".to_string(),
                    }
                }
            }
            if attempt + 1 < self.config.retry_attempts {
                let delay = self.backoff_delay(attempt);
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_err)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay_ms as f64 * 2f64.powi(attempt as i32);
        let jitter_span = base * self.config.retry_jitter_factor;
        let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
        Duration::from_millis((base + jitter).max(0.0) as u64)
    }
}

fn instant_to_unix_ms(instant: Instant) -> i64 {
    let now_instant = Instant::now();
    let now_unix_ms = chrono::Utc::now().timestamp_millis();
    if instant >= now_instant {
        now_unix_ms + instant.duration_since(now_instant).as_millis() as i64
    } else {
        now_unix_ms - now_instant.duration_since(instant).as_millis() as i64
    }
}
