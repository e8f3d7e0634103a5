//! Event Bus: two named channels (`pool:detection:raw`,
//! `pool:detection:scored`), a 1-second idempotency window keyed on
//! signature, in-process `broadcast` fan-out, and a K/V-store-backed
//! cross-process publish surface.
//!
//! Grounded on the `mpsc`/`broadcast` channel idioms used throughout
//! `bot_coordinator.rs` and `mempool_monitor.rs`. The cross-process
//! subscriber uses `KvStore::subscribe`'s dedicated connection so a
//! long-lived subscribe loop can't starve ordinary request/response K/V
//! traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::EventBusConfig;
use crate::constants::{POOL_DETECTION_RAW_CHANNEL, POOL_DETECTION_SCORED_CHANNEL};
use crate::errors::KvError;
use crate::kv_store::{keys, KvStore};
use crate::metrics::Metrics;
use crate::parsers::RawPoolDetection;
use crate::source_manager::ScoredPoolDetection;

const LOCAL_FANOUT_CAPACITY: usize = 1_024;

pub struct EventBus {
    config: EventBusConfig,
    kv: Arc<dyn KvStore>,
    metrics: Arc<Metrics>,
    raw_local: broadcast::Sender<RawPoolDetection>,
    scored_local: broadcast::Sender<ScoredPoolDetection>,
}

impl EventBus {
    pub fn new(config: EventBusConfig, kv: Arc<dyn KvStore>, metrics: Arc<Metrics>) -> Arc<Self> {
        Arc::new(Self {
            config,
            kv,
            metrics,
            raw_local: broadcast::channel(LOCAL_FANOUT_CAPACITY).0,
            scored_local: broadcast::channel(LOCAL_FANOUT_CAPACITY).0,
        })
    }

    fn idempotency_window(&self) -> Duration {
        Duration::from_millis(self.config.idempotency_window_ms)
    }

    /// Returns `Ok(true)` if this signature was newly published, `Ok(false)`
    /// if it was dropped as a duplicate already seen within the
    /// idempotency window.
    async fn publish<T: serde::Serialize + Clone>(
        &self,
        signature: &str,
        channel: &str,
        local: &broadcast::Sender<T>,
        value: T,
    ) -> Result<bool, KvError> {
        let dedupe_key = keys::pool_detection(signature);
        if self.kv.get(&dedupe_key).await?.is_some() {
            self.metrics.bus_deduped_total.with_label_values(&[channel]).inc();
            return Ok(false);
        }
        self.kv
            .set_with_ttl(&dedupe_key, "1".to_string(), self.idempotency_window())
            .await?;

        if let Ok(payload) = serde_json::to_string(&value) {
            self.kv.publish(channel, payload).await?;
        }
        let _ = local.send(value);
        self.metrics.bus_published_total.with_label_values(&[channel]).inc();
        Ok(true)
    }

    pub async fn publish_raw(&self, detection: RawPoolDetection) -> Result<bool, KvError> {
        let signature = detection.signature.clone();
        self.publish(&signature, POOL_DETECTION_RAW_CHANNEL, &self.raw_local, detection)
            .await
    }

    pub async fn publish_scored(&self, detection: ScoredPoolDetection) -> Result<bool, KvError> {
        let signature = detection.raw.signature.clone();
        self.publish(&signature, POOL_DETECTION_SCORED_CHANNEL, &self.scored_local, detection)
            .await
    }

    pub fn subscribe_raw(&self) -> broadcast::Receiver<RawPoolDetection> {
        self.raw_local.subscribe()
    }

    pub fn subscribe_scored(&self) -> broadcast::Receiver<ScoredPoolDetection> {
        self.scored_local.subscribe()
    }

    /// Cross-process subscription: payloads arrive JSON-encoded over the
    /// K/V store's dedicated pub/sub connection.
    pub async fn subscribe_raw_remote(&self) -> Result<broadcast::Receiver<String>, KvError> {
        self.kv.subscribe(POOL_DETECTION_RAW_CHANNEL).await
    }

    pub async fn subscribe_scored_remote(&self) -> Result<broadcast::Receiver<String>, KvError> {
        self.kv.subscribe(POOL_DETECTION_SCORED_CHANNEL).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::InMemoryKvStore;
    use crate::parsers::{PoolSource, QuoteKind};

    fn detection(signature: &str) -> RawPoolDetection {
        RawPoolDetection {
            pool_address: "pool".to_string(),
            token_mint_a: "mint".to_string(),
            token_mint_b: crate::constants::SOL_MINT.to_string(),
            source: PoolSource::RaydiumV4,
            signature: signature.to_string(),
            slot: 1,
            block_time: None,
            quote_kind: QuoteKind::Sol,
            creator: None,
            meteora_anti_sniper: None,
        }
    }

    #[tokio::test]
    async fn publishes_once_and_dedupes_duplicates() {
        let bus = EventBus::new(EventBusConfig::default(), InMemoryKvStore::new(), Arc::new(Metrics::new()));
        let mut rx = bus.subscribe_raw();

        assert!(bus.publish_raw(detection("sig-1")).await.unwrap());
        assert!(!bus.publish_raw(detection("sig-1")).await.unwrap());

        let received = rx.recv().await.unwrap();
        assert_eq!(received.signature, "sig-1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn distinct_signatures_both_publish() {
        let bus = EventBus::new(EventBusConfig::default(), InMemoryKvStore::new(), Arc::new(Metrics::new()));
        assert!(bus.publish_raw(detection("sig-a")).await.unwrap());
        assert!(bus.publish_raw(detection("sig-b")).await.unwrap());
    }

    #[tokio::test]
    async fn remote_subscribers_receive_json_payload() {
        let bus = EventBus::new(EventBusConfig::default(), InMemoryKvStore::new(), Arc::new(Metrics::new()));
        let mut remote = bus.subscribe_raw_remote().await.unwrap();
        bus.publish_raw(detection("sig-remote")).await.unwrap();
        let payload = remote.recv().await.unwrap();
        assert!(payload.contains("sig-remote"));
    }
}
