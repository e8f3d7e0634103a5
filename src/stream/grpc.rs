//! gRPC/ShredStream transport, grounded on `realtime_price_monitor.rs`'s
//! `run_price_monitoring` (connect-with-timeout, then a long subscribe
//! loop) — restructured behind the `StreamSource` trait and with the
//! `eprintln!` debug trail replaced by `tracing`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::SourceConfig;
use crate::metrics::Metrics;

use super::{Backoff, ConnectionHealth, SourceHealth, SourceKind, StreamMessage, StreamSource};
use crate::errors::StreamError;

/// Capability boundary around the actual gRPC client so `GrpcSource`'s
/// reconnect/backoff/health-tracking logic can be tested without a live
/// ShredStream endpoint. A deployment supplies the concrete connector
/// (e.g. one built on `solana-stream-sdk`'s client); none ships in this
/// crate.
#[async_trait]
pub trait GrpcConnector: Send + Sync {
    /// Connect and stream transactions into `sink` until the connection
    /// drops or an unrecoverable error occurs. Each yielded message should
    /// have already had its latency recorded via `health.record_latency`.
    async fn connect_and_stream(
        &self,
        endpoint: &str,
        sink: &mpsc::Sender<StreamMessage>,
        health: &SourceHealth,
    ) -> Result<(), StreamError>;
}

pub struct GrpcSource {
    endpoint: String,
    connector: Arc<dyn GrpcConnector>,
    config: SourceConfig,
    health: Arc<SourceHealth>,
    metrics: Arc<Metrics>,
}

impl GrpcSource {
    pub fn new(endpoint: String, connector: Arc<dyn GrpcConnector>, config: SourceConfig, metrics: Arc<Metrics>) -> Self {
        let health = SourceHealth::new(config.latency_sample_capacity);
        Self {
            endpoint,
            connector,
            config,
            health,
            metrics,
        }
    }
}

#[async_trait]
impl StreamSource for GrpcSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Grpc
    }

    fn health(&self) -> Arc<SourceHealth> {
        self.health.clone()
    }

    async fn run(self: Arc<Self>, sink: mpsc::Sender<StreamMessage>) -> Result<(), StreamError> {
        let mut backoff = Backoff::new(&self.config);
        let source_label = self.kind().as_str();

        loop {
            self.health.mark_connecting();
            info!(endpoint = %self.endpoint, "connecting to shredstream endpoint");
            let start = Instant::now();

            // Route through an internal channel so every message crossing this
            // source is counted and latency-sampled before it reaches the caller.
            let (metered_tx, mut metered_rx) = mpsc::channel::<StreamMessage>(256);
            let metrics = self.metrics.clone();
            let forward_sink = sink.clone();
            let forward_label = source_label;
            let forward_task = tokio::spawn(async move {
                while let Some(message) = metered_rx.recv().await {
                    metrics
                        .stream_messages_total
                        .with_label_values(&[forward_label, "pool_init"])
                        .inc();
                    metrics
                        .stream_latency_ms
                        .with_label_values(&[forward_label])
                        .observe(message.observed_at.elapsed().as_secs_f64() * 1000.0);
                    if forward_sink.send(message).await.is_err() {
                        break;
                    }
                }
            });

            let result = tokio::time::timeout(
                Duration::from_secs(30),
                self.connector.connect_and_stream(&self.endpoint, &metered_tx, &self.health),
            )
            .await;
            drop(metered_tx);
            let _ = forward_task.await;

            match result {
                Ok(Ok(())) => {
                    // Sink closed gracefully (consumer dropped); nothing left to do.
                    debug!(elapsed = ?start.elapsed(), "grpc stream ended without error");
                    self.health.mark_failed();
                }
                Ok(Err(e)) => {
                    warn!(error = %e, elapsed = ?start.elapsed(), "grpc stream error, reconnecting");
                    self.health.mark_failed();
                }
                Err(_) => {
                    warn!("grpc connection attempt timed out after 30s");
                    self.health.mark_failed();
                }
            }

            if self.health.state() == ConnectionHealth::Healthy {
                backoff.reset();
            }

            match backoff.next_delay() {
                Some(delay) => {
                    self.metrics.stream_reconnects_total.with_label_values(&[source_label]).inc();
                    debug!(attempt = backoff.attempt(), delay_ms = delay.as_millis() as u64, "backing off before reconnect");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!("reconnect attempts exhausted for grpc source");
                    return Err(StreamError::ReconnectExhausted);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;
    use solana_sdk::message::{Message, MessageHeader, VersionedMessage};
    use solana_sdk::signature::Signature;
    use solana_sdk::transaction::VersionedTransaction;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dummy_transaction() -> VersionedTransaction {
        VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(Message {
                header: MessageHeader::default(),
                account_keys: vec![],
                recent_blockhash: Hash::default(),
                instructions: vec![],
            }),
        }
    }

    struct FlakyConnector {
        fail_first_n: AtomicUsize,
    }

    #[async_trait]
    impl GrpcConnector for FlakyConnector {
        async fn connect_and_stream(
            &self,
            _endpoint: &str,
            sink: &mpsc::Sender<StreamMessage>,
            health: &SourceHealth,
        ) -> Result<(), StreamError> {
            if self.fail_first_n.load(Ordering::SeqCst) > 0 {
                self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
                return Err(StreamError::StreamError("simulated drop".to_string()));
            }
            health.mark_healthy();
            let _ = sink
                .send(StreamMessage {
                    transaction: dummy_transaction(),
                    signature: "sig".to_string(),
                    slot: 1,
                    block_time: None,
                    observed_at: Instant::now(),
                })
                .await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn reconnects_after_transient_failures_then_delivers() {
        let connector = Arc::new(FlakyConnector {
            fail_first_n: AtomicUsize::new(2),
        });
        let config = SourceConfig {
            reconnect_base_delay_ms: 1,
            reconnect_max_delay_ms: 5,
            reconnect_max_attempts: 5,
            latency_sample_capacity: 10,
        };
        let source = Arc::new(GrpcSource::new("endpoint".to_string(), connector, config, Arc::new(Metrics::new())));
        let (tx, mut rx) = mpsc::channel(4);

        let handle = tokio::spawn(source.clone().run(tx));
        let msg = rx.recv().await;
        assert!(msg.is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn exhausts_reconnect_attempts_and_returns_error() {
        let connector = Arc::new(FlakyConnector {
            fail_first_n: AtomicUsize::new(100),
        });
        let config = SourceConfig {
            reconnect_base_delay_ms: 1,
            reconnect_max_delay_ms: 2,
            reconnect_max_attempts: 3,
            latency_sample_capacity: 10,
        };
        let source = Arc::new(GrpcSource::new("endpoint".to_string(), connector, config, Arc::new(Metrics::new())));
        let (tx, _rx) = mpsc::channel(4);

        let result = source.run(tx).await;
        assert!(matches!(result, Err(StreamError::ReconnectExhausted)));
    }
}
