//! WebSocket transport, grounded on `mempool_monitor.rs`'s
//! `tokio::select!`-driven orchestration (stream messages interleaved with
//! a periodic housekeeping tick) — restructured behind `StreamSource` so
//! the websocket and gRPC transports are interchangeable to everything
//! downstream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::config::SourceConfig;
use crate::metrics::Metrics;

use super::{Backoff, ConnectionHealth, SourceHealth, SourceKind, StreamMessage, StreamSource};
use crate::errors::StreamError;

/// Capability boundary around the websocket connection itself, so the
/// reconnect/backoff/health-tracking logic can be exercised without a live
/// RPC websocket. A deployment supplies the concrete connector (e.g. one
/// built on `tokio-tungstenite`); none ships in this crate.
#[async_trait]
pub trait WebSocketConnector: Send + Sync {
    async fn connect_and_stream(
        &self,
        url: &str,
        sink: &mpsc::Sender<StreamMessage>,
        health: &SourceHealth,
    ) -> Result<(), StreamError>;
}

pub struct WebSocketSource {
    url: String,
    connector: Arc<dyn WebSocketConnector>,
    config: SourceConfig,
    health: Arc<SourceHealth>,
    metrics: Arc<Metrics>,
}

impl WebSocketSource {
    pub fn new(url: String, connector: Arc<dyn WebSocketConnector>, config: SourceConfig, metrics: Arc<Metrics>) -> Self {
        let health = SourceHealth::new(config.latency_sample_capacity);
        Self {
            url,
            connector,
            config,
            health,
            metrics,
        }
    }
}

#[async_trait]
impl StreamSource for WebSocketSource {
    fn kind(&self) -> SourceKind {
        SourceKind::WebSocket
    }

    fn health(&self) -> Arc<SourceHealth> {
        self.health.clone()
    }

    async fn run(self: Arc<Self>, sink: mpsc::Sender<StreamMessage>) -> Result<(), StreamError> {
        let mut backoff = Backoff::new(&self.config);
        let source_label = self.kind().as_str();

        loop {
            self.health.mark_connecting();
            let start = Instant::now();

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
                self.connector.connect_and_stream(&self.url, &metered_tx, &self.health),
            )
            .await;
            drop(metered_tx);
            let _ = forward_task.await;

            match result {
                Ok(Ok(())) => {
                    debug!(elapsed = ?start.elapsed(), "websocket stream ended without error");
                    self.health.mark_failed();
                }
                Ok(Err(e)) => {
                    warn!(error = %e, elapsed = ?start.elapsed(), "websocket stream error, reconnecting");
                    self.health.mark_failed();
                }
                Err(_) => {
                    warn!("websocket connection attempt timed out after 30s");
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
                    error!("reconnect attempts exhausted for websocket source");
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

    struct AlwaysFailsConnector;

    #[async_trait]
    impl WebSocketConnector for AlwaysFailsConnector {
        async fn connect_and_stream(
            &self,
            _url: &str,
            _sink: &mpsc::Sender<StreamMessage>,
            _health: &SourceHealth,
        ) -> Result<(), StreamError> {
            Err(StreamError::StreamError("refused".to_string()))
        }
    }

    struct OneShotConnector;

    #[async_trait]
    impl WebSocketConnector for OneShotConnector {
        async fn connect_and_stream(
            &self,
            _url: &str,
            sink: &mpsc::Sender<StreamMessage>,
            health: &SourceHealth,
        ) -> Result<(), StreamError> {
            health.mark_healthy();
            health.record_latency(Duration::from_millis(12));
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
    async fn delivers_message_and_records_latency() {
        let config = SourceConfig {
            reconnect_base_delay_ms: 1,
            reconnect_max_delay_ms: 2,
            reconnect_max_attempts: 5,
            latency_sample_capacity: 10,
        };
        let source = Arc::new(WebSocketSource::new(
            "wss://example".to_string(),
            Arc::new(OneShotConnector),
            config,
            Arc::new(Metrics::new()),
        ));
        let (tx, mut rx) = mpsc::channel(4);
        let health = source.health();

        let handle = tokio::spawn(source.clone().run(tx));
        let msg = rx.recv().await;
        assert!(msg.is_some());
        assert!(health.average_latency().is_some());
        handle.abort();
    }

    #[tokio::test]
    async fn exhausts_backoff_when_connector_always_fails() {
        let config = SourceConfig {
            reconnect_base_delay_ms: 1,
            reconnect_max_delay_ms: 2,
            reconnect_max_attempts: 2,
            latency_sample_capacity: 10,
        };
        let source = Arc::new(WebSocketSource::new(
            "wss://example".to_string(),
            Arc::new(AlwaysFailsConnector),
            config,
            Arc::new(Metrics::new()),
        ));
        let (tx, _rx) = mpsc::channel(4);

        let result = source.run(tx).await;
        assert!(matches!(result, Err(StreamError::ReconnectExhausted)));
    }
}
