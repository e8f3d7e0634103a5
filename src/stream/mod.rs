//! Stream Sources: one `StreamSource` trait shared by the gRPC and
//! WebSocket transports, so `SourceManager` never special-cases which
//! transport a detection came from.
//!
//! Grounded on `realtime_price_monitor.rs`'s `run_price_monitoring`
//! (connect-with-timeout, then a long-lived subscribe loop) and
//! `mempool_monitor.rs`'s `tokio::select!`-driven orchestration, minus the
//! `eprintln!` debug trail both carry — this crate logs exclusively through
//! `tracing`, matching the rest of the codebase.

mod grpc;
mod websocket;

pub use grpc::GrpcSource;
pub use websocket::WebSocketSource;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use solana_sdk::transaction::VersionedTransaction;
use tokio::sync::mpsc;

use crate::config::SourceConfig;
use crate::errors::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Grpc,
    WebSocket,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Grpc => "grpc",
            SourceKind::WebSocket => "websocket",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    Connecting,
    Healthy,
    Failed,
}

/// One fully-formed transaction observation handed from a transport to
/// whatever is consuming the stream (normally the parser dispatcher). Block
/// messages that arrive "wrapped" are unwrapped by the transport before
/// reaching this point -- a parser should only ever see one transaction at
/// a time.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    pub transaction: VersionedTransaction,
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub observed_at: std::time::Instant,
}

/// Bounded ring buffer of recent per-message latency samples, capped at
/// 100 samples.
pub struct LatencyRingBuffer {
    capacity: usize,
    samples: RwLock<VecDeque<Duration>>,
}

impl LatencyRingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            samples: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, sample: Duration) {
        let mut samples = self.samples.write();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(sample);
    }

    pub fn average(&self) -> Option<Duration> {
        let samples = self.samples.read();
        if samples.is_empty() {
            return None;
        }
        let total: Duration = samples.iter().sum();
        Some(total / samples.len() as u32)
    }

    pub fn len(&self) -> usize {
        self.samples.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shared connection-health tracker: current state plus the latency ring
/// buffer, exposed so the source manager / metrics layer can poll it
/// without owning the transport.
pub struct SourceHealth {
    state: RwLock<ConnectionHealth>,
    latencies: LatencyRingBuffer,
}

impl SourceHealth {
    pub fn new(latency_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(ConnectionHealth::Connecting),
            latencies: LatencyRingBuffer::new(latency_capacity),
        })
    }

    pub fn mark_connecting(&self) {
        *self.state.write() = ConnectionHealth::Connecting;
    }

    pub fn mark_healthy(&self) {
        *self.state.write() = ConnectionHealth::Healthy;
    }

    pub fn mark_failed(&self) {
        *self.state.write() = ConnectionHealth::Failed;
    }

    pub fn state(&self) -> ConnectionHealth {
        *self.state.read()
    }

    pub fn record_latency(&self, sample: Duration) {
        self.latencies.push(sample);
    }

    pub fn average_latency(&self) -> Option<Duration> {
        self.latencies.average()
    }
}

/// Exponential backoff with a hard cap on attempts. `None` from
/// `next_delay` means attempts are exhausted.
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            base: Duration::from_millis(config.reconnect_base_delay_ms),
            max: Duration::from_millis(config.reconnect_max_delay_ms),
            max_attempts: config.reconnect_max_attempts,
            attempt: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.max_attempts {
            return None;
        }
        let multiplier = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(multiplier).min(self.max);
        self.attempt += 1;
        Some(delay)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[async_trait]
pub trait StreamSource: Send + Sync {
    fn kind(&self) -> SourceKind;
    fn health(&self) -> Arc<SourceHealth>;

    /// Runs the reconnect-and-stream loop until the sink is dropped or
    /// reconnect attempts are exhausted. Never returns `Ok(())` on its own —
    /// it only returns once the stream can no longer make progress.
    async fn run(self: Arc<Self>, sink: mpsc::Sender<StreamMessage>) -> Result<(), StreamError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_until_cap_then_exhausts() {
        let config = SourceConfig {
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 500,
            reconnect_max_attempts: 4,
            latency_sample_capacity: 10,
        };
        let mut backoff = Backoff::new(&config);
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(400)));
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(500))); // capped
        assert_eq!(backoff.next_delay(), None); // exhausted
    }

    #[test]
    fn backoff_reset_restarts_from_base() {
        let config = SourceConfig {
            reconnect_base_delay_ms: 50,
            reconnect_max_delay_ms: 1_000,
            reconnect_max_attempts: 2,
            latency_sample_capacity: 10,
        };
        let mut backoff = Backoff::new(&config);
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.next_delay(), None);
        backoff.reset();
        assert_eq!(backoff.next_delay(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn latency_ring_buffer_evicts_oldest_past_capacity() {
        let buf = LatencyRingBuffer::new(3);
        buf.push(Duration::from_millis(10));
        buf.push(Duration::from_millis(20));
        buf.push(Duration::from_millis(30));
        buf.push(Duration::from_millis(100));
        assert_eq!(buf.len(), 3);
        // average should reflect 20, 30, 100, not the evicted 10.
        assert_eq!(buf.average(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn source_health_transitions() {
        let health = SourceHealth::new(10);
        assert_eq!(health.state(), ConnectionHealth::Connecting);
        health.mark_healthy();
        assert_eq!(health.state(), ConnectionHealth::Healthy);
        health.mark_failed();
        assert_eq!(health.state(), ConnectionHealth::Failed);
    }
}
