//! Metrics & Observability: one `prometheus::Registry`
//! shared by the whole process, with counters/gauges/histograms per
//! component registered at construction and handed out by reference.
//!
//! Grounded on `metrics_dashboard.rs` and `websocket_dashboard.rs`'s
//! `prometheus::{Counter, Gauge, Histogram, Registry}` usage and naming
//! conventions (`<component>_<noun>_total`, `_seconds`, `_ms`), stripped of
//! their WebSocket-push/Grafana-integration surface (HTTP health/metrics
//! endpoints are an external collaborator) down to
//! the registry + metric handles an injected service needs. Exposing the
//! registry over HTTP is the caller's job (e.g. via `prometheus::TextEncoder`
//! behind whatever health-endpoint framework the deployment already runs).

use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry};

/// Process-wide metrics, constructed once and injected into every
/// component that needs to observe itself (constructed once and handed
/// around -- no `lazy_static`/`OnceCell` globals here).
pub struct Metrics {
    pub registry: Registry,

    // C3 Stream Sources
    pub stream_messages_total: CounterVec,
    pub stream_reconnects_total: CounterVec,
    pub stream_latency_ms: HistogramVec,

    // C2 DEX Parsers
    pub parser_detections_total: CounterVec,
    pub parser_errors_total: CounterVec,

    // C4 Source Manager
    pub detections_scored_total: Counter,
    pub detections_duplicate_total: Counter,
    pub meteora_rejected_total: Counter,

    // C5 Event Bus
    pub bus_published_total: CounterVec,
    pub bus_deduped_total: CounterVec,

    // C6 Price Feed
    pub price_cache_hits_total: CounterVec,
    pub price_fetch_errors_total: Counter,
    pub price_circuit_state: Gauge,

    // C7 Trade Executor
    pub trades_total: CounterVec,
    pub trade_latency_seconds: Histogram,
    pub commission_usd_total: Counter,

    // C8 Position Monitor
    pub positions_open: Gauge,
    pub position_exits_total: CounterVec,

    // C9 Exit Executor
    pub exit_attempts_total: Counter,
    pub exit_circuit_open_total: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let stream_messages_total = register_counter_vec(
            &registry,
            "sniper_stream_messages_total",
            "messages received per source and message type",
            &["source", "message_type"],
        );
        let stream_reconnects_total = register_counter_vec(
            &registry,
            "sniper_stream_reconnects_total",
            "reconnect attempts per source",
            &["source"],
        );
        let stream_latency_ms = register_histogram_vec(
            &registry,
            "sniper_stream_latency_ms",
            "per-message latency observed by a stream source",
            &["source"],
            vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0],
        );

        let parser_detections_total = register_counter_vec(
            &registry,
            "sniper_parser_detections_total",
            "pool-init detections emitted per DEX",
            &["source"],
        );
        let parser_errors_total = register_counter_vec(
            &registry,
            "sniper_parser_errors_total",
            "parse failures per DEX",
            &["source"],
        );

        let detections_scored_total = register_counter(
            &registry,
            "sniper_detections_scored_total",
            "scored pool detections emitted by the source manager",
        );
        let detections_duplicate_total = register_counter(
            &registry,
            "sniper_detections_duplicate_total",
            "detections that were not the first within the duplicate window",
        );
        let meteora_rejected_total = register_counter(
            &registry,
            "sniper_meteora_rejected_total",
            "meteora detections dropped by the anti-sniper admission filter",
        );

        let bus_published_total = register_counter_vec(
            &registry,
            "sniper_bus_published_total",
            "envelopes published per channel",
            &["channel"],
        );
        let bus_deduped_total = register_counter_vec(
            &registry,
            "sniper_bus_deduped_total",
            "envelopes dropped as duplicates within the idempotency window",
            &["channel"],
        );

        let price_cache_hits_total = register_counter_vec(
            &registry,
            "sniper_price_cache_hits_total",
            "price lookups served per tier",
            &["tier"],
        );
        let price_fetch_errors_total = register_counter(
            &registry,
            "sniper_price_fetch_errors_total",
            "upstream price fetch failures (primary and fallback exhausted)",
        );
        let price_circuit_state = register_gauge(
            &registry,
            "sniper_price_circuit_state",
            "price feed circuit breaker state (0=closed, 1=half_open, 2=open)",
        );

        let trades_total = register_counter_vec(
            &registry,
            "sniper_trades_total",
            "trades executed per outcome",
            &["side", "outcome"],
        );
        let trade_latency_seconds = register_histogram(
            &registry,
            "sniper_trade_latency_seconds",
            "end-to-end trade executor latency",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
        );
        let commission_usd_total = register_counter(
            &registry,
            "sniper_commission_usd_total",
            "cumulative commission collected, in USD",
        );

        let positions_open = register_gauge(&registry, "sniper_positions_open", "currently open positions");
        let position_exits_total = register_counter_vec(
            &registry,
            "sniper_position_exits_total",
            "position exits per trigger reason",
            &["reason"],
        );

        let exit_attempts_total = register_counter(
            &registry,
            "sniper_exit_attempts_total",
            "exit executor attempts across all positions",
        );
        let exit_circuit_open_total = register_counter(
            &registry,
            "sniper_exit_circuit_open_total",
            "exits rejected because a user's circuit breaker was open",
        );

        Self {
            registry,
            stream_messages_total,
            stream_reconnects_total,
            stream_latency_ms,
            parser_detections_total,
            parser_errors_total,
            detections_scored_total,
            detections_duplicate_total,
            meteora_rejected_total,
            bus_published_total,
            bus_deduped_total,
            price_cache_hits_total,
            price_fetch_errors_total,
            price_circuit_state,
            trades_total,
            trade_latency_seconds,
            commission_usd_total,
            positions_open,
            position_exits_total,
            exit_attempts_total,
            exit_circuit_open_total,
        }
    }

    /// Render the registry in Prometheus text exposition format, for
    /// whatever HTTP health/metrics endpoint the deployment wires up.
    pub fn render(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).expect("prometheus text encoding cannot fail");
        String::from_utf8(buf).expect("prometheus encoder emits valid utf8")
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> Counter {
    let counter = Counter::with_opts(Opts::new(name, help)).expect("valid counter opts");
    registry.register(Box::new(counter.clone())).expect("metric name collision");
    counter
}

fn register_counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let counter = CounterVec::new(Opts::new(name, help), labels).expect("valid counter vec opts");
    registry.register(Box::new(counter.clone())).expect("metric name collision");
    counter
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> Gauge {
    let gauge = Gauge::with_opts(Opts::new(name, help)).expect("valid gauge opts");
    registry.register(Box::new(gauge.clone())).expect("metric name collision");
    gauge
}

#[allow(dead_code)]
fn register_gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let gauge = GaugeVec::new(Opts::new(name, help), labels).expect("valid gauge vec opts");
    registry.register(Box::new(gauge.clone())).expect("metric name collision");
    gauge
}

fn register_histogram(registry: &Registry, name: &str, help: &str, buckets: Vec<f64>) -> Histogram {
    let histogram = Histogram::with_opts(HistogramOpts::new(name, help).buckets(buckets)).expect("valid histogram opts");
    registry.register(Box::new(histogram.clone())).expect("metric name collision");
    histogram
}

fn register_histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str], buckets: Vec<f64>) -> HistogramVec {
    let histogram = HistogramVec::new(HistogramOpts::new(name, help).buckets(buckets), labels)
        .expect("valid histogram vec opts");
    registry.register(Box::new(histogram.clone())).expect("metric name collision");
    histogram
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_name_collisions() {
        let metrics = Metrics::new();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn counters_increment_and_render() {
        let metrics = Metrics::new();
        metrics.detections_scored_total.inc();
        metrics.trades_total.with_label_values(&["buy", "filled"]).inc();
        let rendered = metrics.render();
        assert!(rendered.contains("sniper_detections_scored_total"));
        assert!(rendered.contains("sniper_trades_total"));
    }
}
