use prometheus::{
    histogram_opts, opts, Encoder, Gauge, Histogram, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Prometheus metrics for a faucet session.
#[derive(Clone)]
pub struct SessionMetrics {
    registry: Registry,

    // Connection metrics
    pub connected: Gauge,
    pub connect_attempts_total: IntCounter,

    // Read metrics
    pub snapshot_fetches_total: IntCounter,
    pub poll_ticks_total: IntCounter,
    pub read_failures_total: IntCounter,

    // Mutation metrics
    pub mutations_submitted_total: IntCounterVec,
    pub mutations_succeeded_total: IntCounterVec,
    pub mutations_failed_total: IntCounterVec,
    pub busy_rejections_total: IntCounter,
    pub mutation_duration: Histogram,
}

impl SessionMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let connected = Gauge::with_opts(opts!(
            "spout_session_connected",
            "1 while the session holds a bound identity"
        ))?;
        let connect_attempts_total = IntCounter::with_opts(opts!(
            "spout_connect_attempts_total",
            "Connect intents received"
        ))?;

        let snapshot_fetches_total = IntCounter::with_opts(opts!(
            "spout_snapshot_fetches_total",
            "Full faucet snapshots fetched"
        ))?;
        let poll_ticks_total = IntCounter::with_opts(opts!(
            "spout_poll_ticks_total",
            "Background cooldown polls executed"
        ))?;
        let read_failures_total = IntCounter::with_opts(opts!(
            "spout_read_failures_total",
            "Snapshot or poll reads that failed"
        ))?;

        let mutations_submitted_total = IntCounterVec::new(
            opts!("spout_mutations_submitted_total", "Mutations dispatched to the ledger"),
            &["kind"],
        )?;
        let mutations_succeeded_total = IntCounterVec::new(
            opts!("spout_mutations_succeeded_total", "Mutations confirmed by the ledger"),
            &["kind"],
        )?;
        let mutations_failed_total = IntCounterVec::new(
            opts!("spout_mutations_failed_total", "Mutations rejected or reverted"),
            &["kind"],
        )?;
        let busy_rejections_total = IntCounter::with_opts(opts!(
            "spout_busy_rejections_total",
            "Mutations refused because another was in flight"
        ))?;
        let mutation_duration = Histogram::with_opts(histogram_opts!(
            "spout_mutation_duration_seconds",
            "Time from dispatch to confirmation",
            vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
        ))?;

        registry.register(Box::new(connected.clone()))?;
        registry.register(Box::new(connect_attempts_total.clone()))?;
        registry.register(Box::new(snapshot_fetches_total.clone()))?;
        registry.register(Box::new(poll_ticks_total.clone()))?;
        registry.register(Box::new(read_failures_total.clone()))?;
        registry.register(Box::new(mutations_submitted_total.clone()))?;
        registry.register(Box::new(mutations_succeeded_total.clone()))?;
        registry.register(Box::new(mutations_failed_total.clone()))?;
        registry.register(Box::new(busy_rejections_total.clone()))?;
        registry.register(Box::new(mutation_duration.clone()))?;

        Ok(Self {
            registry,
            connected,
            connect_attempts_total,
            snapshot_fetches_total,
            poll_ticks_total,
            read_failures_total,
            mutations_submitted_total,
            mutations_succeeded_total,
            mutations_failed_total,
            busy_rejections_total,
            mutation_duration,
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.set(if connected { 1.0 } else { 0.0 });
    }

    pub fn record_mutation(&self, kind: &str, elapsed: Duration, success: bool) {
        self.mutation_duration.observe(elapsed.as_secs_f64());
        if success {
            self.mutations_succeeded_total.with_label_values(&[kind]).inc();
        } else {
            self.mutations_failed_total.with_label_values(&[kind]).inc();
        }
    }

    /// Render all metrics in the Prometheus text format.
    pub fn gather(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
