use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Covers:
// - Message deliveries and how each attempt was classified
// - Redeliveries and messages that ran out of attempts
// - Dead-letter forwarding
// - Cache restore size
// - Read API requests
//
// Scraped via GET /metrics on the read API.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Ingestion
    pub ingest_attempts: IntCounterVec,
    pub ingest_duration: Histogram,
    pub deliveries: IntCounterVec,
    pub redeliveries: IntCounter,

    // Exhaustion
    pub dead_letters: IntCounterVec,

    // Cache
    pub cache_restored_orders: IntGauge,

    // Read API
    pub http_requests: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ingest_attempts = IntCounterVec::new(
            Opts::new("order_ingest_attempts_total", "Delivery attempts by ingest outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(ingest_attempts.clone()))?;

        let ingest_duration = Histogram::with_opts(
            HistogramOpts::new(
                "order_ingest_duration_seconds",
                "Time from receipt to terminal disposition, including redeliveries",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(ingest_duration.clone()))?;

        let deliveries = IntCounterVec::new(
            Opts::new("order_deliveries_total", "Messages by terminal disposition"),
            &["result"],
        )?;
        registry.register(Box::new(deliveries.clone()))?;

        let redeliveries = IntCounter::new(
            "order_redeliveries_total",
            "Redeliveries after a nack or an ack timeout",
        )?;
        registry.register(Box::new(redeliveries.clone()))?;

        let dead_letters = IntCounterVec::new(
            Opts::new("order_dead_letters_total", "Exhausted messages handed off"),
            &["result"],
        )?;
        registry.register(Box::new(dead_letters.clone()))?;

        let cache_restored_orders = IntGauge::new(
            "order_cache_restored_orders",
            "Orders loaded into the cache at startup",
        )?;
        registry.register(Box::new(cache_restored_orders.clone()))?;

        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "Read API requests"),
            &["route", "status"],
        )?;
        registry.register(Box::new(http_requests.clone()))?;

        Ok(Self {
            registry,
            ingest_attempts,
            ingest_duration,
            deliveries,
            redeliveries,
            dead_letters,
            cache_restored_orders,
            http_requests,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_attempt(&self, outcome: &str) {
        self.ingest_attempts.with_label_values(&[outcome]).inc();
    }

    /// `acked` is false when the message ran out of delivery attempts.
    pub fn record_delivery(&self, attempts: u32, acked: bool, duration_secs: f64) {
        let result = if acked { "acked" } else { "exhausted" };
        self.deliveries.with_label_values(&[result]).inc();
        self.redeliveries.inc_by(u64::from(attempts.saturating_sub(1)));
        self.ingest_duration.observe(duration_secs);
    }

    pub fn record_dead_letter(&self, result: &str) {
        self.dead_letters.with_label_values(&[result]).inc();
    }

    pub fn record_http(&self, route: &str, status: u16) {
        self.http_requests
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }
}
