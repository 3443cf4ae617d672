use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec,
    IntGauge, Opts, Registry,
};

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Record ingestion (outcome counts, processing latency)
// - Query path cache effectiveness (hit / miss / not found / error)
// - Cache size
// - Broker session recovery
//
// All metrics are registered with one Registry and scraped via GET /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Ingestion
    pub records_ingested: IntCounterVec,
    pub record_processing_duration: HistogramVec,

    // Query path
    pub order_lookups: IntCounterVec,
    pub cache_entries: IntGauge,

    // Broker session
    pub broker_session_retries: IntCounter,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let records_ingested = IntCounterVec::new(
            Opts::new("orders_records_ingested_total", "Broker records handled, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(records_ingested.clone()))?;

        let record_processing_duration = HistogramVec::new(
            HistogramOpts::new(
                "orders_record_processing_duration_seconds",
                "Time from record receipt to acknowledgment or drop",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["outcome"],
        )?;
        registry.register(Box::new(record_processing_duration.clone()))?;

        let order_lookups = IntCounterVec::new(
            Opts::new("orders_lookups_total", "Order lookups by result"),
            &["result"],
        )?;
        registry.register(Box::new(order_lookups.clone()))?;

        let cache_entries = IntGauge::new("orders_cache_entries", "Orders held in the in-memory cache")?;
        registry.register(Box::new(cache_entries.clone()))?;

        let broker_session_retries = IntCounter::new(
            "orders_broker_session_retries_total",
            "Broker receive failures that were retried",
        )?;
        registry.register(Box::new(broker_session_retries.clone()))?;

        Ok(Self {
            registry,
            records_ingested,
            record_processing_duration,
            order_lookups,
            cache_entries,
            broker_session_retries,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_ingest(&self, outcome: &str, duration_secs: f64) {
        self.records_ingested.with_label_values(&[outcome]).inc();
        self.record_processing_duration
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    pub fn record_lookup(&self, result: &str) {
        self.order_lookups.with_label_values(&[result]).inc();
    }

    pub fn set_cache_entries(&self, entries: usize) {
        self.cache_entries.set(entries as i64);
    }

    pub fn record_session_retry(&self) {
        self.broker_session_retries.inc();
    }
}
