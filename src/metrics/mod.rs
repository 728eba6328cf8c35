//! Prometheus metrics for the incident view synchronization engine.
//!
//! Metrics are recorded unconditionally; [`init_metrics`] only registers them
//! with [`PROMETHEUS_REGISTRY`] so that [`gather_metrics`] can export them.
//!
//! # Example
//! ```no_run
//! use incident_sync::metrics::{init_metrics, gather_metrics};
//!
//! init_metrics().expect("metrics registration");
//! println!("{}", gather_metrics());
//! ```

use lazy_static::lazy_static;
use prometheus::{CounterVec, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};

const NAMESPACE: &str = "incident_sync";

lazy_static! {
    /// Registry holding every engine metric
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Page fetch metrics
    // ============================================================================

    /// Page fetches by outcome
    ///
    /// Labels: outcome (applied, failed, stale)
    pub static ref PAGE_FETCHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("page_fetches_total", "Total number of incident page fetches")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create PAGE_FETCHES_TOTAL metric");

    /// Page fetch latency in seconds
    pub static ref PAGE_FETCH_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("page_fetch_duration_seconds", "Incident page fetch latency in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    ).expect("Failed to create PAGE_FETCH_DURATION_SECONDS metric");

    // ============================================================================
    // Realtime metrics
    // ============================================================================

    /// Realtime events by kind and admission decision
    ///
    /// Labels: kind (add, modify, remove), decision (applied, ignored, evicted)
    pub static ref REALTIME_EVENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("realtime_events_total", "Total number of realtime incident events")
            .namespace(NAMESPACE),
        &["kind", "decision"]
    ).expect("Failed to create REALTIME_EVENTS_TOTAL metric");

    /// Connection state transitions
    ///
    /// Labels: state
    pub static ref CONNECTION_TRANSITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("connection_transitions_total", "Realtime connection state transitions")
            .namespace(NAMESPACE),
        &["state"]
    ).expect("Failed to create CONNECTION_TRANSITIONS_TOTAL metric");

    // ============================================================================
    // Store metrics
    // ============================================================================

    /// Incidents currently held in stores
    pub static ref STORE_INCIDENTS: IntGauge = IntGauge::with_opts(
        Opts::new("store_incidents", "Number of incidents held in the view store")
            .namespace(NAMESPACE)
    ).expect("Failed to create STORE_INCIDENTS metric");

    /// Store fallbacks (add of existing, modify of missing, remove of missing)
    ///
    /// Labels: fallback
    pub static ref STORE_FALLBACKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("store_fallbacks_total", "Store operations redirected by fallback rules")
            .namespace(NAMESPACE),
        &["fallback"]
    ).expect("Failed to create STORE_FALLBACKS_TOTAL metric");

    /// Bulk loads rejected for duplicate keys
    pub static ref STORE_DUPLICATE_LOADS_TOTAL: IntCounter = IntCounter::with_opts(
        Opts::new("store_duplicate_loads_total", "Bulk loads rejected for duplicate primary keys")
            .namespace(NAMESPACE)
    ).expect("Failed to create STORE_DUPLICATE_LOADS_TOTAL metric");
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(PAGE_FETCHES_TOTAL.clone()),
        Box::new(PAGE_FETCH_DURATION_SECONDS.clone()),
        Box::new(REALTIME_EVENTS_TOTAL.clone()),
        Box::new(CONNECTION_TRANSITIONS_TOTAL.clone()),
        Box::new(STORE_INCIDENTS.clone()),
        Box::new(STORE_FALLBACKS_TOTAL.clone()),
        Box::new(STORE_DUPLICATE_LOADS_TOTAL.clone()),
    ];

    for collector in collectors {
        match PROMETHEUS_REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }

    tracing::debug!("Engine metrics registered");
    Ok(())
}

/// Export metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
