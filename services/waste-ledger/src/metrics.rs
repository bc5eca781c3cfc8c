use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use lazy_static::lazy_static;

lazy_static! {
    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"]
    ).expect("metric can be created");

    pub static ref HTTP_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request duration in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("metric can be created");

    // Identity metrics
    pub static ref REGISTRATIONS: IntCounter = IntCounter::new(
        "collector_registrations_total",
        "Total collector registrations"
    ).expect("metric can be created");

    pub static ref LOGINS: IntCounterVec = IntCounterVec::new(
        Opts::new("logins_total", "Login attempts by outcome"),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref AUTH_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("auth_failures_total", "Rejected bearer tokens by reason"),
        &["reason"]
    ).expect("metric can be created");

    // Ledger metrics
    pub static ref COLLECTIONS_RECORDED: IntCounter = IntCounter::new(
        "collections_recorded_total",
        "Total collections recorded"
    ).expect("metric can be created");

    pub static ref COLLECTION_WEIGHT_KG: Histogram = Histogram::with_opts(
        HistogramOpts::new("collection_weight_kg", "Distribution of collected weights")
            .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 50.0, 100.0, 500.0])
    ).expect("metric can be created");

    pub static ref WITHDRAWALS: IntCounterVec = IntCounterVec::new(
        Opts::new("withdrawals_total", "Withdrawal attempts by outcome"),
        &["outcome"]
    ).expect("metric can be created");

    pub static ref CITIZEN_SEARCHES: IntCounter = IntCounter::new(
        "citizen_searches_total",
        "Total citizen catalog searches with a query"
    ).expect("metric can be created");

    pub static ref LEDGER_DISCREPANCIES: IntGauge = IntGauge::new(
        "ledger_discrepancies",
        "Identities whose stored totals disagree with their history at the last audit"
    ).expect("metric can be created");
}

/// Register all metrics with the given registry
pub fn register_metrics(registry: &Registry) -> Result<(), Box<dyn std::error::Error>> {
    // HTTP metrics
    registry.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    registry.register(Box::new(HTTP_REQUEST_DURATION.clone()))?;

    // Identity metrics
    registry.register(Box::new(REGISTRATIONS.clone()))?;
    registry.register(Box::new(LOGINS.clone()))?;
    registry.register(Box::new(AUTH_FAILURES.clone()))?;

    // Ledger metrics
    registry.register(Box::new(COLLECTIONS_RECORDED.clone()))?;
    registry.register(Box::new(COLLECTION_WEIGHT_KG.clone()))?;
    registry.register(Box::new(WITHDRAWALS.clone()))?;
    registry.register(Box::new(CITIZEN_SEARCHES.clone()))?;
    registry.register(Box::new(LEDGER_DISCREPANCIES.clone()))?;

    Ok(())
}

/// Generate metrics output in Prometheus text format
pub fn metrics_handler() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
