//! Prometheus Metrics
//!
//! Process-wide collectors under the `chat_relay` namespace, exposed at
//! `GET /metrics`.

use once_cell::sync::Lazy;
use prometheus::core::Collector;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

const NAMESPACE: &str = "chat_relay";

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(WEBSOCKET_CONNECTIONS_ACTIVE.clone()),
        Box::new(PIPELINE_EVENTS_TOTAL.clone()),
        Box::new(PIPELINE_STAGE_DURATION_SECONDS.clone()),
        Box::new(QUEUE_DISPOSITIONS_TOTAL.clone()),
        Box::new(QUEUE_REDELIVERIES_TOTAL.clone()),
        Box::new(MESSAGE_LOOKUP_ATTEMPTS_TOTAL.clone()),
        Box::new(DB_QUERY_DURATION_SECONDS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            tracing::error!(error = %e, "Failed to register metric");
        }
    }
    registry
});

fn counter(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help).namespace(NAMESPACE), labels)
        .expect("static counter definition")
}

fn histogram(name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    HistogramVec::new(
        HistogramOpts::new(name, help)
            .namespace(NAMESPACE)
            .buckets(LATENCY_BUCKETS.to_vec()),
        labels,
    )
    .expect("static histogram definition")
}

pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter(
        "http_requests_total",
        "HTTP requests by method, route and status",
        &["method", "path", "status"],
    )
});

pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    histogram(
        "http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path"],
    )
});

pub static WEBSOCKET_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("websocket_connections_active", "Open gateway connections").namespace(NAMESPACE),
    )
    .expect("static gauge definition")
});

/// Submission events by stage and outcome label
pub static PIPELINE_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter(
        "pipeline_events_total",
        "Submission events handled by pipeline stages",
        &["stage", "outcome"],
    )
});

pub static PIPELINE_STAGE_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    histogram(
        "pipeline_stage_duration_seconds",
        "Time to handle one submission event",
        &["stage"],
    )
});

pub static QUEUE_DISPOSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter(
        "queue_dispositions_total",
        "Queue deliveries acknowledged or returned",
        &["group", "disposition"],
    )
});

/// Deliveries seen more than once by a consumer group
pub static QUEUE_REDELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter(
        "queue_redeliveries_total",
        "Entries delivered again after a nack or ack timeout",
        &["group"],
    )
});

pub static MESSAGE_LOOKUP_ATTEMPTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    counter(
        "message_lookup_attempts_total",
        "Message store lookups by result",
        &["result"],
    )
});

pub static DB_QUERY_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    histogram(
        "db_query_duration_seconds",
        "Database query latency in seconds",
        &["operation", "table"],
    )
});

/// Encode every registered family in the Prometheus text format
pub fn gather_metrics() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

pub fn record_db_query(operation: &str, table: &str, duration_secs: f64) {
    DB_QUERY_DURATION_SECONDS
        .with_label_values(&[operation, table])
        .observe(duration_secs);
}

pub fn record_pipeline_event(stage: &str, outcome: &str) {
    PIPELINE_EVENTS_TOTAL.with_label_values(&[stage, outcome]).inc();
}

pub fn record_stage_duration(stage: &str, duration_secs: f64) {
    PIPELINE_STAGE_DURATION_SECONDS
        .with_label_values(&[stage])
        .observe(duration_secs);
}

pub fn record_queue_disposition(group: &str, disposition: &str) {
    QUEUE_DISPOSITIONS_TOTAL
        .with_label_values(&[group, disposition])
        .inc();
}

pub fn record_redelivery(group: &str) {
    QUEUE_REDELIVERIES_TOTAL.with_label_values(&[group]).inc();
}

pub fn record_lookup_attempt(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    MESSAGE_LOOKUP_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
}

pub fn set_websocket_connections(connected: usize) {
    WEBSOCKET_CONNECTIONS_ACTIVE.set(connected as i64);
}
