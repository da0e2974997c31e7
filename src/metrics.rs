//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{Counter, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("threadline_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "threadline_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Content Metrics
    pub static ref THREADS_CREATED_TOTAL: IntCounter = IntCounter::new(
        "threadline_threads_created_total",
        "Total number of threads created"
    ).expect("metric can be created");
    pub static ref LIKES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("threadline_likes_total", "Total number of like requests"),
        &["target"]
    ).expect("metric can be created");
    pub static ref FOLLOWS_TOTAL: IntCounter = IntCounter::new(
        "threadline_follows_total",
        "Total number of follow requests"
    ).expect("metric can be created");

    // Storage Metrics
    pub static ref MEDIA_UPLOADS_TOTAL: IntCounter = IntCounter::new(
        "threadline_media_uploads_total",
        "Total number of media uploads"
    ).expect("metric can be created");
    pub static ref MEDIA_BYTES_UPLOADED: Counter = Counter::new(
        "threadline_media_bytes_uploaded_total",
        "Total bytes of media uploaded"
    ).expect("metric can be created");
    pub static ref BLOB_DELETE_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "threadline_blob_delete_failures_total",
        "Total number of blob deletions that failed and were skipped"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("threadline_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
///
/// Safe to call more than once; repeated registrations are ignored.
pub fn init_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(THREADS_CREATED_TOTAL.clone()),
        Box::new(LIKES_TOTAL.clone()),
        Box::new(FOLLOWS_TOTAL.clone()),
        Box::new(MEDIA_UPLOADS_TOTAL.clone()),
        Box::new(MEDIA_BYTES_UPLOADED.clone()),
        Box::new(BLOB_DELETE_FAILURES_TOTAL.clone()),
        Box::new(ERRORS_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(error) => tracing::error!(%error, "Failed to register metric"),
        }
    }

    tracing::info!("Metrics registry initialized");
}
