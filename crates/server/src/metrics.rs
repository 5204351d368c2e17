//! Prometheus metrics for the Depot server.
//!
//! Exposes counters for uploads and retrievals, their latency, and errors by
//! code. Metrics carry no file names, ids or addresses.
//!
//! The `/metrics` endpoint is unauthenticated; restrict it to the Prometheus
//! scraper at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Upload metrics
pub static FILES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_files_uploaded_total",
        "Total number of files stored and indexed",
    )
    .expect("metric creation failed")
});

pub static BYTES_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_bytes_uploaded_total",
        "Total bytes of indexed uploads",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_CONFLICTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_upload_conflicts_total",
        "Total uploads rejected because identical content was already indexed",
    )
    .expect("metric creation failed")
});

pub static UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "depot_upload_duration_seconds",
            "Time taken to store and index an upload",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("metric creation failed")
});

// Retrieval metrics
pub static RETRIEVALS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_retrievals_total",
            "Total retrievals by outcome (ok, not_found, failed, cancelled)",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static CHUNK_FETCH_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_chunk_fetch_failures_total",
        "Total chunk fetches that failed after all attempts",
    )
    .expect("metric creation failed")
});

pub static BYTES_RETRIEVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "depot_bytes_retrieved_total",
        "Total bytes returned by retrievals",
    )
    .expect("metric creation failed")
});

pub static RETRIEVAL_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "depot_retrieval_duration_seconds",
            "Time taken to reassemble a file from the content store",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("metric creation failed")
});

pub static RETRIEVALS_IN_FLIGHT: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "depot_retrievals_in_flight",
        "Current number of running retrievals",
    )
    .expect("metric creation failed")
});

// Error metrics
pub static REQUEST_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_request_errors_total",
            "Total error responses by error code",
        ),
        &["code"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once; only the first call registers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(FILES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_CONFLICTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RETRIEVALS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNK_FETCH_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_RETRIEVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RETRIEVAL_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(RETRIEVALS_IN_FLIGHT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REQUEST_ERRORS.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Count an error response by its code.
pub fn record_request_error(code: &str) {
    REQUEST_ERRORS.with_label_values(&[code]).inc();
}

/// Count a finished retrieval by outcome.
pub fn record_retrieval(outcome: &str) {
    RETRIEVALS.with_label_values(&[outcome]).inc();
}

/// Tracks one running retrieval in [`RETRIEVALS_IN_FLIGHT`] until dropped.
pub struct RetrievalGauge;

impl RetrievalGauge {
    pub fn start() -> Self {
        RETRIEVALS_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for RetrievalGauge {
    fn drop(&mut self) {
        RETRIEVALS_IN_FLIGHT.dec();
    }
}
