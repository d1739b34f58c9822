// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the auto-trigger controller.
//!
//! Every metric name carries the `autotrigger_` prefix.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Outcome and duration of every reconcile, per resource type
//! - **Trigger Lifecycle Metrics** - Triggers created and deleted, and cleanup failures
//! - **Controller Metrics** - Number of running per-type loops
//!
//! # Example
//!
//! ```rust,no_run
//! use autotrigger::metrics::{record_reconciliation, STATUS_SYNCED};
//!
//! record_reconciliation("widgets.example.io/v1", STATUS_SYNCED, std::time::Duration::from_millis(20));
//! ```

use crate::constants::{METRICS_SERVER_BIND_ADDRESS, METRICS_SERVER_PATH};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "autotrigger";

/// Reconcile changed or verified the trigger set
pub const STATUS_SYNCED: &str = "synced";

/// Reconcile synced but at least one stale trigger could not be deleted
pub const STATUS_DEGRADED: &str = "degraded";

/// Reconcile returned early without touching triggers
pub const STATUS_SKIPPED: &str = "skipped";

/// Reconcile failed
pub const STATUS_ERROR: &str = "error";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via the `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by resource and status
///
/// Labels:
/// - `resource`: Watched resource (e.g., `widgets.example.io/v1`, `CustomResourceDefinition`)
/// - `status`: Outcome (`synced`, `degraded`, `skipped`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by resource and status",
    );
    let counter = CounterVec::new(opts, &["resource", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `resource`: Watched resource
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["resource"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Trigger Lifecycle Metrics
// ============================================================================

/// Total number of triggers created
///
/// Labels:
/// - `resource`: Parent resource the triggers subscribe
pub static TRIGGERS_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_triggers_created_total"),
        "Total number of triggers created by parent resource",
    );
    let counter = CounterVec::new(opts, &["resource"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of stale triggers deleted
///
/// Labels:
/// - `resource`: Parent resource the triggers subscribed
pub static TRIGGERS_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_triggers_deleted_total"),
        "Total number of stale triggers deleted by parent resource",
    );
    let counter = CounterVec::new(opts, &["resource"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Total number of stale trigger deletions that failed
///
/// These are not retried until the parent changes again.
///
/// Labels:
/// - `resource`: Parent resource the triggers subscribed
pub static CLEANUP_FAILURES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_cleanup_failures_total"),
        "Total number of stale trigger deletions that failed by parent resource",
    );
    let counter = CounterVec::new(opts, &["resource"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Controller Metrics
// ============================================================================

/// Number of per-type reconciliation loops currently running
pub static RUNNING_LOOPS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_running_loops"),
        "Number of per-type reconciliation loops currently running",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record the outcome of one reconciliation
///
/// # Arguments
/// * `resource` - The watched resource
/// * `status` - One of the `STATUS_*` constants
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation(resource: &str, status: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource, status])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource])
        .observe(duration.as_secs_f64());
}

/// Record a trigger creation
pub fn record_trigger_created(resource: &str) {
    TRIGGERS_CREATED_TOTAL.with_label_values(&[resource]).inc();
}

/// Record a stale trigger deletion
pub fn record_trigger_deleted(resource: &str) {
    TRIGGERS_DELETED_TOTAL.with_label_values(&[resource]).inc();
}

/// Record a failed stale trigger deletion
pub fn record_cleanup_failure(resource: &str) {
    CLEANUP_FAILURES_TOTAL.with_label_values(&[resource]).inc();
}

/// Publish the number of running per-type loops
#[allow(clippy::cast_precision_loss)]
pub fn set_running_loops(count: usize) {
    RUNNING_LOOPS.set(count as f64);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

// ============================================================================
// HTTP Endpoint
// ============================================================================

async fn metrics_handler() -> (StatusCode, String) {
    match gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Router serving the Prometheus text format at `/metrics`.
pub fn metrics_router() -> Router {
    Router::new().route(METRICS_SERVER_PATH, get(metrics_handler))
}

/// Serve `/metrics` on `port` until `token` is cancelled.
///
/// # Errors
/// Returns error if the port cannot be bound or the server fails.
pub async fn serve_metrics(port: u16, token: CancellationToken) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((METRICS_SERVER_BIND_ADDRESS, port)).await?;
    info!(port = port, path = METRICS_SERVER_PATH, "Serving metrics");
    axum::serve(listener, metrics_router())
        .with_graceful_shutdown(token.cancelled_owned())
        .await
}
