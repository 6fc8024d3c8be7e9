// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the transfersim control plane.
//!
//! Every metric name carries the `transfersim` prefix and is registered in
//! [`METRICS_REGISTRY`], which is exposed at `GET /metrics`.
//!
//! # Metrics Categories
//!
//! - **Operation Metrics** - Server create/delete/lifecycle/import outcomes and durations
//! - **Error Metrics** - Failures by error reason
//! - **Discovery Metrics** - Servers seen by the last scan and discovery document rebuilds
//!
//! # Example
//!
//! ```rust,no_run
//! use transfersim::metrics::record_operation;
//!
//! record_operation("create", "ftp", "success", std::time::Duration::from_millis(300));
//! ```

use crate::types::DiscoveredServer;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics
const METRICS_NAMESPACE: &str = "transfersim";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Operation Metrics
// ============================================================================

/// Total number of server operations
///
/// Labels:
/// - `operation`: `create`, `delete`, `start`, `stop`, `restart`, `import`, `export`
/// - `protocol`: Protocol of the target server, or `all`
/// - `status`: `success` or `error`
pub static OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_operations_total"),
        "Total number of server operations by operation, protocol and status",
    );
    let counter = CounterVec::new(opts, &["operation", "protocol", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of server operations in seconds
///
/// Labels:
/// - `operation`: Operation name
pub static OPERATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_operation_duration_seconds"),
        "Duration of server operations in seconds by operation",
    )
    .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 120.0]);
    let histogram = HistogramVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by type
///
/// Labels:
/// - `error_type`: Error reason (e.g. `ProtectionError`, `ConflictError`)
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by error type",
    );
    let counter = CounterVec::new(opts, &["error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Discovery Metrics
// ============================================================================

/// Servers seen by the most recent discovery scan
///
/// Labels:
/// - `protocol`: Server protocol
/// - `ownership`: `dynamic` or `static`
pub static DISCOVERED_SERVERS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_discovered_servers"),
        "Servers seen by the most recent discovery scan",
    );
    let gauge = GaugeVec::new(opts, &["protocol", "ownership"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total number of service discovery document rebuilds
///
/// Labels:
/// - `status`: `success`, `retried` or `error`
pub static DISCOVERY_DOCUMENT_REBUILDS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_discovery_document_rebuilds_total"),
        "Total number of service discovery document rebuilds by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a completed operation
///
/// # Arguments
/// * `operation` - Operation name (e.g. `create`)
/// * `protocol` - Protocol of the target server
/// * `status` - `success` or `error`
/// * `duration` - Wall time of the operation
pub fn record_operation(operation: &str, protocol: &str, status: &str, duration: Duration) {
    OPERATIONS_TOTAL
        .with_label_values(&[operation, protocol, status])
        .inc();
    OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

/// Record an error by its machine-readable reason
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Record the outcome of a discovery document rebuild
pub fn record_rebuild(status: &str) {
    DISCOVERY_DOCUMENT_REBUILDS_TOTAL
        .with_label_values(&[status])
        .inc();
}

/// Replace the discovered server gauges with the counts of one scan
pub fn record_discovered_servers(servers: &[DiscoveredServer]) {
    let mut counts: BTreeMap<(&str, &str), f64> = BTreeMap::new();
    for server in servers {
        let ownership = if server.is_dynamic {
            "dynamic"
        } else {
            "static"
        };
        *counts
            .entry((server.protocol.as_str(), ownership))
            .or_default() += 1.0;
    }
    DISCOVERED_SERVERS.reset();
    for ((protocol, ownership), count) in counts {
        DISCOVERED_SERVERS
            .with_label_values(&[protocol, ownership])
            .set(count);
    }
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
