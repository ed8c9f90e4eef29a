//! Prometheus metrics for the lifecycle driver.
//!
//! Counters mirror the fields of a [`LifecycleReport`]; every tick also
//! records its duration and the pool size.

use arena_core::tournament::LifecycleReport;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// Tick Metrics
// ============================================================================

/// Record everything one tick did.
pub fn record_tick(report: &LifecycleReport, elapsed: Duration) {
    metrics::counter!("lifecycle_ticks_total").increment(1);
    metrics::histogram!("lifecycle_tick_duration_ms").record(elapsed.as_secs_f64() * 1_000.0);

    metrics::counter!("tournaments_started_total").increment(report.started.len() as u64);
    metrics::counter!("tournaments_canceled_total").increment(report.canceled.len() as u64);
    metrics::counter!("tournaments_completed_total").increment(report.completed.len() as u64);
    metrics::counter!("refunds_resumed_total").increment(report.refunds_resumed.len() as u64);
    metrics::counter!("matches_auto_confirmed_total").increment(report.auto_confirmed.len() as u64);

    for failure in &report.failures {
        metrics::counter!("lifecycle_failures_total",
            "entity" => failure.entity.to_string()
        )
        .increment(1);
    }
}

// ============================================================================
// Database Metrics
// ============================================================================

/// Set current database connection pool size.
pub fn db_connections_active(count: u32) {
    metrics::gauge!("db_connections_active").set(count as f64);
}
