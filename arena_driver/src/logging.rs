//! Structured logging setup.
//!
//! The engine logs through the `log` facade; the subscriber installed here
//! picks those records up alongside the driver's own `tracing` events.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log a tick that took longer than expected
pub fn log_slow_tick(duration_ms: u64, budget_ms: u64) {
    if duration_ms > budget_ms {
        tracing::warn!(
            duration_ms = duration_ms,
            budget_ms = budget_ms,
            "PERFORMANCE: Slow lifecycle tick"
        );
    } else {
        tracing::debug!(duration_ms = duration_ms, "Lifecycle tick finished");
    }
}
