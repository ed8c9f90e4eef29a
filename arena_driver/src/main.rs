//! Lifecycle driver for the tournament engine.
//!
//! Connects to PostgreSQL, applies migrations and runs the engine's
//! lifecycle tick on a fixed interval until interrupted.

mod config;
mod logging;
mod metrics;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Error};
use arena_core::Engine;
use arena_core::db::Database;
use chrono::Utc;
use config::DriverConfig;
use pico_args::Arguments;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

const HELP: &str = "\
Run the tournament lifecycle driver

USAGE:
  arena_driver [OPTIONS]

OPTIONS:
  --db-url     URL         Database connection string  [default: env DATABASE_URL]
  --interval   SECS        Seconds between ticks       [default: env ARENA_TICK_INTERVAL_SECS or 30]

FLAGS:
  --once                   Run a single tick and exit
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string
  METRICS_BIND             Prometheus scrape address (e.g., 0.0.0.0:9090)
  ARENA_*                  Engine settings (windows, limits, currency)
  RUST_LOG                 Log filter [default: info,sqlx=warn]
  (See .env file for all configuration options)
";

struct Args {
    database_url: Option<String>,
    interval: Option<u64>,
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        once: pargs.contains("--once"),
        database_url: pargs.opt_value_from_str("--db-url")?,
        interval: pargs.opt_value_from_str("--interval")?,
    };

    logging::init();

    let config = DriverConfig::from_env(args.database_url, args.interval)
        .context("Invalid configuration")?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(Error::msg)?;
        info!("Prometheus metrics exported at http://{}/metrics", addr);
    }

    let db = Database::new(&config.database)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to apply migrations")?;
    info!("Database connected and migrated");

    let engine = Engine::with_store(Arc::new(db.store()), config.engine.clone());

    if args.once {
        run_tick(&engine, &db, &config).await;
        db.close().await;
        return Ok(());
    }

    info!(
        "Running lifecycle tick every {}s",
        config.tick_interval.as_secs()
    );
    let mut interval = tokio::time::interval(config.tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => run_tick(&engine, &db, &config).await,
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutting down lifecycle driver");
                break;
            }
        }
    }

    db.close().await;
    Ok(())
}

/// One tick, with its outcome logged and recorded
async fn run_tick(engine: &Engine, db: &Database, config: &DriverConfig) {
    let started = Instant::now();
    let report = engine.run_lifecycle_tick(Utc::now()).await;
    let elapsed = started.elapsed();

    metrics::record_tick(&report, elapsed);
    metrics::db_connections_active(db.pool().size());

    for failure in &report.failures {
        warn!(
            entity = %failure.entity,
            id = failure.id,
            error = %failure.error,
            "Lifecycle step failed"
        );
    }
    if !report.is_idle() {
        info!(
            started = report.started.len(),
            canceled = report.canceled.len(),
            completed = report.completed.len(),
            refunds_resumed = report.refunds_resumed.len(),
            auto_confirmed = report.auto_confirmed.len(),
            failures = report.failures.len(),
            "Lifecycle tick applied changes"
        );
    }

    logging::log_slow_tick(
        elapsed.as_millis() as u64,
        config.tick_interval.as_millis() as u64,
    );
}
