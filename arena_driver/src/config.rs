//! Driver configuration management.
//!
//! Consolidates the database, engine and scheduling settings the driver
//! process needs, with CLI overrides applied on top of the environment.

use arena_core::config::{ConfigError, EngineConfig, parse_env_or};
use arena_core::db::DatabaseConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Complete driver configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Database configuration
    pub database: DatabaseConfig,
    /// Engine settings shared by every component
    pub engine: EngineConfig,
    /// Pause between lifecycle ticks
    pub tick_interval: Duration,
    /// Prometheus scrape endpoint; metrics stay in-process when unset
    pub metrics_bind: Option<SocketAddr>,
}

impl DriverConfig {
    /// Load configuration from environment variables
    ///
    /// Expected environment variables, beyond those read by
    /// [`DatabaseConfig::from_env`] and [`EngineConfig::from_env`]:
    /// - `ARENA_TICK_INTERVAL_SECS` (default: 30)
    /// - `METRICS_BIND` (optional, e.g. `0.0.0.0:9090`)
    ///
    /// # Arguments
    ///
    /// * `database_url_override` - Optional database URL (from CLI args)
    /// * `interval_override` - Optional tick interval in seconds (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        database_url_override: Option<String>,
        interval_override: Option<u64>,
    ) -> Result<Self, ConfigError> {
        let database = match database_url_override {
            Some(database_url) => DatabaseConfig {
                database_url,
                max_connections: parse_env_or("DB_MAX_CONNECTIONS", 20),
                min_connections: parse_env_or("DB_MIN_CONNECTIONS", 2),
                connection_timeout_secs: parse_env_or("DB_CONNECTION_TIMEOUT", 10),
                idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT", 600),
                max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME", 1800),
            },
            None => DatabaseConfig::from_env()?,
        };

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(raw) if !raw.trim().is_empty() => {
                Some(raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{raw}' is not an IP:PORT address"),
                })?)
            }
            _ => None,
        };

        let interval_secs =
            interval_override.unwrap_or_else(|| parse_env_or("ARENA_TICK_INTERVAL_SECS", 30));

        let config = DriverConfig {
            database,
            engine: EngineConfig::from_env()?,
            tick_interval: Duration::from_secs(interval_secs),
            metrics_bind,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "ARENA_TICK_INTERVAL_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        // A tick that outlives the interval would just queue the next one
        if self.tick_interval < self.engine.tick_step_timeout() {
            return Err(ConfigError::Invalid {
                var: "ARENA_TICK_INTERVAL_SECS".to_string(),
                reason: format!(
                    "Must be at least the step timeout ({}s)",
                    self.engine.tick_step_timeout_secs
                ),
            });
        }

        self.database.validate()?;
        self.engine.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(interval_secs: u64) -> DriverConfig {
        DriverConfig {
            database: DatabaseConfig::development(),
            engine: EngineConfig::default(),
            tick_interval: Duration::from_secs(interval_secs),
            metrics_bind: None,
        }
    }

    #[test]
    fn test_default_interval_is_valid() {
        assert!(config(30).validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = config(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert!(err.to_string().contains("ARENA_TICK_INTERVAL_SECS"));
    }

    #[test]
    fn test_interval_shorter_than_step_timeout_rejected() {
        let err = config(5).validate().unwrap_err();
        assert!(err.to_string().contains("step timeout"));
    }

    #[test]
    fn test_invalid_pool_rejected() {
        let mut config = config(60);
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
