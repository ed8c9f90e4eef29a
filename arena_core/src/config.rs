//! Engine configuration management.
//!
//! Consolidates the environment variable reads the engine depends on and
//! provides validated configuration.

use crate::wallet::Amount;
use std::time::Duration;

/// Engine-wide settings shared by every component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Eligible participants needed to start when a tournament sets none
    pub min_participants: u32,
    /// How long a reported match may wait before it is auto-confirmed
    pub confirmation_window_secs: u64,
    /// How long after confirmation a match may still be disputed
    pub dispute_window_secs: u64,
    /// Rows handled per lifecycle pass
    pub max_tournaments_per_tick: i64,
    /// Time budget for one tournament step inside a tick
    pub tick_step_timeout_secs: u64,
    /// Currency for tournaments and wallets that name none
    pub default_currency: String,
    /// Withdrawals above this amount need approval
    pub withdrawal_approval_threshold: Amount,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_participants: 2,
            confirmation_window_secs: 24 * 60 * 60,
            dispute_window_secs: 48 * 60 * 60,
            max_tournaments_per_tick: 50,
            tick_step_timeout_secs: 30,
            default_currency: "USD".to_string(),
            withdrawal_approval_threshold: Amount::from_major(1_000),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - `ARENA_MIN_PARTICIPANTS` (default: 2)
    /// - `ARENA_CONFIRMATION_WINDOW_SECS` (default: 86400)
    /// - `ARENA_DISPUTE_WINDOW_SECS` (default: 172800)
    /// - `ARENA_MAX_TOURNAMENTS_PER_TICK` (default: 50)
    /// - `ARENA_TICK_STEP_TIMEOUT_SECS` (default: 30)
    /// - `ARENA_DEFAULT_CURRENCY` (default: USD)
    /// - `ARENA_WITHDRAWAL_APPROVAL_THRESHOLD` (default: 1000.00)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a value is out of range or the
    /// threshold is not a decimal amount
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let withdrawal_approval_threshold = match std::env::var("ARENA_WITHDRAWAL_APPROVAL_THRESHOLD")
        {
            Ok(raw) => raw.parse::<Amount>().map_err(|e| ConfigError::Invalid {
                var: "ARENA_WITHDRAWAL_APPROVAL_THRESHOLD".to_string(),
                reason: e.to_string(),
            })?,
            Err(_) => defaults.withdrawal_approval_threshold,
        };

        let config = Self {
            min_participants: parse_env_or("ARENA_MIN_PARTICIPANTS", defaults.min_participants),
            confirmation_window_secs: parse_env_or(
                "ARENA_CONFIRMATION_WINDOW_SECS",
                defaults.confirmation_window_secs,
            ),
            dispute_window_secs: parse_env_or(
                "ARENA_DISPUTE_WINDOW_SECS",
                defaults.dispute_window_secs,
            ),
            max_tournaments_per_tick: parse_env_or(
                "ARENA_MAX_TOURNAMENTS_PER_TICK",
                defaults.max_tournaments_per_tick,
            ),
            tick_step_timeout_secs: parse_env_or(
                "ARENA_TICK_STEP_TIMEOUT_SECS",
                defaults.tick_step_timeout_secs,
            ),
            default_currency: std::env::var("ARENA_DEFAULT_CURRENCY")
                .unwrap_or(defaults.default_currency),
            withdrawal_approval_threshold,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_participants < 2 {
            return Err(ConfigError::Invalid {
                var: "ARENA_MIN_PARTICIPANTS".to_string(),
                reason: "Must be at least 2".to_string(),
            });
        }

        if self.max_tournaments_per_tick <= 0 {
            return Err(ConfigError::Invalid {
                var: "ARENA_MAX_TOURNAMENTS_PER_TICK".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.tick_step_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "ARENA_TICK_STEP_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.default_currency.len() != 3 {
            return Err(ConfigError::Invalid {
                var: "ARENA_DEFAULT_CURRENCY".to_string(),
                reason: format!(
                    "Must be a three-letter code, got '{}'",
                    self.default_currency
                ),
            });
        }

        if self.withdrawal_approval_threshold.is_negative() {
            return Err(ConfigError::Invalid {
                var: "ARENA_WITHDRAWAL_APPROVAL_THRESHOLD".to_string(),
                reason: "Must not be negative".to_string(),
            });
        }

        Ok(())
    }

    pub fn confirmation_window(&self) -> chrono::Duration {
        seconds(self.confirmation_window_secs)
    }

    pub fn dispute_window(&self) -> chrono::Duration {
        seconds(self.dispute_window_secs)
    }

    pub fn tick_step_timeout(&self) -> Duration {
        Duration::from_secs(self.tick_step_timeout_secs)
    }
}

/// Out-of-range windows saturate instead of panicking
fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
pub fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
