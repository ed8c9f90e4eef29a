//! Time budgets for PostgreSQL round trips.
//!
//! `PgStore` sends every statement, `BEGIN` and `COMMIT` through [`within`]
//! so a stalled connection surfaces as [`StoreError::Timeout`] instead of
//! holding a tournament lock forever.

use super::errors::{StoreError, StoreResult};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Budget class of a store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Budget {
    /// One statement
    Query,
    /// Opening or committing a transaction
    Transaction,
    /// Committing a freshly inserted bracket
    Bracket,
}

impl Budget {
    pub const fn duration(self) -> Duration {
        match self {
            Budget::Query => Duration::from_secs(5),
            Budget::Transaction => Duration::from_secs(10),
            Budget::Bracket => Duration::from_secs(30),
        }
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Budget::Query => "query",
            Budget::Transaction => "transaction",
            Budget::Bracket => "bracket commit",
        };
        write!(f, "{} budget of {:?}", name, self.duration())
    }
}

/// Run a driver future under `budget`, mapping both failure modes to
/// `StoreError`
pub async fn within<F, T>(budget: Budget, future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    bounded(budget, budget.duration(), future).await
}

async fn bounded<F, T>(budget: Budget, limit: Duration, future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(StoreError::Timeout(budget)),
    }
}

/// [`within`] with the single-statement budget
pub async fn timed<F, T>(future: F) -> StoreResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    within(Budget::Query, future).await
}
