//! Persistence error types.

use super::timeouts::Budget;
use crate::error::{Entity, ErrorKind};
use crate::wallet::{Amount, WalletId};
use thiserror::Error;

/// Errors raised by repository adapters
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Query or transaction exceeded its time budget
    #[error("Database call exceeded its {0}")]
    Timeout(Budget),

    /// Row does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    /// Optimistic version check failed; another writer got there first
    #[error("{entity} {id} was modified concurrently")]
    StaleVersion { entity: Entity, id: i64 },

    /// Unique constraint hit
    #[error("Duplicate {entity}: {detail}")]
    Duplicate { entity: Entity, detail: String },

    /// Guarded balance update refused
    #[error("Insufficient funds in wallet {wallet_id}: available {available}, required {required}")]
    InsufficientFunds {
        wallet_id: WalletId,
        available: Amount,
        required: Amount,
    },

    /// Guarded participant-count increment refused
    #[error("Tournament {0} is at capacity")]
    CapacityReached(i64),

    /// Wallet still holds funds
    #[error("Wallet {0} has a non-zero balance")]
    NonZeroBalance(WalletId),

    /// Row could not be decoded into a domain type
    #[error("Corrupt {entity} row: {detail}")]
    Corrupt { entity: Entity, detail: String },

    /// JSON column could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Database(_)
            | StoreError::Timeout(_)
            | StoreError::Corrupt { .. }
            | StoreError::Serialization(_) => ErrorKind::Infrastructure,
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::StaleVersion { .. }
            | StoreError::Duplicate { .. }
            | StoreError::CapacityReached(_)
            | StoreError::NonZeroBalance(_) => ErrorKind::Conflict,
            StoreError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
        }
    }

    pub(crate) fn not_found(entity: Entity, id: i64) -> Self {
        StoreError::NotFound { entity, id }
    }

    pub(crate) fn stale(entity: Entity, id: i64) -> Self {
        StoreError::StaleVersion { entity, id }
    }

    pub(crate) fn corrupt(entity: Entity, detail: impl Into<String>) -> Self {
        StoreError::Corrupt {
            entity,
            detail: detail.into(),
        }
    }
}

/// Result type for repository operations
pub type StoreResult<T> = Result<T, StoreError>;
