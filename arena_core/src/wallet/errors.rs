//! Wallet error types.

use super::models::{Amount, TransactionId, TransactionStatus, UserId, WalletId};
use crate::db::StoreError;
use crate::error::{Entity, ErrorKind};
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Persistence failure
    #[error(transparent)]
    Store(StoreError),

    /// Insufficient balance
    #[error("Insufficient funds in wallet {wallet_id}: available {available}, required {required}")]
    InsufficientFunds {
        wallet_id: WalletId,
        available: Amount,
        required: Amount,
    },

    /// Wallet not found
    #[error("Wallet {0} not found")]
    WalletNotFound(WalletId),

    /// User has no wallet
    #[error("No wallet for user {0}")]
    NoWalletForUser(UserId),

    /// User already owns a wallet
    #[error("User {0} already has a wallet")]
    WalletExists(UserId),

    /// Wallet still holds funds
    #[error("Wallet {0} is not empty")]
    WalletNotEmpty(WalletId),

    /// Transaction not found
    #[error("Transaction {0} not found")]
    TransactionNotFound(TransactionId),

    /// Idempotency key reused for a different effect
    #[error("Idempotency key '{0}' already used for a different transaction")]
    DuplicateIdempotencyKey(String),

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(Amount),

    /// Illegal status move
    #[error("Transaction {transaction_id} cannot move from {from} to {to}")]
    InvalidTransition {
        transaction_id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Operation applies to a different transaction kind
    #[error("Transaction {0} is not a withdrawal")]
    NotAWithdrawal(TransactionId),
}

impl From<StoreError> for WalletError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientFunds {
                wallet_id,
                available,
                required,
            } => WalletError::InsufficientFunds {
                wallet_id,
                available,
                required,
            },
            StoreError::NotFound {
                entity: Entity::Wallet,
                id,
            } => WalletError::WalletNotFound(id),
            StoreError::NotFound {
                entity: Entity::Transaction,
                id,
            } => WalletError::TransactionNotFound(id),
            StoreError::NonZeroBalance(wallet_id) => WalletError::WalletNotEmpty(wallet_id),
            other => WalletError::Store(other),
        }
    }
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::Store(err) => err.kind(),
            WalletError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            WalletError::WalletNotFound(_)
            | WalletError::NoWalletForUser(_)
            | WalletError::TransactionNotFound(_) => ErrorKind::NotFound,
            WalletError::WalletExists(_)
            | WalletError::WalletNotEmpty(_)
            | WalletError::DuplicateIdempotencyKey(_) => ErrorKind::Conflict,
            WalletError::InvalidAmount(_) => ErrorKind::Validation,
            WalletError::InvalidTransition { .. } | WalletError::NotAWithdrawal(_) => {
                ErrorKind::InvalidState
            }
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Persistence errors are sanitized to prevent information disclosure about
    /// the internal system structure.
    pub fn client_message(&self) -> String {
        match self {
            WalletError::Store(err) if err.kind() == ErrorKind::Infrastructure => {
                "Internal server error".to_string()
            }
            WalletError::InsufficientFunds { .. } => "Insufficient funds".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
