//! Wallet module providing the ledger of record for balances.
//!
//! This module implements:
//! - One wallet per user with a never-negative balance
//! - Append-only transaction log whose completed sum equals the balance
//! - Idempotency keys so every financial effect happens at most once
//! - Tournament fee, refund and prize postings
//! - Withdrawal approval and settlement
//!
//! ## Example
//!
//! ```no_run
//! use arena_core::config::EngineConfig;
//! use arena_core::db::MemoryStore;
//! use arena_core::wallet::{Amount, Ledger, TransactionKind};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ledger = Ledger::new(Arc::new(MemoryStore::new()), Arc::new(EngineConfig::default()));
//!     let wallet = ledger.create_wallet(1, None).await?;
//!
//!     let tx = ledger
//!         .credit(wallet.id, Amount::from_major(50), TransactionKind::Deposit, Some("deposit-1"), None)
//!         .await?;
//!     println!("Deposited {} (tx {})", tx.amount, tx.id);
//!
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod keys;
pub mod manager;
pub mod models;

pub use errors::{WalletError, WalletResult};
pub use manager::Ledger;
pub use models::{
    Amount, BalanceCheck, NewTransaction, ParseAmountError, Posting, RefundReport, Transaction,
    TransactionId, TransactionKind, TransactionStatus, UserId, Wallet, WalletId,
};
