//! # Arena Core
//!
//! Tournament lifecycle, bracket and wallet ledger engine for competitive
//! gaming platforms.
//!
//! Players pay entry fees from a wallet, get seeded into a single- or
//! double-elimination bracket, report match results, and collect a prize
//! when they win the final. Every balance change goes through an
//! append-only, idempotent ledger so retries never charge or pay twice.
//!
//! ## Architecture
//!
//! - **Ledger** ([`wallet`]): wallets, transactions, idempotency keys and
//!   tournament fee/refund/prize postings
//! - **Tournaments** ([`tournament`]): registration, start decision,
//!   cancellation with refunds, completion and the periodic lifecycle tick
//! - **Brackets** ([`bracket`]): pure bracket construction and advancement
//! - **Matches** ([`matches`]): dual result reporting and confirmation
//! - **Disputes** ([`dispute`]): tickets and moderator verdicts
//! - **Persistence** ([`db`]): repository ports with PostgreSQL and
//!   in-memory adapters
//!
//! [`Engine`] wires these together over one set of repository ports.
//!
//! ## Example
//!
//! ```
//! use arena_core::{Engine, EngineConfig};
//! use arena_core::tournament::NewTournament;
//! use arena_core::wallet::Amount;
//! use chrono::Utc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::in_memory(EngineConfig::default());
//! let cup = engine
//!     .tournaments()
//!     .create_tournament(
//!         NewTournament::single_elimination("Friday Cup", 8, Amount::ZERO, Amount::ZERO, Utc::now()),
//!         Utc::now(),
//!     )
//!     .await?;
//! assert_eq!(cup.current_participants, 0);
//! # Ok(())
//! # }
//! ```

/// Pure bracket construction and advancement.
pub mod bracket;

/// Engine configuration.
pub mod config;

/// Repository ports and adapters.
pub mod db;

/// Dispute tickets and verdicts.
pub mod dispute;

/// Engine facade.
pub mod engine;

/// Shared error classification.
pub mod error;

/// Per-key async locks.
pub mod locks;

/// Match reporting and confirmation.
pub mod matches;

/// Tournament lifecycle.
pub mod tournament;

/// Wallet ledger.
pub mod wallet;

pub use config::EngineConfig;
pub use engine::{Engine, EngineError, EngineResult};
pub use error::{Entity, ErrorKind};
