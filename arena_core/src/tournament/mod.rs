//! Tournament lifecycle: creation, registration with entry fees, start
//! decision, cancellation with refunds and completion with prize payout.
//!
//! ## Example
//!
//! ```no_run
//! use arena_core::Engine;
//! use arena_core::tournament::{NewTournament, ParticipantRef};
//! use arena_core::wallet::Amount;
//! use chrono::{Duration, Utc};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::in_memory(Default::default());
//!     let now = Utc::now();
//!
//!     let cup = engine
//!         .tournaments()
//!         .create_tournament(
//!             NewTournament::single_elimination(
//!                 "Friday Cup",
//!                 8,
//!                 Amount::from_major(5),
//!                 Amount::from_major(30),
//!                 now + Duration::hours(1),
//!             ),
//!             now,
//!         )
//!         .await?;
//!
//!     engine.ledger().create_wallet(7, None).await?;
//!     let entry = engine.register_participant(cup.id, ParticipantRef::user(7), 7).await?;
//!     println!("Registered as participant {}", entry.id);
//!
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod lifecycle;
pub mod manager;
pub mod models;

pub use errors::{TournamentError, TournamentResult};
pub use lifecycle::{LifecycleDriver, LifecycleReport, TickFailure};
pub use manager::{Cancellation, NOT_ENOUGH_PARTICIPANTS, TournamentManager};
pub use models::{
    BracketKind, NewParticipant, NewTournament, Participant, ParticipantId, ParticipantRef,
    ParticipantStatus, ParticipantType, StartOutcome, Tournament, TournamentId, TournamentSettings,
    TournamentStatus,
};
