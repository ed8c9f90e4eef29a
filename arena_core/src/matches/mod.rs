//! Match lifecycle: start, dual result reporting and confirmation.
//!
//! A match confirms when both participants report the same winner, or when
//! the single reported result is confirmed (by the other participant or on
//! confirmation-window expiry). Disagreeing reports put the match into
//! dispute and open a ticket for a moderator.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{MatchError, MatchResult};
pub use manager::{CONFLICTING_REPORTS, MatchManager};
pub use models::{
    BracketSide, Match, MatchId, MatchSlot, MatchStatus, ResultReport, Scoreline, SlotRef,
    SlotState,
};
