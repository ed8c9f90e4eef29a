//! Dispute tickets and moderator verdicts.
//!
//! A match holds at most one active ticket. Tickets open automatically when
//! result reports disagree, or on request while a result is awaiting
//! confirmation or recently confirmed. A moderator reviews the ticket and
//! either applies a [`Verdict`] to the bracket or dismisses it.

pub mod errors;
pub mod manager;
pub mod models;

pub use errors::{DisputeError, DisputeResult};
pub use manager::{DisputeResolver, Resolution};
pub use models::{DisputeStatus, DisputeTicket, NewDisputeTicket, TicketId, Verdict};
