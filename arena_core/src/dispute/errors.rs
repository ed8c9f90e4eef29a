//! Dispute error types.

use super::models::{DisputeStatus, TicketId};
use crate::bracket::BracketError;
use crate::db::StoreError;
use crate::error::{Entity, ErrorKind};
use crate::matches::{MatchError, MatchId, MatchStatus};
use crate::tournament::ParticipantId;
use thiserror::Error;

/// Dispute errors
#[derive(Debug, Error)]
pub enum DisputeError {
    #[error(transparent)]
    Store(StoreError),

    /// Match lookup, lock or tournament check failed
    #[error(transparent)]
    Match(#[from] MatchError),

    /// Verdict could not be applied to the bracket
    #[error(transparent)]
    Bracket(#[from] BracketError),

    #[error("Dispute ticket {0} not found")]
    TicketNotFound(TicketId),

    /// Reporter does not play in the match
    #[error("Participant {participant_id} is not in match {match_id}")]
    Unauthorized {
        match_id: MatchId,
        participant_id: ParticipantId,
    },

    /// Match is in a state that cannot be contested
    #[error("Match {match_id} cannot be disputed while {status}")]
    NotDisputable {
        match_id: MatchId,
        status: MatchStatus,
    },

    /// Bye results are never contested
    #[error("Match {0} is a bye")]
    ByeMatch(MatchId),

    /// Confirmed result is older than the dispute window
    #[error("Dispute window for match {0} has closed")]
    WindowClosed(MatchId),

    #[error("Dispute reason must not be empty")]
    MissingReason,

    /// Match already has an open or under-review ticket
    #[error("Match {0} already has an active dispute")]
    AlreadyOpen(MatchId),

    /// Ticket was already resolved or closed
    #[error("Dispute ticket {ticket_id} is already {status}")]
    AlreadyResolved {
        ticket_id: TicketId,
        status: DisputeStatus,
    },

    /// Ticket status does not allow the requested step
    #[error("Dispute ticket {ticket_id} is {status}")]
    InvalidTicketState {
        ticket_id: TicketId,
        status: DisputeStatus,
    },

    /// Dismissal refused; the match waits on a verdict
    #[error("Match {0} is disputed and needs a verdict")]
    VerdictRequired(MatchId),
}

impl From<StoreError> for DisputeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound {
                entity: Entity::DisputeTicket,
                id,
            } => DisputeError::TicketNotFound(id),
            other => DisputeError::Store(other),
        }
    }
}

impl DisputeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DisputeError::Store(err) => err.kind(),
            DisputeError::Match(err) => err.kind(),
            DisputeError::Bracket(err) => err.kind(),
            DisputeError::TicketNotFound(_) => ErrorKind::NotFound,
            DisputeError::Unauthorized { .. } => ErrorKind::Unauthorized,
            DisputeError::NotDisputable { .. }
            | DisputeError::ByeMatch(_)
            | DisputeError::WindowClosed(_)
            | DisputeError::InvalidTicketState { .. }
            | DisputeError::VerdictRequired(_) => ErrorKind::InvalidState,
            DisputeError::MissingReason => ErrorKind::Validation,
            DisputeError::AlreadyOpen(_) | DisputeError::AlreadyResolved { .. } => {
                ErrorKind::Conflict
            }
        }
    }
}

/// Result type for dispute operations
pub type DisputeResult<T> = Result<T, DisputeError>;
