//! Bracket error types.

use crate::error::ErrorKind;
use crate::matches::{MatchId, MatchStatus};
use crate::tournament::ParticipantId;
use thiserror::Error;

/// Bracket errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BracketError {
    /// Fewer than two participants
    #[error("At least 2 participants are required, got {0}")]
    InsufficientParticipants(usize),

    /// A downstream match already progressed past the point of replacement
    #[error("Match {match_id} is {status} and can no longer be changed from upstream")]
    DownstreamLocked {
        match_id: MatchId,
        status: MatchStatus,
    },

    /// Edge or lookup names a match outside the bracket
    #[error("Match {0} is not part of this bracket")]
    UnknownMatch(MatchId),

    /// Declared winner does not hold a slot of the match
    #[error("Participant {participant_id} does not play in match {match_id}")]
    NotInMatch {
        match_id: MatchId,
        participant_id: ParticipantId,
    },
}

impl BracketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BracketError::InsufficientParticipants(_) | BracketError::DownstreamLocked { .. } => {
                ErrorKind::InvalidState
            }
            BracketError::UnknownMatch(_) => ErrorKind::NotFound,
            BracketError::NotInMatch { .. } => ErrorKind::Validation,
        }
    }
}

/// Result type for bracket operations
pub type BracketResult<T> = Result<T, BracketError>;
