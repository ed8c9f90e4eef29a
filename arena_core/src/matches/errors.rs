//! Match error types.

use super::models::{MatchId, MatchStatus};
use crate::bracket::BracketError;
use crate::db::StoreError;
use crate::error::{Entity, ErrorKind};
use crate::tournament::{ParticipantId, TournamentId, TournamentStatus};
use thiserror::Error;

/// Match errors
#[derive(Debug, Error)]
pub enum MatchError {
    /// Persistence failure
    #[error(transparent)]
    Store(StoreError),

    /// Bracket advancement refused
    #[error(transparent)]
    Bracket(#[from] BracketError),

    #[error("Match {0} not found")]
    MatchNotFound(MatchId),

    /// Operation illegal in the match's current state
    #[error("Match {match_id} is {status}")]
    InvalidMatchState {
        match_id: MatchId,
        status: MatchStatus,
    },

    /// Actor does not play in the match
    #[error("Participant {participant_id} is not in match {match_id}")]
    Unauthorized {
        match_id: MatchId,
        participant_id: ParticipantId,
    },

    #[error("Invalid score for match {match_id}: {reason}")]
    InvalidScore { match_id: MatchId, reason: String },

    /// Tournament is not running
    #[error("Tournament {tournament_id} is {status}")]
    TournamentNotActive {
        tournament_id: TournamentId,
        status: TournamentStatus,
    },
}

impl From<StoreError> for MatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound {
                entity: Entity::Match,
                id,
            } => MatchError::MatchNotFound(id),
            other => MatchError::Store(other),
        }
    }
}

impl MatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchError::Store(err) => err.kind(),
            MatchError::Bracket(err) => err.kind(),
            MatchError::MatchNotFound(_) => ErrorKind::NotFound,
            MatchError::InvalidMatchState { .. } | MatchError::TournamentNotActive { .. } => {
                ErrorKind::InvalidState
            }
            MatchError::Unauthorized { .. } => ErrorKind::Unauthorized,
            MatchError::InvalidScore { .. } => ErrorKind::Validation,
        }
    }
}

/// Result type for match operations
pub type MatchResult<T> = Result<T, MatchError>;
