//! Tournament error types.

use super::models::{ParticipantId, ParticipantRef, TournamentId, TournamentStatus};
use crate::bracket::BracketError;
use crate::db::StoreError;
use crate::error::{Entity, ErrorKind};
use crate::matches::MatchError;
use crate::wallet::{UserId, WalletError};
use thiserror::Error;

/// Tournament errors
#[derive(Debug, Error)]
pub enum TournamentError {
    #[error(transparent)]
    Store(StoreError),

    /// Fee, refund or prize posting failed
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Bracket(#[from] BracketError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error("Tournament {0} not found")]
    TournamentNotFound(TournamentId),

    #[error("Participant {0} not found")]
    ParticipantNotFound(ParticipantId),

    #[error("Tournament {0} is full")]
    TournamentFull(TournamentId),

    #[error("{identity} is already registered in tournament {tournament_id}")]
    AlreadyRegistered {
        tournament_id: TournamentId,
        identity: ParticipantRef,
    },

    /// Operation not allowed in the tournament's current state
    #[error("Tournament {tournament_id} is {status}, cannot {operation}")]
    InvalidState {
        tournament_id: TournamentId,
        status: TournamentStatus,
        operation: &'static str,
    },

    /// Participant is not in a state that allows the operation
    #[error("Participant {participant_id} cannot {operation}")]
    InvalidParticipantState {
        participant_id: ParticipantId,
        operation: &'static str,
    },

    /// A user registration paid from someone else's wallet
    #[error("{identity} must pay its own entry fee, not user {payer_id}")]
    PayerMismatch {
        identity: ParticipantRef,
        payer_id: UserId,
    },

    /// Creation request or seed rejected
    #[error("Invalid tournament request: {0}")]
    InvalidRequest(String),
}

impl From<StoreError> for TournamentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound {
                entity: Entity::Tournament,
                id,
            } => TournamentError::TournamentNotFound(id),
            StoreError::NotFound {
                entity: Entity::Participant,
                id,
            } => TournamentError::ParticipantNotFound(id),
            StoreError::CapacityReached(id) => TournamentError::TournamentFull(id),
            err @ (StoreError::InsufficientFunds { .. }
            | StoreError::NotFound {
                entity: Entity::Wallet,
                ..
            }) => TournamentError::Wallet(err.into()),
            other => TournamentError::Store(other),
        }
    }
}

impl TournamentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TournamentError::Store(err) => err.kind(),
            TournamentError::Wallet(err) => err.kind(),
            TournamentError::Bracket(err) => err.kind(),
            TournamentError::Match(err) => err.kind(),
            TournamentError::TournamentNotFound(_) | TournamentError::ParticipantNotFound(_) => {
                ErrorKind::NotFound
            }
            TournamentError::TournamentFull(_) | TournamentError::AlreadyRegistered { .. } => {
                ErrorKind::Conflict
            }
            TournamentError::InvalidState { .. }
            | TournamentError::InvalidParticipantState { .. } => ErrorKind::InvalidState,
            TournamentError::PayerMismatch { .. } => ErrorKind::Unauthorized,
            TournamentError::InvalidRequest(_) => ErrorKind::Validation,
        }
    }
}

/// Result type for tournament operations
pub type TournamentResult<T> = Result<T, TournamentError>;
