//! Idempotency keys and metadata for tournament money movements.
//!
//! Keys are derived from the tournament and the registrant identity so every
//! retry of the same financial effect lands on the same ledger row.

use super::models::UserId;
use crate::tournament::{ParticipantRef, TournamentId};
use serde::{Deserialize, Serialize};

/// `tournament:{id}:{type}:{participant}:fee`
pub fn entry_fee(tournament_id: TournamentId, identity: ParticipantRef) -> String {
    format!(
        "tournament:{tournament_id}:{}:{}:fee",
        identity.kind, identity.id
    )
}

/// `tournament:{id}:{type}:{participant}:refund`
pub fn refund(tournament_id: TournamentId, identity: ParticipantRef) -> String {
    format!(
        "tournament:{tournament_id}:{}:{}:refund",
        identity.kind, identity.id
    )
}

/// `tournament:{id}:prize`
pub fn prize(tournament_id: TournamentId) -> String {
    format!("tournament:{tournament_id}:prize")
}

/// Metadata stored on every entry-fee debit so refunds can be keyed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeMetadata {
    pub participant: ParticipantRef,
    pub payer_id: UserId,
}
