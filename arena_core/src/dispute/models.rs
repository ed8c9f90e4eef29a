//! Dispute ticket data models.

use crate::matches::{MatchId, MatchSlot};
use crate::tournament::{ParticipantId, TournamentId};
use crate::wallet::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dispute ticket ID type
pub type TicketId = i64;

/// Moderator decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Participant1Wins,
    Participant2Wins,
    /// Reset the match to scheduled with a clean slate
    Replay,
    /// No winner; both participants eliminated
    Void,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Participant1Wins => "participant1_wins",
            Verdict::Participant2Wins => "participant2_wins",
            Verdict::Replay => "replay",
            Verdict::Void => "void",
        }
    }

    /// Slot declared winner, for win verdicts
    pub fn winning_slot(self) -> Option<MatchSlot> {
        match self {
            Verdict::Participant1Wins => Some(MatchSlot::First),
            Verdict::Participant2Wins => Some(MatchSlot::Second),
            Verdict::Replay | Verdict::Void => None,
        }
    }

    /// Ticket status recorded for this verdict
    pub fn ticket_status(self) -> DisputeStatus {
        match self {
            Verdict::Participant1Wins => DisputeStatus::ResolvedParticipant1Win,
            Verdict::Participant2Wins => DisputeStatus::ResolvedParticipant2Win,
            Verdict::Replay => DisputeStatus::ResolvedReplay,
            Verdict::Void => DisputeStatus::ResolvedVoid,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "participant1_wins" => Ok(Verdict::Participant1Wins),
            "participant2_wins" => Ok(Verdict::Participant2Wins),
            "replay" => Ok(Verdict::Replay),
            "void" => Ok(Verdict::Void),
            other => Err(format!("unknown verdict '{other}'")),
        }
    }
}

/// Dispute ticket state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    ResolvedParticipant1Win,
    ResolvedParticipant2Win,
    ResolvedReplay,
    ResolvedVoid,
    /// Dismissed without changing the match
    Closed,
}

impl DisputeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DisputeStatus::Open => "open",
            DisputeStatus::UnderReview => "under_review",
            DisputeStatus::ResolvedParticipant1Win => "resolved_participant1_win",
            DisputeStatus::ResolvedParticipant2Win => "resolved_participant2_win",
            DisputeStatus::ResolvedReplay => "resolved_replay",
            DisputeStatus::ResolvedVoid => "resolved_void",
            DisputeStatus::Closed => "closed",
        }
    }

    /// Open or under review; counts toward the one-open-ticket-per-match rule
    pub fn is_active(self) -> bool {
        matches!(self, DisputeStatus::Open | DisputeStatus::UnderReview)
    }
}

impl fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DisputeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(DisputeStatus::Open),
            "under_review" => Ok(DisputeStatus::UnderReview),
            "resolved_participant1_win" => Ok(DisputeStatus::ResolvedParticipant1Win),
            "resolved_participant2_win" => Ok(DisputeStatus::ResolvedParticipant2Win),
            "resolved_replay" => Ok(DisputeStatus::ResolvedReplay),
            "resolved_void" => Ok(DisputeStatus::ResolvedVoid),
            "closed" => Ok(DisputeStatus::Closed),
            other => Err(format!("unknown dispute status '{other}'")),
        }
    }
}

/// Dispute ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisputeTicket {
    pub id: TicketId,
    pub match_id: MatchId,
    pub tournament_id: TournamentId,
    pub reporter_id: ParticipantId,
    pub reason: String,
    pub status: DisputeStatus,
    pub verdict: Option<Verdict>,
    pub resolution: Option<String>,
    pub moderator_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub version: i64,
}

/// Ticket to insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDisputeTicket {
    pub match_id: MatchId,
    pub tournament_id: TournamentId,
    pub reporter_id: ParticipantId,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
