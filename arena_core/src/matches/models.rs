//! Match data models.

use crate::tournament::{ParticipantId, TournamentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Match ID type
pub type MatchId = i64;

/// Match state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchStatus {
    /// Waiting for one or both participants
    Pending,
    /// Both participants known
    Scheduled,
    InProgress,
    /// At least one participant reported a result
    AwaitingConfirmation,
    Confirmed,
    /// Conflicting reports or contested result; needs a moderator
    Disputed,
    /// Outcome forced by a moderator
    Resolved,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::InProgress => "in_progress",
            MatchStatus::AwaitingConfirmation => "awaiting_confirmation",
            MatchStatus::Confirmed => "confirmed",
            MatchStatus::Disputed => "disputed",
            MatchStatus::Resolved => "resolved",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MatchStatus::Confirmed | MatchStatus::Resolved)
    }

    /// States in which a participant may report a result
    pub fn accepts_reports(self) -> bool {
        matches!(
            self,
            MatchStatus::Scheduled | MatchStatus::InProgress | MatchStatus::AwaitingConfirmation
        )
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MatchStatus::Pending),
            "scheduled" => Ok(MatchStatus::Scheduled),
            "in_progress" => Ok(MatchStatus::InProgress),
            "awaiting_confirmation" => Ok(MatchStatus::AwaitingConfirmation),
            "confirmed" => Ok(MatchStatus::Confirmed),
            "disputed" => Ok(MatchStatus::Disputed),
            "resolved" => Ok(MatchStatus::Resolved),
            other => Err(format!("unknown match status '{other}'")),
        }
    }
}

/// Which part of the bracket a match belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BracketSide {
    Winners,
    Losers,
    GrandFinal,
}

impl BracketSide {
    pub fn as_str(self) -> &'static str {
        match self {
            BracketSide::Winners => "winners",
            BracketSide::Losers => "losers",
            BracketSide::GrandFinal => "grand_final",
        }
    }
}

impl fmt::Display for BracketSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BracketSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "winners" => Ok(BracketSide::Winners),
            "losers" => Ok(BracketSide::Losers),
            "grand_final" => Ok(BracketSide::GrandFinal),
            other => Err(format!("unknown bracket side '{other}'")),
        }
    }
}

/// One of the two participant positions in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MatchSlot {
    First,
    Second,
}

impl MatchSlot {
    pub fn other(self) -> MatchSlot {
        match self {
            MatchSlot::First => MatchSlot::Second,
            MatchSlot::Second => MatchSlot::First,
        }
    }

    /// 1 or 2, as stored
    pub fn number(self) -> i16 {
        match self {
            MatchSlot::First => 1,
            MatchSlot::Second => 2,
        }
    }

    pub fn from_number(n: i16) -> Option<MatchSlot> {
        match n {
            1 => Some(MatchSlot::First),
            2 => Some(MatchSlot::Second),
            _ => None,
        }
    }
}

/// Occupancy of a match slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "participant_id", rename_all = "snake_case")]
pub enum SlotState {
    /// Waiting on an upstream result
    Open,
    Filled(ParticipantId),
    /// No participant will ever arrive (bye, void, dead feeder)
    Vacant,
}

impl SlotState {
    pub fn participant(self) -> Option<ParticipantId> {
        match self {
            SlotState::Filled(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_vacant(self) -> bool {
        matches!(self, SlotState::Vacant)
    }
}

/// Forward edge target: a slot of a downstream match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub match_id: MatchId,
    pub slot: MatchSlot,
}

impl SlotRef {
    pub fn new(match_id: MatchId, slot: MatchSlot) -> Self {
        Self { match_id, slot }
    }
}

/// Declared scoreline, ordered by slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoreline {
    pub first: u32,
    pub second: u32,
}

impl Scoreline {
    pub fn new(first: u32, second: u32) -> Self {
        Self { first, second }
    }

    /// Winning slot; `None` for a draw
    pub fn winner(&self) -> Option<MatchSlot> {
        match self.first.cmp(&self.second) {
            std::cmp::Ordering::Greater => Some(MatchSlot::First),
            std::cmp::Ordering::Less => Some(MatchSlot::Second),
            std::cmp::Ordering::Equal => None,
        }
    }
}

impl fmt::Display for Scoreline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.second)
    }
}

/// One participant's view of the result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultReport {
    pub score: Scoreline,
    pub proof_ref: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Bracket match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub tournament_id: TournamentId,
    pub side: BracketSide,
    pub round: i32,
    pub index_in_round: i32,
    pub slot1: SlotState,
    pub slot2: SlotState,
    pub status: MatchStatus,
    pub score: Option<Scoreline>,
    pub report1: Option<ResultReport>,
    pub report2: Option<ResultReport>,
    pub winner_id: Option<ParticipantId>,
    /// Where the winner goes
    pub next_match: Option<SlotRef>,
    /// Where the loser goes (double elimination)
    pub next_loser_match: Option<SlotRef>,
    pub started_at: Option<DateTime<Utc>>,
    pub awaiting_since: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Match {
    /// Empty match with open slots and no edges
    pub fn blank(
        id: MatchId,
        tournament_id: TournamentId,
        side: BracketSide,
        round: i32,
        index_in_round: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tournament_id,
            side,
            round,
            index_in_round,
            slot1: SlotState::Open,
            slot2: SlotState::Open,
            status: MatchStatus::Pending,
            score: None,
            report1: None,
            report2: None,
            winner_id: None,
            next_match: None,
            next_loser_match: None,
            started_at: None,
            awaiting_since: None,
            confirmed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn slot(&self, slot: MatchSlot) -> SlotState {
        match slot {
            MatchSlot::First => self.slot1,
            MatchSlot::Second => self.slot2,
        }
    }

    pub fn set_slot(&mut self, slot: MatchSlot, state: SlotState) {
        match slot {
            MatchSlot::First => self.slot1 = state,
            MatchSlot::Second => self.slot2 = state,
        }
    }

    pub fn participant(&self, slot: MatchSlot) -> Option<ParticipantId> {
        self.slot(slot).participant()
    }

    /// Slot held by `participant_id`, if any
    pub fn slot_of(&self, participant_id: ParticipantId) -> Option<MatchSlot> {
        if self.slot1 == SlotState::Filled(participant_id) {
            Some(MatchSlot::First)
        } else if self.slot2 == SlotState::Filled(participant_id) {
            Some(MatchSlot::Second)
        } else {
            None
        }
    }

    pub fn report(&self, slot: MatchSlot) -> Option<&ResultReport> {
        match slot {
            MatchSlot::First => self.report1.as_ref(),
            MatchSlot::Second => self.report2.as_ref(),
        }
    }

    pub fn set_report(&mut self, slot: MatchSlot, report: Option<ResultReport>) {
        match slot {
            MatchSlot::First => self.report1 = report,
            MatchSlot::Second => self.report2 = report,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Exactly one participant, the other slot can never fill
    pub fn is_bye(&self) -> bool {
        matches!(
            (self.slot1, self.slot2),
            (SlotState::Filled(_), SlotState::Vacant) | (SlotState::Vacant, SlotState::Filled(_))
        )
    }

    /// Both slots vacant: unreachable
    pub fn is_dead(&self) -> bool {
        self.slot1.is_vacant() && self.slot2.is_vacant()
    }

    /// Terminal without being played (bye or dead)
    pub fn is_auto_settled(&self) -> bool {
        self.is_terminal() && (self.slot1.is_vacant() || self.slot2.is_vacant())
    }

    /// Loser of a decided two-participant match
    pub fn loser_id(&self) -> Option<ParticipantId> {
        let winner = self.winner_id?;
        let winner_slot = self.slot_of(winner)?;
        self.participant(winner_slot.other())
    }

    pub fn next_match_id(&self) -> Option<MatchId> {
        self.next_match.map(|r| r.match_id)
    }

    pub fn next_loser_match_id(&self) -> Option<MatchId> {
        self.next_loser_match.map(|r| r.match_id)
    }

    /// First grand final in a bracket with a reset match
    pub fn is_resettable_grand_final(&self) -> bool {
        self.side == BracketSide::GrandFinal && self.next_match.is_some()
    }

    /// Drop reports, scores and winner
    pub fn clear_result(&mut self) {
        self.report1 = None;
        self.report2 = None;
        self.score = None;
        self.winner_id = None;
        self.awaiting_since = None;
        self.confirmed_at = None;
        self.started_at = None;
    }
}
