//! Tournament and participant data models.

use crate::wallet::{Amount, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Tournament ID type
pub type TournamentId = i64;

/// Participant (registration row) ID type
pub type ParticipantId = i64;

/// Tournament state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TournamentStatus {
    /// Accepting registrations
    Upcoming,
    /// Start time reached; claimed by a lifecycle tick
    AwaitingDecision,
    /// Bracket built, matches being played
    Ongoing,
    /// Champion decided and paid
    Completed,
    /// Cancelled, entry fees refunded
    Canceled,
}

impl TournamentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TournamentStatus::Upcoming => "upcoming",
            TournamentStatus::AwaitingDecision => "awaiting_decision",
            TournamentStatus::Ongoing => "ongoing",
            TournamentStatus::Completed => "completed",
            TournamentStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TournamentStatus::Completed | TournamentStatus::Canceled)
    }

    /// Forward-only lifecycle; cancellation allowed from any live state.
    pub fn can_transition_to(self, next: TournamentStatus) -> bool {
        use TournamentStatus::*;
        matches!(
            (self, next),
            (Upcoming, AwaitingDecision)
                | (AwaitingDecision, Ongoing)
                | (Ongoing, Completed)
                | (Upcoming, Canceled)
                | (AwaitingDecision, Canceled)
                | (Ongoing, Canceled)
        )
    }
}

impl fmt::Display for TournamentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TournamentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(TournamentStatus::Upcoming),
            "awaiting_decision" => Ok(TournamentStatus::AwaitingDecision),
            "ongoing" => Ok(TournamentStatus::Ongoing),
            "completed" => Ok(TournamentStatus::Completed),
            "canceled" => Ok(TournamentStatus::Canceled),
            other => Err(format!("unknown tournament status '{other}'")),
        }
    }
}

/// Bracket structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BracketKind {
    SingleElimination,
    DoubleElimination,
}

impl BracketKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BracketKind::SingleElimination => "single_elimination",
            BracketKind::DoubleElimination => "double_elimination",
        }
    }
}

impl fmt::Display for BracketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BracketKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_elimination" => Ok(BracketKind::SingleElimination),
            "double_elimination" => Ok(BracketKind::DoubleElimination),
            other => Err(format!("unknown bracket kind '{other}'")),
        }
    }
}

/// Free-form tournament settings persisted as JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentSettings {
    /// Minimum eligible participants to start (falls back to engine config)
    pub min_participants: Option<u32>,
    /// Only checked-in registrants are seeded when set
    pub require_check_in: bool,
    /// Double elimination: play a second grand final if the losers-side champion wins the first
    pub grand_final_reset: bool,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            min_participants: None,
            require_check_in: false,
            grand_final_reset: true,
        }
    }
}

/// Tournament model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub game_id: i64,
    pub currency: String,
    pub entry_fee: Amount,
    pub prize_pool: Amount,
    pub max_participants: i32,
    pub current_participants: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub status: TournamentStatus,
    pub bracket_kind: BracketKind,
    pub settings: TournamentSettings,
    /// Set while cancellation refunds are outstanding
    pub refund_pending: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Tournament {
    pub fn has_capacity(&self) -> bool {
        self.current_participants < self.max_participants
    }

    /// Configured start threshold, or the engine-wide default
    pub fn min_participants(&self, default: u32) -> u32 {
        self.settings.min_participants.unwrap_or(default).max(2)
    }

    /// True once `now` has reached the scheduled start
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now
    }
}

/// Tournament creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTournament {
    pub name: String,
    pub game_id: i64,
    /// Defaults to the engine currency when `None`
    pub currency: Option<String>,
    pub entry_fee: Amount,
    pub prize_pool: Amount,
    pub max_participants: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub bracket_kind: BracketKind,
    pub settings: TournamentSettings,
}

impl NewTournament {
    /// Single-elimination tournament with default settings
    pub fn single_elimination(
        name: impl Into<String>,
        max_participants: i32,
        entry_fee: Amount,
        prize_pool: Amount,
        start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            name: name.into(),
            game_id: 0,
            currency: None,
            entry_fee,
            prize_pool,
            max_participants,
            start_date,
            end_date: None,
            bracket_kind: BracketKind::SingleElimination,
            settings: TournamentSettings::default(),
        }
    }

    /// Same as [`NewTournament::single_elimination`] with a double-elimination bracket
    pub fn double_elimination(
        name: impl Into<String>,
        max_participants: i32,
        entry_fee: Amount,
        prize_pool: Amount,
        start_date: DateTime<Utc>,
    ) -> Self {
        Self {
            bracket_kind: BracketKind::DoubleElimination,
            ..Self::single_elimination(name, max_participants, entry_fee, prize_pool, start_date)
        }
    }

    pub fn with_min_participants(mut self, min: u32) -> Self {
        self.settings.min_participants = Some(min);
        self
    }

    pub fn with_check_in(mut self) -> Self {
        self.settings.require_check_in = true;
        self
    }

    /// Checks shape constraints before anything is persisted
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        if self.max_participants < 2 {
            return Err(format!(
                "max_participants must be at least 2, got {}",
                self.max_participants
            ));
        }
        if let Some(min) = self.settings.min_participants {
            if min < 2 || min as i64 > self.max_participants as i64 {
                return Err(format!(
                    "min_participants must be within 2..={}, got {min}",
                    self.max_participants
                ));
            }
        }
        if self.entry_fee.is_negative() {
            return Err(format!("entry_fee must not be negative, got {}", self.entry_fee));
        }
        if self.prize_pool.is_negative() {
            return Err(format!("prize_pool must not be negative, got {}", self.prize_pool));
        }
        if let Some(end) = self.end_date {
            if end <= self.start_date {
                return Err("end_date must be after start_date".to_string());
            }
        }
        Ok(())
    }
}

/// Participant type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantType {
    User,
    Team,
}

impl ParticipantType {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantType::User => "user",
            ParticipantType::Team => "team",
        }
    }
}

impl fmt::Display for ParticipantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ParticipantType::User),
            "team" => Ok(ParticipantType::Team),
            other => Err(format!("unknown participant type '{other}'")),
        }
    }
}

/// External identity of a registrant (a user or a team)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantRef {
    pub id: i64,
    pub kind: ParticipantType,
}

impl ParticipantRef {
    pub fn user(id: UserId) -> Self {
        Self {
            id,
            kind: ParticipantType::User,
        }
    }

    pub fn team(id: i64) -> Self {
        Self {
            id,
            kind: ParticipantType::Team,
        }
    }
}

impl fmt::Display for ParticipantRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Participant state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Registered,
    /// Seeded into the bracket
    Active,
    /// Registered but not checked in at start
    NoShow,
    Withdrawn,
    Champion,
}

impl ParticipantStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ParticipantStatus::Registered => "registered",
            ParticipantStatus::Active => "active",
            ParticipantStatus::NoShow => "no_show",
            ParticipantStatus::Withdrawn => "withdrawn",
            ParticipantStatus::Champion => "champion",
        }
    }
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParticipantStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(ParticipantStatus::Registered),
            "active" => Ok(ParticipantStatus::Active),
            "no_show" => Ok(ParticipantStatus::NoShow),
            "withdrawn" => Ok(ParticipantStatus::Withdrawn),
            "champion" => Ok(ParticipantStatus::Champion),
            other => Err(format!("unknown participant status '{other}'")),
        }
    }
}

/// Tournament registration entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub tournament_id: TournamentId,
    pub identity: ParticipantRef,
    /// User whose wallet paid the entry fee and receives refunds/prizes
    pub payer_id: UserId,
    pub registered_at: DateTime<Utc>,
    pub checked_in: bool,
    pub seed: Option<i32>,
    pub status: ParticipantStatus,
    pub version: i64,
}

impl Participant {
    /// Eligible for seeding at start
    pub fn is_eligible(&self, require_check_in: bool) -> bool {
        self.status == ParticipantStatus::Registered && (!require_check_in || self.checked_in)
    }
}

/// Registration row to insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewParticipant {
    pub tournament_id: TournamentId,
    pub identity: ParticipantRef,
    pub payer_id: UserId,
    pub registered_at: DateTime<Utc>,
}

/// Result of a tournament start decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StartOutcome {
    /// Bracket built, tournament ongoing
    Started { matches: usize },
    /// Not enough eligible participants
    Canceled { eligible: usize, required: u32 },
}
