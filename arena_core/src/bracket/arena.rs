//! Pure advancement over an id-indexed set of matches.
//!
//! Matches only point forward (`next_match`, `next_loser_match`). Every
//! transition settles one match, derives its two outputs and places them into
//! the downstream slots, cascading through byes and dead matches. The arena
//! records which matches changed so the caller can persist exactly those.

use super::errors::{BracketError, BracketResult};
use crate::matches::{Match, MatchId, MatchStatus, Scoreline, SlotRef, SlotState};
use crate::tournament::ParticipantId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Overall bracket result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Standing {
    /// Undecided matches remain
    InProgress,
    /// The bracket produced a winner
    Champion {
        participant_id: ParticipantId,
        match_id: MatchId,
    },
    /// The final was voided or never reachable
    NoChampion { match_id: MatchId },
}

/// Working copy of a bracket
#[derive(Debug, Clone)]
pub struct BracketArena {
    matches: BTreeMap<MatchId, Match>,
    touched: BTreeSet<MatchId>,
    now: DateTime<Utc>,
}

impl BracketArena {
    pub fn new(matches: impl IntoIterator<Item = Match>, now: DateTime<Utc>) -> Self {
        Self {
            matches: matches.into_iter().map(|m| (m.id, m)).collect(),
            touched: BTreeSet::new(),
            now,
        }
    }

    pub fn get(&self, match_id: MatchId) -> BracketResult<&Match> {
        self.matches
            .get(&match_id)
            .ok_or(BracketError::UnknownMatch(match_id))
    }

    fn get_mut(&mut self, match_id: MatchId) -> BracketResult<&mut Match> {
        let m = self
            .matches
            .get_mut(&match_id)
            .ok_or(BracketError::UnknownMatch(match_id))?;
        self.touched.insert(match_id);
        Ok(m)
    }

    pub fn matches(&self) -> impl Iterator<Item = &Match> {
        self.matches.values()
    }

    /// Replace a match without propagating (report bookkeeping, status moves)
    pub fn update(&mut self, updated: Match) -> BracketResult<()> {
        let slot = self.get_mut(updated.id)?;
        *slot = updated;
        Ok(())
    }

    /// Settle `match_id` with a winner and push both outputs downstream
    pub fn decide(
        &mut self,
        match_id: MatchId,
        winner_id: ParticipantId,
        score: Option<Scoreline>,
        status: MatchStatus,
    ) -> BracketResult<()> {
        if self.get(match_id)?.slot_of(winner_id).is_none() {
            return Err(BracketError::NotInMatch {
                match_id,
                participant_id: winner_id,
            });
        }

        let now = self.now;
        let m = self.get_mut(match_id)?;
        m.winner_id = Some(winner_id);
        m.score = score;
        m.status = status;
        m.confirmed_at = Some(now);
        m.awaiting_since = None;
        m.updated_at = now;
        self.propagate(match_id)
    }

    /// Settle `match_id` with no winner; both outputs become vacant
    pub fn void(&mut self, match_id: MatchId) -> BracketResult<()> {
        let now = self.now;
        let m = self.get_mut(match_id)?;
        m.winner_id = None;
        m.score = None;
        m.status = MatchStatus::Resolved;
        m.confirmed_at = Some(now);
        m.awaiting_since = None;
        m.updated_at = now;
        self.propagate(match_id)
    }

    /// Reset `match_id` to be played again and retract its outputs
    pub fn replay(&mut self, match_id: MatchId) -> BracketResult<()> {
        let now = self.now;
        let m = self.get_mut(match_id)?;
        m.clear_result();
        m.status = match (m.slot1, m.slot2) {
            (SlotState::Filled(_), SlotState::Filled(_)) => MatchStatus::Scheduled,
            _ => MatchStatus::Pending,
        };
        m.updated_at = now;
        self.propagate(match_id)
    }

    /// Re-derive a match's status from its slots, settling byes and dead
    /// matches, then propagate
    pub fn refresh(&mut self, match_id: MatchId) -> BracketResult<()> {
        let now = self.now;
        let m = self.get_mut(match_id)?;
        if !m.is_terminal() {
            match (m.slot1, m.slot2) {
                (SlotState::Filled(_), SlotState::Filled(_)) => {
                    if m.status == MatchStatus::Pending {
                        m.status = MatchStatus::Scheduled;
                    }
                }
                (SlotState::Filled(p), SlotState::Vacant)
                | (SlotState::Vacant, SlotState::Filled(p)) => {
                    m.status = MatchStatus::Confirmed;
                    m.winner_id = Some(p);
                    m.score = None;
                    m.confirmed_at = Some(now);
                }
                (SlotState::Vacant, SlotState::Vacant) => {
                    m.status = MatchStatus::Confirmed;
                    m.winner_id = None;
                    m.score = None;
                    m.confirmed_at = Some(now);
                }
                _ => {
                    if m.status == MatchStatus::Scheduled {
                        m.status = MatchStatus::Pending;
                    }
                }
            }
            m.updated_at = now;
        }
        self.propagate(match_id)
    }

    /// (winner output, loser output) of a match
    fn outputs(m: &Match) -> (SlotState, SlotState) {
        if !m.is_terminal() {
            return (SlotState::Open, SlotState::Open);
        }
        match m.winner_id {
            None => (SlotState::Vacant, SlotState::Vacant),
            // Winners-side champion took the first grand final: no reset.
            Some(w) if m.is_resettable_grand_final() && m.slot1 == SlotState::Filled(w) => {
                (SlotState::Vacant, SlotState::Vacant)
            }
            Some(w) => (
                SlotState::Filled(w),
                m.loser_id().map_or(SlotState::Vacant, SlotState::Filled),
            ),
        }
    }

    fn propagate(&mut self, match_id: MatchId) -> BracketResult<()> {
        let m = self.get(match_id)?;
        let (winner_out, loser_out) = Self::outputs(m);
        let (next, next_loser) = (m.next_match, m.next_loser_match);

        if let Some(target) = next {
            self.place(target, winner_out)?;
        }
        if let Some(target) = next_loser {
            self.place(target, loser_out)?;
        }
        Ok(())
    }

    fn place(&mut self, target: SlotRef, value: SlotState) -> BracketResult<()> {
        let m = self.get(target.match_id)?;
        if m.slot(target.slot) == value {
            return Ok(());
        }

        let reopen = if m.is_auto_settled() {
            true
        } else if matches!(m.status, MatchStatus::Pending | MatchStatus::Scheduled) {
            false
        } else {
            return Err(BracketError::DownstreamLocked {
                match_id: m.id,
                status: m.status,
            });
        };

        let m = self.get_mut(target.match_id)?;
        if reopen {
            m.clear_result();
            m.status = MatchStatus::Pending;
        }
        m.set_slot(target.slot, value);
        self.refresh(target.match_id)
    }

    /// Champion, no champion, or still running
    pub fn standing(&self) -> Standing {
        for m in self.matches.values().filter(|m| m.is_terminal()) {
            let Some(winner) = m.winner_id else {
                continue;
            };
            let is_last = match m.next_match {
                None => true,
                Some(edge) => self
                    .matches
                    .get(&edge.match_id)
                    .is_some_and(|next| next.is_terminal() && next.is_dead()),
            };
            if is_last {
                return Standing::Champion {
                    participant_id: winner,
                    match_id: m.id,
                };
            }
        }

        let mut sinks = self.matches.values().filter(|m| m.next_match.is_none()).peekable();
        let first_sink = sinks.peek().map(|m| m.id);
        if let Some(match_id) = first_sink {
            if sinks.all(|m| m.is_terminal() && m.winner_id.is_none()) {
                return Standing::NoChampion { match_id };
            }
        }
        Standing::InProgress
    }

    /// Matches changed since construction, in id order
    pub fn touched(&self) -> Vec<Match> {
        self.touched
            .iter()
            .filter_map(|id| self.matches.get(id).cloned())
            .collect()
    }

    pub fn into_matches(self) -> Vec<Match> {
        self.matches.into_values().collect()
    }
}
