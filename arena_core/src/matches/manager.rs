//! Match state machine.

use super::{
    errors::{MatchError, MatchResult},
    models::{Match, MatchId, MatchSlot, MatchStatus, ResultReport, Scoreline},
};
use crate::bracket::BracketArena;
use crate::config::EngineConfig;
use crate::db::{DisputeRepository, MatchRepository, StoreError, TournamentRepository};
use crate::dispute::NewDisputeTicket;
use crate::error::Entity;
use crate::locks::{KeyGuard, KeyedLocks};
use crate::tournament::{ParticipantId, TournamentId, TournamentStatus};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Reason recorded on tickets opened by disagreeing reports
pub const CONFLICTING_REPORTS: &str = "conflicting result reports";

/// Match manager
#[derive(Clone)]
pub struct MatchManager {
    matches: Arc<dyn MatchRepository>,
    tournaments: Arc<dyn TournamentRepository>,
    disputes: Arc<dyn DisputeRepository>,
    locks: Arc<KeyedLocks<MatchId>>,
    config: Arc<EngineConfig>,
}

impl MatchManager {
    pub fn new(
        matches: Arc<dyn MatchRepository>,
        tournaments: Arc<dyn TournamentRepository>,
        disputes: Arc<dyn DisputeRepository>,
        locks: Arc<KeyedLocks<MatchId>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            matches,
            tournaments,
            disputes,
            locks,
            config,
        }
    }

    pub async fn get_match(&self, match_id: MatchId) -> MatchResult<Match> {
        self.matches
            .find_match(match_id)
            .await?
            .ok_or(MatchError::MatchNotFound(match_id))
    }

    pub async fn tournament_matches(&self, tournament_id: TournamentId) -> MatchResult<Vec<Match>> {
        Ok(self.matches.tournament_matches(tournament_id).await?)
    }

    /// Whether any match of the tournament has a ticket awaiting a moderator
    pub async fn has_active_dispute(&self, tournament_id: TournamentId) -> MatchResult<bool> {
        Ok(!self
            .disputes
            .active_tickets_for_tournament(tournament_id)
            .await?
            .is_empty())
    }

    /// Lock a match and its immediate downstream matches, then re-read it
    ///
    /// The guards must be held until the transition is stored.
    pub async fn lock_transition(&self, match_id: MatchId) -> MatchResult<(Vec<KeyGuard>, Match)> {
        let seen = self.get_match(match_id).await?;
        let keys = [Some(seen.id), seen.next_match_id(), seen.next_loser_match_id()];
        let guards = self.locks.acquire_many(keys.into_iter().flatten()).await;
        let fresh = self.get_match(match_id).await?;
        Ok((guards, fresh))
    }

    /// Working copy of the whole bracket a match belongs to
    pub async fn load_bracket(
        &self,
        tournament_id: TournamentId,
        now: DateTime<Utc>,
    ) -> MatchResult<BracketArena> {
        let matches = self.matches.tournament_matches(tournament_id).await?;
        Ok(BracketArena::new(matches, now))
    }

    /// Persist every match the arena changed, version-checked as one unit
    pub async fn save_bracket(&self, arena: &BracketArena) -> MatchResult<Vec<Match>> {
        Ok(self.matches.save_matches(&arena.touched()).await?)
    }

    pub(crate) async fn ensure_active(&self, m: &Match) -> MatchResult<()> {
        let status = self
            .tournaments
            .find_tournament(m.tournament_id)
            .await?
            .map(|t| t.status);
        match status {
            Some(TournamentStatus::Ongoing) => Ok(()),
            Some(status) => Err(MatchError::TournamentNotActive {
                tournament_id: m.tournament_id,
                status,
            }),
            None => Err(StoreError::not_found(Entity::Tournament, m.tournament_id).into()),
        }
    }

    fn participant_slot(m: &Match, participant_id: ParticipantId) -> MatchResult<MatchSlot> {
        m.slot_of(participant_id).ok_or(MatchError::Unauthorized {
            match_id: m.id,
            participant_id,
        })
    }

    /// Mark a scheduled match as being played
    ///
    /// # Errors
    ///
    /// * `MatchError::Unauthorized` - Caller does not play in the match
    /// * `MatchError::InvalidMatchState` - Match is not scheduled
    pub async fn start_match(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        now: DateTime<Utc>,
    ) -> MatchResult<Match> {
        let _guard = self.locks.acquire(match_id).await;
        let m = self.get_match(match_id).await?;
        self.ensure_active(&m).await?;
        Self::participant_slot(&m, participant_id)?;
        if m.status != MatchStatus::Scheduled {
            return Err(MatchError::InvalidMatchState {
                match_id,
                status: m.status,
            });
        }

        let mut started = m;
        started.status = MatchStatus::InProgress;
        started.started_at = Some(now);
        started.updated_at = now;
        let saved = self.matches.save_matches(&[started]).await?;
        log::info!("Match {} started by participant {}", match_id, participant_id);
        saved
            .into_iter()
            .next()
            .ok_or(MatchError::MatchNotFound(match_id))
    }

    /// Record one participant's view of the result
    ///
    /// With both views present the match either confirms (winners agree) or
    /// becomes disputed with a ticket opened in the same write.
    ///
    /// # Arguments
    ///
    /// * `match_id` - Match being reported
    /// * `participant_id` - Reporting participant; must hold a slot
    /// * `score` - Declared scoreline, ordered by slot
    /// * `proof_ref` - Optional reference to evidence
    /// * `now` - Submission time
    ///
    /// # Errors
    ///
    /// * `MatchError::InvalidMatchState` - Match does not accept reports
    /// * `MatchError::Unauthorized` - Caller does not play in the match
    /// * `MatchError::InvalidScore` - Scoreline names no winner
    pub async fn submit_result(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        score: Scoreline,
        proof_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> MatchResult<Match> {
        let (_guards, m) = self.lock_transition(match_id).await?;
        self.ensure_active(&m).await?;
        if !m.status.accepts_reports() {
            return Err(MatchError::InvalidMatchState {
                match_id,
                status: m.status,
            });
        }
        let slot = Self::participant_slot(&m, participant_id)?;
        if score.winner().is_none() {
            return Err(MatchError::InvalidScore {
                match_id,
                reason: format!("{score} is a draw"),
            });
        }

        let mut updated = m.clone();
        updated.set_report(
            slot,
            Some(ResultReport {
                score,
                proof_ref,
                submitted_at: now,
            }),
        );
        updated.updated_at = now;

        let Some(earlier) = m.report(slot.other()).cloned() else {
            updated.status = MatchStatus::AwaitingConfirmation;
            updated.awaiting_since = updated.awaiting_since.or(Some(now));
            let saved = self.matches.save_matches(&[updated]).await?;
            log::debug!(
                "Match {} awaiting confirmation after report from {}",
                match_id,
                participant_id
            );
            return saved
                .into_iter()
                .next()
                .ok_or(MatchError::MatchNotFound(match_id));
        };

        if earlier.score.winner() == score.winner() {
            let winner_slot = earlier.score.winner().unwrap_or(slot);
            let winner = updated
                .participant(winner_slot)
                .ok_or(MatchError::InvalidMatchState {
                    match_id,
                    status: m.status,
                })?;
            let mut arena = self.load_bracket(m.tournament_id, now).await?;
            arena.update(updated)?;
            arena.decide(match_id, winner, Some(earlier.score), MatchStatus::Confirmed)?;
            self.save_bracket(&arena).await?;
            log::info!(
                "Match {} confirmed by agreeing reports, winner {}",
                match_id,
                winner
            );
            return self.get_match(match_id).await;
        }

        updated.status = MatchStatus::Disputed;
        updated.awaiting_since = None;
        let ticket = NewDisputeTicket {
            match_id,
            tournament_id: m.tournament_id,
            reporter_id: participant_id,
            reason: CONFLICTING_REPORTS.to_string(),
            created_at: now,
        };
        let (ticket, saved) = self.disputes.open_ticket(&ticket, &[updated]).await?;
        log::warn!(
            "Match {} disputed: reports disagree (ticket {})",
            match_id,
            ticket.id
        );
        saved
            .into_iter()
            .next()
            .ok_or(MatchError::MatchNotFound(match_id))
    }

    /// Confirm a reported match from its single report
    ///
    /// Confirming an already confirmed or resolved match returns it unchanged.
    pub async fn confirm_match(&self, match_id: MatchId, now: DateTime<Utc>) -> MatchResult<Match> {
        let (_guards, m) = self.lock_transition(match_id).await?;
        if m.is_terminal() {
            return Ok(m);
        }
        self.ensure_active(&m).await?;
        if m.status != MatchStatus::AwaitingConfirmation {
            return Err(MatchError::InvalidMatchState {
                match_id,
                status: m.status,
            });
        }

        let invalid = || MatchError::InvalidMatchState {
            match_id,
            status: m.status,
        };
        let report = m
            .report1
            .as_ref()
            .or(m.report2.as_ref())
            .ok_or_else(invalid)?;
        let winner = report
            .score
            .winner()
            .and_then(|slot| m.participant(slot))
            .ok_or_else(invalid)?;

        let mut arena = self.load_bracket(m.tournament_id, now).await?;
        arena.decide(match_id, winner, Some(report.score), MatchStatus::Confirmed)?;
        self.save_bracket(&arena).await?;
        log::info!("Match {} confirmed, winner {}", match_id, winner);
        self.get_match(match_id).await
    }

    /// Matches past the confirmation window
    pub async fn overdue_matches(&self, now: DateTime<Utc>) -> MatchResult<Vec<Match>> {
        let Some(cutoff) = now.checked_sub_signed(self.config.confirmation_window()) else {
            return Ok(Vec::new());
        };
        Ok(self
            .matches
            .matches_awaiting_since(cutoff, self.config.max_tournaments_per_tick)
            .await?)
    }
}
