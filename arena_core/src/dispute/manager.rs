//! Dispute resolver.

use super::{
    errors::{DisputeError, DisputeResult},
    models::{DisputeStatus, DisputeTicket, NewDisputeTicket, TicketId, Verdict},
};
use crate::config::EngineConfig;
use crate::db::{DisputeRepository, StoreError};
use crate::error::Entity;
use crate::locks::KeyedLocks;
use crate::matches::{Match, MatchError, MatchId, MatchManager, MatchStatus};
use crate::tournament::ParticipantId;
use crate::wallet::UserId;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Ticket and match after a verdict was applied
#[derive(Debug, Clone)]
pub struct Resolution {
    pub ticket: DisputeTicket,
    pub outcome: Match,
}

/// Dispute resolver
#[derive(Clone)]
pub struct DisputeResolver {
    repo: Arc<dyn DisputeRepository>,
    matches: MatchManager,
    locks: Arc<KeyedLocks<TicketId>>,
    config: Arc<EngineConfig>,
}

impl DisputeResolver {
    pub fn new(
        repo: Arc<dyn DisputeRepository>,
        matches: MatchManager,
        locks: Arc<KeyedLocks<TicketId>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            repo,
            matches,
            locks,
            config,
        }
    }

    pub async fn get_ticket(&self, ticket_id: TicketId) -> DisputeResult<DisputeTicket> {
        self.repo
            .find_ticket(ticket_id)
            .await?
            .ok_or(DisputeError::TicketNotFound(ticket_id))
    }

    pub async fn tickets_for_match(&self, match_id: MatchId) -> DisputeResult<Vec<DisputeTicket>> {
        Ok(self.repo.tickets_for_match(match_id).await?)
    }

    /// Contest a reported or confirmed result
    ///
    /// An awaiting match moves to `Disputed`; a confirmed match keeps its
    /// outcome until a verdict.
    ///
    /// # Errors
    ///
    /// * `DisputeError::Unauthorized` - Reporter does not play in the match
    /// * `DisputeError::NotDisputable` - Match is neither awaiting nor confirmed
    /// * `DisputeError::ByeMatch` - Match was a bye
    /// * `DisputeError::WindowClosed` - Confirmed too long ago
    /// * `DisputeError::AlreadyOpen` - Match already has an active ticket
    pub async fn open_dispute(
        &self,
        match_id: MatchId,
        reporter_id: ParticipantId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DisputeResult<DisputeTicket> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DisputeError::MissingReason);
        }

        let (_guards, m) = self.matches.lock_transition(match_id).await?;
        self.matches.ensure_active(&m).await?;
        if m.slot_of(reporter_id).is_none() {
            return Err(DisputeError::Unauthorized {
                match_id,
                participant_id: reporter_id,
            });
        }
        if m.is_bye() {
            return Err(DisputeError::ByeMatch(match_id));
        }

        let mut affected = Vec::new();
        match m.status {
            MatchStatus::AwaitingConfirmation => {
                let mut disputed = m.clone();
                disputed.status = MatchStatus::Disputed;
                disputed.awaiting_since = None;
                disputed.updated_at = now;
                affected.push(disputed);
            }
            MatchStatus::Confirmed => {
                let confirmed_at = m.confirmed_at.unwrap_or(m.updated_at);
                if now - confirmed_at > self.config.dispute_window() {
                    return Err(DisputeError::WindowClosed(match_id));
                }
            }
            status => return Err(DisputeError::NotDisputable { match_id, status }),
        }

        if self.repo.active_ticket_for_match(match_id).await?.is_some() {
            return Err(DisputeError::AlreadyOpen(match_id));
        }

        let request = NewDisputeTicket {
            match_id,
            tournament_id: m.tournament_id,
            reporter_id,
            reason: reason.to_string(),
            created_at: now,
        };
        let (ticket, _) = self
            .repo
            .open_ticket(&request, &affected)
            .await
            .map_err(|err| match err {
                StoreError::Duplicate {
                    entity: Entity::DisputeTicket,
                    ..
                } => DisputeError::AlreadyOpen(match_id),
                other => other.into(),
            })?;

        log::info!(
            "Dispute ticket {} opened on match {} by participant {}",
            ticket.id,
            match_id,
            reporter_id
        );
        Ok(ticket)
    }

    /// Take an open ticket into review
    pub async fn begin_review(
        &self,
        ticket_id: TicketId,
        moderator_id: UserId,
    ) -> DisputeResult<DisputeTicket> {
        let _guard = self.locks.acquire(ticket_id).await;
        let ticket = self.get_ticket(ticket_id).await?;
        match ticket.status {
            DisputeStatus::Open => {}
            status if status.is_active() => {
                return Err(DisputeError::InvalidTicketState { ticket_id, status });
            }
            status => return Err(DisputeError::AlreadyResolved { ticket_id, status }),
        }

        let mut reviewing = ticket;
        reviewing.status = DisputeStatus::UnderReview;
        reviewing.moderator_id = Some(moderator_id);
        let (saved, _) = self.repo.update_ticket(&reviewing, &[]).await?;
        log::debug!("Dispute ticket {} under review by {}", ticket_id, moderator_id);
        Ok(saved)
    }

    /// Apply a moderator verdict to the match and close the ticket
    ///
    /// Win verdicts force the winner and re-propagate it. Replay clears the
    /// match and retracts its downstream placements. Void eliminates both
    /// participants. Ticket and bracket changes are stored as one write.
    ///
    /// # Errors
    ///
    /// * `DisputeError::AlreadyResolved` - Ticket is no longer active
    /// * `DisputeError::Bracket` - A downstream match already progressed
    pub async fn resolve_dispute(
        &self,
        ticket_id: TicketId,
        moderator_id: UserId,
        verdict: Verdict,
        details: &str,
        now: DateTime<Utc>,
    ) -> DisputeResult<Resolution> {
        let _ticket_guard = self.locks.acquire(ticket_id).await;
        let ticket = self.get_ticket(ticket_id).await?;
        if !ticket.status.is_active() {
            return Err(DisputeError::AlreadyResolved {
                ticket_id,
                status: ticket.status,
            });
        }

        let (_guards, m) = self.matches.lock_transition(ticket.match_id).await?;
        self.matches.ensure_active(&m).await?;

        let mut arena = self.matches.load_bracket(m.tournament_id, now).await?;
        match verdict.winning_slot() {
            Some(slot) => {
                let winner = m.participant(slot).ok_or(MatchError::InvalidMatchState {
                    match_id: m.id,
                    status: m.status,
                })?;
                // keep the scoreline of whichever report agrees with the verdict
                let score = [m.report1.as_ref(), m.report2.as_ref()]
                    .into_iter()
                    .flatten()
                    .map(|r| r.score)
                    .find(|score| score.winner() == Some(slot));
                arena.decide(m.id, winner, score, MatchStatus::Resolved)?;
            }
            None if verdict == Verdict::Replay => arena.replay(m.id)?,
            None => arena.void(m.id)?,
        }

        let mut closed = ticket;
        closed.status = verdict.ticket_status();
        closed.verdict = Some(verdict);
        closed.resolution = Some(details.to_string());
        closed.moderator_id = Some(moderator_id);
        closed.resolved_at = Some(now);

        let (ticket, saved) = self.repo.update_ticket(&closed, &arena.touched()).await?;
        let outcome = match saved.into_iter().find(|s| s.id == m.id) {
            Some(outcome) => outcome,
            None => self.matches.get_match(m.id).await?,
        };

        log::info!(
            "Dispute ticket {} resolved by {}: {} (match {} now {})",
            ticket_id,
            moderator_id,
            verdict,
            outcome.id,
            outcome.status
        );
        Ok(Resolution { ticket, outcome })
    }

    /// Close a ticket without touching the match
    ///
    /// Refused while the match itself is disputed, since only a verdict can
    /// move it out of that state.
    pub async fn dismiss_dispute(
        &self,
        ticket_id: TicketId,
        moderator_id: UserId,
        details: &str,
        now: DateTime<Utc>,
    ) -> DisputeResult<DisputeTicket> {
        let _guard = self.locks.acquire(ticket_id).await;
        let ticket = self.get_ticket(ticket_id).await?;
        if !ticket.status.is_active() {
            return Err(DisputeError::AlreadyResolved {
                ticket_id,
                status: ticket.status,
            });
        }

        let m = self.matches.get_match(ticket.match_id).await?;
        if m.status == MatchStatus::Disputed {
            return Err(DisputeError::VerdictRequired(m.id));
        }

        let mut closed = ticket;
        closed.status = DisputeStatus::Closed;
        closed.resolution = Some(details.to_string());
        closed.moderator_id = Some(moderator_id);
        closed.resolved_at = Some(now);
        let (saved, _) = self.repo.update_ticket(&closed, &[]).await?;
        log::info!("Dispute ticket {} dismissed by {}", ticket_id, moderator_id);
        Ok(saved)
    }
}
