//! Periodic lifecycle tick.
//!
//! The tick holds no state between runs: every pass is driven by what the
//! store says at `now`, so an interrupted tick is finished by the next one.

use super::manager::TournamentManager;
use super::models::{StartOutcome, Tournament, TournamentId, TournamentStatus};
use crate::config::EngineConfig;
use crate::db::TournamentRepository;
use crate::error::Entity;
use crate::matches::{MatchId, MatchManager};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

/// One step that failed during a tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickFailure {
    pub entity: Entity,
    pub id: i64,
    pub error: String,
}

/// What a tick did
#[derive(Debug, Clone, Default, Serialize)]
pub struct LifecycleReport {
    pub started: Vec<TournamentId>,
    pub canceled: Vec<TournamentId>,
    pub completed: Vec<TournamentId>,
    pub refunds_resumed: Vec<TournamentId>,
    pub auto_confirmed: Vec<MatchId>,
    pub failures: Vec<TickFailure>,
}

impl LifecycleReport {
    /// True when the tick changed nothing and nothing failed
    pub fn is_idle(&self) -> bool {
        self.started.is_empty()
            && self.canceled.is_empty()
            && self.completed.is_empty()
            && self.refunds_resumed.is_empty()
            && self.auto_confirmed.is_empty()
            && self.failures.is_empty()
    }

    fn fail(&mut self, entity: Entity, id: i64, error: impl Display) {
        log::warn!("Lifecycle step for {} {} failed: {}", entity, id, error);
        self.failures.push(TickFailure {
            entity,
            id,
            error: error.to_string(),
        });
    }
}

/// Lifecycle driver
#[derive(Clone)]
pub struct LifecycleDriver {
    repo: Arc<dyn TournamentRepository>,
    tournaments: TournamentManager,
    matches: MatchManager,
    config: Arc<EngineConfig>,
}

impl LifecycleDriver {
    pub fn new(
        repo: Arc<dyn TournamentRepository>,
        tournaments: TournamentManager,
        matches: MatchManager,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            repo,
            tournaments,
            matches,
            config,
        }
    }

    /// Run one step under the per-step time budget
    async fn step<T, E: Display>(
        &self,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, String> {
        let budget = self.config.tick_step_timeout();
        match tokio::time::timeout(budget, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("step timed out after {budget:?}")),
        }
    }

    /// Advance everything that is due at `now`
    ///
    /// Passes, in order: start or cancel due tournaments, resume pending
    /// refunds, complete decided tournaments, auto-confirm matches past the
    /// confirmation window. Each pass handles at most
    /// `max_tournaments_per_tick` rows. A failing row is reported, skipped and
    /// moved to the back of its pass.
    pub async fn run_lifecycle_tick(&self, now: DateTime<Utc>) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        let limit = self.config.max_tournaments_per_tick;

        self.start_due(now, limit, &mut report).await;
        self.resume_refunds(limit, &mut report).await;
        self.complete_decided(now, limit, &mut report).await;
        self.auto_confirm(now, &mut report).await;

        if !report.is_idle() {
            log::info!(
                "Lifecycle tick: {} started, {} canceled, {} completed, {} refunds resumed, {} auto-confirmed, {} failures",
                report.started.len(),
                report.canceled.len(),
                report.completed.len(),
                report.refunds_resumed.len(),
                report.auto_confirmed.len(),
                report.failures.len()
            );
        }
        report
    }

    async fn start_due(&self, now: DateTime<Utc>, limit: i64, report: &mut LifecycleReport) {
        let mut due = match self.repo.due_tournaments(now, limit).await {
            Ok(due) => due,
            Err(e) => return report.fail(Entity::Tournament, 0, e),
        };
        // left behind by a tick that died between claim and decision
        match self
            .repo
            .tournaments_with_status(TournamentStatus::AwaitingDecision, limit)
            .await
        {
            Ok(stuck) => due.extend(stuck),
            Err(e) => report.fail(Entity::Tournament, 0, e),
        }

        for tournament in due.into_iter().take(usize::try_from(limit).unwrap_or(0)) {
            match self
                .step(self.tournaments.begin_tournament(tournament.id, now))
                .await
            {
                Ok(StartOutcome::Started { .. }) => report.started.push(tournament.id),
                Ok(StartOutcome::Canceled { .. }) => report.canceled.push(tournament.id),
                Err(e) => report.fail(Entity::Tournament, tournament.id, e),
            }
        }
    }

    async fn resume_refunds(&self, limit: i64, report: &mut LifecycleReport) {
        let pending = match self.repo.pending_refunds(limit).await {
            Ok(pending) => pending,
            Err(e) => return report.fail(Entity::Tournament, 0, e),
        };
        for tournament in pending {
            match self.step(self.tournaments.resume_refunds(tournament.id)).await {
                Ok(done) if !done.tournament.refund_pending => {
                    report.refunds_resumed.push(tournament.id)
                }
                Ok(partial) => {
                    report.fail(
                        Entity::Tournament,
                        tournament.id,
                        format!("{} refunds still outstanding", partial.refunds.failed.len()),
                    );
                    self.requeue(&partial.tournament).await;
                }
                Err(e) => {
                    report.fail(Entity::Tournament, tournament.id, e);
                    self.requeue(&tournament).await;
                }
            }
        }
    }

    async fn complete_decided(&self, now: DateTime<Utc>, limit: i64, report: &mut LifecycleReport) {
        let decided = match self.repo.decided_tournaments(limit).await {
            Ok(decided) => decided,
            Err(e) => return report.fail(Entity::Tournament, 0, e),
        };
        for tournament in decided {
            match self
                .step(self.tournaments.complete_if_decided(tournament.id, now))
                .await
            {
                Ok(Some(_)) => report.completed.push(tournament.id),
                Ok(None) => {}
                Err(e) => {
                    report.fail(Entity::Tournament, tournament.id, e);
                    self.requeue(&tournament).await;
                }
            }
        }
    }

    /// Rewrite a row unchanged so its `updated_at` puts it behind the other
    /// rows of the same pass
    ///
    /// A lost version check is fine: the competing write moved the row too.
    async fn requeue(&self, tournament: &Tournament) {
        if let Err(e) = self.repo.update_tournament(tournament).await {
            log::debug!("Tournament {} not requeued: {}", tournament.id, e);
        }
    }

    async fn auto_confirm(&self, now: DateTime<Utc>, report: &mut LifecycleReport) {
        let overdue = match self.matches.overdue_matches(now).await {
            Ok(overdue) => overdue,
            Err(e) => return report.fail(Entity::Match, 0, e),
        };
        for m in overdue {
            match self.step(self.matches.confirm_match(m.id, now)).await {
                Ok(_) => report.auto_confirmed.push(m.id),
                Err(e) => {
                    report.fail(Entity::Match, m.id, e);
                    continue;
                }
            }
            match self
                .step(self.tournaments.complete_if_decided(m.tournament_id, now))
                .await
            {
                Ok(Some(_)) if !report.completed.contains(&m.tournament_id) => {
                    report.completed.push(m.tournament_id)
                }
                Ok(_) => {}
                Err(e) => report.fail(Entity::Tournament, m.tournament_id, e),
            }
        }
    }
}
