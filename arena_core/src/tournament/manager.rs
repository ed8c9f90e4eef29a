//! Tournament manager: registration, start decision, cancellation and
//! completion.

use super::{
    errors::{TournamentError, TournamentResult},
    models::{
        NewParticipant, NewTournament, Participant, ParticipantId, ParticipantRef,
        ParticipantStatus, ParticipantType, StartOutcome, Tournament, TournamentId,
        TournamentStatus,
    },
};
use crate::bracket::{BracketArena, Standing, build_bracket};
use crate::config::EngineConfig;
use crate::db::{StoreError, TournamentRepository};
use crate::error::Entity;
use crate::locks::KeyedLocks;
use crate::matches::MatchManager;
use crate::wallet::{Ledger, RefundReport, UserId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// Reason recorded on refunds issued because too few participants showed up
pub const NOT_ENOUGH_PARTICIPANTS: &str = "not enough eligible participants";

/// Tournament state and refunds after a cancellation
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub tournament: Tournament,
    pub refunds: RefundReport,
}

/// Tournament manager
#[derive(Clone)]
pub struct TournamentManager {
    repo: Arc<dyn TournamentRepository>,
    ledger: Ledger,
    matches: MatchManager,
    locks: Arc<KeyedLocks<TournamentId>>,
    config: Arc<EngineConfig>,
}

impl TournamentManager {
    /// Create a new tournament manager
    pub fn new(
        repo: Arc<dyn TournamentRepository>,
        ledger: Ledger,
        matches: MatchManager,
        locks: Arc<KeyedLocks<TournamentId>>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            repo,
            ledger,
            matches,
            locks,
            config,
        }
    }

    /// Create a new tournament in `Upcoming`
    ///
    /// # Errors
    ///
    /// * `TournamentError::InvalidRequest` - Capacity, threshold or amounts out of range
    pub async fn create_tournament(
        &self,
        request: NewTournament,
        now: DateTime<Utc>,
    ) -> TournamentResult<Tournament> {
        request.validate().map_err(TournamentError::InvalidRequest)?;
        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| self.config.default_currency.clone());
        let tournament = self.repo.create_tournament(&request, &currency, now).await?;
        log::info!(
            "Created tournament {} '{}' ({}, {} slots)",
            tournament.id,
            tournament.name,
            tournament.bracket_kind,
            tournament.max_participants
        );
        Ok(tournament)
    }

    pub async fn get_tournament(&self, tournament_id: TournamentId) -> TournamentResult<Tournament> {
        self.repo
            .find_tournament(tournament_id)
            .await?
            .ok_or(TournamentError::TournamentNotFound(tournament_id))
    }

    pub async fn get_participant(
        &self,
        participant_id: ParticipantId,
    ) -> TournamentResult<Participant> {
        self.repo
            .find_participant(participant_id)
            .await?
            .ok_or(TournamentError::ParticipantNotFound(participant_id))
    }

    pub async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> TournamentResult<Vec<Participant>> {
        Ok(self.repo.list_participants(tournament_id).await?)
    }

    fn require_status(
        tournament: &Tournament,
        expected: TournamentStatus,
        operation: &'static str,
    ) -> TournamentResult<()> {
        if tournament.status == expected {
            Ok(())
        } else {
            Err(TournamentError::InvalidState {
                tournament_id: tournament.id,
                status: tournament.status,
                operation,
            })
        }
    }

    /// Register a user or team
    ///
    /// The capacity check, the registration row and the entry-fee debit are
    /// stored together; a refused debit leaves no registration behind.
    ///
    /// # Arguments
    ///
    /// * `tournament_id` - Tournament to join
    /// * `identity` - Registering user or team
    /// * `payer_id` - User whose wallet pays the fee; a user must pay for itself
    /// * `now` - Registration time
    ///
    /// # Errors
    ///
    /// * `TournamentError::InvalidState` - Registration is closed
    /// * `TournamentError::TournamentFull` - No capacity left
    /// * `TournamentError::AlreadyRegistered` - Identity already registered
    /// * `TournamentError::Wallet` - Payer has no wallet or too little balance
    pub async fn register_participant(
        &self,
        tournament_id: TournamentId,
        identity: ParticipantRef,
        payer_id: UserId,
        now: DateTime<Utc>,
    ) -> TournamentResult<Participant> {
        if identity.kind == ParticipantType::User && identity.id != payer_id {
            return Err(TournamentError::PayerMismatch { identity, payer_id });
        }

        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.get_tournament(tournament_id).await?;
        Self::require_status(&tournament, TournamentStatus::Upcoming, "register")?;
        if !tournament.has_capacity() {
            return Err(TournamentError::TournamentFull(tournament_id));
        }
        if self
            .repo
            .find_participant_by_identity(tournament_id, identity)
            .await?
            .is_some()
        {
            return Err(TournamentError::AlreadyRegistered {
                tournament_id,
                identity,
            });
        }

        let fee = if tournament.entry_fee.is_positive() {
            let wallet = self.ledger.wallet_for_owner(payer_id).await?;
            Some(self.ledger.entry_fee_request(
                tournament_id,
                identity,
                wallet.id,
                payer_id,
                tournament.entry_fee,
            ))
        } else {
            None
        };

        let request = NewParticipant {
            tournament_id,
            identity,
            payer_id,
            registered_at: now,
        };
        let (participant, _fee_tx) = self
            .repo
            .register_participant(&request, fee.as_ref())
            .await
            .map_err(|err| match err {
                StoreError::Duplicate {
                    entity: Entity::Participant,
                    ..
                } => TournamentError::AlreadyRegistered {
                    tournament_id,
                    identity,
                },
                other => other.into(),
            })?;

        log::info!(
            "Registered {} in tournament {} as participant {} (fee {})",
            identity,
            tournament_id,
            participant.id,
            tournament.entry_fee
        );
        Ok(participant)
    }

    /// Withdraw before the start and refund the entry fee
    pub async fn withdraw_participant(
        &self,
        participant_id: ParticipantId,
    ) -> TournamentResult<Participant> {
        let participant = self.get_participant(participant_id).await?;
        let _guard = self.locks.acquire(participant.tournament_id).await;
        let participant = self.get_participant(participant_id).await?;
        let tournament = self.get_tournament(participant.tournament_id).await?;
        Self::require_status(&tournament, TournamentStatus::Upcoming, "withdraw")?;
        if participant.status != ParticipantStatus::Registered {
            return Err(TournamentError::InvalidParticipantState {
                participant_id,
                operation: "withdraw",
            });
        }

        let refund = if tournament.entry_fee.is_positive() {
            let wallet = self.ledger.wallet_for_owner(participant.payer_id).await?;
            Some(self.ledger.refund_request(
                tournament.id,
                participant.identity,
                wallet.id,
                tournament.entry_fee,
                "withdrawn",
            ))
        } else {
            None
        };

        let (withdrawn, posting) = self
            .repo
            .withdraw_participant(&participant, refund.as_ref())
            .await?;
        log::info!(
            "Participant {} withdrew from tournament {} (refund {})",
            participant_id,
            tournament.id,
            posting.map_or_else(|| "none".to_string(), |p| p.transaction().amount.to_string())
        );
        Ok(withdrawn)
    }

    /// Mark a registrant present
    pub async fn check_in(&self, participant_id: ParticipantId) -> TournamentResult<Participant> {
        self.update_registration(participant_id, "check in", |p| p.checked_in = true)
            .await
    }

    /// Set or clear an explicit seed
    pub async fn set_seed(
        &self,
        participant_id: ParticipantId,
        seed: Option<i32>,
    ) -> TournamentResult<Participant> {
        if let Some(seed) = seed.filter(|s| *s < 1) {
            return Err(TournamentError::InvalidRequest(format!(
                "seed must be at least 1, got {seed}"
            )));
        }
        self.update_registration(participant_id, "set seed", |p| p.seed = seed)
            .await
    }

    async fn update_registration(
        &self,
        participant_id: ParticipantId,
        operation: &'static str,
        change: impl FnOnce(&mut Participant),
    ) -> TournamentResult<Participant> {
        let participant = self.get_participant(participant_id).await?;
        let _guard = self.locks.acquire(participant.tournament_id).await;
        let mut participant = self.get_participant(participant_id).await?;
        let tournament = self.get_tournament(participant.tournament_id).await?;
        Self::require_status(&tournament, TournamentStatus::Upcoming, operation)?;
        if participant.status != ParticipantStatus::Registered {
            return Err(TournamentError::InvalidParticipantState {
                participant_id,
                operation,
            });
        }
        change(&mut participant);
        Ok(self.repo.update_participant(&participant).await?)
    }

    /// Cancel a live tournament and refund every entry fee
    ///
    /// The tournament is stored as `Canceled` with `refund_pending` first; the
    /// flag clears only once every refund went through. A partial run is
    /// resumed by [`TournamentManager::resume_refunds`].
    pub async fn cancel_tournament(
        &self,
        tournament_id: TournamentId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> TournamentResult<Cancellation> {
        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.get_tournament(tournament_id).await?;
        if !tournament.status.can_transition_to(TournamentStatus::Canceled) {
            return Err(TournamentError::InvalidState {
                tournament_id,
                status: tournament.status,
                operation: "cancel",
            });
        }
        self.cancel_locked(tournament, reason, now).await
    }

    async fn cancel_locked(
        &self,
        tournament: Tournament,
        reason: &str,
        now: DateTime<Utc>,
    ) -> TournamentResult<Cancellation> {
        let mut canceled = tournament;
        canceled.status = TournamentStatus::Canceled;
        canceled.refund_pending = true;
        canceled.end_date = Some(now);
        let canceled = self.repo.update_tournament(&canceled).await?;
        log::warn!("Tournament {} canceled: {}", canceled.id, reason);
        self.refund_locked(canceled, reason).await
    }

    /// Retry outstanding cancellation refunds
    pub async fn resume_refunds(&self, tournament_id: TournamentId) -> TournamentResult<Cancellation> {
        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.get_tournament(tournament_id).await?;
        Self::require_status(&tournament, TournamentStatus::Canceled, "refund")?;
        if !tournament.refund_pending {
            return Ok(Cancellation {
                tournament,
                refunds: RefundReport::default(),
            });
        }
        self.refund_locked(tournament, "tournament canceled").await
    }

    async fn refund_locked(
        &self,
        tournament: Tournament,
        reason: &str,
    ) -> TournamentResult<Cancellation> {
        let refunds = if tournament.entry_fee.is_positive() {
            self.ledger
                .refund_all(tournament.id, tournament.entry_fee, reason)
                .await?
        } else {
            RefundReport::default()
        };

        if !refunds.is_complete() {
            log::warn!(
                "Tournament {} still has {} refunds outstanding",
                tournament.id,
                refunds.failed.len()
            );
            return Ok(Cancellation {
                tournament,
                refunds,
            });
        }

        let mut settled = tournament;
        settled.refund_pending = false;
        let tournament = self.repo.update_tournament(&settled).await?;
        Ok(Cancellation {
            tournament,
            refunds,
        })
    }

    /// Decide whether a due tournament starts or is canceled
    ///
    /// `Upcoming` is first claimed as `AwaitingDecision`, so a tick that dies
    /// halfway leaves a row the next tick picks up again. With enough eligible
    /// participants the bracket, the participants' final states and the
    /// `Ongoing` status are stored in one write; otherwise the tournament is
    /// canceled and refunded.
    ///
    /// # Errors
    ///
    /// * `TournamentError::InvalidState` - Tournament already decided
    pub async fn begin_tournament(
        &self,
        tournament_id: TournamentId,
        now: DateTime<Utc>,
    ) -> TournamentResult<StartOutcome> {
        let _guard = self.locks.acquire(tournament_id).await;
        let mut tournament = self.get_tournament(tournament_id).await?;
        match tournament.status {
            TournamentStatus::Upcoming => {
                let mut claimed = tournament;
                claimed.status = TournamentStatus::AwaitingDecision;
                tournament = self.repo.update_tournament(&claimed).await?;
            }
            TournamentStatus::AwaitingDecision => {}
            status => {
                return Err(TournamentError::InvalidState {
                    tournament_id,
                    status,
                    operation: "start",
                });
            }
        }

        let registered: Vec<Participant> = self
            .repo
            .list_participants(tournament_id)
            .await?
            .into_iter()
            .filter(|p| p.status == ParticipantStatus::Registered)
            .collect();
        let require_check_in = tournament.settings.require_check_in;
        let eligible: Vec<Participant> = registered
            .iter()
            .filter(|p| p.is_eligible(require_check_in))
            .cloned()
            .collect();
        let required = tournament.min_participants(self.config.min_participants);

        if eligible.len() < required as usize {
            let eligible = eligible.len();
            self.cancel_locked(tournament, NOT_ENOUGH_PARTICIPANTS, now)
                .await?;
            log::info!(
                "Tournament {} canceled at start: {} eligible, {} required",
                tournament_id,
                eligible,
                required
            );
            return Ok(StartOutcome::Canceled { eligible, required });
        }

        let plan = build_bracket(
            tournament_id,
            tournament.bracket_kind,
            &eligible,
            tournament.settings.grand_final_reset,
            now,
        )?;
        let seeds: HashMap<ParticipantId, i32> = plan.seeds.iter().copied().collect();
        let participants: Vec<Participant> = registered
            .into_iter()
            .map(|mut p| {
                match seeds.get(&p.id) {
                    Some(&seed) => {
                        p.status = ParticipantStatus::Active;
                        p.seed = Some(seed);
                    }
                    None => p.status = ParticipantStatus::NoShow,
                }
                p
            })
            .collect();

        let mut ongoing = tournament;
        ongoing.status = TournamentStatus::Ongoing;
        let (_, matches) = self
            .repo
            .start_tournament(&ongoing, &participants, plan.matches)
            .await?;

        log::info!(
            "Tournament {} started with {} participants and {} matches",
            tournament_id,
            seeds.len(),
            matches.len()
        );
        Ok(StartOutcome::Started {
            matches: matches.len(),
        })
    }

    /// Complete a tournament whose bracket is decided
    ///
    /// Pays the prize pool to the champion's payer before marking anything,
    /// keyed so a repeat pays nothing twice. A bracket whose final was voided
    /// completes without a payout. Returns `None` while matches remain or a
    /// dispute ticket still awaits a verdict.
    pub async fn complete_if_decided(
        &self,
        tournament_id: TournamentId,
        now: DateTime<Utc>,
    ) -> TournamentResult<Option<Tournament>> {
        let _guard = self.locks.acquire(tournament_id).await;
        let tournament = self.get_tournament(tournament_id).await?;
        match tournament.status {
            TournamentStatus::Completed => return Ok(Some(tournament)),
            TournamentStatus::Ongoing => {}
            _ => return Ok(None),
        }

        let arena = BracketArena::new(self.matches.tournament_matches(tournament_id).await?, now);
        let standing = arena.standing();
        if standing == Standing::InProgress {
            return Ok(None);
        }
        // a pending verdict may still change who advanced
        if self.matches.has_active_dispute(tournament_id).await? {
            log::debug!(
                "Tournament {} decided but waiting on a dispute verdict",
                tournament_id
            );
            return Ok(None);
        }
        let champion = match standing {
            Standing::InProgress => return Ok(None),
            Standing::NoChampion { match_id } => {
                log::warn!(
                    "Tournament {} ended without a champion (match {} voided)",
                    tournament_id,
                    match_id
                );
                None
            }
            Standing::Champion { participant_id, .. } => {
                let mut champion = self.get_participant(participant_id).await?;
                if tournament.prize_pool.is_positive() {
                    let wallet = self.ledger.wallet_for_owner(champion.payer_id).await?;
                    self.ledger
                        .pay_prize(tournament_id, wallet.id, tournament.prize_pool)
                        .await?;
                }
                champion.status = ParticipantStatus::Champion;
                Some(champion)
            }
        };

        let mut completed = tournament;
        completed.status = TournamentStatus::Completed;
        completed.end_date = Some(now);
        let completed = self
            .repo
            .complete_tournament(&completed, champion.as_ref())
            .await?;
        log::info!(
            "Tournament {} completed, champion {}",
            tournament_id,
            champion.map_or_else(|| "none".to_string(), |c| c.identity.to_string())
        );
        Ok(Some(completed))
    }
}
