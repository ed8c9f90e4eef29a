//! In-process store implementing every repository port.
//!
//! All tables sit behind one `tokio::sync::Mutex`, so each trait call is a
//! single atomic unit. Multi-step writes validate everything before the first
//! mutation; a failed call leaves no trace.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::errors::{StoreError, StoreResult};
use super::repository::{
    DisputeRepository, MatchRepository, TournamentRepository, WalletRepository,
};
use crate::dispute::{DisputeStatus, DisputeTicket, NewDisputeTicket, TicketId};
use crate::error::Entity;
use crate::matches::{Match, MatchId, MatchStatus};
use crate::tournament::{
    NewParticipant, NewTournament, Participant, ParticipantId, ParticipantRef, ParticipantStatus,
    Tournament, TournamentId, TournamentStatus,
};
use crate::wallet::{
    Amount, NewTransaction, Posting, Transaction, TransactionId, TransactionKind,
    TransactionStatus, UserId, Wallet, WalletId,
};

#[derive(Default)]
struct MemoryState {
    sequences: HashMap<Entity, i64>,
    wallets: BTreeMap<WalletId, Wallet>,
    transactions: BTreeMap<TransactionId, Transaction>,
    keys: HashMap<String, TransactionId>,
    tournaments: BTreeMap<TournamentId, Tournament>,
    participants: BTreeMap<ParticipantId, Participant>,
    matches: BTreeMap<MatchId, Match>,
    tickets: BTreeMap<TicketId, DisputeTicket>,
}

impl MemoryState {
    fn next_id(&mut self, entity: Entity) -> i64 {
        let id = self.sequences.entry(entity).or_insert(0);
        *id += 1;
        *id
    }

    /// Balance after applying `delta`, refusing to go negative
    fn checked_balance(&self, wallet_id: WalletId, delta: Amount) -> StoreResult<Amount> {
        let wallet = self
            .wallets
            .get(&wallet_id)
            .ok_or_else(|| StoreError::not_found(Entity::Wallet, wallet_id))?;
        match wallet.balance.checked_add(delta) {
            Some(next) if !next.is_negative() => Ok(next),
            _ => Err(StoreError::InsufficientFunds {
                wallet_id,
                available: wallet.balance,
                required: delta.abs(),
            }),
        }
    }

    fn post(&mut self, request: &NewTransaction, now: DateTime<Utc>) -> StoreResult<Posting> {
        if let Some(key) = &request.idempotency_key {
            if let Some(existing) = self.keys.get(key).and_then(|id| self.transactions.get(id)) {
                return Ok(Posting::Replayed(existing.clone()));
            }
        }

        let new_balance = if request.status == TransactionStatus::Completed {
            Some(self.checked_balance(request.wallet_id, request.amount)?)
        } else if self.wallets.contains_key(&request.wallet_id) {
            None
        } else {
            return Err(StoreError::not_found(Entity::Wallet, request.wallet_id));
        };

        if let (Some(balance), Some(wallet)) = (new_balance, self.wallets.get_mut(&request.wallet_id))
        {
            wallet.balance = balance;
            wallet.updated_at = now;
        }

        let id = self.next_id(Entity::Transaction);
        let tx = Transaction {
            id,
            wallet_id: request.wallet_id,
            kind: request.kind,
            amount: request.amount,
            status: request.status,
            idempotency_key: request.idempotency_key.clone(),
            tournament_id: request.tournament_id,
            metadata: request.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        if let Some(key) = &tx.idempotency_key {
            self.keys.insert(key.clone(), id);
        }
        self.transactions.insert(id, tx.clone());
        Ok(Posting::Created(tx))
    }

    fn check_match_versions(&self, matches: &[Match]) -> StoreResult<()> {
        for m in matches {
            let stored = self
                .matches
                .get(&m.id)
                .ok_or_else(|| StoreError::not_found(Entity::Match, m.id))?;
            if stored.version != m.version {
                return Err(StoreError::stale(Entity::Match, m.id));
            }
        }
        Ok(())
    }

    fn write_matches(&mut self, matches: &[Match]) -> Vec<Match> {
        matches
            .iter()
            .map(|m| {
                let mut stored = m.clone();
                stored.version += 1;
                self.matches.insert(stored.id, stored.clone());
                stored
            })
            .collect()
    }

    fn check_participant_version(&self, participant: &Participant) -> StoreResult<()> {
        let stored = self
            .participants
            .get(&participant.id)
            .ok_or_else(|| StoreError::not_found(Entity::Participant, participant.id))?;
        if stored.version != participant.version {
            return Err(StoreError::stale(Entity::Participant, participant.id));
        }
        Ok(())
    }

    fn write_participant(&mut self, participant: &Participant) -> Participant {
        let mut stored = participant.clone();
        stored.version += 1;
        self.participants.insert(stored.id, stored.clone());
        stored
    }

    fn check_tournament_version(&self, tournament: &Tournament) -> StoreResult<()> {
        let stored = self
            .tournaments
            .get(&tournament.id)
            .ok_or_else(|| StoreError::not_found(Entity::Tournament, tournament.id))?;
        if stored.version != tournament.version {
            return Err(StoreError::stale(Entity::Tournament, tournament.id));
        }
        Ok(())
    }

    fn write_tournament(&mut self, tournament: &Tournament, now: DateTime<Utc>) -> Tournament {
        let mut stored = tournament.clone();
        stored.version += 1;
        stored.updated_at = now;
        self.tournaments.insert(stored.id, stored.clone());
        stored
    }
}

/// In-memory repository adapter
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WalletRepository for MemoryStore {
    async fn create_wallet(&self, user_id: UserId, currency: &str) -> StoreResult<Wallet> {
        let mut state = self.state.lock().await;
        if state.wallets.values().any(|w| w.user_id == user_id) {
            return Err(StoreError::Duplicate {
                entity: Entity::Wallet,
                detail: format!("user {user_id} already owns a wallet"),
            });
        }
        let now = Utc::now();
        let wallet = Wallet {
            id: state.next_id(Entity::Wallet),
            user_id,
            balance: Amount::ZERO,
            currency: currency.to_string(),
            created_at: now,
            updated_at: now,
        };
        state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    async fn find_wallet(&self, wallet_id: WalletId) -> StoreResult<Option<Wallet>> {
        Ok(self.state.lock().await.wallets.get(&wallet_id).cloned())
    }

    async fn find_wallet_by_owner(&self, user_id: UserId) -> StoreResult<Option<Wallet>> {
        let state = self.state.lock().await;
        Ok(state.wallets.values().find(|w| w.user_id == user_id).cloned())
    }

    async fn delete_wallet(&self, wallet_id: WalletId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let wallet = state
            .wallets
            .get(&wallet_id)
            .ok_or_else(|| StoreError::not_found(Entity::Wallet, wallet_id))?;
        if wallet.balance != Amount::ZERO {
            return Err(StoreError::NonZeroBalance(wallet_id));
        }
        state.wallets.remove(&wallet_id);
        Ok(())
    }

    async fn post_transaction(&self, request: &NewTransaction) -> StoreResult<Posting> {
        self.state.lock().await.post(request, Utc::now())
    }

    async fn transition_transaction(
        &self,
        transaction_id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> StoreResult<Transaction> {
        let mut state = self.state.lock().await;
        let tx = state
            .transactions
            .get(&transaction_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Transaction, transaction_id))?;
        if tx.status != from {
            return Err(StoreError::stale(Entity::Transaction, transaction_id));
        }

        let now = Utc::now();
        if to == TransactionStatus::Completed {
            let balance = state.checked_balance(tx.wallet_id, tx.amount)?;
            if let Some(wallet) = state.wallets.get_mut(&tx.wallet_id) {
                wallet.balance = balance;
                wallet.updated_at = now;
            }
        }

        let mut updated = tx;
        updated.status = to;
        updated.updated_at = now;
        state.transactions.insert(transaction_id, updated.clone());
        Ok(updated)
    }

    async fn find_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> StoreResult<Option<Transaction>> {
        Ok(self
            .state
            .lock()
            .await
            .transactions
            .get(&transaction_id)
            .cloned())
    }

    async fn find_transaction_by_key(&self, key: &str) -> StoreResult<Option<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .keys
            .get(key)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    async fn list_transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .rev()
            .filter(|tx| tx.wallet_id == wallet_id)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn tournament_transactions(
        &self,
        tournament_id: TournamentId,
        kind: TransactionKind,
    ) -> StoreResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .filter(|tx| tx.tournament_id == Some(tournament_id) && tx.kind == kind)
            .cloned()
            .collect())
    }

    async fn completed_total(&self, wallet_id: WalletId) -> StoreResult<Amount> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .values()
            .filter(|tx| tx.wallet_id == wallet_id && tx.status == TransactionStatus::Completed)
            .map(|tx| tx.amount)
            .sum())
    }
}

#[async_trait]
impl TournamentRepository for MemoryStore {
    async fn create_tournament(
        &self,
        request: &NewTournament,
        currency: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Tournament> {
        let mut state = self.state.lock().await;
        let tournament = Tournament {
            id: state.next_id(Entity::Tournament),
            name: request.name.clone(),
            game_id: request.game_id,
            currency: currency.to_string(),
            entry_fee: request.entry_fee,
            prize_pool: request.prize_pool,
            max_participants: request.max_participants,
            current_participants: 0,
            start_date: request.start_date,
            end_date: request.end_date,
            status: TournamentStatus::Upcoming,
            bracket_kind: request.bracket_kind,
            settings: request.settings.clone(),
            refund_pending: false,
            created_at: now,
            updated_at: now,
            version: 0,
        };
        state.tournaments.insert(tournament.id, tournament.clone());
        Ok(tournament)
    }

    async fn find_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Option<Tournament>> {
        Ok(self
            .state
            .lock()
            .await
            .tournaments
            .get(&tournament_id)
            .cloned())
    }

    async fn update_tournament(&self, tournament: &Tournament) -> StoreResult<Tournament> {
        let mut state = self.state.lock().await;
        state.check_tournament_version(tournament)?;
        Ok(state.write_tournament(tournament, Utc::now()))
    }

    async fn due_tournaments(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Tournament>> {
        let state = self.state.lock().await;
        let mut due: Vec<Tournament> = state
            .tournaments
            .values()
            .filter(|t| t.status == TournamentStatus::Upcoming && t.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|t| (t.start_date, t.id));
        due.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(due)
    }

    async fn tournaments_with_status(
        &self,
        status: TournamentStatus,
        limit: i64,
    ) -> StoreResult<Vec<Tournament>> {
        let state = self.state.lock().await;
        Ok(state
            .tournaments
            .values()
            .filter(|t| t.status == status)
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn decided_tournaments(&self, limit: i64) -> StoreResult<Vec<Tournament>> {
        let state = self.state.lock().await;
        let mut decided: Vec<Tournament> = state
            .tournaments
            .values()
            .filter(|t| {
                t.status == TournamentStatus::Ongoing
                    && state
                        .matches
                        .values()
                        .filter(|m| m.tournament_id == t.id)
                        .all(Match::is_terminal)
                    && !state
                        .tickets
                        .values()
                        .any(|ticket| ticket.tournament_id == t.id && ticket.status.is_active())
            })
            .cloned()
            .collect();
        decided.sort_by_key(|t| (t.updated_at, t.id));
        decided.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(decided)
    }

    async fn pending_refunds(&self, limit: i64) -> StoreResult<Vec<Tournament>> {
        let state = self.state.lock().await;
        let mut pending: Vec<Tournament> = state
            .tournaments
            .values()
            .filter(|t| t.status == TournamentStatus::Canceled && t.refund_pending)
            .cloned()
            .collect();
        pending.sort_by_key(|t| (t.updated_at, t.id));
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn find_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreResult<Option<Participant>> {
        Ok(self
            .state
            .lock()
            .await
            .participants
            .get(&participant_id)
            .cloned())
    }

    async fn find_participant_by_identity(
        &self,
        tournament_id: TournamentId,
        identity: ParticipantRef,
    ) -> StoreResult<Option<Participant>> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .values()
            .find(|p| p.tournament_id == tournament_id && p.identity == identity)
            .cloned())
    }

    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Vec<Participant>> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .values()
            .filter(|p| p.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn update_participant(&self, participant: &Participant) -> StoreResult<Participant> {
        let mut state = self.state.lock().await;
        state.check_participant_version(participant)?;
        Ok(state.write_participant(participant))
    }

    async fn register_participant(
        &self,
        request: &NewParticipant,
        fee: Option<&NewTransaction>,
    ) -> StoreResult<(Participant, Option<Transaction>)> {
        let mut state = self.state.lock().await;
        let tournament = state
            .tournaments
            .get(&request.tournament_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Tournament, request.tournament_id))?;
        if tournament.status != TournamentStatus::Upcoming {
            return Err(StoreError::stale(Entity::Tournament, tournament.id));
        }
        if !tournament.has_capacity() {
            return Err(StoreError::CapacityReached(tournament.id));
        }
        if state
            .participants
            .values()
            .any(|p| p.tournament_id == request.tournament_id && p.identity == request.identity)
        {
            return Err(StoreError::Duplicate {
                entity: Entity::Participant,
                detail: format!(
                    "{} already registered in tournament {}",
                    request.identity, request.tournament_id
                ),
            });
        }

        let now = Utc::now();
        // Last fallible step; nothing has been mutated yet if it fails.
        let fee_tx = match fee {
            Some(fee) => Some(state.post(fee, now)?.into_transaction()),
            None => None,
        };

        let mut counted = tournament;
        counted.current_participants += 1;
        state.write_tournament(&counted, now);

        let participant = Participant {
            id: state.next_id(Entity::Participant),
            tournament_id: request.tournament_id,
            identity: request.identity,
            payer_id: request.payer_id,
            registered_at: request.registered_at,
            checked_in: false,
            seed: None,
            status: ParticipantStatus::Registered,
            version: 0,
        };
        state
            .participants
            .insert(participant.id, participant.clone());
        Ok((participant, fee_tx))
    }

    async fn withdraw_participant(
        &self,
        participant: &Participant,
        refund: Option<&NewTransaction>,
    ) -> StoreResult<(Participant, Option<Posting>)> {
        let mut state = self.state.lock().await;
        state.check_participant_version(participant)?;
        let tournament = state
            .tournaments
            .get(&participant.tournament_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::not_found(Entity::Tournament, participant.tournament_id)
            })?;

        let now = Utc::now();
        let posting = match refund {
            Some(refund) => Some(state.post(refund, now)?),
            None => None,
        };

        let mut freed = tournament;
        freed.current_participants = (freed.current_participants - 1).max(0);
        state.write_tournament(&freed, now);

        let mut withdrawn = participant.clone();
        withdrawn.status = ParticipantStatus::Withdrawn;
        let stored = state.write_participant(&withdrawn);
        Ok((stored, posting))
    }

    async fn start_tournament(
        &self,
        tournament: &Tournament,
        participants: &[Participant],
        bracket: Vec<Match>,
    ) -> StoreResult<(Tournament, Vec<Match>)> {
        let mut state = self.state.lock().await;
        state.check_tournament_version(tournament)?;
        for participant in participants {
            state.check_participant_version(participant)?;
        }

        let now = Utc::now();
        let stored = state.write_tournament(tournament, now);
        for participant in participants {
            state.write_participant(participant);
        }

        let mut ids = HashMap::with_capacity(bracket.len());
        for m in &bracket {
            ids.insert(m.id, state.next_id(Entity::Match));
        }
        let remap = |id: MatchId| ids.get(&id).copied().unwrap_or(id);

        let mut inserted = Vec::with_capacity(bracket.len());
        for mut m in bracket {
            m.id = remap(m.id);
            m.tournament_id = stored.id;
            if let Some(edge) = m.next_match.as_mut() {
                edge.match_id = remap(edge.match_id);
            }
            if let Some(edge) = m.next_loser_match.as_mut() {
                edge.match_id = remap(edge.match_id);
            }
            state.matches.insert(m.id, m.clone());
            inserted.push(m);
        }
        Ok((stored, inserted))
    }

    async fn complete_tournament(
        &self,
        tournament: &Tournament,
        champion: Option<&Participant>,
    ) -> StoreResult<Tournament> {
        let mut state = self.state.lock().await;
        state.check_tournament_version(tournament)?;
        if let Some(champion) = champion {
            state.check_participant_version(champion)?;
        }
        let stored = state.write_tournament(tournament, Utc::now());
        if let Some(champion) = champion {
            state.write_participant(champion);
        }
        Ok(stored)
    }
}

#[async_trait]
impl MatchRepository for MemoryStore {
    async fn find_match(&self, match_id: MatchId) -> StoreResult<Option<Match>> {
        Ok(self.state.lock().await.matches.get(&match_id).cloned())
    }

    async fn tournament_matches(&self, tournament_id: TournamentId) -> StoreResult<Vec<Match>> {
        let state = self.state.lock().await;
        Ok(state
            .matches
            .values()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect())
    }

    async fn matches_awaiting_since(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Match>> {
        let state = self.state.lock().await;
        Ok(state
            .matches
            .values()
            .filter(|m| {
                m.status == MatchStatus::AwaitingConfirmation
                    && m.awaiting_since.is_some_and(|since| since < cutoff)
                    && state
                        .tournaments
                        .get(&m.tournament_id)
                        .is_some_and(|t| t.status == TournamentStatus::Ongoing)
            })
            .take(usize::try_from(limit).unwrap_or(0))
            .cloned()
            .collect())
    }

    async fn save_matches(&self, matches: &[Match]) -> StoreResult<Vec<Match>> {
        let mut state = self.state.lock().await;
        state.check_match_versions(matches)?;
        Ok(state.write_matches(matches))
    }
}

#[async_trait]
impl DisputeRepository for MemoryStore {
    async fn find_ticket(&self, ticket_id: TicketId) -> StoreResult<Option<DisputeTicket>> {
        Ok(self.state.lock().await.tickets.get(&ticket_id).cloned())
    }

    async fn active_ticket_for_match(
        &self,
        match_id: MatchId,
    ) -> StoreResult<Option<DisputeTicket>> {
        let state = self.state.lock().await;
        Ok(state
            .tickets
            .values()
            .find(|t| t.match_id == match_id && t.status.is_active())
            .cloned())
    }

    async fn active_tickets_for_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Vec<DisputeTicket>> {
        let state = self.state.lock().await;
        Ok(state
            .tickets
            .values()
            .filter(|t| t.tournament_id == tournament_id && t.status.is_active())
            .cloned()
            .collect())
    }

    async fn tickets_for_match(&self, match_id: MatchId) -> StoreResult<Vec<DisputeTicket>> {
        let state = self.state.lock().await;
        Ok(state
            .tickets
            .values()
            .filter(|t| t.match_id == match_id)
            .cloned()
            .collect())
    }

    async fn open_ticket(
        &self,
        request: &NewDisputeTicket,
        matches: &[Match],
    ) -> StoreResult<(DisputeTicket, Vec<Match>)> {
        let mut state = self.state.lock().await;
        if state
            .tickets
            .values()
            .any(|t| t.match_id == request.match_id && t.status.is_active())
        {
            return Err(StoreError::Duplicate {
                entity: Entity::DisputeTicket,
                detail: format!("match {} already has an open ticket", request.match_id),
            });
        }
        state.check_match_versions(matches)?;

        let ticket = DisputeTicket {
            id: state.next_id(Entity::DisputeTicket),
            match_id: request.match_id,
            tournament_id: request.tournament_id,
            reporter_id: request.reporter_id,
            reason: request.reason.clone(),
            status: DisputeStatus::Open,
            verdict: None,
            resolution: None,
            moderator_id: None,
            created_at: request.created_at,
            resolved_at: None,
            version: 0,
        };
        state.tickets.insert(ticket.id, ticket.clone());
        let saved = state.write_matches(matches);
        Ok((ticket, saved))
    }

    async fn update_ticket(
        &self,
        ticket: &DisputeTicket,
        matches: &[Match],
    ) -> StoreResult<(DisputeTicket, Vec<Match>)> {
        let mut state = self.state.lock().await;
        let stored = state
            .tickets
            .get(&ticket.id)
            .ok_or_else(|| StoreError::not_found(Entity::DisputeTicket, ticket.id))?;
        if stored.version != ticket.version {
            return Err(StoreError::stale(Entity::DisputeTicket, ticket.id));
        }
        state.check_match_versions(matches)?;

        let mut updated = ticket.clone();
        updated.version += 1;
        state.tickets.insert(updated.id, updated.clone());
        let saved = state.write_matches(matches);
        Ok((updated, saved))
    }
}
