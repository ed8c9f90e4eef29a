//! Repository trait definitions for testability and dependency injection.
//!
//! Every component receives the ports it needs as `Arc<dyn ...Repository>`.
//! Two adapters implement all four traits: [`PgStore`](super::PgStore) for
//! PostgreSQL and [`MemoryStore`](super::MemoryStore) for in-process use.
//!
//! Mutable rows carry a `version`. Update methods take the row as it was read
//! and fail with [`StoreError::StaleVersion`](super::StoreError::StaleVersion)
//! when another writer bumped it first. Returned rows carry the new version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::errors::StoreResult;
use crate::dispute::{DisputeTicket, NewDisputeTicket, TicketId};
use crate::matches::{Match, MatchId};
use crate::tournament::{
    NewParticipant, NewTournament, Participant, ParticipantId, ParticipantRef, Tournament,
    TournamentId, TournamentStatus,
};
use crate::wallet::{
    Amount, NewTransaction, Posting, Transaction, TransactionId, TransactionKind,
    TransactionStatus, UserId, Wallet, WalletId,
};

/// Trait for wallet and ledger operations
#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Create a zero-balance wallet; `Duplicate` if the user already has one
    async fn create_wallet(&self, user_id: UserId, currency: &str) -> StoreResult<Wallet>;

    /// Find wallet by ID
    async fn find_wallet(&self, wallet_id: WalletId) -> StoreResult<Option<Wallet>>;

    /// Find the wallet owned by a user
    async fn find_wallet_by_owner(&self, user_id: UserId) -> StoreResult<Option<Wallet>>;

    /// Delete a wallet; `NonZeroBalance` unless it is empty
    async fn delete_wallet(&self, wallet_id: WalletId) -> StoreResult<()>;

    /// Append a transaction.
    ///
    /// When the idempotency key is already stored, the stored row is returned
    /// as [`Posting::Replayed`] and nothing is written. A `Completed` row moves
    /// the balance in the same write, refusing to take it below zero.
    async fn post_transaction(&self, request: &NewTransaction) -> StoreResult<Posting>;

    /// Compare-and-set a transaction's status.
    ///
    /// Moving to `Completed` applies the amount to the balance atomically.
    async fn transition_transaction(
        &self,
        transaction_id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> StoreResult<Transaction>;

    /// Find transaction by ID
    async fn find_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> StoreResult<Option<Transaction>>;

    /// Find transaction by idempotency key
    async fn find_transaction_by_key(&self, key: &str) -> StoreResult<Option<Transaction>>;

    /// Most recent transactions of a wallet, newest first
    async fn list_transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>>;

    /// Transactions of one kind referencing a tournament, oldest first
    async fn tournament_transactions(
        &self,
        tournament_id: TournamentId,
        kind: TransactionKind,
    ) -> StoreResult<Vec<Transaction>>;

    /// Sum of `Completed` amounts for a wallet
    async fn completed_total(&self, wallet_id: WalletId) -> StoreResult<Amount>;
}

/// Trait for tournament and participant operations
#[async_trait]
pub trait TournamentRepository: Send + Sync {
    /// Insert a tournament in `Upcoming`
    async fn create_tournament(
        &self,
        request: &NewTournament,
        currency: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Tournament>;

    /// Find tournament by ID
    async fn find_tournament(&self, tournament_id: TournamentId)
    -> StoreResult<Option<Tournament>>;

    /// Version-checked full-row update
    async fn update_tournament(&self, tournament: &Tournament) -> StoreResult<Tournament>;

    /// `Upcoming` tournaments whose start date has passed, earliest first
    async fn due_tournaments(&self, now: DateTime<Utc>, limit: i64)
    -> StoreResult<Vec<Tournament>>;

    /// Tournaments in a given status, oldest first
    async fn tournaments_with_status(
        &self,
        status: TournamentStatus,
        limit: i64,
    ) -> StoreResult<Vec<Tournament>>;

    /// `Ongoing` tournaments whose matches are all terminal and carry no
    /// active dispute ticket, least recently updated first
    async fn decided_tournaments(&self, limit: i64) -> StoreResult<Vec<Tournament>>;

    /// Canceled tournaments with refunds outstanding, least recently updated
    /// first
    async fn pending_refunds(&self, limit: i64) -> StoreResult<Vec<Tournament>>;

    /// Find participant by ID
    async fn find_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreResult<Option<Participant>>;

    /// Find a registration by external identity
    async fn find_participant_by_identity(
        &self,
        tournament_id: TournamentId,
        identity: ParticipantRef,
    ) -> StoreResult<Option<Participant>>;

    /// All registrations of a tournament, in registration order
    async fn list_participants(&self, tournament_id: TournamentId)
    -> StoreResult<Vec<Participant>>;

    /// Version-checked participant update
    async fn update_participant(&self, participant: &Participant) -> StoreResult<Participant>;

    /// Register in one atomic write: guarded counter increment, unique insert
    /// and the optional entry-fee debit.
    ///
    /// # Errors
    ///
    /// * `CapacityReached` - Counter already at capacity
    /// * `Duplicate` - Identity already registered
    /// * `InsufficientFunds` / `NotFound` - Fee debit refused
    async fn register_participant(
        &self,
        request: &NewParticipant,
        fee: Option<&NewTransaction>,
    ) -> StoreResult<(Participant, Option<Transaction>)>;

    /// Mark a participant withdrawn, free the slot and post the optional
    /// refund, atomically.
    async fn withdraw_participant(
        &self,
        participant: &Participant,
        refund: Option<&NewTransaction>,
    ) -> StoreResult<(Participant, Option<Posting>)>;

    /// Persist a start decision atomically: the tournament row, every
    /// participant's final status and seed, and the bracket.
    ///
    /// `bracket` carries provisional ids; the returned matches carry the
    /// stored ids with every edge remapped.
    async fn start_tournament(
        &self,
        tournament: &Tournament,
        participants: &[Participant],
        bracket: Vec<Match>,
    ) -> StoreResult<(Tournament, Vec<Match>)>;

    /// Persist completion atomically: the tournament row and the champion
    async fn complete_tournament(
        &self,
        tournament: &Tournament,
        champion: Option<&Participant>,
    ) -> StoreResult<Tournament>;
}

/// Trait for match operations
#[async_trait]
pub trait MatchRepository: Send + Sync {
    /// Find match by ID
    async fn find_match(&self, match_id: MatchId) -> StoreResult<Option<Match>>;

    /// Every match of a tournament, ordered by ID
    async fn tournament_matches(&self, tournament_id: TournamentId) -> StoreResult<Vec<Match>>;

    /// Matches of ongoing tournaments stuck in `AwaitingConfirmation` since
    /// before `cutoff`
    async fn matches_awaiting_since(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Match>>;

    /// Version-checked update of several matches as one unit
    async fn save_matches(&self, matches: &[Match]) -> StoreResult<Vec<Match>>;
}

/// Trait for dispute ticket operations
#[async_trait]
pub trait DisputeRepository: Send + Sync {
    /// Find ticket by ID
    async fn find_ticket(&self, ticket_id: TicketId) -> StoreResult<Option<DisputeTicket>>;

    /// The open or under-review ticket of a match, if any
    async fn active_ticket_for_match(
        &self,
        match_id: MatchId,
    ) -> StoreResult<Option<DisputeTicket>>;

    /// Open or under-review tickets on any match of a tournament
    async fn active_tickets_for_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Vec<DisputeTicket>>;

    /// Every ticket ever opened on a match, oldest first
    async fn tickets_for_match(&self, match_id: MatchId) -> StoreResult<Vec<DisputeTicket>>;

    /// Insert a ticket together with the match updates it causes.
    ///
    /// `Duplicate` when the match already has an active ticket.
    async fn open_ticket(
        &self,
        request: &NewDisputeTicket,
        matches: &[Match],
    ) -> StoreResult<(DisputeTicket, Vec<Match>)>;

    /// Version-checked ticket update together with match updates
    async fn update_ticket(
        &self,
        ticket: &DisputeTicket,
        matches: &[Match],
    ) -> StoreResult<(DisputeTicket, Vec<Match>)>;
}
