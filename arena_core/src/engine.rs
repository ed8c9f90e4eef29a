//! Engine facade wiring every component over shared repository ports.

use crate::config::EngineConfig;
use crate::db::{DisputeRepository, MatchRepository, MemoryStore, TournamentRepository, WalletRepository};
use crate::dispute::{DisputeError, DisputeResolver, DisputeTicket, TicketId, Verdict};
use crate::error::ErrorKind;
use crate::locks::KeyedLocks;
use crate::matches::{Match, MatchError, MatchId, MatchManager, Scoreline};
use crate::tournament::{
    LifecycleDriver, LifecycleReport, Participant, ParticipantId, ParticipantRef,
    TournamentError, TournamentId, TournamentManager,
};
use crate::wallet::{Amount, Ledger, Transaction, TransactionKind, UserId, WalletError, WalletId};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Any engine failure
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Tournament(#[from] TournamentError),

    #[error(transparent)]
    Match(#[from] MatchError),

    #[error(transparent)]
    Dispute(#[from] DisputeError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Wallet(err) => err.kind(),
            EngineError::Tournament(err) => err.kind(),
            EngineError::Match(err) => err.kind(),
            EngineError::Dispute(err) => err.kind(),
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Tournament lifecycle and ledger engine
///
/// Cloning is cheap; clones share locks and stores.
#[derive(Clone)]
pub struct Engine {
    ledger: Ledger,
    tournaments: TournamentManager,
    matches: MatchManager,
    disputes: DisputeResolver,
    lifecycle: LifecycleDriver,
    config: Arc<EngineConfig>,
}

impl Engine {
    /// Wire the engine over explicit ports
    pub fn new(
        wallets: Arc<dyn WalletRepository>,
        tournaments: Arc<dyn TournamentRepository>,
        matches: Arc<dyn MatchRepository>,
        disputes: Arc<dyn DisputeRepository>,
        config: EngineConfig,
    ) -> Self {
        let config = Arc::new(config);
        let ledger = Ledger::new(wallets, config.clone());
        let match_manager = MatchManager::new(
            matches,
            tournaments.clone(),
            disputes.clone(),
            Arc::new(KeyedLocks::new()),
            config.clone(),
        );
        let tournament_manager = TournamentManager::new(
            tournaments.clone(),
            ledger.clone(),
            match_manager.clone(),
            Arc::new(KeyedLocks::new()),
            config.clone(),
        );
        let resolver = DisputeResolver::new(
            disputes,
            match_manager.clone(),
            Arc::new(KeyedLocks::new()),
            config.clone(),
        );
        let lifecycle = LifecycleDriver::new(
            tournaments,
            tournament_manager.clone(),
            match_manager.clone(),
            config.clone(),
        );

        Self {
            ledger,
            tournaments: tournament_manager,
            matches: match_manager,
            disputes: resolver,
            lifecycle,
            config,
        }
    }

    /// Wire the engine over one store implementing every port
    pub fn with_store<S>(store: Arc<S>, config: EngineConfig) -> Self
    where
        S: WalletRepository + TournamentRepository + MatchRepository + DisputeRepository + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store, config)
    }

    /// Engine over a fresh [`MemoryStore`]
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), config)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn tournaments(&self) -> &TournamentManager {
        &self.tournaments
    }

    pub fn matches(&self) -> &MatchManager {
        &self.matches
    }

    pub fn disputes(&self) -> &DisputeResolver {
        &self.disputes
    }

    pub fn lifecycle(&self) -> &LifecycleDriver {
        &self.lifecycle
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a user or team, debiting the entry fee from `payer`
    pub async fn register_participant(
        &self,
        tournament_id: TournamentId,
        participant: ParticipantRef,
        payer: UserId,
    ) -> EngineResult<Participant> {
        Ok(self
            .tournaments
            .register_participant(tournament_id, participant, payer, Utc::now())
            .await?)
    }

    /// Report a result; completes the tournament if this decided it
    pub async fn submit_match_result(
        &self,
        match_id: MatchId,
        participant_id: ParticipantId,
        score: Scoreline,
        proof_ref: Option<String>,
    ) -> EngineResult<Match> {
        let now = Utc::now();
        let m = self
            .matches
            .submit_result(match_id, participant_id, score, proof_ref, now)
            .await?;
        self.after_outcome(&m, now).await;
        Ok(m)
    }

    /// Confirm an awaiting match from its single report
    pub async fn confirm_match(&self, match_id: MatchId) -> EngineResult<Match> {
        let now = Utc::now();
        let m = self.matches.confirm_match(match_id, now).await?;
        self.after_outcome(&m, now).await;
        Ok(m)
    }

    pub async fn open_dispute(
        &self,
        match_id: MatchId,
        reporter_id: ParticipantId,
        reason: &str,
    ) -> EngineResult<DisputeTicket> {
        Ok(self
            .disputes
            .open_dispute(match_id, reporter_id, reason, Utc::now())
            .await?)
    }

    /// Apply a verdict and return the match as it now stands
    pub async fn resolve_dispute(
        &self,
        ticket_id: TicketId,
        moderator_id: UserId,
        verdict: Verdict,
        details: &str,
    ) -> EngineResult<Match> {
        let now = Utc::now();
        let resolution = self
            .disputes
            .resolve_dispute(ticket_id, moderator_id, verdict, details, now)
            .await?;
        self.after_outcome(&resolution.outcome, now).await;
        Ok(resolution.outcome)
    }

    pub async fn run_lifecycle_tick(&self, now: DateTime<Utc>) -> LifecycleReport {
        self.lifecycle.run_lifecycle_tick(now).await
    }

    pub async fn credit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        kind: TransactionKind,
        idempotency_key: Option<&str>,
        metadata: Option<Value>,
    ) -> EngineResult<Transaction> {
        Ok(self
            .ledger
            .credit(wallet_id, amount, kind, idempotency_key, metadata)
            .await?)
    }

    pub async fn debit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        kind: TransactionKind,
        idempotency_key: Option<&str>,
        metadata: Option<Value>,
    ) -> EngineResult<Transaction> {
        Ok(self
            .ledger
            .debit(wallet_id, amount, kind, idempotency_key, metadata)
            .await?)
    }

    /// Completion check after a terminal match outcome.
    ///
    /// The outcome is already stored; a failed payout is left for the next
    /// lifecycle tick.
    async fn after_outcome(&self, m: &Match, now: DateTime<Utc>) {
        if !m.is_terminal() {
            return;
        }
        if let Err(e) = self.tournaments.complete_if_decided(m.tournament_id, now).await {
            log::warn!(
                "Completion check for tournament {} after match {} failed: {}",
                m.tournament_id,
                m.id,
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_kind_delegates() {
        let err: EngineError = WalletError::InvalidAmount(Amount::ZERO).into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: EngineError = TournamentError::TournamentFull(3).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_in_memory_engine_moves_money() {
        let engine = Engine::in_memory(EngineConfig::default());
        let wallet = engine.ledger().create_wallet(1, None).await.unwrap();
        engine
            .credit(wallet.id, Amount::from_major(10), TransactionKind::Deposit, Some("d1"), None)
            .await
            .unwrap();
        let err = engine
            .debit(wallet.id, Amount::from_major(11), TransactionKind::Withdrawal, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }
}
