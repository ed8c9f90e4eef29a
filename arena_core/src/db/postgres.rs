//! PostgreSQL repository adapter.
//!
//! Every multi-row mutation runs inside one `sqlx` transaction. Versioned
//! rows are updated with `WHERE id = $1 AND version = $2`; an empty result is
//! turned into `StaleVersion` or `NotFound` by a follow-up lookup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres, Row, Transaction as SqlTransaction};
use std::collections::HashMap;
use std::str::FromStr;

use super::errors::{StoreError, StoreResult};
use super::repository::{
    DisputeRepository, MatchRepository, TournamentRepository, WalletRepository,
};
use super::timeouts::{Budget, timed, within};
use crate::dispute::{DisputeTicket, NewDisputeTicket, TicketId, Verdict};
use crate::error::Entity;
use crate::matches::{Match, MatchId, MatchSlot, SlotRef};
use crate::tournament::{
    NewParticipant, NewTournament, Participant, ParticipantId, ParticipantRef, Tournament,
    TournamentId, TournamentStatus,
};
use crate::wallet::{
    Amount, NewTransaction, Posting, Transaction, TransactionId, TransactionKind,
    TransactionStatus, UserId, Wallet, WalletId,
};

const WALLET_COLUMNS: &str = "id, user_id, balance, currency, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, wallet_id, kind, amount, status, idempotency_key, \
     tournament_id, metadata, created_at, updated_at";

const TOURNAMENT_COLUMNS: &str = "id, name, game_id, currency, entry_fee, prize_pool, \
     max_participants, current_participants, start_date, end_date, status, bracket_kind, \
     settings, refund_pending, created_at, updated_at, version";

const PARTICIPANT_COLUMNS: &str = "id, tournament_id, participant_type, participant_ref, \
     payer_id, registered_at, checked_in, seed, status, version";

const MATCH_COLUMNS: &str = "id, tournament_id, side, round, index_in_round, slot1, slot2, \
     status, score, report1, report2, winner_id, next_match_id, next_match_slot, \
     next_loser_match_id, next_loser_match_slot, started_at, awaiting_since, confirmed_at, \
     created_at, updated_at, version";

const TICKET_COLUMNS: &str = "id, match_id, tournament_id, reporter_id, reason, status, \
     verdict, resolution, moderator_id, created_at, resolved_at, version";

/// PostgreSQL implementation of every repository port
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> StoreResult<SqlTransaction<'static, Postgres>> {
        Ok(within(Budget::Transaction, self.pool.begin()).await?)
    }
}

async fn commit(tx: SqlTransaction<'static, Postgres>) -> StoreResult<()> {
    Ok(within(Budget::Transaction, tx.commit()).await?)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn parse_column<T>(row: &PgRow, column: &str, entity: Entity) -> StoreResult<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: String| StoreError::corrupt(entity, e))
}

fn wallet_from_row(row: &PgRow) -> StoreResult<Wallet> {
    Ok(Wallet {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        balance: Amount::from_minor(row.try_get("balance")?),
        currency: row.try_get("currency")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn transaction_from_row(row: &PgRow) -> StoreResult<Transaction> {
    Ok(Transaction {
        id: row.try_get("id")?,
        wallet_id: row.try_get("wallet_id")?,
        kind: parse_column(row, "kind", Entity::Transaction)?,
        amount: Amount::from_minor(row.try_get("amount")?),
        status: parse_column(row, "status", Entity::Transaction)?,
        idempotency_key: row.try_get("idempotency_key")?,
        tournament_id: row.try_get("tournament_id")?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn tournament_from_row(row: &PgRow) -> StoreResult<Tournament> {
    Ok(Tournament {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        game_id: row.try_get("game_id")?,
        currency: row.try_get("currency")?,
        entry_fee: Amount::from_minor(row.try_get("entry_fee")?),
        prize_pool: Amount::from_minor(row.try_get("prize_pool")?),
        max_participants: row.try_get("max_participants")?,
        current_participants: row.try_get("current_participants")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        status: parse_column(row, "status", Entity::Tournament)?,
        bracket_kind: parse_column(row, "bracket_kind", Entity::Tournament)?,
        settings: row.try_get::<Json<_>, _>("settings")?.0,
        refund_pending: row.try_get("refund_pending")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn participant_from_row(row: &PgRow) -> StoreResult<Participant> {
    Ok(Participant {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        identity: ParticipantRef {
            id: row.try_get("participant_ref")?,
            kind: parse_column(row, "participant_type", Entity::Participant)?,
        },
        payer_id: row.try_get("payer_id")?,
        registered_at: row.try_get("registered_at")?,
        checked_in: row.try_get("checked_in")?,
        seed: row.try_get("seed")?,
        status: parse_column(row, "status", Entity::Participant)?,
        version: row.try_get("version")?,
    })
}

fn edge_from_row(row: &PgRow, id_column: &str, slot_column: &str) -> StoreResult<Option<SlotRef>> {
    let id: Option<MatchId> = row.try_get(id_column)?;
    let slot: Option<i16> = row.try_get(slot_column)?;
    match (id, slot) {
        (None, _) => Ok(None),
        (Some(match_id), Some(n)) => MatchSlot::from_number(n)
            .map(|slot| Some(SlotRef::new(match_id, slot)))
            .ok_or_else(|| StoreError::corrupt(Entity::Match, format!("slot number {n}"))),
        (Some(match_id), None) => Err(StoreError::corrupt(
            Entity::Match,
            format!("edge to match {match_id} without a slot"),
        )),
    }
}

fn match_from_row(row: &PgRow) -> StoreResult<Match> {
    Ok(Match {
        id: row.try_get("id")?,
        tournament_id: row.try_get("tournament_id")?,
        side: parse_column(row, "side", Entity::Match)?,
        round: row.try_get("round")?,
        index_in_round: row.try_get("index_in_round")?,
        slot1: row.try_get::<Json<_>, _>("slot1")?.0,
        slot2: row.try_get::<Json<_>, _>("slot2")?.0,
        status: parse_column(row, "status", Entity::Match)?,
        score: row.try_get::<Option<Json<_>>, _>("score")?.map(|j| j.0),
        report1: row.try_get::<Option<Json<_>>, _>("report1")?.map(|j| j.0),
        report2: row.try_get::<Option<Json<_>>, _>("report2")?.map(|j| j.0),
        winner_id: row.try_get("winner_id")?,
        next_match: edge_from_row(row, "next_match_id", "next_match_slot")?,
        next_loser_match: edge_from_row(row, "next_loser_match_id", "next_loser_match_slot")?,
        started_at: row.try_get("started_at")?,
        awaiting_since: row.try_get("awaiting_since")?,
        confirmed_at: row.try_get("confirmed_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn ticket_from_row(row: &PgRow) -> StoreResult<DisputeTicket> {
    let verdict: Option<String> = row.try_get("verdict")?;
    Ok(DisputeTicket {
        id: row.try_get("id")?,
        match_id: row.try_get("match_id")?,
        tournament_id: row.try_get("tournament_id")?,
        reporter_id: row.try_get("reporter_id")?,
        reason: row.try_get("reason")?,
        status: parse_column(row, "status", Entity::DisputeTicket)?,
        verdict: verdict
            .map(|v| v.parse::<Verdict>())
            .transpose()
            .map_err(|e: String| StoreError::corrupt(Entity::DisputeTicket, e))?,
        resolution: row.try_get("resolution")?,
        moderator_id: row.try_get("moderator_id")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
        version: row.try_get("version")?,
    })
}

fn collect<T>(rows: &[PgRow], decode: fn(&PgRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(decode).collect()
}

/// Distinguish a version miss from a missing row after an empty CAS update
async fn stale_or_missing(
    conn: &mut PgConnection,
    table: &str,
    entity: Entity,
    id: i64,
) -> StoreError {
    let exists = sqlx::query(&format!("SELECT 1 FROM {table} WHERE id = $1"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await;
    match exists {
        Ok(Some(_)) => StoreError::stale(entity, id),
        Ok(None) => StoreError::not_found(entity, id),
        Err(e) => e.into(),
    }
}

/// Move a wallet balance by `delta`, refusing to take it below zero
async fn apply_balance(conn: &mut PgConnection, wallet_id: WalletId, delta: Amount) -> StoreResult<()> {
    let updated = sqlx::query(
        "UPDATE wallets
         SET balance = balance + $2, updated_at = NOW()
         WHERE id = $1 AND balance + $2 >= 0
         RETURNING balance",
    )
    .bind(wallet_id)
    .bind(delta.minor_units())
    .fetch_optional(&mut *conn)
    .await?;
    if updated.is_some() {
        return Ok(());
    }

    let current = sqlx::query("SELECT balance FROM wallets WHERE id = $1")
        .bind(wallet_id)
        .fetch_optional(&mut *conn)
        .await?;
    match current {
        Some(row) => Err(StoreError::InsufficientFunds {
            wallet_id,
            available: Amount::from_minor(row.try_get("balance")?),
            required: delta.abs(),
        }),
        None => Err(StoreError::not_found(Entity::Wallet, wallet_id)),
    }
}

/// Append a transaction inside an open database transaction.
///
/// A concurrent insert of the same key surfaces as `Duplicate`; the caller
/// rolls back and reads the winner's row.
async fn post_in(conn: &mut PgConnection, request: &NewTransaction) -> StoreResult<Posting> {
    if let Some(key) = &request.idempotency_key {
        let existing = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&mut *conn)
        .await?;
        if let Some(row) = existing {
            return Ok(Posting::Replayed(transaction_from_row(&row)?));
        }
    }

    if request.status == TransactionStatus::Completed {
        apply_balance(conn, request.wallet_id, request.amount).await?;
    } else {
        let exists = sqlx::query("SELECT 1 FROM wallets WHERE id = $1")
            .bind(request.wallet_id)
            .fetch_optional(&mut *conn)
            .await?;
        if exists.is_none() {
            return Err(StoreError::not_found(Entity::Wallet, request.wallet_id));
        }
    }

    let inserted = sqlx::query(&format!(
        "INSERT INTO wallet_transactions
             (wallet_id, kind, amount, status, idempotency_key, tournament_id, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (idempotency_key) DO NOTHING
         RETURNING {TRANSACTION_COLUMNS}"
    ))
    .bind(request.wallet_id)
    .bind(request.kind.as_str())
    .bind(request.amount.minor_units())
    .bind(request.status.as_str())
    .bind(&request.idempotency_key)
    .bind(request.tournament_id)
    .bind(&request.metadata)
    .fetch_optional(&mut *conn)
    .await?;

    match inserted {
        Some(row) => Ok(Posting::Created(transaction_from_row(&row)?)),
        None => Err(StoreError::Duplicate {
            entity: Entity::Transaction,
            detail: request.idempotency_key.clone().unwrap_or_default(),
        }),
    }
}

async fn update_tournament_in(conn: &mut PgConnection, t: &Tournament) -> StoreResult<Tournament> {
    let row = sqlx::query(&format!(
        "UPDATE tournaments
         SET name = $3, game_id = $4, currency = $5, entry_fee = $6, prize_pool = $7,
             max_participants = $8, current_participants = $9, start_date = $10,
             end_date = $11, status = $12, bracket_kind = $13, settings = $14,
             refund_pending = $15, updated_at = NOW(), version = version + 1
         WHERE id = $1 AND version = $2
         RETURNING {TOURNAMENT_COLUMNS}"
    ))
    .bind(t.id)
    .bind(t.version)
    .bind(&t.name)
    .bind(t.game_id)
    .bind(&t.currency)
    .bind(t.entry_fee.minor_units())
    .bind(t.prize_pool.minor_units())
    .bind(t.max_participants)
    .bind(t.current_participants)
    .bind(t.start_date)
    .bind(t.end_date)
    .bind(t.status.as_str())
    .bind(t.bracket_kind.as_str())
    .bind(Json(&t.settings))
    .bind(t.refund_pending)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => tournament_from_row(&row),
        None => Err(stale_or_missing(conn, "tournaments", Entity::Tournament, t.id).await),
    }
}

async fn update_participant_in(
    conn: &mut PgConnection,
    p: &Participant,
) -> StoreResult<Participant> {
    let row = sqlx::query(&format!(
        "UPDATE tournament_participants
         SET payer_id = $3, checked_in = $4, seed = $5, status = $6, version = version + 1
         WHERE id = $1 AND version = $2
         RETURNING {PARTICIPANT_COLUMNS}"
    ))
    .bind(p.id)
    .bind(p.version)
    .bind(p.payer_id)
    .bind(p.checked_in)
    .bind(p.seed)
    .bind(p.status.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => participant_from_row(&row),
        None => {
            Err(stale_or_missing(conn, "tournament_participants", Entity::Participant, p.id).await)
        }
    }
}

/// Version-checked update of the mutable match columns; edges never change
async fn save_matches_in(conn: &mut PgConnection, matches: &[Match]) -> StoreResult<Vec<Match>> {
    let mut saved = Vec::with_capacity(matches.len());
    for m in matches {
        let row = sqlx::query(&format!(
            "UPDATE matches
             SET slot1 = $3, slot2 = $4, status = $5, score = $6, report1 = $7, report2 = $8,
                 winner_id = $9, started_at = $10, awaiting_since = $11, confirmed_at = $12,
                 updated_at = $13, version = version + 1
             WHERE id = $1 AND version = $2
             RETURNING {MATCH_COLUMNS}"
        ))
        .bind(m.id)
        .bind(m.version)
        .bind(Json(&m.slot1))
        .bind(Json(&m.slot2))
        .bind(m.status.as_str())
        .bind(m.score.map(Json))
        .bind(m.report1.as_ref().map(Json))
        .bind(m.report2.as_ref().map(Json))
        .bind(m.winner_id)
        .bind(m.started_at)
        .bind(m.awaiting_since)
        .bind(m.confirmed_at)
        .bind(m.updated_at)
        .fetch_optional(&mut *conn)
        .await?;

        match row {
            Some(row) => saved.push(match_from_row(&row)?),
            None => return Err(stale_or_missing(conn, "matches", Entity::Match, m.id).await),
        }
    }
    Ok(saved)
}

#[async_trait]
impl WalletRepository for PgStore {
    async fn create_wallet(&self, user_id: UserId, currency: &str) -> StoreResult<Wallet> {
        let result = timed(
            sqlx::query(&format!(
                "INSERT INTO wallets (user_id, currency) VALUES ($1, $2) RETURNING {WALLET_COLUMNS}"
            ))
            .bind(user_id)
            .bind(currency)
            .fetch_one(&self.pool),
        )
        .await;

        match result {
            Ok(row) => wallet_from_row(&row),
            Err(StoreError::Database(e)) if is_unique_violation(&e) => {
                Err(StoreError::Duplicate {
                    entity: Entity::Wallet,
                    detail: format!("user {user_id} already owns a wallet"),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn find_wallet(&self, wallet_id: WalletId) -> StoreResult<Option<Wallet>> {
        let row = timed(
            sqlx::query(&format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1"))
                .bind(wallet_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn find_wallet_by_owner(&self, user_id: UserId) -> StoreResult<Option<Wallet>> {
        let row = timed(
            sqlx::query(&format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(wallet_from_row).transpose()
    }

    async fn delete_wallet(&self, wallet_id: WalletId) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        let deleted = sqlx::query("DELETE FROM wallets WHERE id = $1 AND balance = 0 RETURNING id")
            .bind(wallet_id)
            .fetch_optional(&mut *tx)
            .await?;
        if deleted.is_none() {
            let exists = sqlx::query("SELECT 1 FROM wallets WHERE id = $1")
                .bind(wallet_id)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => StoreError::NonZeroBalance(wallet_id),
                None => StoreError::not_found(Entity::Wallet, wallet_id),
            });
        }
        commit(tx).await
    }

    async fn post_transaction(&self, request: &NewTransaction) -> StoreResult<Posting> {
        let mut tx = self.begin().await?;
        match post_in(&mut *tx, request).await {
            Ok(posting) => {
                commit(tx).await?;
                Ok(posting)
            }
            Err(StoreError::Duplicate {
                entity: Entity::Transaction,
                detail,
            }) => {
                // lost an insert race on the key: undo our balance change and
                // report the winner's row
                tx.rollback().await?;
                match self.find_transaction_by_key(&detail).await? {
                    Some(existing) => Ok(Posting::Replayed(existing)),
                    None => Err(StoreError::Duplicate {
                        entity: Entity::Transaction,
                        detail,
                    }),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn transition_transaction(
        &self,
        transaction_id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> StoreResult<Transaction> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE id = $1 FOR UPDATE"
        ))
        .bind(transaction_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found(Entity::Transaction, transaction_id))?;
        let current = transaction_from_row(&row)?;
        if current.status != from {
            return Err(StoreError::stale(Entity::Transaction, transaction_id));
        }

        if to == TransactionStatus::Completed {
            apply_balance(&mut *tx, current.wallet_id, current.amount).await?;
        }

        let row = sqlx::query(&format!(
            "UPDATE wallet_transactions SET status = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(transaction_id)
        .bind(to.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let updated = transaction_from_row(&row)?;
        commit(tx).await?;
        Ok(updated)
    }

    async fn find_transaction(
        &self,
        transaction_id: TransactionId,
    ) -> StoreResult<Option<Transaction>> {
        let row = timed(
            sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE id = $1"
            ))
            .bind(transaction_id)
            .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn find_transaction_by_key(&self, key: &str) -> StoreResult<Option<Transaction>> {
        let row = timed(
            sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions WHERE idempotency_key = $1"
            ))
            .bind(key)
            .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(transaction_from_row).transpose()
    }

    async fn list_transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions
                 WHERE wallet_id = $1 ORDER BY id DESC LIMIT $2"
            ))
            .bind(wallet_id)
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, transaction_from_row)
    }

    async fn tournament_transactions(
        &self,
        tournament_id: TournamentId,
        kind: TransactionKind,
    ) -> StoreResult<Vec<Transaction>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions
                 WHERE tournament_id = $1 AND kind = $2 ORDER BY id"
            ))
            .bind(tournament_id)
            .bind(kind.as_str())
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, transaction_from_row)
    }

    async fn completed_total(&self, wallet_id: WalletId) -> StoreResult<Amount> {
        let row = timed(
            sqlx::query(
                "SELECT COALESCE(SUM(amount), 0)::BIGINT AS total FROM wallet_transactions
                 WHERE wallet_id = $1 AND status = 'completed'",
            )
            .bind(wallet_id)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(Amount::from_minor(row.try_get("total")?))
    }
}

#[async_trait]
impl TournamentRepository for PgStore {
    async fn create_tournament(
        &self,
        request: &NewTournament,
        currency: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Tournament> {
        let row = timed(
            sqlx::query(&format!(
                "INSERT INTO tournaments
                     (name, game_id, currency, entry_fee, prize_pool, max_participants,
                      start_date, end_date, status, bracket_kind, settings, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $12)
                 RETURNING {TOURNAMENT_COLUMNS}"
            ))
            .bind(&request.name)
            .bind(request.game_id)
            .bind(currency)
            .bind(request.entry_fee.minor_units())
            .bind(request.prize_pool.minor_units())
            .bind(request.max_participants)
            .bind(request.start_date)
            .bind(request.end_date)
            .bind(TournamentStatus::Upcoming.as_str())
            .bind(request.bracket_kind.as_str())
            .bind(Json(&request.settings))
            .bind(now)
            .fetch_one(&self.pool),
        )
        .await?;
        tournament_from_row(&row)
    }

    async fn find_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Option<Tournament>> {
        let row = timed(
            sqlx::query(&format!("SELECT {TOURNAMENT_COLUMNS} FROM tournaments WHERE id = $1"))
                .bind(tournament_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(tournament_from_row).transpose()
    }

    async fn update_tournament(&self, tournament: &Tournament) -> StoreResult<Tournament> {
        let mut tx = self.begin().await?;
        let updated = update_tournament_in(&mut *tx, tournament).await?;
        commit(tx).await?;
        Ok(updated)
    }

    async fn due_tournaments(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Tournament>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {TOURNAMENT_COLUMNS} FROM tournaments
                 WHERE status = 'upcoming' AND start_date <= $1
                 ORDER BY start_date, id LIMIT $2"
            ))
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, tournament_from_row)
    }

    async fn tournaments_with_status(
        &self,
        status: TournamentStatus,
        limit: i64,
    ) -> StoreResult<Vec<Tournament>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {TOURNAMENT_COLUMNS} FROM tournaments
                 WHERE status = $1 ORDER BY id LIMIT $2"
            ))
            .bind(status.as_str())
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, tournament_from_row)
    }

    async fn decided_tournaments(&self, limit: i64) -> StoreResult<Vec<Tournament>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {TOURNAMENT_COLUMNS} FROM tournaments t
                 WHERE t.status = 'ongoing'
                   AND NOT EXISTS (
                       SELECT 1 FROM matches m
                        WHERE m.tournament_id = t.id
                          AND m.status NOT IN ('confirmed', 'resolved'))
                   AND NOT EXISTS (
                       SELECT 1 FROM dispute_tickets d
                        WHERE d.tournament_id = t.id
                          AND d.status IN ('open', 'under_review'))
                 ORDER BY t.updated_at, t.id LIMIT $1"
            ))
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, tournament_from_row)
    }

    async fn pending_refunds(&self, limit: i64) -> StoreResult<Vec<Tournament>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {TOURNAMENT_COLUMNS} FROM tournaments
                 WHERE status = 'canceled' AND refund_pending
                 ORDER BY updated_at, id LIMIT $1"
            ))
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, tournament_from_row)
    }

    async fn find_participant(
        &self,
        participant_id: ParticipantId,
    ) -> StoreResult<Option<Participant>> {
        let row = timed(
            sqlx::query(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM tournament_participants WHERE id = $1"
            ))
            .bind(participant_id)
            .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(participant_from_row).transpose()
    }

    async fn find_participant_by_identity(
        &self,
        tournament_id: TournamentId,
        identity: ParticipantRef,
    ) -> StoreResult<Option<Participant>> {
        let row = timed(
            sqlx::query(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM tournament_participants
                 WHERE tournament_id = $1 AND participant_type = $2 AND participant_ref = $3"
            ))
            .bind(tournament_id)
            .bind(identity.kind.as_str())
            .bind(identity.id)
            .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(participant_from_row).transpose()
    }

    async fn list_participants(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Vec<Participant>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {PARTICIPANT_COLUMNS} FROM tournament_participants
                 WHERE tournament_id = $1 ORDER BY registered_at, id"
            ))
            .bind(tournament_id)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, participant_from_row)
    }

    async fn update_participant(&self, participant: &Participant) -> StoreResult<Participant> {
        let mut tx = self.begin().await?;
        let updated = update_participant_in(&mut *tx, participant).await?;
        commit(tx).await?;
        Ok(updated)
    }

    async fn register_participant(
        &self,
        request: &NewParticipant,
        fee: Option<&NewTransaction>,
    ) -> StoreResult<(Participant, Option<Transaction>)> {
        let mut tx = self.begin().await?;

        // Guarded increment: only an upcoming tournament with a free slot
        let counted = sqlx::query(
            "UPDATE tournaments
             SET current_participants = current_participants + 1,
                 updated_at = NOW(), version = version + 1
             WHERE id = $1 AND status = 'upcoming' AND current_participants < max_participants
             RETURNING id",
        )
        .bind(request.tournament_id)
        .fetch_optional(&mut *tx)
        .await?;
        if counted.is_none() {
            let row = sqlx::query("SELECT status FROM tournaments WHERE id = $1")
                .bind(request.tournament_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| StoreError::not_found(Entity::Tournament, request.tournament_id))?;
            let status: TournamentStatus = parse_column(&row, "status", Entity::Tournament)?;
            return Err(if status == TournamentStatus::Upcoming {
                StoreError::CapacityReached(request.tournament_id)
            } else {
                StoreError::stale(Entity::Tournament, request.tournament_id)
            });
        }

        let row = sqlx::query(&format!(
            "INSERT INTO tournament_participants
                 (tournament_id, participant_type, participant_ref, payer_id, registered_at, status)
             VALUES ($1, $2, $3, $4, $5, 'registered')
             ON CONFLICT (tournament_id, participant_type, participant_ref) DO NOTHING
             RETURNING {PARTICIPANT_COLUMNS}"
        ))
        .bind(request.tournament_id)
        .bind(request.identity.kind.as_str())
        .bind(request.identity.id)
        .bind(request.payer_id)
        .bind(request.registered_at)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::Duplicate {
            entity: Entity::Participant,
            detail: format!(
                "{} already registered in tournament {}",
                request.identity, request.tournament_id
            ),
        })?;
        let participant = participant_from_row(&row)?;

        let fee_tx = match fee {
            Some(fee) => Some(post_in(&mut *tx, fee).await?.into_transaction()),
            None => None,
        };

        commit(tx).await?;
        Ok((participant, fee_tx))
    }

    async fn withdraw_participant(
        &self,
        participant: &Participant,
        refund: Option<&NewTransaction>,
    ) -> StoreResult<(Participant, Option<Posting>)> {
        let mut tx = self.begin().await?;

        let mut withdrawn = participant.clone();
        withdrawn.status = crate::tournament::ParticipantStatus::Withdrawn;
        let stored = update_participant_in(&mut *tx, &withdrawn).await?;

        sqlx::query(
            "UPDATE tournaments
             SET current_participants = GREATEST(current_participants - 1, 0),
                 updated_at = NOW(), version = version + 1
             WHERE id = $1",
        )
        .bind(participant.tournament_id)
        .execute(&mut *tx)
        .await?;

        let posting = match refund {
            Some(refund) => Some(post_in(&mut *tx, refund).await?),
            None => None,
        };

        commit(tx).await?;
        Ok((stored, posting))
    }

    async fn start_tournament(
        &self,
        tournament: &Tournament,
        participants: &[Participant],
        bracket: Vec<Match>,
    ) -> StoreResult<(Tournament, Vec<Match>)> {
        let mut tx = self.begin().await?;
        let stored = update_tournament_in(&mut *tx, tournament).await?;
        for participant in participants {
            update_participant_in(&mut *tx, participant).await?;
        }

        // Rows first, edges second: edges reference ids that only exist
        // once every row is in.
        let mut ids: HashMap<MatchId, MatchId> = HashMap::with_capacity(bracket.len());
        for m in &bracket {
            let row = sqlx::query(
                "INSERT INTO matches
                     (tournament_id, side, round, index_in_round, slot1, slot2, status, score,
                      winner_id, confirmed_at, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                 RETURNING id",
            )
            .bind(stored.id)
            .bind(m.side.as_str())
            .bind(m.round)
            .bind(m.index_in_round)
            .bind(Json(&m.slot1))
            .bind(Json(&m.slot2))
            .bind(m.status.as_str())
            .bind(m.score.map(Json))
            .bind(m.winner_id)
            .bind(m.confirmed_at)
            .bind(m.created_at)
            .bind(m.updated_at)
            .fetch_one(&mut *tx)
            .await?;
            ids.insert(m.id, row.try_get("id")?);
        }

        let remap = |edge: Option<SlotRef>| -> StoreResult<Option<SlotRef>> {
            edge.map(|e| {
                ids.get(&e.match_id)
                    .map(|&id| SlotRef::new(id, e.slot))
                    .ok_or_else(|| {
                        StoreError::corrupt(Entity::Match, format!("edge to unknown match {}", e.match_id))
                    })
            })
            .transpose()
        };

        let mut inserted = Vec::with_capacity(bracket.len());
        for mut m in bracket {
            m.id = ids
                .get(&m.id)
                .copied()
                .ok_or_else(|| StoreError::corrupt(Entity::Match, "unmapped bracket match"))?;
            m.tournament_id = stored.id;
            m.next_match = remap(m.next_match)?;
            m.next_loser_match = remap(m.next_loser_match)?;
            m.version = 0;
            if m.next_match.is_some() || m.next_loser_match.is_some() {
                sqlx::query(
                    "UPDATE matches
                     SET next_match_id = $2, next_match_slot = $3,
                         next_loser_match_id = $4, next_loser_match_slot = $5
                     WHERE id = $1",
                )
                .bind(m.id)
                .bind(m.next_match.map(|e| e.match_id))
                .bind(m.next_match.map(|e| e.slot.number()))
                .bind(m.next_loser_match.map(|e| e.match_id))
                .bind(m.next_loser_match.map(|e| e.slot.number()))
                .execute(&mut *tx)
                .await?;
            }
            inserted.push(m);
        }

        within(Budget::Bracket, tx.commit()).await?;
        Ok((stored, inserted))
    }

    async fn complete_tournament(
        &self,
        tournament: &Tournament,
        champion: Option<&Participant>,
    ) -> StoreResult<Tournament> {
        let mut tx = self.begin().await?;
        let stored = update_tournament_in(&mut *tx, tournament).await?;
        if let Some(champion) = champion {
            update_participant_in(&mut *tx, champion).await?;
        }
        commit(tx).await?;
        Ok(stored)
    }
}

#[async_trait]
impl MatchRepository for PgStore {
    async fn find_match(&self, match_id: MatchId) -> StoreResult<Option<Match>> {
        let row = timed(
            sqlx::query(&format!("SELECT {MATCH_COLUMNS} FROM matches WHERE id = $1"))
                .bind(match_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(match_from_row).transpose()
    }

    async fn tournament_matches(&self, tournament_id: TournamentId) -> StoreResult<Vec<Match>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches WHERE tournament_id = $1 ORDER BY id"
            ))
            .bind(tournament_id)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, match_from_row)
    }

    async fn matches_awaiting_since(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Match>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {MATCH_COLUMNS} FROM matches
                 WHERE status = 'awaiting_confirmation' AND awaiting_since < $1
                   AND tournament_id IN (SELECT id FROM tournaments WHERE status = 'ongoing')
                 ORDER BY awaiting_since, id LIMIT $2"
            ))
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, match_from_row)
    }

    async fn save_matches(&self, matches: &[Match]) -> StoreResult<Vec<Match>> {
        let mut tx = self.begin().await?;
        let saved = save_matches_in(&mut *tx, matches).await?;
        commit(tx).await?;
        Ok(saved)
    }
}

#[async_trait]
impl DisputeRepository for PgStore {
    async fn find_ticket(&self, ticket_id: TicketId) -> StoreResult<Option<DisputeTicket>> {
        let row = timed(
            sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM dispute_tickets WHERE id = $1"))
                .bind(ticket_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn active_ticket_for_match(
        &self,
        match_id: MatchId,
    ) -> StoreResult<Option<DisputeTicket>> {
        let row = timed(
            sqlx::query(&format!(
                "SELECT {TICKET_COLUMNS} FROM dispute_tickets
                 WHERE match_id = $1 AND status IN ('open', 'under_review')"
            ))
            .bind(match_id)
            .fetch_optional(&self.pool),
        )
        .await?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn active_tickets_for_tournament(
        &self,
        tournament_id: TournamentId,
    ) -> StoreResult<Vec<DisputeTicket>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {TICKET_COLUMNS} FROM dispute_tickets
                 WHERE tournament_id = $1 AND status IN ('open', 'under_review')
                 ORDER BY id"
            ))
            .bind(tournament_id)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, ticket_from_row)
    }

    async fn tickets_for_match(&self, match_id: MatchId) -> StoreResult<Vec<DisputeTicket>> {
        let rows = timed(
            sqlx::query(&format!(
                "SELECT {TICKET_COLUMNS} FROM dispute_tickets WHERE match_id = $1 ORDER BY id"
            ))
            .bind(match_id)
            .fetch_all(&self.pool),
        )
        .await?;
        collect(&rows, ticket_from_row)
    }

    async fn open_ticket(
        &self,
        request: &NewDisputeTicket,
        matches: &[Match],
    ) -> StoreResult<(DisputeTicket, Vec<Match>)> {
        let mut tx = self.begin().await?;
        let saved = save_matches_in(&mut *tx, matches).await?;

        let inserted = sqlx::query(&format!(
            "INSERT INTO dispute_tickets
                 (match_id, tournament_id, reporter_id, reason, status, created_at)
             VALUES ($1, $2, $3, $4, 'open', $5)
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(request.match_id)
        .bind(request.tournament_id)
        .bind(request.reporter_id)
        .bind(&request.reason)
        .bind(request.created_at)
        .fetch_one(&mut *tx)
        .await;

        let row = match inserted {
            Ok(row) => row,
            Err(e) if is_unique_violation(&e) => {
                return Err(StoreError::Duplicate {
                    entity: Entity::DisputeTicket,
                    detail: format!("match {} already has an open ticket", request.match_id),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let ticket = ticket_from_row(&row)?;
        commit(tx).await?;
        Ok((ticket, saved))
    }

    async fn update_ticket(
        &self,
        ticket: &DisputeTicket,
        matches: &[Match],
    ) -> StoreResult<(DisputeTicket, Vec<Match>)> {
        let mut tx = self.begin().await?;
        let row = sqlx::query(&format!(
            "UPDATE dispute_tickets
             SET status = $3, verdict = $4, resolution = $5, moderator_id = $6,
                 resolved_at = $7, version = version + 1
             WHERE id = $1 AND version = $2
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket.id)
        .bind(ticket.version)
        .bind(ticket.status.as_str())
        .bind(ticket.verdict.map(|v| v.as_str()))
        .bind(&ticket.resolution)
        .bind(ticket.moderator_id)
        .bind(ticket.resolved_at)
        .fetch_optional(&mut *tx)
        .await?;

        let updated = match row {
            Some(row) => ticket_from_row(&row)?,
            None => {
                return Err(
                    stale_or_missing(&mut *tx, "dispute_tickets", Entity::DisputeTicket, ticket.id)
                        .await,
                );
            }
        };
        let saved = save_matches_in(&mut *tx, matches).await?;
        commit(tx).await?;
        Ok((updated, saved))
    }
}
