//! Ledger implementation with idempotent postings.

use super::{
    errors::{WalletError, WalletResult},
    keys::{self, FeeMetadata},
    models::{
        Amount, BalanceCheck, NewTransaction, Posting, RefundReport, Transaction, TransactionId,
        TransactionKind, TransactionStatus, UserId, Wallet, WalletId,
    },
};
use crate::config::EngineConfig;
use crate::db::WalletRepository;
use crate::tournament::{ParticipantRef, TournamentId};
use serde_json::{Value, json};
use std::sync::Arc;

/// Ledger over wallet balances and the append-only transaction log
#[derive(Clone)]
pub struct Ledger {
    repo: Arc<dyn WalletRepository>,
    config: Arc<EngineConfig>,
}

impl Ledger {
    /// Create a new ledger
    ///
    /// # Arguments
    ///
    /// * `repo` - Wallet persistence port
    /// * `config` - Engine configuration (currency, approval threshold)
    pub fn new(repo: Arc<dyn WalletRepository>, config: Arc<EngineConfig>) -> Self {
        Self { repo, config }
    }

    /// Open a wallet for a user
    ///
    /// # Errors
    ///
    /// * `WalletError::WalletExists` - The user already owns a wallet
    pub async fn create_wallet(
        &self,
        user_id: UserId,
        currency: Option<&str>,
    ) -> WalletResult<Wallet> {
        let currency = currency.unwrap_or(&self.config.default_currency);
        match self.repo.create_wallet(user_id, currency).await {
            Ok(wallet) => {
                log::info!("Opened wallet {} for user {}", wallet.id, user_id);
                Ok(wallet)
            }
            Err(crate::db::StoreError::Duplicate { .. }) => Err(WalletError::WalletExists(user_id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get_wallet(&self, wallet_id: WalletId) -> WalletResult<Wallet> {
        self.repo
            .find_wallet(wallet_id)
            .await?
            .ok_or(WalletError::WalletNotFound(wallet_id))
    }

    pub async fn wallet_for_owner(&self, user_id: UserId) -> WalletResult<Wallet> {
        self.repo
            .find_wallet_by_owner(user_id)
            .await?
            .ok_or(WalletError::NoWalletForUser(user_id))
    }

    /// Delete an empty wallet
    pub async fn delete_wallet(&self, wallet_id: WalletId) -> WalletResult<()> {
        self.repo.delete_wallet(wallet_id).await?;
        log::info!("Deleted wallet {}", wallet_id);
        Ok(())
    }

    /// Raise a balance by a completed transaction
    ///
    /// # Arguments
    ///
    /// * `wallet_id` - Wallet to credit
    /// * `amount` - Positive amount
    /// * `kind` - Transaction kind
    /// * `idempotency_key` - Replaying the same key returns the stored row
    /// * `metadata` - Free-form JSON stored with the row
    ///
    /// # Errors
    ///
    /// * `WalletError::InvalidAmount` - Amount is not positive
    /// * `WalletError::DuplicateIdempotencyKey` - Key used for a different effect
    pub async fn credit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        kind: TransactionKind,
        idempotency_key: Option<&str>,
        metadata: Option<Value>,
    ) -> WalletResult<Transaction> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount));
        }
        let request = NewTransaction {
            wallet_id,
            kind,
            amount,
            status: TransactionStatus::Completed,
            idempotency_key: idempotency_key.map(str::to_string),
            tournament_id: None,
            metadata: metadata.unwrap_or_else(|| json!({})),
        };
        self.post(&request).await.map(Posting::into_transaction)
    }

    /// Lower a balance by a completed transaction
    ///
    /// Same contract as [`Ledger::credit`]; the row records a negative amount.
    ///
    /// # Errors
    ///
    /// * `WalletError::InsufficientFunds` - Balance lower than `amount`
    pub async fn debit(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        kind: TransactionKind,
        idempotency_key: Option<&str>,
        metadata: Option<Value>,
    ) -> WalletResult<Transaction> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount));
        }
        let request = NewTransaction {
            wallet_id,
            kind,
            amount: -amount,
            status: TransactionStatus::Completed,
            idempotency_key: idempotency_key.map(str::to_string),
            tournament_id: None,
            metadata: metadata.unwrap_or_else(|| json!({})),
        };
        self.post(&request).await.map(Posting::into_transaction)
    }

    /// Append a transaction, resolving keyed replays
    pub async fn post(&self, request: &NewTransaction) -> WalletResult<Posting> {
        let posting = self.repo.post_transaction(request).await?;
        match &posting {
            Posting::Replayed(existing) => {
                if !existing.same_effect(request) {
                    return Err(WalletError::DuplicateIdempotencyKey(
                        existing.idempotency_key.clone().unwrap_or_default(),
                    ));
                }
                log::debug!("Replayed transaction {}", existing.id);
            }
            Posting::Created(tx) => {
                log::debug!(
                    "Posted {} {} to wallet {} (tx {})",
                    tx.kind,
                    tx.amount,
                    tx.wallet_id,
                    tx.id
                );
            }
        }
        Ok(posting)
    }

    /// Completed entry-fee debit request for a registration
    pub fn entry_fee_request(
        &self,
        tournament_id: TournamentId,
        identity: ParticipantRef,
        payer_wallet: WalletId,
        payer_id: UserId,
        fee: Amount,
    ) -> NewTransaction {
        NewTransaction {
            wallet_id: payer_wallet,
            kind: TransactionKind::TournamentFee,
            amount: -fee,
            status: TransactionStatus::Completed,
            idempotency_key: Some(keys::entry_fee(tournament_id, identity)),
            tournament_id: Some(tournament_id),
            metadata: json!(FeeMetadata {
                participant: identity,
                payer_id,
            }),
        }
    }

    /// Completed refund credit request for one registrant
    pub fn refund_request(
        &self,
        tournament_id: TournamentId,
        identity: ParticipantRef,
        wallet_id: WalletId,
        amount: Amount,
        reason: &str,
    ) -> NewTransaction {
        NewTransaction {
            wallet_id,
            kind: TransactionKind::Refund,
            amount,
            status: TransactionStatus::Completed,
            idempotency_key: Some(keys::refund(tournament_id, identity)),
            tournament_id: Some(tournament_id),
            metadata: json!({ "participant": identity, "reason": reason }),
        }
    }

    /// Refund every completed entry fee of a tournament
    ///
    /// Each refund is keyed per registrant and posted on its own, so a failed
    /// or interrupted run can simply be repeated.
    ///
    /// # Arguments
    ///
    /// * `tournament_id` - Tournament whose fees are refunded
    /// * `amount` - Amount credited per fee
    /// * `reason` - Stored in each refund's metadata
    pub async fn refund_all(
        &self,
        tournament_id: TournamentId,
        amount: Amount,
        reason: &str,
    ) -> WalletResult<RefundReport> {
        let fees = self
            .repo
            .tournament_transactions(tournament_id, TransactionKind::TournamentFee)
            .await?;

        let mut report = RefundReport::default();
        for fee in fees
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Completed)
        {
            let meta: FeeMetadata = match serde_json::from_value(fee.metadata.clone()) {
                Ok(meta) => meta,
                Err(e) => {
                    log::warn!("Fee {} has unreadable metadata: {}", fee.id, e);
                    report.failed.push((fee.id, e.to_string()));
                    continue;
                }
            };

            let request =
                self.refund_request(tournament_id, meta.participant, fee.wallet_id, amount, reason);
            match self.post(&request).await {
                Ok(Posting::Created(tx)) => report.refunded.push(tx.id),
                Ok(Posting::Replayed(tx)) => report.already_refunded.push(tx.id),
                Err(e) => {
                    log::warn!(
                        "Refund of fee {} in tournament {} failed: {}",
                        fee.id,
                        tournament_id,
                        e
                    );
                    report.failed.push((fee.id, e.to_string()));
                }
            }
        }

        log::info!(
            "Tournament {} refunds: {} issued, {} already done, {} failed",
            tournament_id,
            report.refunded.len(),
            report.already_refunded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Credit the prize pool, keyed once per tournament
    pub async fn pay_prize(
        &self,
        tournament_id: TournamentId,
        wallet_id: WalletId,
        amount: Amount,
    ) -> WalletResult<Transaction> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount));
        }
        let request = NewTransaction {
            wallet_id,
            kind: TransactionKind::PrizePayout,
            amount,
            status: TransactionStatus::Completed,
            idempotency_key: Some(keys::prize(tournament_id)),
            tournament_id: Some(tournament_id),
            metadata: json!({}),
        };
        let tx = self.post(&request).await?.into_transaction();
        log::info!(
            "Paid prize {} for tournament {} to wallet {}",
            amount,
            tournament_id,
            wallet_id
        );
        Ok(tx)
    }

    /// Record a withdrawal request
    ///
    /// Amounts above the configured threshold wait in `RequiresApproval`;
    /// others go straight to `Pending`. Funds move only on settlement.
    pub async fn request_withdrawal(
        &self,
        wallet_id: WalletId,
        amount: Amount,
        idempotency_key: &str,
    ) -> WalletResult<Transaction> {
        if !amount.is_positive() {
            return Err(WalletError::InvalidAmount(amount));
        }
        let wallet = self.get_wallet(wallet_id).await?;
        if wallet.balance < amount {
            return Err(WalletError::InsufficientFunds {
                wallet_id,
                available: wallet.balance,
                required: amount,
            });
        }

        let status = if amount > self.config.withdrawal_approval_threshold {
            TransactionStatus::RequiresApproval
        } else {
            TransactionStatus::Pending
        };
        let request = NewTransaction {
            wallet_id,
            kind: TransactionKind::Withdrawal,
            amount: -amount,
            status,
            idempotency_key: Some(idempotency_key.to_string()),
            tournament_id: None,
            metadata: json!({}),
        };
        Ok(self.post(&request).await?.into_transaction())
    }

    /// Move an approved withdrawal to `Pending`
    pub async fn approve_withdrawal(
        &self,
        transaction_id: TransactionId,
    ) -> WalletResult<Transaction> {
        self.move_withdrawal(transaction_id, TransactionStatus::Pending)
            .await
    }

    /// Complete (debiting the wallet) or fail a pending withdrawal
    pub async fn settle_withdrawal(
        &self,
        transaction_id: TransactionId,
        success: bool,
    ) -> WalletResult<Transaction> {
        let to = if success {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        self.move_withdrawal(transaction_id, to).await
    }

    /// Cancel a withdrawal that has not settled
    pub async fn cancel_withdrawal(
        &self,
        transaction_id: TransactionId,
    ) -> WalletResult<Transaction> {
        self.move_withdrawal(transaction_id, TransactionStatus::Canceled)
            .await
    }

    async fn move_withdrawal(
        &self,
        transaction_id: TransactionId,
        to: TransactionStatus,
    ) -> WalletResult<Transaction> {
        let tx = self
            .repo
            .find_transaction(transaction_id)
            .await?
            .ok_or(WalletError::TransactionNotFound(transaction_id))?;
        if tx.kind != TransactionKind::Withdrawal {
            return Err(WalletError::NotAWithdrawal(transaction_id));
        }
        if !tx.status.can_transition_to(to) {
            return Err(WalletError::InvalidTransition {
                transaction_id,
                from: tx.status,
                to,
            });
        }

        let updated = self
            .repo
            .transition_transaction(transaction_id, tx.status, to)
            .await?;
        log::info!(
            "Withdrawal {} moved from {} to {}",
            transaction_id,
            tx.status,
            to
        );
        Ok(updated)
    }

    /// Most recent transactions of a wallet
    pub async fn transactions(
        &self,
        wallet_id: WalletId,
        limit: i64,
    ) -> WalletResult<Vec<Transaction>> {
        Ok(self.repo.list_transactions(wallet_id, limit).await?)
    }

    /// Recompute the completed sum and compare with the stored balance
    pub async fn verify_balance(&self, wallet_id: WalletId) -> WalletResult<BalanceCheck> {
        let wallet = self.get_wallet(wallet_id).await?;
        let completed_total = self.repo.completed_total(wallet_id).await?;
        let check = BalanceCheck {
            wallet_id,
            balance: wallet.balance,
            completed_total,
        };
        if !check.is_consistent() {
            log::error!(
                "Wallet {} drifted: balance {}, completed total {}",
                wallet_id,
                check.balance,
                check.completed_total
            );
        }
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn ledger() -> Ledger {
        Ledger::new(
            Arc::new(MemoryStore::new()),
            Arc::new(EngineConfig::default()),
        )
    }

    #[tokio::test]
    async fn test_non_positive_amount_rejected() {
        let ledger = ledger();
        let wallet = ledger.create_wallet(1, None).await.unwrap();
        let err = ledger
            .credit(wallet.id, Amount::ZERO, TransactionKind::Deposit, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InvalidAmount(_)));
        assert_eq!(wallet.currency, "USD");
    }

    #[tokio::test]
    async fn test_key_reuse_with_different_amount_is_rejected() {
        let ledger = ledger();
        let wallet = ledger.create_wallet(1, None).await.unwrap();
        ledger
            .credit(
                wallet.id,
                Amount::from_major(10),
                TransactionKind::Deposit,
                Some("dep-1"),
                None,
            )
            .await
            .unwrap();
        let err = ledger
            .credit(
                wallet.id,
                Amount::from_major(11),
                TransactionKind::Deposit,
                Some("dep-1"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::DuplicateIdempotencyKey(_)));
    }

    #[tokio::test]
    async fn test_debit_cannot_reuse_pending_withdrawal_key() {
        let ledger = ledger();
        let wallet = ledger.create_wallet(1, None).await.unwrap();
        ledger
            .credit(
                wallet.id,
                Amount::from_major(100),
                TransactionKind::Deposit,
                None,
                None,
            )
            .await
            .unwrap();
        let pending = ledger
            .request_withdrawal(wallet.id, Amount::from_major(10), "wd-k")
            .await
            .unwrap();
        assert_eq!(pending.status, TransactionStatus::Pending);

        let err = ledger
            .debit(
                wallet.id,
                Amount::from_major(10),
                TransactionKind::Withdrawal,
                Some("wd-k"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::DuplicateIdempotencyKey(ref key) if key == "wd-k"));
        assert_eq!(
            ledger.get_wallet(wallet.id).await.unwrap().balance,
            Amount::from_major(100)
        );

        // Replaying the request itself still returns the stored row
        let again = ledger
            .request_withdrawal(wallet.id, Amount::from_major(10), "wd-k")
            .await
            .unwrap();
        assert_eq!(again.id, pending.id);
    }

    #[tokio::test]
    async fn test_large_withdrawal_needs_approval() {
        let ledger = ledger();
        let wallet = ledger.create_wallet(1, None).await.unwrap();
        ledger
            .credit(
                wallet.id,
                Amount::from_major(5_000),
                TransactionKind::Deposit,
                None,
                None,
            )
            .await
            .unwrap();

        let tx = ledger
            .request_withdrawal(wallet.id, Amount::from_major(2_000), "wd-1")
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::RequiresApproval);

        let err = ledger.settle_withdrawal(tx.id, true).await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidTransition { .. }));

        ledger.approve_withdrawal(tx.id).await.unwrap();
        let done = ledger.settle_withdrawal(tx.id, true).await.unwrap();
        assert_eq!(done.status, TransactionStatus::Completed);
        assert_eq!(
            ledger.get_wallet(wallet.id).await.unwrap().balance,
            Amount::from_major(3_000)
        );
    }
}
