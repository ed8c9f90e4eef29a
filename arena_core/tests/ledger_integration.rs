//! Integration tests for the wallet ledger.
//!
//! Covers idempotent postings, the never-negative balance, withdrawal
//! settlement and the balance/transaction-log invariant, all over the
//! in-memory store.

use arena_core::config::EngineConfig;
use arena_core::db::MemoryStore;
use arena_core::wallet::{
    Amount, Ledger, TransactionKind, TransactionStatus, Wallet, WalletError,
};
use arena_core::ErrorKind;
use std::sync::Arc;

fn ledger() -> Ledger {
    Ledger::new(Arc::new(MemoryStore::new()), Arc::new(EngineConfig::default()))
}

/// Helper to open a wallet and fund it
async fn funded_wallet(ledger: &Ledger, user_id: i64, major: i64) -> Wallet {
    let wallet = ledger.create_wallet(user_id, None).await.unwrap();
    if major > 0 {
        ledger
            .credit(
                wallet.id,
                Amount::from_major(major),
                TransactionKind::Deposit,
                Some(&format!("seed-deposit-{user_id}")),
                None,
            )
            .await
            .unwrap();
    }
    ledger.get_wallet(wallet.id).await.unwrap()
}

#[tokio::test]
async fn test_keyed_credit_applies_once() {
    let ledger = ledger();
    let wallet = funded_wallet(&ledger, 1, 0).await;

    let first = ledger
        .credit(wallet.id, Amount::from_major(25), TransactionKind::Deposit, Some("dep-1"), None)
        .await
        .unwrap();
    let second = ledger
        .credit(wallet.id, Amount::from_major(25), TransactionKind::Deposit, Some("dep-1"), None)
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, Amount::from_major(25));
    assert_eq!(ledger.transactions(wallet.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_keyed_credits_apply_once() {
    let ledger = ledger();
    let wallet_id = funded_wallet(&ledger, 1, 0).await.id;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .credit(wallet_id, Amount::from_major(5), TransactionKind::Deposit, Some("race"), None)
                .await
        }));
    }
    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.dedup();

    assert_eq!(ids.len(), 1, "every caller must see the same row");
    assert_eq!(ledger.get_wallet(wallet_id).await.unwrap().balance, Amount::from_major(5));
}

#[tokio::test]
async fn test_overdraft_refused_without_trace() {
    let ledger = ledger();
    let wallet = funded_wallet(&ledger, 1, 10).await;

    let err = ledger
        .debit(wallet.id, Amount::from_major(11), TransactionKind::Withdrawal, Some("w-1"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, WalletError::InsufficientFunds { .. }));
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, Amount::from_major(10));
    assert_eq!(ledger.transactions(wallet.id, 10).await.unwrap().len(), 1);

    // The refused key stays free for a later, affordable attempt
    let ok = ledger
        .debit(wallet.id, Amount::from_major(4), TransactionKind::Withdrawal, Some("w-1"), None)
        .await
        .unwrap();
    assert_eq!(ok.amount, Amount::from_major(-4));
}

#[tokio::test]
async fn test_debit_to_exactly_zero_allowed() {
    let ledger = ledger();
    let wallet = funded_wallet(&ledger, 1, 10).await;

    ledger
        .debit(wallet.id, Amount::from_major(10), TransactionKind::Withdrawal, None, None)
        .await
        .unwrap();
    assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, Amount::ZERO);
}

#[tokio::test]
async fn test_balance_matches_completed_sum() {
    let ledger = ledger();
    let wallet = funded_wallet(&ledger, 1, 100).await;

    ledger
        .debit(wallet.id, Amount::from_minor(1_234), TransactionKind::Withdrawal, None, None)
        .await
        .unwrap();
    ledger
        .credit(wallet.id, Amount::from_minor(99), TransactionKind::Refund, None, None)
        .await
        .unwrap();
    // Pending rows do not count toward the balance
    ledger
        .request_withdrawal(wallet.id, Amount::from_major(5), "pending-1")
        .await
        .unwrap();

    let check = ledger.verify_balance(wallet.id).await.unwrap();
    assert!(check.is_consistent());
    assert_eq!(check.balance, Amount::from_minor(10_000 - 1_234 + 99));
}

#[tokio::test]
async fn test_withdrawal_settles_only_on_completion() {
    let ledger = ledger();
    let wallet = funded_wallet(&ledger, 1, 50).await;

    let pending = ledger
        .request_withdrawal(wallet.id, Amount::from_major(20), "wd-1")
        .await
        .unwrap();
    assert_eq!(pending.status, TransactionStatus::Pending);
    assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, Amount::from_major(50));

    let settled = ledger.settle_withdrawal(pending.id, true).await.unwrap();
    assert_eq!(settled.status, TransactionStatus::Completed);
    assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, Amount::from_major(30));

    // Completed rows are immutable
    let err = ledger.cancel_withdrawal(pending.id).await.unwrap_err();
    assert!(matches!(err, WalletError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_large_withdrawal_goes_through_approval() {
    let config = EngineConfig {
        withdrawal_approval_threshold: Amount::from_major(10),
        ..EngineConfig::default()
    };
    let ledger = Ledger::new(Arc::new(MemoryStore::new()), Arc::new(config));
    let wallet = funded_wallet(&ledger, 1, 100).await;

    let held = ledger
        .request_withdrawal(wallet.id, Amount::from_major(60), "big-1")
        .await
        .unwrap();
    assert_eq!(held.status, TransactionStatus::RequiresApproval);

    // Cannot settle before approval
    assert!(ledger.settle_withdrawal(held.id, true).await.is_err());

    let approved = ledger.approve_withdrawal(held.id).await.unwrap();
    assert_eq!(approved.status, TransactionStatus::Pending);
    let failed = ledger.settle_withdrawal(held.id, false).await.unwrap();
    assert_eq!(failed.status, TransactionStatus::Failed);
    assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, Amount::from_major(100));
}

#[tokio::test]
async fn test_settlement_refused_when_balance_dropped() {
    let ledger = ledger();
    let wallet = funded_wallet(&ledger, 1, 30).await;

    let pending = ledger
        .request_withdrawal(wallet.id, Amount::from_major(25), "wd-late")
        .await
        .unwrap();
    ledger
        .debit(wallet.id, Amount::from_major(10), TransactionKind::Withdrawal, None, None)
        .await
        .unwrap();

    let err = ledger.settle_withdrawal(pending.id, true).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, Amount::from_major(20));
}

#[tokio::test]
async fn test_wallet_lifecycle() {
    let ledger = ledger();
    let wallet = funded_wallet(&ledger, 9, 5).await;

    assert!(matches!(
        ledger.create_wallet(9, None).await,
        Err(WalletError::WalletExists(9))
    ));
    assert_eq!(ledger.wallet_for_owner(9).await.unwrap().id, wallet.id);
    assert_eq!(wallet.currency, "USD");

    assert!(matches!(
        ledger.delete_wallet(wallet.id).await,
        Err(WalletError::WalletNotEmpty(_))
    ));
    ledger
        .debit(wallet.id, Amount::from_major(5), TransactionKind::Withdrawal, None, None)
        .await
        .unwrap();
    ledger.delete_wallet(wallet.id).await.unwrap();
    assert!(matches!(
        ledger.get_wallet(wallet.id).await,
        Err(WalletError::WalletNotFound(_))
    ));
}

#[tokio::test]
async fn test_prize_is_paid_once_per_tournament() {
    let ledger = ledger();
    let wallet = funded_wallet(&ledger, 1, 0).await;

    let first = ledger.pay_prize(77, wallet.id, Amount::from_major(40)).await.unwrap();
    let again = ledger.pay_prize(77, wallet.id, Amount::from_major(40)).await.unwrap();

    assert_eq!(first.id, again.id);
    assert_eq!(first.idempotency_key.as_deref(), Some("tournament:77:prize"));
    assert_eq!(ledger.get_wallet(wallet.id).await.unwrap().balance, Amount::from_major(40));
}
