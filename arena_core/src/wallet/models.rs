//! Wallet and ledger data models.

use crate::tournament::TournamentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// User ID type
pub type UserId = i64;

/// Wallet ID type
pub type WalletId = i64;

/// Ledger transaction ID type
pub type TransactionId = i64;

/// Fixed-point money amount stored as minor units (two fractional digits).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Amount from minor units (cents)
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Amount from whole currency units, saturating at the `i64` bounds
    pub const fn from_major(major: i64) -> Self {
        Self(major.saturating_mul(100))
    }

    /// Amount from whole currency units, `None` when out of range
    pub const fn checked_from_major(major: i64) -> Option<Self> {
        match major.checked_mul(100) {
            Some(minor) => Some(Self(minor)),
            None => None,
        }
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Multiply by a count (fee x participants)
    pub fn checked_mul(self, count: i64) -> Option<Amount> {
        self.0.checked_mul(count).map(Amount)
    }
}

impl std::ops::Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        Amount(iter.map(|a| a.0).sum())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// Error parsing a decimal amount string
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid amount '{0}': expected at most two fractional digits")]
pub struct ParseAmountError(String);

impl FromStr for Amount {
    type Err = ParseAmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseAmountError(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        if whole.is_empty() || frac.len() > 2 {
            return Err(err());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }

        let whole: i64 = whole.parse().map_err(|_| err())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse().map_err(|_| err())?,
        };

        let minor = whole
            .checked_mul(100)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(err)?;
        Ok(Amount(if negative { -minor } else { minor }))
    }
}

/// Wallet model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub user_id: UserId,
    pub balance: Amount,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
    TournamentFee,
    PrizePayout,
    Refund,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
            TransactionKind::TournamentFee => "tournament_fee",
            TransactionKind::PrizePayout => "prize_payout",
            TransactionKind::Refund => "refund",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            "tournament_fee" => Ok(TransactionKind::TournamentFee),
            "prize_payout" => Ok(TransactionKind::PrizePayout),
            "refund" => Ok(TransactionKind::Refund),
            other => Err(format!("unknown transaction kind '{other}'")),
        }
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Canceled,
    RequiresApproval,
}

impl TransactionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Canceled => "canceled",
            TransactionStatus::RequiresApproval => "requires_approval",
        }
    }

    /// Whether `self -> next` is a legal ledger status move.
    ///
    /// Completed and failed rows are immutable.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Canceled)
                | (RequiresApproval, Pending)
                | (RequiresApproval, Canceled)
        )
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "canceled" => Ok(TransactionStatus::Canceled),
            "requires_approval" => Ok(TransactionStatus::RequiresApproval),
            other => Err(format!("unknown transaction status '{other}'")),
        }
    }
}

/// Ledger transaction (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub wallet_id: WalletId,
    pub kind: TransactionKind,
    /// Signed: credits positive, debits negative
    pub amount: Amount,
    pub status: TransactionStatus,
    pub idempotency_key: Option<String>,
    pub tournament_id: Option<TournamentId>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// True when a keyed replay describes the same financial effect.
    ///
    /// A request that moves money on insert only matches a row that has
    /// moved it; a pending request also matches its later settled states.
    pub fn same_effect(&self, request: &NewTransaction) -> bool {
        self.wallet_id == request.wallet_id
            && self.kind == request.kind
            && self.amount == request.amount
            && (request.status != TransactionStatus::Completed
                || self.status == TransactionStatus::Completed)
    }
}

/// Transaction to append
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub wallet_id: WalletId,
    pub kind: TransactionKind,
    pub amount: Amount,
    /// Only `Completed` rows move the balance on insert
    pub status: TransactionStatus,
    pub idempotency_key: Option<String>,
    pub tournament_id: Option<TournamentId>,
    pub metadata: serde_json::Value,
}

/// Result of appending a keyed transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Posting {
    /// New row written and balance applied
    Created(Transaction),
    /// Idempotency key already present; stored row returned untouched
    Replayed(Transaction),
}

impl Posting {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Posting::Created(tx) | Posting::Replayed(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> Transaction {
        match self {
            Posting::Created(tx) | Posting::Replayed(tx) => tx,
        }
    }

    pub fn is_replay(&self) -> bool {
        matches!(self, Posting::Replayed(_))
    }
}

/// Outcome of `Ledger::refund_all`
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefundReport {
    /// Refunds written by this run
    pub refunded: Vec<TransactionId>,
    /// Refunds found already applied by an earlier run
    pub already_refunded: Vec<TransactionId>,
    /// (fee transaction, error) pairs left for the next run
    pub failed: Vec<(TransactionId, String)>,
}

impl RefundReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Result of `Ledger::verify_balance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BalanceCheck {
    pub wallet_id: WalletId,
    pub balance: Amount,
    pub completed_total: Amount,
}

impl BalanceCheck {
    pub fn is_consistent(&self) -> bool {
        self.balance == self.completed_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_display() {
        assert_eq!(Amount::from_minor(1234).to_string(), "12.34");
        assert_eq!(Amount::from_minor(5).to_string(), "0.05");
        assert_eq!(Amount::from_minor(-250).to_string(), "-2.50");
        assert_eq!(Amount::ZERO.to_string(), "0.00");
    }

    #[test]
    fn test_amount_parse() {
        assert_eq!("12.34".parse::<Amount>(), Ok(Amount::from_minor(1234)));
        assert_eq!("7".parse::<Amount>(), Ok(Amount::from_major(7)));
        assert_eq!("0.5".parse::<Amount>(), Ok(Amount::from_minor(50)));
        assert_eq!("-1.05".parse::<Amount>(), Ok(Amount::from_minor(-105)));
        assert!("1.234".parse::<Amount>().is_err());
        assert!("abc".parse::<Amount>().is_err());
        assert!(".50".parse::<Amount>().is_err());
    }

    #[test]
    fn test_major_units_never_wrap() {
        assert_eq!(Amount::checked_from_major(12), Some(Amount::from_minor(1_200)));
        assert_eq!(Amount::checked_from_major(i64::MAX / 10), None);
        assert_eq!(Amount::checked_from_major(i64::MIN), None);
        assert_eq!(Amount::from_major(i64::MAX), Amount::from_minor(i64::MAX));
        assert_eq!(Amount::from_major(i64::MIN), Amount::from_minor(i64::MIN));
    }

    #[test]
    fn test_completed_request_never_matches_pending_row() {
        let now = Utc::now();
        let pending = Transaction {
            id: 1,
            wallet_id: 7,
            kind: TransactionKind::Withdrawal,
            amount: Amount::from_major(-10),
            status: TransactionStatus::Pending,
            idempotency_key: Some("wd".to_string()),
            tournament_id: None,
            metadata: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        let mut request = NewTransaction {
            wallet_id: 7,
            kind: TransactionKind::Withdrawal,
            amount: Amount::from_major(-10),
            status: TransactionStatus::Pending,
            idempotency_key: Some("wd".to_string()),
            tournament_id: None,
            metadata: serde_json::json!({}),
        };
        assert!(pending.same_effect(&request));

        request.status = TransactionStatus::Completed;
        assert!(!pending.same_effect(&request));

        let settled = Transaction {
            status: TransactionStatus::Completed,
            ..pending
        };
        assert!(settled.same_effect(&request));
        request.status = TransactionStatus::Pending;
        assert!(settled.same_effect(&request));
    }

    #[test]
    fn test_status_transitions() {
        use TransactionStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(RequiresApproval.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!RequiresApproval.can_transition_to(Completed));
    }

    #[test]
    fn test_kind_round_trips_through_storage_name() {
        for kind in [
            TransactionKind::Deposit,
            TransactionKind::Withdrawal,
            TransactionKind::TournamentFee,
            TransactionKind::PrizePayout,
            TransactionKind::Refund,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionKind>(), Ok(kind));
        }
    }
}
