//! Wallet and ledger records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use utoipa::ToSchema;

use crate::core_types::{LedgerEntryId, UserId, WalletId};

/// Per-user prepaid balance.
///
/// `balance` always equals the sum of committed ledger entries for the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Wallet {
    #[schema(value_type = Uuid)]
    pub id: WalletId,
    #[schema(value_type = Uuid)]
    pub user_id: UserId,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Fresh zero-balance wallet
    pub fn new(user_id: UserId, currency: &str, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: Decimal::ZERO,
            currency: currency.to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Direction of a balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "credit",
            Direction::Debit => "debit",
        }
    }

    /// Signed effect of `amount` on a balance; `None` on `Decimal` overflow
    #[inline]
    pub fn apply(&self, balance: Decimal, amount: Decimal) -> Option<Decimal> {
        match self {
            Direction::Credit => balance.checked_add(amount),
            Direction::Debit => balance.checked_sub(amount),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(Direction::Credit),
            "debit" => Ok(Direction::Debit),
            other => Err(format!("unknown direction: {}", other)),
        }
    }
}

/// Business event a ledger entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RefKind {
    TopUp,
    MessFee,
    MealPurchase,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefKind::TopUp => "top-up",
            RefKind::MessFee => "mess-fee",
            RefKind::MealPurchase => "meal-purchase",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top-up" => Ok(RefKind::TopUp),
            "mess-fee" => Ok(RefKind::MessFee),
            "meal-purchase" => Ok(RefKind::MealPurchase),
            other => Err(format!("unknown reference kind: {}", other)),
        }
    }
}

/// Status stored on every persisted entry; failed attempts never get a row.
pub const ENTRY_STATUS_COMPLETED: &str = "completed";

/// Immutable record of one balance mutation
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LedgerEntry {
    #[schema(value_type = Uuid)]
    pub id: LedgerEntryId,
    #[schema(value_type = Uuid)]
    pub wallet_id: WalletId,
    pub direction: Direction,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_before: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance_after: Decimal,
    pub ref_kind: RefKind,
    pub ref_id: Option<Uuid>,
    pub description: String,
    pub status: &'static str,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// `balance_after == balance_before ± amount` for the entry's direction
    pub fn is_consistent(&self) -> bool {
        self.amount > Decimal::ZERO
            && self.direction.apply(self.balance_before, self.amount) == Some(self.balance_after)
    }

    /// Signed contribution of this entry to the wallet balance
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

/// Caller-supplied description of a balance mutation
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub ref_kind: RefKind,
    pub ref_id: Option<Uuid>,
    pub description: String,
    pub metadata: serde_json::Value,
}

impl EntryDraft {
    pub fn new(ref_kind: RefKind, description: impl Into<String>) -> Self {
        Self {
            ref_kind,
            ref_id: None,
            description: description.into(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_ref(mut self, ref_id: Uuid) -> Self {
        self.ref_id = Some(ref_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Aggregates over a wallet's committed entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct LedgerTotals {
    pub credit_count: i64,
    pub debit_count: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_credited: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_spent: Decimal,
    pub debits_since: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub spent_since: Decimal,
}

impl LedgerTotals {
    /// Fold entries into totals; `since` bounds the "today" figures.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
        since: DateTime<Utc>,
    ) -> Self {
        let mut totals = LedgerTotals::default();
        for e in entries {
            match e.direction {
                Direction::Credit => {
                    totals.credit_count += 1;
                    totals.total_credited += e.amount;
                }
                Direction::Debit => {
                    totals.debit_count += 1;
                    totals.total_spent += e.amount;
                    if e.created_at >= since {
                        totals.debits_since += 1;
                        totals.spent_since += e.amount;
                    }
                }
            }
        }
        totals
    }
}

/// Wallet plus its usage statistics
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WalletSummary {
    pub wallet: Wallet,
    pub totals: LedgerTotals,
}

/// One mess-fee payment per student per academic year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessFeeRecord {
    pub id: Uuid,
    pub student_id: UserId,
    pub wallet_id: WalletId,
    pub academic_year: String,
    pub semester: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}
