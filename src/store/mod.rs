//! Persistence seam
//!
//! Reads go straight through [`Storage`]. Every money-moving write runs inside
//! a [`UnitOfWork`]: a transaction that holds exclusive locks on the wallet and
//! token rows it touches and is rolled back when dropped without `commit`.

pub mod memory;
pub mod postgres;
pub mod schema;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::core_types::{MenuItemId, SettlementId, UserId, VendorId, WalletId};
use crate::directory::{MenuItem, UserAccount, Vendor};
use crate::meal::types::MealTransaction;
use crate::settlement::types::VendorSettlement;
use crate::token::types::TokenRecord;
use crate::wallet::models::{LedgerEntry, LedgerTotals, MessFeeRecord, Wallet};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Infrastructure failures. Business rejections live in the subsystem errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Unavailable(_) => "SERVICE_UNAVAILABLE",
            StoreError::Corrupt(_) => "SYSTEM_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            StoreError::Unavailable(_) => 503,
            StoreError::Database(_) | StoreError::Corrupt(_) => 500,
        }
    }
}

/// Page window for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const MAX_LIMIT: i64 = 200;

    /// Clamp caller input into a sane window
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.clamp(1, Self::MAX_LIMIT),
            offset: offset.max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// Storage backend shared by every component.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Open a unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    // === Directory (read-only) ===
    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError>;
    async fn get_vendor(&self, id: VendorId) -> Result<Option<Vendor>, StoreError>;
    async fn get_menu_item(&self, id: MenuItemId) -> Result<Option<MenuItem>, StoreError>;

    // === Wallets ===
    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError>;

    /// Insert `wallet` unless one already exists for its user; returns the
    /// surviving row either way.
    async fn insert_wallet_if_absent(&self, wallet: &Wallet) -> Result<Wallet, StoreError>;

    /// Entries for one wallet, newest first
    async fn list_entries(
        &self,
        wallet_id: WalletId,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, StoreError>;

    async fn ledger_totals(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<LedgerTotals, StoreError>;

    // === Tokens ===
    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError>;
    async fn find_token(&self, code_hash: &str) -> Result<Option<TokenRecord>, StoreError>;

    // === Meals ===
    async fn list_student_meals(
        &self,
        student_id: UserId,
        page: Page,
    ) -> Result<Vec<MealTransaction>, StoreError>;

    async fn list_vendor_meals(
        &self,
        vendor_id: VendorId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: Page,
    ) -> Result<Vec<MealTransaction>, StoreError>;

    /// `(count, sum(amount))` of completed meals in `[start, end]`
    async fn meal_totals(
        &self,
        vendor_id: VendorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(i64, Decimal), StoreError>;

    // === Settlements ===

    /// Returns false when the (vendor, start, end) tuple already exists
    async fn insert_settlement(&self, settlement: &VendorSettlement) -> Result<bool, StoreError>;

    async fn find_settlement(
        &self,
        id: SettlementId,
    ) -> Result<Option<VendorSettlement>, StoreError>;

    /// CAS pending -> paid. Returns false if the row was not pending.
    async fn mark_settlement_paid(
        &self,
        id: SettlementId,
        reference: &str,
        approver: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Newest period first
    async fn list_settlements(
        &self,
        vendor_id: VendorId,
        page: Page,
    ) -> Result<Vec<VendorSettlement>, StoreError>;
}

/// One atomic scope. Dropping without [`UnitOfWork::commit`] rolls back.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Lock the user's wallet row until the unit ends.
    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>, StoreError>;

    async fn update_balance(
        &mut self,
        wallet_id: WalletId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn insert_meal(&mut self, meal: &MealTransaction) -> Result<(), StoreError>;

    /// Mark the token used only if it is currently unused.
    ///
    /// Blocks on a concurrent unit holding the same token; returns false if
    /// the token was already consumed (or does not exist).
    async fn mark_token_used(
        &mut self,
        code_hash: &str,
        used_by: UserId,
        transaction_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Returns false if a fee for (student, academic year) already exists.
    async fn insert_mess_fee(&mut self, record: &MessFeeRecord) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
