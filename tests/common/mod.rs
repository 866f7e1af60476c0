//! Shared fixtures: in-process store, manual clock, seeded directory.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use mealpay::clock::{Clock, ManualClock};
use mealpay::core_types::*;
use mealpay::directory::{MenuItem, Role, UserAccount, Vendor, VendorType};
use mealpay::gateway::AppState;
use mealpay::meal::MealTransaction;
use mealpay::settlement::VendorSettlement;
use mealpay::store::{MemoryStore, Page, Storage, StoreError, UnitOfWork};
use mealpay::token::TokenRecord;
use mealpay::wallet::{EntryDraft, LedgerEntry, LedgerTotals, MessFeeRecord, RefKind, Wallet};

pub const SECRET: &str = "integration-test-secret";
pub const TTL_SECONDS: u64 = 300;

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

pub struct Fixture {
    pub store: MemoryStore,
    pub clock: Arc<ManualClock>,
    pub app: AppState,

    pub student: UserId,
    pub other_student: UserId,
    pub inactive_student: UserId,
    pub vendor_user: UserId,
    pub admin: UserId,

    pub mess: VendorId,
    pub canteen: VendorId,
    pub closed_vendor: VendorId,

    /// Veg Thali at the mess, 120.00
    pub thali: MenuItemId,
    /// Samosa at the canteen, 15.00
    pub samosa: MenuItemId,
    /// Sold out at the mess
    pub sold_out: MenuItemId,
}

fn user(role: Role, name: &str, active: bool) -> UserAccount {
    UserAccount {
        id: Uuid::new_v4(),
        full_name: name.to_string(),
        role,
        is_active: active,
    }
}

fn vendor(code: &str, name: &str, owner: Option<UserId>, active: bool) -> Vendor {
    Vendor {
        id: Uuid::new_v4(),
        owner_user_id: owner,
        vendor_code: code.to_string(),
        name: name.to_string(),
        vendor_type: VendorType::Mess,
        is_active: active,
    }
}

fn item(vendor_id: VendorId, name: &str, price: &str, available: bool) -> MenuItem {
    MenuItem {
        id: Uuid::new_v4(),
        vendor_id,
        name: name.to_string(),
        price: dec(price),
        meal_type: "lunch".to_string(),
        is_available: available,
    }
}

/// Seed the directory into `store` and wire every component over `backend`.
pub fn fixture_over(store: MemoryStore, backend: Arc<dyn Storage>) -> Fixture {
    let clock = Arc::new(ManualClock::at_default());

    let student = user(Role::Student, "Asha Rao", true);
    let other_student = user(Role::Student, "Vikram Iyer", true);
    let inactive_student = user(Role::Student, "Graduated", false);
    let vendor_user = user(Role::Vendor, "Mess Operator", true);
    let admin = user(Role::Admin, "Accounts Office", true);

    let mess = vendor("NM01", "North Mess", Some(vendor_user.id), true);
    let canteen = vendor("CC01", "Central Canteen", None, true);
    let closed = vendor("OLD1", "Old Block Mess", Some(vendor_user.id), false);

    let thali = item(mess.id, "Veg Thali", "120.00", true);
    let samosa = item(canteen.id, "Samosa", "15.00", true);
    let sold_out = item(mess.id, "Paneer Special", "90.00", false);

    let fixture_ids = (
        student.id,
        other_student.id,
        inactive_student.id,
        vendor_user.id,
        admin.id,
        mess.id,
        canteen.id,
        closed.id,
        thali.id,
        samosa.id,
        sold_out.id,
    );

    for u in [student, other_student, inactive_student, vendor_user, admin] {
        store.upsert_user(u);
    }
    for v in [mess, canteen, closed] {
        store.upsert_vendor(v);
    }
    for i in [thali, samosa, sold_out] {
        store.upsert_menu_item(i);
    }

    let app = AppState::new(
        backend,
        clock.clone() as Arc<dyn Clock>,
        SECRET,
        TTL_SECONDS,
        "INR",
    )
    .unwrap();

    Fixture {
        store,
        clock,
        app,
        student: fixture_ids.0,
        other_student: fixture_ids.1,
        inactive_student: fixture_ids.2,
        vendor_user: fixture_ids.3,
        admin: fixture_ids.4,
        mess: fixture_ids.5,
        canteen: fixture_ids.6,
        closed_vendor: fixture_ids.7,
        thali: fixture_ids.8,
        samosa: fixture_ids.9,
        sold_out: fixture_ids.10,
    }
}

pub fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let backend: Arc<dyn Storage> = Arc::new(store.clone());
    fixture_over(store, backend)
}

impl Fixture {
    /// Credit `amount` as a top-up
    pub async fn fund(&self, user_id: UserId, amount: &str) -> LedgerEntry {
        self.app
            .ledger
            .credit(
                user_id,
                dec(amount),
                EntryDraft::new(RefKind::TopUp, "Test funding"),
            )
            .await
            .unwrap()
    }

    pub async fn balance(&self, user_id: UserId) -> Decimal {
        self.app.ledger.balance(user_id).await.unwrap()
    }

    /// Committed entries for the user's wallet, oldest first
    pub async fn entries(&self, user_id: UserId) -> Vec<LedgerEntry> {
        let wallet = self.app.ledger.get_or_create(user_id).await.unwrap();
        self.store.entries_for(wallet.id)
    }

    pub async fn token_used(&self, signed: &str) -> bool {
        self.app
            .tokens
            .details(signed)
            .await
            .unwrap()
            .map(|r| r.used)
            .unwrap_or(false)
    }
}

// ============================================================================
// Fault injection
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Another request consumes the token just before this unit tries to
    RivalConsumesToken,
    /// The meal insert fails after the debit was staged
    MealInsertFails,
}

/// Delegates to a [`MemoryStore`] but injects `fault` into every unit of work.
pub struct FaultyStorage {
    pub inner: MemoryStore,
    pub fault: Fault,
}

pub struct FaultyUnit {
    inner: Box<dyn UnitOfWork>,
    store: MemoryStore,
    fault: Fault,
}

#[async_trait]
impl Storage for FaultyStorage {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(FaultyUnit {
            inner: self.inner.begin().await?,
            store: self.inner.clone(),
            fault: self.fault,
        }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        self.inner.get_user(id).await
    }

    async fn get_vendor(&self, id: VendorId) -> Result<Option<Vendor>, StoreError> {
        self.inner.get_vendor(id).await
    }

    async fn get_menu_item(&self, id: MenuItemId) -> Result<Option<MenuItem>, StoreError> {
        self.inner.get_menu_item(id).await
    }

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        self.inner.find_wallet(user_id).await
    }

    async fn insert_wallet_if_absent(&self, wallet: &Wallet) -> Result<Wallet, StoreError> {
        self.inner.insert_wallet_if_absent(wallet).await
    }

    async fn list_entries(
        &self,
        wallet_id: WalletId,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.list_entries(wallet_id, page).await
    }

    async fn ledger_totals(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<LedgerTotals, StoreError> {
        self.inner.ledger_totals(wallet_id, since).await
    }

    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError> {
        self.inner.insert_token(record).await
    }

    async fn find_token(&self, code_hash: &str) -> Result<Option<TokenRecord>, StoreError> {
        self.inner.find_token(code_hash).await
    }

    async fn list_student_meals(
        &self,
        student_id: UserId,
        page: Page,
    ) -> Result<Vec<MealTransaction>, StoreError> {
        self.inner.list_student_meals(student_id, page).await
    }

    async fn list_vendor_meals(
        &self,
        vendor_id: VendorId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: Page,
    ) -> Result<Vec<MealTransaction>, StoreError> {
        self.inner.list_vendor_meals(vendor_id, start, end, page).await
    }

    async fn meal_totals(
        &self,
        vendor_id: VendorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(i64, Decimal), StoreError> {
        self.inner.meal_totals(vendor_id, start, end).await
    }

    async fn insert_settlement(&self, settlement: &VendorSettlement) -> Result<bool, StoreError> {
        self.inner.insert_settlement(settlement).await
    }

    async fn find_settlement(
        &self,
        id: SettlementId,
    ) -> Result<Option<VendorSettlement>, StoreError> {
        self.inner.find_settlement(id).await
    }

    async fn mark_settlement_paid(
        &self,
        id: SettlementId,
        reference: &str,
        approver: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner
            .mark_settlement_paid(id, reference, approver, at)
            .await
    }

    async fn list_settlements(
        &self,
        vendor_id: VendorId,
        page: Page,
    ) -> Result<Vec<VendorSettlement>, StoreError> {
        self.inner.list_settlements(vendor_id, page).await
    }
}

#[async_trait]
impl UnitOfWork for FaultyUnit {
    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        self.inner.lock_wallet(user_id).await
    }

    async fn update_balance(
        &mut self,
        wallet_id: WalletId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner.update_balance(wallet_id, balance, at).await
    }

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.inner.append_entry(entry).await
    }

    async fn insert_meal(&mut self, meal: &MealTransaction) -> Result<(), StoreError> {
        if self.fault == Fault::MealInsertFails {
            return Err(StoreError::Unavailable("injected meal insert failure".into()));
        }
        self.inner.insert_meal(meal).await
    }

    async fn mark_token_used(
        &mut self,
        code_hash: &str,
        used_by: UserId,
        transaction_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        if self.fault == Fault::RivalConsumesToken {
            let mut rival = self.store.begin().await?;
            assert!(
                rival
                    .mark_token_used(code_hash, Uuid::new_v4(), Uuid::new_v4(), at)
                    .await?
            );
            rival.commit().await?;
        }
        self.inner
            .mark_token_used(code_hash, used_by, transaction_id, at)
            .await
    }

    async fn insert_mess_fee(&mut self, record: &MessFeeRecord) -> Result<bool, StoreError> {
        self.inner.insert_mess_fee(record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.inner.commit().await
    }
}

pub fn faulty_fixture(fault: Fault) -> Fixture {
    let store = MemoryStore::new();
    let backend: Arc<dyn Storage> = Arc::new(FaultyStorage {
        inner: store.clone(),
        fault,
    });
    fixture_over(store, backend)
}
