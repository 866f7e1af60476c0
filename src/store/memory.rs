//! In-process storage backend
//!
//! Committed state sits behind one `RwLock`. Row locks are modelled with a
//! keyed table of async mutexes: a unit of work acquires `wallet:<user>`,
//! `token:<hash>` or `mess-fee:<student>:<year>` and keeps the guard until it
//! commits or is dropped, so two units touching the same row serialize while
//! units on different rows never block each other. Writes are buffered and
//! applied in one step on commit.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Page, Storage, StoreError, UnitOfWork};
use crate::core_types::{MenuItemId, SettlementId, UserId, VendorId, WalletId};
use crate::directory::{MenuItem, UserAccount, Vendor};
use crate::meal::types::{MEAL_STATUS_COMPLETED, MealTransaction};
use crate::settlement::types::{SettlementStatus, VendorSettlement};
use crate::token::types::TokenRecord;
use crate::wallet::models::{LedgerEntry, LedgerTotals, MessFeeRecord, Wallet};

#[derive(Default)]
struct State {
    users: HashMap<UserId, UserAccount>,
    vendors: HashMap<VendorId, Vendor>,
    menu_items: HashMap<MenuItemId, MenuItem>,
    /// Keyed by owning user
    wallets: HashMap<UserId, Wallet>,
    /// Commit order
    entries: Vec<LedgerEntry>,
    tokens: HashMap<String, TokenRecord>,
    /// Commit order
    meals: Vec<MealTransaction>,
    mess_fees: HashMap<(UserId, String), MessFeeRecord>,
    settlements: HashMap<SettlementId, VendorSettlement>,
}

#[derive(Default)]
struct Inner {
    state: RwLock<State>,
    row_locks: DashMap<String, Arc<Mutex<()>>>,
    unavailable: AtomicBool,
}

impl Inner {
    async fn lock_row(self: &Arc<Self>, key: String) -> RowGuard {
        let mutex = self
            .row_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        RowGuard {
            inner: Arc::clone(self),
            key,
            guard: Some(guard),
        }
    }
}

/// Held row lock. Releasing the last reference to a row's mutex also
/// removes it from the lock table.
struct RowGuard {
    inner: Arc<Inner>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters hold a clone, so a count of one means only the table is left.
        self.inner
            .row_locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// In-memory [`Storage`] with the same locking contract as PostgreSQL.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // === Directory seeding ===

    pub fn upsert_user(&self, user: UserAccount) {
        self.inner.state.write().users.insert(user.id, user);
    }

    pub fn upsert_vendor(&self, vendor: Vendor) {
        self.inner.state.write().vendors.insert(vendor.id, vendor);
    }

    pub fn upsert_menu_item(&self, item: MenuItem) {
        self.inner.state.write().menu_items.insert(item.id, item);
    }

    /// Make `begin` fail as if the backing store went away.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    // === Inspection ===

    /// Every committed entry for the wallet, oldest first
    pub fn entries_for(&self, wallet_id: WalletId) -> Vec<LedgerEntry> {
        self.inner
            .state
            .read()
            .entries
            .iter()
            .filter(|e| e.wallet_id == wallet_id)
            .cloned()
            .collect()
    }

    pub fn meal_count(&self) -> usize {
        self.inner.state.read().meals.len()
    }

    pub fn wallet_count(&self) -> usize {
        self.inner.state.read().wallets.len()
    }

    /// Rows currently locked or waited on
    pub fn row_lock_count(&self) -> usize {
        self.inner.row_locks.len()
    }
}

fn paginate<T>(items: impl Iterator<Item = T>, page: Page) -> Vec<T> {
    items
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl Storage for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(Box::new(MemoryUnit::new(self.inner.clone())))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.inner.state.read().users.get(&id).cloned())
    }

    async fn get_vendor(&self, id: VendorId) -> Result<Option<Vendor>, StoreError> {
        Ok(self.inner.state.read().vendors.get(&id).cloned())
    }

    async fn get_menu_item(&self, id: MenuItemId) -> Result<Option<MenuItem>, StoreError> {
        Ok(self.inner.state.read().menu_items.get(&id).cloned())
    }

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        Ok(self.inner.state.read().wallets.get(&user_id).cloned())
    }

    async fn insert_wallet_if_absent(&self, wallet: &Wallet) -> Result<Wallet, StoreError> {
        let mut state = self.inner.state.write();
        let row = state
            .wallets
            .entry(wallet.user_id)
            .or_insert_with(|| wallet.clone());
        Ok(row.clone())
    }

    async fn list_entries(
        &self,
        wallet_id: WalletId,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.inner.state.read();
        Ok(paginate(
            state
                .entries
                .iter()
                .rev()
                .filter(|e| e.wallet_id == wallet_id)
                .cloned(),
            page,
        ))
    }

    async fn ledger_totals(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<LedgerTotals, StoreError> {
        let state = self.inner.state.read();
        Ok(LedgerTotals::from_entries(
            state.entries.iter().filter(|e| e.wallet_id == wallet_id),
            since,
        ))
    }

    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let mut state = self.inner.state.write();
        if state.tokens.contains_key(&record.code_hash) {
            return Err(StoreError::Corrupt(format!(
                "duplicate token hash {}",
                record.code_hash
            )));
        }
        state.tokens.insert(record.code_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_token(&self, code_hash: &str) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self.inner.state.read().tokens.get(code_hash).cloned())
    }

    async fn list_student_meals(
        &self,
        student_id: UserId,
        page: Page,
    ) -> Result<Vec<MealTransaction>, StoreError> {
        let state = self.inner.state.read();
        Ok(paginate(
            state
                .meals
                .iter()
                .rev()
                .filter(|m| m.student_id == student_id && m.status == MEAL_STATUS_COMPLETED)
                .cloned(),
            page,
        ))
    }

    async fn list_vendor_meals(
        &self,
        vendor_id: VendorId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: Page,
    ) -> Result<Vec<MealTransaction>, StoreError> {
        let state = self.inner.state.read();
        Ok(paginate(
            state
                .meals
                .iter()
                .rev()
                .filter(|m| m.vendor_id == vendor_id && m.status == MEAL_STATUS_COMPLETED)
                .filter(|m| start.is_none_or(|s| m.created_at >= s))
                .filter(|m| end.is_none_or(|e| m.created_at <= e))
                .cloned(),
            page,
        ))
    }

    async fn meal_totals(
        &self,
        vendor_id: VendorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(i64, Decimal), StoreError> {
        let state = self.inner.state.read();
        Ok(state
            .meals
            .iter()
            .filter(|m| m.vendor_id == vendor_id && m.status == MEAL_STATUS_COMPLETED)
            .filter(|m| m.created_at >= start && m.created_at <= end)
            .fold((0, Decimal::ZERO), |(n, sum), m| (n + 1, sum + m.amount)))
    }

    async fn insert_settlement(&self, settlement: &VendorSettlement) -> Result<bool, StoreError> {
        let mut state = self.inner.state.write();
        let s = &settlement.summary;
        let duplicate = state.settlements.values().any(|x| {
            x.summary.vendor_id == s.vendor_id
                && x.summary.period_start == s.period_start
                && x.summary.period_end == s.period_end
        });
        if duplicate {
            return Ok(false);
        }
        state.settlements.insert(settlement.id, settlement.clone());
        Ok(true)
    }

    async fn find_settlement(
        &self,
        id: SettlementId,
    ) -> Result<Option<VendorSettlement>, StoreError> {
        Ok(self.inner.state.read().settlements.get(&id).cloned())
    }

    async fn mark_settlement_paid(
        &self,
        id: SettlementId,
        reference: &str,
        approver: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.inner.state.write();
        match state.settlements.get_mut(&id) {
            Some(s) if s.status == SettlementStatus::Pending => {
                s.status = SettlementStatus::Paid;
                s.payment_reference = Some(reference.to_string());
                s.paid_by = Some(approver);
                s.paid_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_settlements(
        &self,
        vendor_id: VendorId,
        page: Page,
    ) -> Result<Vec<VendorSettlement>, StoreError> {
        let state = self.inner.state.read();
        let mut rows: Vec<VendorSettlement> = state
            .settlements
            .values()
            .filter(|s| s.summary.vendor_id == vendor_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.summary.period_start.cmp(&a.summary.period_start));
        Ok(paginate(rows.into_iter(), page))
    }
}

enum PendingWrite {
    Balance {
        wallet_id: WalletId,
        balance: Decimal,
        at: DateTime<Utc>,
    },
    Entry(LedgerEntry),
    Meal(MealTransaction),
    TokenUsed {
        code_hash: String,
        used_by: UserId,
        transaction_id: Uuid,
        at: DateTime<Utc>,
    },
    MessFee(MessFeeRecord),
}

/// Unit of work over [`MemoryStore`]
pub struct MemoryUnit {
    inner: Arc<Inner>,
    held: HashMap<String, RowGuard>,
    writes: Vec<PendingWrite>,
    balances: HashMap<WalletId, Decimal>,
    used_tokens: HashSet<String>,
    fees: HashSet<(UserId, String)>,
}

impl MemoryUnit {
    fn new(inner: Arc<Inner>) -> Self {
        Self {
            inner,
            held: HashMap::new(),
            writes: Vec::new(),
            balances: HashMap::new(),
            used_tokens: HashSet::new(),
            fees: HashSet::new(),
        }
    }

    async fn hold(&mut self, key: String) {
        if !self.held.contains_key(&key) {
            let guard = self.inner.lock_row(key.clone()).await;
            self.held.insert(key, guard);
        }
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        self.hold(format!("wallet:{}", user_id)).await;
        let mut wallet = self.inner.state.read().wallets.get(&user_id).cloned();
        if let Some(w) = wallet.as_mut() {
            if let Some(pending) = self.balances.get(&w.id) {
                w.balance = *pending;
            }
        }
        Ok(wallet)
    }

    async fn update_balance(
        &mut self,
        wallet_id: WalletId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.balances.insert(wallet_id, balance);
        self.writes.push(PendingWrite::Balance {
            wallet_id,
            balance,
            at,
        });
        Ok(())
    }

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        self.writes.push(PendingWrite::Entry(entry.clone()));
        Ok(())
    }

    async fn insert_meal(&mut self, meal: &MealTransaction) -> Result<(), StoreError> {
        self.writes.push(PendingWrite::Meal(meal.clone()));
        Ok(())
    }

    async fn mark_token_used(
        &mut self,
        code_hash: &str,
        used_by: UserId,
        transaction_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.hold(format!("token:{}", code_hash)).await;
        if self.used_tokens.contains(code_hash) {
            return Ok(false);
        }
        let unused = matches!(
            self.inner.state.read().tokens.get(code_hash),
            Some(t) if !t.used
        );
        if !unused {
            return Ok(false);
        }
        self.used_tokens.insert(code_hash.to_string());
        self.writes.push(PendingWrite::TokenUsed {
            code_hash: code_hash.to_string(),
            used_by,
            transaction_id,
            at,
        });
        Ok(true)
    }

    async fn insert_mess_fee(&mut self, record: &MessFeeRecord) -> Result<bool, StoreError> {
        let key = (record.student_id, record.academic_year.clone());
        self.hold(format!("mess-fee:{}:{}", key.0, key.1)).await;
        if self.fees.contains(&key) || self.inner.state.read().mess_fees.contains_key(&key) {
            return Ok(false);
        }
        self.fees.insert(key);
        self.writes.push(PendingWrite::MessFee(record.clone()));
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnit {
            inner,
            held,
            writes,
            ..
        } = *self;
        {
            let mut state = inner.state.write();

            let wallet_ids: HashSet<WalletId> = state.wallets.values().map(|w| w.id).collect();
            let missing = writes.iter().find_map(|w| match w {
                PendingWrite::Balance { wallet_id, .. } if !wallet_ids.contains(wallet_id) => {
                    Some(*wallet_id)
                }
                _ => None,
            });
            if let Some(wallet_id) = missing {
                return Err(StoreError::Corrupt(format!("wallet {} vanished", wallet_id)));
            }

            for w in writes {
                match w {
                    PendingWrite::Balance {
                        wallet_id,
                        balance,
                        at,
                    } => {
                        if let Some(wallet) =
                            state.wallets.values_mut().find(|x| x.id == wallet_id)
                        {
                            wallet.balance = balance;
                            wallet.updated_at = at;
                        }
                    }
                    PendingWrite::Entry(e) => state.entries.push(e),
                    PendingWrite::Meal(m) => state.meals.push(m),
                    PendingWrite::TokenUsed {
                        code_hash,
                        used_by,
                        transaction_id,
                        at,
                    } => {
                        if let Some(t) = state.tokens.get_mut(&code_hash) {
                            t.used = true;
                            t.used_by = Some(used_by);
                            t.used_at = Some(at);
                            t.transaction_id = Some(transaction_id);
                        }
                    }
                    PendingWrite::MessFee(f) => {
                        state
                            .mess_fees
                            .insert((f.student_id, f.academic_year.clone()), f);
                    }
                }
            }
        }
        // Row locks are released only after the writes are visible.
        drop(held);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::types::Purpose;
    use std::time::Duration;

    fn token(hash: &str) -> TokenRecord {
        let now = Utc::now();
        TokenRecord {
            code_hash: hash.to_string(),
            subject_id: Some(Uuid::new_v4()),
            vendor_id: None,
            purpose: Purpose::SubjectPresented,
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(300),
            used: false,
            used_at: None,
            used_by: None,
            transaction_id: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_wallet_insert_is_idempotent() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = store
            .insert_wallet_if_absent(&Wallet::new(user, "INR", Utc::now()))
            .await
            .unwrap();
        let second = store
            .insert_wallet_if_absent(&Wallet::new(user, "INR", Utc::now()))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.wallet_count(), 1);
    }

    #[tokio::test]
    async fn test_drop_rolls_back() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let wallet = store
            .insert_wallet_if_absent(&Wallet::new(user, "INR", Utc::now()))
            .await
            .unwrap();

        {
            let mut uow = store.begin().await.unwrap();
            uow.lock_wallet(user).await.unwrap();
            uow.update_balance(wallet.id, Decimal::new(500, 0), Utc::now())
                .await
                .unwrap();
        }

        let w = store.find_wallet(user).await.unwrap().unwrap();
        assert_eq!(w.balance, Decimal::ZERO);

        // lock was released by the drop
        let mut uow = store.begin().await.unwrap();
        assert!(uow.lock_wallet(user).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pending_balance_visible_inside_unit() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let wallet = store
            .insert_wallet_if_absent(&Wallet::new(user, "INR", Utc::now()))
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.lock_wallet(user).await.unwrap();
        uow.update_balance(wallet.id, Decimal::new(70, 0), Utc::now())
            .await
            .unwrap();
        let seen = uow.lock_wallet(user).await.unwrap().unwrap();
        assert_eq!(seen.balance, Decimal::new(70, 0));
        uow.commit().await.unwrap();

        let w = store.find_wallet(user).await.unwrap().unwrap();
        assert_eq!(w.balance, Decimal::new(70, 0));
    }

    #[tokio::test]
    async fn test_token_cas_blocks_then_fails() {
        let store = MemoryStore::new();
        store.insert_token(&token("abc")).await.unwrap();

        let mut first = store.begin().await.unwrap();
        assert!(
            first
                .mark_token_used("abc", Uuid::new_v4(), Uuid::new_v4(), Utc::now())
                .await
                .unwrap()
        );

        let racer = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                second
                    .mark_token_used("abc", Uuid::new_v4(), Uuid::new_v4(), Utc::now())
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!racer.is_finished(), "second unit must wait on the row lock");

        first.commit().await.unwrap();
        assert!(!racer.await.unwrap());
        assert!(store.find_token("abc").await.unwrap().unwrap().used);
    }

    #[tokio::test]
    async fn test_lock_table_empties_after_commit_and_rollback() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store.insert_token(&token("t1")).await.unwrap();
        store
            .insert_wallet_if_absent(&Wallet::new(user, "INR", Utc::now()))
            .await
            .unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.lock_wallet(user).await.unwrap();
        uow.mark_token_used("t1", user, Uuid::new_v4(), Utc::now())
            .await
            .unwrap();
        assert_eq!(store.row_lock_count(), 2);
        uow.commit().await.unwrap();
        assert_eq!(store.row_lock_count(), 0);

        {
            let mut uow = store.begin().await.unwrap();
            uow.lock_wallet(user).await.unwrap();
            assert_eq!(store.row_lock_count(), 1);
        }
        assert_eq!(store.row_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_contended_row_lock_survives_until_last_waiter() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        store
            .insert_wallet_if_absent(&Wallet::new(user, "INR", Utc::now()))
            .await
            .unwrap();

        let mut first = store.begin().await.unwrap();
        first.lock_wallet(user).await.unwrap();

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut second = store.begin().await.unwrap();
                second.lock_wallet(user).await.unwrap();
                second.commit().await.unwrap();
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first.commit().await.unwrap();
        // the waiter still owns the entry
        waiter.await.unwrap();
        assert_eq!(store.row_lock_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_marked() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        assert!(
            !uow.mark_token_used("missing", Uuid::new_v4(), Uuid::new_v4(), Utc::now())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unavailable_refuses_units() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.begin().await,
            Err(StoreError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.begin().await.is_ok());
    }
}
