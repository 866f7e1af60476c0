//! Wallet Ledger
//!
//! Every balance mutation locks exactly one wallet row, recomputes the
//! balance from the committed value, writes it back and appends one
//! immutable entry, all in the same unit of work. Failed debits leave no
//! entry behind.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::error::LedgerError;
use super::models::{
    Direction, ENTRY_STATUS_COMPLETED, EntryDraft, LedgerEntry, MessFeeRecord, RefKind, Wallet,
    WalletSummary,
};
use crate::clock::Clock;
use crate::core_types::{UserId, new_id};
use crate::money::{MAX_AMOUNT, ensure_positive};
use crate::store::{Page, Storage, UnitOfWork};

/// Default wallet currency
pub const DEFAULT_CURRENCY: &str = "INR";

pub struct WalletLedger {
    store: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    currency: String,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn Storage>, clock: Arc<dyn Clock>, currency: impl Into<String>) -> Self {
        Self {
            store,
            clock,
            currency: currency.into(),
        }
    }

    /// Fetch the user's wallet, creating an empty one on first access.
    ///
    /// Concurrent first calls converge on one row via the unique owner
    /// constraint.
    pub async fn get_or_create(&self, user_id: UserId) -> Result<Wallet, LedgerError> {
        if let Some(wallet) = self.store.find_wallet(user_id).await? {
            return Ok(wallet);
        }
        let fresh = Wallet::new(user_id, &self.currency, self.clock.now());
        let wallet = self.store.insert_wallet_if_absent(&fresh).await?;
        if wallet.id == fresh.id {
            info!(user_id = %user_id, wallet_id = %wallet.id, "Wallet created");
        }
        Ok(wallet)
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Decimal, LedgerError> {
        Ok(self.get_or_create(user_id).await?.balance)
    }

    pub async fn credit(
        &self,
        user_id: UserId,
        amount: Decimal,
        draft: EntryDraft,
    ) -> Result<LedgerEntry, LedgerError> {
        self.apply(user_id, Direction::Credit, amount, draft).await
    }

    /// Fails with `InsufficientFunds` when `balance < amount`.
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: Decimal,
        draft: EntryDraft,
    ) -> Result<LedgerEntry, LedgerError> {
        self.apply(user_id, Direction::Debit, amount, draft).await
    }

    async fn apply(
        &self,
        user_id: UserId,
        direction: Direction,
        amount: Decimal,
        draft: EntryDraft,
    ) -> Result<LedgerEntry, LedgerError> {
        let amount = ensure_positive(amount)?;
        self.get_or_create(user_id).await?;

        let mut uow = self.store.begin().await?;
        let entry = self
            .apply_in(uow.as_mut(), user_id, direction, amount, draft)
            .await?;
        uow.commit().await?;

        log_committed(user_id, &entry);
        Ok(entry)
    }

    /// Mutate the wallet inside the caller's unit of work.
    ///
    /// The wallet must already exist. Nothing is visible until the caller
    /// commits.
    pub async fn apply_in(
        &self,
        uow: &mut dyn UnitOfWork,
        user_id: UserId,
        direction: Direction,
        amount: Decimal,
        draft: EntryDraft,
    ) -> Result<LedgerEntry, LedgerError> {
        let amount = ensure_positive(amount)?;
        let wallet = uow
            .lock_wallet(user_id)
            .await?
            .ok_or(LedgerError::WalletNotFound)?;

        let before = wallet.balance;
        if direction == Direction::Debit && before < amount {
            warn!(
                user_id = %user_id,
                available = %before,
                requested = %amount,
                ref_kind = %draft.ref_kind,
                "Insufficient wallet balance"
            );
            return Err(LedgerError::InsufficientFunds {
                available: before,
                requested: amount,
            });
        }
        let after = direction
            .apply(before, amount)
            .filter(|after| *after <= MAX_AMOUNT)
            .ok_or_else(|| {
                warn!(
                    user_id = %user_id,
                    balance = %before,
                    requested = %amount,
                    "Credit would exceed the wallet balance limit"
                );
                LedgerError::BalanceLimitExceeded {
                    balance: before,
                    amount,
                    limit: MAX_AMOUNT,
                }
            })?;
        let now = self.clock.now();

        let entry = LedgerEntry {
            id: new_id(),
            wallet_id: wallet.id,
            direction,
            amount,
            balance_before: before,
            balance_after: after,
            ref_kind: draft.ref_kind,
            ref_id: draft.ref_id,
            description: draft.description,
            status: ENTRY_STATUS_COMPLETED,
            metadata: draft.metadata,
            created_at: now,
        };

        uow.update_balance(wallet.id, after, now).await?;
        uow.append_entry(&entry).await?;

        debug!(
            wallet_id = %wallet.id,
            direction = %direction,
            before = %before,
            after = %after,
            "Ledger entry staged"
        );
        Ok(entry)
    }

    pub async fn debit_in(
        &self,
        uow: &mut dyn UnitOfWork,
        user_id: UserId,
        amount: Decimal,
        draft: EntryDraft,
    ) -> Result<LedgerEntry, LedgerError> {
        self.apply_in(uow, user_id, Direction::Debit, amount, draft)
            .await
    }

    /// Credit with reference kind `top-up`.
    pub async fn top_up(
        &self,
        user_id: UserId,
        amount: Decimal,
        payment_method: Option<String>,
        payment_reference: Option<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        let draft = EntryDraft::new(RefKind::TopUp, "Wallet top-up")
            .with_ref(new_id())
            .with_metadata(json!({
                "payment_method": payment_method,
                "payment_reference": payment_reference,
            }));
        self.credit(user_id, amount, draft).await
    }

    /// Record the year's mess fee and credit it, atomically. A second
    /// payment for the same academic year is rejected and changes nothing.
    pub async fn pay_mess_fee(
        &self,
        user_id: UserId,
        amount: Decimal,
        academic_year: &str,
        semester: Option<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        let academic_year = academic_year.trim();
        if academic_year.is_empty() {
            return Err(LedgerError::InvalidParameter(
                "academic_year is required".into(),
            ));
        }
        let amount = ensure_positive(amount)?;
        let wallet = self.get_or_create(user_id).await?;

        let record = MessFeeRecord {
            id: new_id(),
            student_id: user_id,
            wallet_id: wallet.id,
            academic_year: academic_year.to_string(),
            semester: semester.clone(),
            amount,
            created_at: self.clock.now(),
        };

        let mut uow = self.store.begin().await?;
        if !uow.insert_mess_fee(&record).await? {
            warn!(user_id = %user_id, academic_year = %academic_year, "Duplicate mess fee payment");
            return Err(LedgerError::MessFeeAlreadyPaid(academic_year.to_string()));
        }
        let draft = EntryDraft::new(
            RefKind::MessFee,
            format!("Mess fee payment for {}", academic_year),
        )
        .with_ref(record.id)
        .with_metadata(json!({ "academic_year": academic_year, "semester": semester }));
        let entry = self
            .apply_in(uow.as_mut(), user_id, Direction::Credit, amount, draft)
            .await?;
        uow.commit().await?;

        log_committed(user_id, &entry);
        Ok(entry)
    }

    /// Entries newest first
    pub async fn list_ledger(
        &self,
        user_id: UserId,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let wallet = self.get_or_create(user_id).await?;
        Ok(self.store.list_entries(wallet.id, page).await?)
    }

    /// Wallet plus totals; "today" starts at UTC midnight of the clock.
    pub async fn summary(&self, user_id: UserId) -> Result<WalletSummary, LedgerError> {
        let wallet = self.get_or_create(user_id).await?;
        let totals = self
            .store
            .ledger_totals(wallet.id, start_of_day(self.clock.now()))
            .await?;
        Ok(WalletSummary { wallet, totals })
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or(now)
}

fn log_committed(user_id: UserId, entry: &LedgerEntry) {
    info!(
        user_id = %user_id,
        wallet_id = %entry.wallet_id,
        direction = %entry.direction,
        amount = %entry.amount,
        balance_after = %entry.balance_after,
        ref_kind = %entry.ref_kind,
        "Ledger entry committed"
    );
}
