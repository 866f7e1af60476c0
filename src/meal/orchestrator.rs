//! Transaction Orchestrator
//!
//! Drives one meal redemption from request to a committed (or entirely
//! absent) result. The debit, the meal row and the token consumption share a
//! single unit of work; any failure drops it and nothing becomes visible.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::RedeemError;
use super::state::{RedemptionState, RedemptionTrace};
use super::types::{Identity, MEAL_STATUS_COMPLETED, MealTransaction, RedeemRequest};
use crate::clock::Clock;
use crate::core_types::{MealTransactionId, UserId, VendorId, new_id};
use crate::directory::{MenuItem, Role, UserAccount, Vendor};
use crate::money::ensure_positive;
use crate::store::{Page, Storage};
use crate::token::{Purpose, TokenRegistry, ValidToken};
use crate::wallet::{EntryDraft, RefKind, WalletLedger};

pub struct MealOrchestrator {
    store: Arc<dyn Storage>,
    tokens: Arc<TokenRegistry>,
    ledger: Arc<WalletLedger>,
    clock: Arc<dyn Clock>,
}

impl MealOrchestrator {
    pub fn new(
        store: Arc<dyn Storage>,
        tokens: Arc<TokenRegistry>,
        ledger: Arc<WalletLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            tokens,
            ledger,
            clock,
        }
    }

    /// Redeem one meal. `caller` is recorded as the token consumer.
    ///
    /// On success exactly one ledger entry, one meal row and (for token
    /// paths) one consumed token exist. On rejection none of them do.
    pub async fn redeem(
        &self,
        req: RedeemRequest,
        caller: UserId,
    ) -> Result<MealTransaction, RedeemError> {
        let meal_id = new_id();
        let mut trace = RedemptionTrace::new(meal_id);

        match self.run(&req, caller, meal_id, &mut trace).await {
            Ok(meal) => {
                trace.advance(RedemptionState::Completed);
                info!(
                    meal_id = %meal.id,
                    student_id = %meal.student_id,
                    vendor_id = %meal.vendor_id,
                    amount = %meal.amount,
                    item = %meal.item_name,
                    "Meal redeemed"
                );
                Ok(meal)
            }
            Err(e) => {
                trace.reject(&e);
                if e.is_already_used() {
                    warn!(vendor_id = %req.vendor_id, caller = %caller, "Replay rejected");
                }
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        req: &RedeemRequest,
        caller: UserId,
        meal_id: MealTransactionId,
        trace: &mut RedemptionTrace,
    ) -> Result<MealTransaction, RedeemError> {
        // 1. identity
        let (student_id, token) = self.resolve_identity(req).await?;
        trace.advance(RedemptionState::IdentityResolved);

        // 2. vendor & item
        let (vendor, item) = self.resolve_vendor_item(req).await?;
        let amount = match req.amount {
            Some(a) => ensure_positive(a)?,
            None => item.price,
        };
        trace.advance(RedemptionState::VendorResolved);

        // 3. student
        self.resolve_student(student_id).await?;
        let wallet = self.ledger.get_or_create(student_id).await?;
        trace.advance(RedemptionState::StudentResolved);

        // 4..6 one unit of work
        let mut uow = self.store.begin().await?;

        let draft = EntryDraft::new(
            RefKind::MealPurchase,
            format!("Meal purchase: {} at {}", item.name, vendor.name),
        )
        .with_ref(meal_id)
        .with_metadata(json!({
            "vendor_id": vendor.id,
            "menu_item_id": item.id,
            "meal_type": item.meal_type,
        }));
        let entry = self
            .ledger
            .debit_in(uow.as_mut(), student_id, amount, draft)
            .await?;
        trace.advance(RedemptionState::Debited);

        let now = self.clock.now();
        let meal = MealTransaction {
            id: meal_id,
            student_id,
            wallet_id: wallet.id,
            vendor_id: vendor.id,
            menu_item_id: item.id,
            amount,
            meal_type: item.meal_type.clone(),
            item_name: item.name.clone(),
            token_hash: token.as_ref().map(|t| t.code_hash.clone()),
            ledger_entry_id: entry.id,
            status: MEAL_STATUS_COMPLETED,
            metadata: json!({
                "vendor_code": vendor.vendor_code,
                "ledger_entry_id": entry.id,
                "purpose": token.as_ref().map(|t| t.payload.purpose),
            }),
            created_at: now,
            processed_at: now,
        };
        uow.insert_meal(&meal).await?;
        trace.advance(RedemptionState::Recorded);

        if let Some(t) = &token {
            self.tokens
                .consume_in(uow.as_mut(), &t.code_hash, caller, meal_id)
                .await?;
            trace.advance(RedemptionState::TokenConsumed);
        }

        uow.commit().await?;

        if let Some(t) = &token {
            self.tokens.evict(&t.code_hash);
        }
        Ok(meal)
    }

    async fn resolve_identity(
        &self,
        req: &RedeemRequest,
    ) -> Result<(UserId, Option<ValidToken>), RedeemError> {
        match &req.identity {
            Identity::SubjectToken { signed } => {
                let valid = self
                    .tokens
                    .check_valid(signed, Purpose::SubjectPresented)
                    .await?;
                if let Some(bound) = valid.payload.counterparty
                    && bound != req.vendor_id
                {
                    return Err(RedeemError::VendorMismatch);
                }
                Ok((valid.payload.identity, Some(valid)))
            }
            Identity::CounterToken { signed, student_id } => {
                let valid = self
                    .tokens
                    .check_valid(signed, Purpose::CounterPresented)
                    .await?;
                if valid.payload.identity != req.vendor_id {
                    return Err(RedeemError::VendorMismatch);
                }
                Ok((*student_id, Some(valid)))
            }
            Identity::Direct { student_id } => Ok((*student_id, None)),
        }
    }

    async fn resolve_vendor_item(
        &self,
        req: &RedeemRequest,
    ) -> Result<(Vendor, MenuItem), RedeemError> {
        let vendor = self
            .store
            .get_vendor(req.vendor_id)
            .await?
            .ok_or(RedeemError::VendorNotFound)?;
        if !vendor.is_active {
            return Err(RedeemError::VendorInactive);
        }

        let item = self
            .store
            .get_menu_item(req.menu_item_id)
            .await?
            .filter(|i| i.vendor_id == vendor.id)
            .ok_or(RedeemError::MenuItemNotFound)?;
        if !item.is_sellable_by(vendor.id) {
            return Err(RedeemError::ItemUnavailable);
        }
        Ok((vendor, item))
    }

    async fn resolve_student(&self, student_id: UserId) -> Result<UserAccount, RedeemError> {
        let user = self
            .store
            .get_user(student_id)
            .await?
            .ok_or(RedeemError::StudentNotFound)?;
        if user.role != Role::Student {
            return Err(RedeemError::NotAStudent);
        }
        if !user.is_active {
            return Err(RedeemError::StudentInactive);
        }
        Ok(user)
    }

    // === Histories ===

    /// Completed meals for a student, newest first
    pub async fn student_history(
        &self,
        student_id: UserId,
        page: Page,
    ) -> Result<Vec<MealTransaction>, RedeemError> {
        Ok(self.store.list_student_meals(student_id, page).await?)
    }

    /// Completed meals at a vendor within optional bounds, newest first
    pub async fn vendor_transactions(
        &self,
        vendor_id: VendorId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: Page,
    ) -> Result<Vec<MealTransaction>, RedeemError> {
        Ok(self
            .store
            .list_vendor_meals(vendor_id, start, end, page)
            .await?)
    }
}
