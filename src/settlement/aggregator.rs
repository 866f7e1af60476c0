//! Settlement Aggregator
//!
//! Summaries are recomputed from committed meal rows every time. Meal rows
//! are never edited, so a paid settlement always matches a recomputation of
//! its window.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, warn};

use super::error::SettlementError;
use super::types::{RATE_DECIMALS, SettlementStatus, SettlementSummary, VendorSettlement};
use crate::clock::Clock;
use crate::core_types::{SettlementId, UserId, VendorId, new_id};
use crate::store::{Page, Storage};

pub struct SettlementAggregator {
    store: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
}

impl SettlementAggregator {
    pub fn new(store: Arc<dyn Storage>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Totals for `[start, end]` (inclusive). Pure read; safe to retry.
    pub async fn summarize(
        &self,
        vendor_id: VendorId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        commission_rate: Decimal,
    ) -> Result<SettlementSummary, SettlementError> {
        if period_start > period_end {
            return Err(SettlementError::InvalidPeriod);
        }
        if commission_rate < Decimal::ZERO
            || commission_rate > Decimal::ONE_HUNDRED
            || commission_rate.normalize().scale() > RATE_DECIMALS
        {
            return Err(SettlementError::InvalidRate);
        }
        let (count, total) = self
            .store
            .meal_totals(vendor_id, period_start, period_end)
            .await?;
        Ok(SettlementSummary::compute(
            vendor_id,
            period_start,
            period_end,
            count,
            total,
            commission_rate,
        ))
    }

    /// Persist a pending settlement over a closed window. A second
    /// settlement for the same (vendor, start, end) is rejected.
    pub async fn create(
        &self,
        vendor_id: VendorId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        commission_rate: Decimal,
    ) -> Result<VendorSettlement, SettlementError> {
        let now = self.clock.now();
        if period_end > now {
            return Err(SettlementError::PeriodNotClosed);
        }
        if self.store.get_vendor(vendor_id).await?.is_none() {
            return Err(SettlementError::VendorNotFound);
        }

        let summary = self
            .summarize(vendor_id, period_start, period_end, commission_rate)
            .await?;
        let settlement = VendorSettlement {
            id: new_id(),
            summary,
            status: SettlementStatus::Pending,
            payment_reference: None,
            paid_at: None,
            paid_by: None,
            created_at: now,
        };

        if !self.store.insert_settlement(&settlement).await? {
            warn!(vendor_id = %vendor_id, start = %period_start, end = %period_end, "Duplicate settlement");
            return Err(SettlementError::DuplicateSettlement);
        }

        info!(
            settlement_id = %settlement.id,
            vendor_id = %vendor_id,
            total = %settlement.summary.total_amount,
            net = %settlement.summary.net_amount,
            "Settlement created"
        );
        Ok(settlement)
    }

    /// One-way pending -> paid.
    pub async fn mark_paid(
        &self,
        id: SettlementId,
        payment_reference: &str,
        approver: UserId,
    ) -> Result<VendorSettlement, SettlementError> {
        let payment_reference = payment_reference.trim();
        if payment_reference.is_empty() {
            return Err(SettlementError::InvalidParameter(
                "payment_reference is required".into(),
            ));
        }

        let existing = self
            .store
            .find_settlement(id)
            .await?
            .ok_or(SettlementError::SettlementNotFound)?;
        if existing.status.is_terminal() {
            return Err(SettlementError::AlreadyPaid);
        }

        if !self
            .store
            .mark_settlement_paid(id, payment_reference, approver, self.clock.now())
            .await?
        {
            // Lost a race with another approver
            return Err(SettlementError::AlreadyPaid);
        }

        let paid = self
            .store
            .find_settlement(id)
            .await?
            .ok_or(SettlementError::SettlementNotFound)?;
        info!(settlement_id = %id, approver = %approver, reference = %payment_reference, "Settlement paid");
        Ok(paid)
    }

    /// Newest period first
    pub async fn list(
        &self,
        vendor_id: VendorId,
        page: Page,
    ) -> Result<Vec<VendorSettlement>, SettlementError> {
        Ok(self.store.list_settlements(vendor_id, page).await?)
    }
}
