//! Vendor settlement endpoints (admin), plus the vendor's own listing

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::super::identity::Caller;
use super::super::response::{ApiResult, ok};
use super::super::state::AppState;
use super::super::types::{PageQuery, ValidatedJson};
use super::ensure_vendor_access;
use crate::directory::Role;
use crate::settlement::{SettlementSummary, VendorSettlement};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SettlementWindowRequest {
    pub vendor_id: Uuid,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    /// Percent, 0..=100, at most two decimals
    #[schema(value_type = String, example = "5.00")]
    pub commission_rate: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MarkPaidRequest {
    #[validate(length(min = 1, max = 128))]
    pub payment_reference: String,
}

/// Recompute totals for a window without persisting
///
/// POST /api/v1/settlements/summary
#[utoipa::path(
    post,
    path = "/api/v1/settlements/summary",
    request_body = SettlementWindowRequest,
    responses(
        (status = 200, description = "Totals", body = SettlementSummary),
        (status = 400, description = "Bad period or rate")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Settlements"
)]
pub async fn summarize_settlement(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidatedJson(req): ValidatedJson<SettlementWindowRequest>,
) -> ApiResult<SettlementSummary> {
    caller.require(&[Role::Admin])?;
    let summary = state
        .settlements
        .summarize(
            req.vendor_id,
            req.period_start,
            req.period_end,
            req.commission_rate,
        )
        .await?;
    ok(summary)
}

/// Persist a pending settlement for a closed window
///
/// POST /api/v1/settlements
#[utoipa::path(
    post,
    path = "/api/v1/settlements",
    request_body = SettlementWindowRequest,
    responses(
        (status = 200, description = "Created", body = VendorSettlement),
        (status = 400, description = "Bad period or rate, or window still open"),
        (status = 404, description = "Vendor not found"),
        (status = 409, description = "Settlement already exists for the window")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Settlements"
)]
pub async fn create_settlement(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidatedJson(req): ValidatedJson<SettlementWindowRequest>,
) -> ApiResult<VendorSettlement> {
    caller.require(&[Role::Admin])?;
    let settlement = state
        .settlements
        .create(
            req.vendor_id,
            req.period_start,
            req.period_end,
            req.commission_rate,
        )
        .await?;
    ok(settlement)
}

/// Approve payout
///
/// POST /api/v1/settlements/{settlement_id}/paid
#[utoipa::path(
    post,
    path = "/api/v1/settlements/{settlement_id}/paid",
    params(("settlement_id" = Uuid, Path)),
    request_body = MarkPaidRequest,
    responses(
        (status = 200, description = "Paid", body = VendorSettlement),
        (status = 404, description = "Unknown settlement"),
        (status = 409, description = "Already paid")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Settlements"
)]
pub async fn mark_settlement_paid(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(settlement_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<MarkPaidRequest>,
) -> ApiResult<VendorSettlement> {
    caller.require(&[Role::Admin])?;
    let paid = state
        .settlements
        .mark_paid(settlement_id, &req.payment_reference, caller.user_id)
        .await?;
    ok(paid)
}

/// Settlements for one vendor, newest period first
///
/// GET /api/v1/vendors/{vendor_id}/settlements
#[utoipa::path(
    get,
    path = "/api/v1/vendors/{vendor_id}/settlements",
    params(("vendor_id" = Uuid, Path), PageQuery),
    responses((status = 200, description = "Settlements", body = Vec<VendorSettlement>)),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Settlements"
)]
pub async fn list_settlements(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(vendor_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<VendorSettlement>> {
    ensure_vendor_access(&state, &caller, vendor_id).await?;
    ok(state.settlements.list(vendor_id, page.page()?).await?)
}
