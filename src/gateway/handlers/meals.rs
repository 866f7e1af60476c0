//! Meal redemption and histories

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::super::identity::Caller;
use super::super::response::{ApiError, ApiResult, ok};
use super::super::state::AppState;
use super::super::types::{PageQuery, StrictAmount, ValidatedJson};
use super::ensure_vendor_access;
use crate::directory::Role;
use crate::meal::{Identity, MealTransaction, RedeemRequest};

/// Exactly one identity path:
/// - `subject_token`: a vendor scanned the student's code
/// - `counter_token` (+ `student_id` for admins): a student scanned the vendor's code
/// - `student_id` alone: admin direct charge
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RedeemBody {
    #[validate(length(min = 1, max = 2048))]
    pub subject_token: Option<String>,
    #[validate(length(min = 1, max = 2048))]
    pub counter_token: Option<String>,
    pub student_id: Option<Uuid>,
    pub vendor_id: Uuid,
    pub menu_item_id: Uuid,
    /// Overrides the menu price
    #[schema(value_type = Option<String>, example = "120.00")]
    pub amount: Option<StrictAmount>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct HistoryQuery {
    /// Admin only; students read their own history
    pub student_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct WindowQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Redeem one meal
///
/// POST /api/v1/meals/redeem
///
/// Debit, meal record and token consumption commit together or not at all.
#[utoipa::path(
    post,
    path = "/api/v1/meals/redeem",
    request_body = RedeemBody,
    responses(
        (status = 200, description = "Meal recorded", body = MealTransaction),
        (status = 400, description = "Invalid token, purpose, amount or vendor binding"),
        (status = 403, description = "Caller may not redeem on this path"),
        (status = 404, description = "Vendor, item, student or token not found"),
        (status = 409, description = "Token already used"),
        (status = 422, description = "Insufficient funds or inactive party")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Meals"
)]
pub async fn redeem_meal(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidatedJson(body): ValidatedJson<RedeemBody>,
) -> ApiResult<MealTransaction> {
    // A student scanning a counter code pays for themselves
    let student_id = match (caller.role, &body.counter_token) {
        (Role::Student, Some(_)) => Some(caller.subject(body.student_id)?),
        _ => body.student_id,
    };

    let request = RedeemRequest::from_parts(
        body.subject_token,
        body.counter_token,
        student_id,
        caller.is_admin(),
        body.vendor_id,
        body.menu_item_id,
        body.amount.map(StrictAmount::inner),
    )?;

    match &request.identity {
        Identity::SubjectToken { .. } => {
            ensure_vendor_access(&state, &caller, request.vendor_id).await?;
        }
        Identity::CounterToken { student_id, .. } => {
            caller.require(&[Role::Student, Role::Admin])?;
            caller.subject(Some(*student_id))?;
        }
        Identity::Direct { .. } => {
            caller.require(&[Role::Admin])?;
        }
    }

    ok(state.meals.redeem(request, caller.user_id).await?)
}

/// A student's completed meals, newest first
///
/// GET /api/v1/meals/history
#[utoipa::path(
    get,
    path = "/api/v1/meals/history",
    params(HistoryQuery, PageQuery),
    responses((status = 200, description = "Meals", body = Vec<MealTransaction>)),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Meals"
)]
pub async fn meal_history(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(q): Query<HistoryQuery>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<MealTransaction>> {
    let student_id = caller.subject(q.student_id)?;
    ok(state.meals.student_history(student_id, page.page()?).await?)
}

/// Completed meals at one vendor within optional bounds
///
/// GET /api/v1/vendors/{vendor_id}/transactions
#[utoipa::path(
    get,
    path = "/api/v1/vendors/{vendor_id}/transactions",
    params(("vendor_id" = Uuid, Path), WindowQuery, PageQuery),
    responses(
        (status = 200, description = "Meals", body = Vec<MealTransaction>),
        (status = 403, description = "Caller does not operate the vendor")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Meals"
)]
pub async fn vendor_transactions(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(vendor_id): Path<Uuid>,
    Query(window): Query<WindowQuery>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<MealTransaction>> {
    ensure_vendor_access(&state, &caller, vendor_id).await?;
    if let (Some(start), Some(end)) = (window.start, window.end)
        && start > end
    {
        return ApiError::bad_request("start must not be after end").into_err();
    }
    let meals = state
        .meals
        .vendor_transactions(vendor_id, window.start, window.end, page.page()?)
        .await?;
    ok(meals)
}
