//! Wallet balance, ledger and credits

use std::sync::Arc;

use axum::extract::{Query, State};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::super::identity::Caller;
use super::super::response::{ApiResult, ok};
use super::super::state::AppState;
use super::super::types::{PageQuery, StrictAmount, ValidatedJson};
use crate::directory::Role;
use crate::wallet::{LedgerEntry, WalletSummary};

/// Admins may name a user; everyone else reads their own wallet.
#[derive(Debug, Deserialize, IntoParams)]
pub struct WalletQuery {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    #[schema(value_type = String, example = "850.00")]
    pub balance: Decimal,
    #[schema(example = "INR")]
    pub currency: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TopUpRequest {
    #[schema(value_type = String, example = "120.00")]
    pub amount: StrictAmount,
    #[validate(length(max = 32))]
    pub payment_method: Option<String>,
    #[validate(length(max = 128))]
    pub payment_reference: Option<String>,
    /// Admin credit to another user's wallet
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MessFeeRequest {
    #[schema(value_type = String, example = "120.00")]
    pub amount: StrictAmount,
    #[validate(length(min = 4, max = 16))]
    #[schema(example = "2025-26")]
    pub academic_year: String,
    #[validate(length(max = 16))]
    pub semester: Option<String>,
    pub user_id: Option<Uuid>,
}

/// Current balance
///
/// GET /api/v1/wallet/balance
#[utoipa::path(
    get,
    path = "/api/v1/wallet/balance",
    params(WalletQuery),
    responses((status = 200, description = "Balance", body = BalanceResponse)),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Wallet"
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(q): Query<WalletQuery>,
) -> ApiResult<BalanceResponse> {
    let user_id = caller.subject(q.user_id)?;
    let wallet = state.ledger.get_or_create(user_id).await?;
    ok(BalanceResponse {
        user_id,
        balance: wallet.balance,
        currency: wallet.currency,
    })
}

/// Wallet with credit/debit totals and today's spend
///
/// GET /api/v1/wallet/summary
#[utoipa::path(
    get,
    path = "/api/v1/wallet/summary",
    params(WalletQuery),
    responses((status = 200, description = "Summary", body = WalletSummary)),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Wallet"
)]
pub async fn get_summary(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(q): Query<WalletQuery>,
) -> ApiResult<WalletSummary> {
    let user_id = caller.subject(q.user_id)?;
    ok(state.ledger.summary(user_id).await?)
}

/// Ledger entries, newest first
///
/// GET /api/v1/wallet/ledger
#[utoipa::path(
    get,
    path = "/api/v1/wallet/ledger",
    params(WalletQuery, PageQuery),
    responses((status = 200, description = "Entries", body = Vec<LedgerEntry>)),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Wallet"
)]
pub async fn get_ledger(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(q): Query<WalletQuery>,
    Query(page): Query<PageQuery>,
) -> ApiResult<Vec<LedgerEntry>> {
    let user_id = caller.subject(q.user_id)?;
    ok(state.ledger.list_ledger(user_id, page.page()?).await?)
}

/// Credit a wallet after an external payment
///
/// POST /api/v1/wallet/topup
#[utoipa::path(
    post,
    path = "/api/v1/wallet/topup",
    request_body = TopUpRequest,
    responses(
        (status = 200, description = "Credited", body = LedgerEntry),
        (status = 400, description = "Invalid amount")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Wallet"
)]
pub async fn top_up(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidatedJson(req): ValidatedJson<TopUpRequest>,
) -> ApiResult<LedgerEntry> {
    caller.require(&[Role::Student, Role::Admin])?;
    let user_id = caller.subject(req.user_id)?;
    let entry = state
        .ledger
        .top_up(
            user_id,
            req.amount.inner(),
            req.payment_method,
            req.payment_reference,
        )
        .await?;
    ok(entry)
}

/// Record the academic year's mess fee and credit it
///
/// POST /api/v1/wallet/mess-fee
#[utoipa::path(
    post,
    path = "/api/v1/wallet/mess-fee",
    request_body = MessFeeRequest,
    responses(
        (status = 200, description = "Credited", body = LedgerEntry),
        (status = 409, description = "Already paid for this academic year")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Wallet"
)]
pub async fn pay_mess_fee(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidatedJson(req): ValidatedJson<MessFeeRequest>,
) -> ApiResult<LedgerEntry> {
    caller.require(&[Role::Student, Role::Admin])?;
    let user_id = caller.subject(req.user_id)?;
    let entry = state
        .ledger
        .pay_mess_fee(user_id, req.amount.inner(), &req.academic_year, req.semester)
        .await?;
    ok(entry)
}
