//! QR token issuance and inspection

use std::sync::Arc;

use axum::extract::State;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::super::identity::Caller;
use super::super::response::{ApiResult, ok};
use super::super::state::AppState;
use super::super::types::ValidatedJson;
use crate::directory::Role;
use crate::token::{IssuedToken, Purpose, TokenError, TokenReason, TokenRecord, TokenValidation};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssueSubjectRequest {
    /// Admins may issue on behalf of a student; students always get their own code
    pub student_id: Option<Uuid>,
    /// Bind the code to one vendor
    pub vendor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct IssueCounterRequest {
    pub vendor_id: Uuid,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ValidateTokenRequest {
    #[validate(length(min = 1, max = 2048))]
    pub signed_payload: String,
    pub purpose: Purpose,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TokenDetailsRequest {
    #[validate(length(min = 1, max = 2048))]
    pub signed_payload: String,
}

/// Issue a student-presented code
///
/// POST /api/v1/tokens/subject
#[utoipa::path(
    post,
    path = "/api/v1/tokens/subject",
    request_body = IssueSubjectRequest,
    responses(
        (status = 200, description = "Code issued", body = IssuedToken),
        (status = 403, description = "Caller is not an active student")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Tokens"
)]
pub async fn issue_subject_token(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidatedJson(req): ValidatedJson<IssueSubjectRequest>,
) -> ApiResult<IssuedToken> {
    caller.require(&[Role::Student, Role::Admin])?;
    let student_id = caller.subject(req.student_id)?;
    let issued = state
        .tokens
        .issue_subject_code(student_id, req.vendor_id)
        .await?;
    ok(issued)
}

/// Issue a counter-displayed code for a vendor the caller operates
///
/// POST /api/v1/tokens/counter
#[utoipa::path(
    post,
    path = "/api/v1/tokens/counter",
    request_body = IssueCounterRequest,
    responses(
        (status = 200, description = "Code issued", body = IssuedToken),
        (status = 403, description = "Caller does not operate the vendor"),
        (status = 404, description = "Vendor not found"),
        (status = 422, description = "Vendor inactive")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Tokens"
)]
pub async fn issue_counter_token(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidatedJson(req): ValidatedJson<IssueCounterRequest>,
) -> ApiResult<IssuedToken> {
    caller.require(&[Role::Vendor])?;
    let issued = state
        .tokens
        .issue_counter_code(caller.user_id, req.vendor_id)
        .await?;
    ok(issued)
}

/// Check a scanned code without consuming it
///
/// POST /api/v1/tokens/validate
///
/// Rejections come back as `{valid: false, reason}` with HTTP 200.
#[utoipa::path(
    post,
    path = "/api/v1/tokens/validate",
    request_body = ValidateTokenRequest,
    responses(
        (status = 200, description = "Validation answer", body = TokenValidation)
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Tokens"
)]
pub async fn validate_token(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    ValidatedJson(req): ValidatedJson<ValidateTokenRequest>,
) -> ApiResult<TokenValidation> {
    let answer = state
        .tokens
        .validate(&req.signed_payload, req.purpose)
        .await?;
    ok(answer)
}

/// Registry row for a signed payload
///
/// POST /api/v1/tokens/details
#[utoipa::path(
    post,
    path = "/api/v1/tokens/details",
    request_body = TokenDetailsRequest,
    responses(
        (status = 200, description = "Registry row", body = TokenRecord),
        (status = 404, description = "Unknown token")
    ),
    security(("caller_id" = []), ("caller_role" = [])),
    tag = "Tokens"
)]
pub async fn token_details(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    ValidatedJson(req): ValidatedJson<TokenDetailsRequest>,
) -> ApiResult<TokenRecord> {
    caller.require(&[Role::Vendor, Role::Admin])?;
    let record = state
        .tokens
        .details(&req.signed_payload)
        .await?
        .ok_or(TokenError::Rejected(TokenReason::NotFound))?;
    ok(record)
}
