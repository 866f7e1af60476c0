//! API Response envelope and error mapping
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `error_codes`: Numeric code families
//! - `ApiError`: Rejection carrying HTTP status, numeric code and machine reason

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::meal::RedeemError;
use crate::settlement::SettlementError;
use crate::store::StoreError;
use crate::token::TokenError;
use crate::wallet::LedgerError;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// - code: 0 = success, non-zero = error family
/// - msg: short human readable description
/// - reason: stable machine reason (errors only), e.g. `ALREADY_USED`
/// - data: payload (success only)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    #[schema(example = 0)]
    pub code: i32,
    #[schema(example = "ok")]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            reason: None,
            data: Some(data),
        }
    }

    pub fn error(code: i32, reason: &str, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            reason: Some(reason.to_string()),
            data: None,
        }
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Numeric error families. The precise cause travels in `reason`.
pub mod error_codes {
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const FORBIDDEN: i32 = 2003;

    // Business rejections (3xxx)
    pub const CONFLICT: i32 = 3009;
    pub const REJECTED: i32 = 3022;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4004;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;

    /// Family for an HTTP status
    pub fn for_status(status: u16) -> i32 {
        match status {
            400 => INVALID_PARAMETER,
            401 => MISSING_AUTH,
            403 => FORBIDDEN,
            404 => NOT_FOUND,
            409 => CONFLICT,
            422 => REJECTED,
            503 => SERVICE_UNAVAILABLE,
            _ => INTERNAL_ERROR,
        }
    }
}

// ============================================================================
// ApiError
// ============================================================================

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub reason: &'static str,
    pub msg: String,
}

pub type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Wrap a payload in the success envelope
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok(Json(ApiResponse::success(data)))
}

impl ApiError {
    pub fn new(status: StatusCode, reason: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code: error_codes::for_status(status.as_u16()),
            reason,
            msg: msg.into(),
        }
    }

    /// Map a domain error's `(http_status, code, message)` triple
    fn domain(http_status: u16, reason: &'static str, msg: String) -> Self {
        let status =
            StatusCode::from_u16(http_status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(reason, error = %msg, "Request failed on infrastructure error");
            let public = if status == StatusCode::SERVICE_UNAVAILABLE {
                "service unavailable"
            } else {
                "internal error"
            };
            return Self::new(status, reason, public);
        }
        Self::new(status, reason, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_PARAMETER", msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg)
    }

    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ApiResponse::<()>::error(self.code, self.reason, self.msg));
        (self.status, body).into_response()
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        Self::domain(e.http_status(), e.code(), e.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self::domain(e.http_status(), e.code(), e.to_string())
    }
}

impl From<RedeemError> for ApiError {
    fn from(e: RedeemError) -> Self {
        Self::domain(e.http_status(), e.code(), e.to_string())
    }
}

impl From<SettlementError> for ApiError {
    fn from(e: SettlementError) -> Self {
        Self::domain(e.http_status(), e.code(), e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self::domain(e.http_status(), e.code(), e.to_string())
    }
}
