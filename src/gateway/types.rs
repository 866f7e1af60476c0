//! Request-side types for API boundary enforcement
//!
//! - `StrictAmount`: money string validated during deserialization
//! - `ValidatedJson<T>`: JSON body extractor that runs `validator` rules
//! - `PageQuery`: limit/offset query parameters

use axum::Json;
use axum::extract::{FromRequest, Request};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;
use validator::Validate;

use super::response::ApiError;
use crate::money::{format_amount, parse_amount};
use crate::store::Page;

// ============================================================================
// StrictAmount: Format-Validated Money at Serde Layer
// ============================================================================

/// Positive amount with at most two fractional digits, strings only.
///
/// JSON numbers are refused so `0.1 + 0.2` style float artefacts never reach
/// the ledger. `.5`, `5.`, signs and exponents are refused as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrictAmount(Decimal);

impl StrictAmount {
    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl std::ops::Deref for StrictAmount {
    type Target = Decimal;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for StrictAmount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let s = String::deserialize(deserializer)?;
        parse_amount(&s).map(StrictAmount).map_err(D::Error::custom)
    }
}

impl Serialize for StrictAmount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&format_amount(self.0))
    }
}

// ============================================================================
// ValidatedJson: Framework-level validation
// ============================================================================

/// JSON body that has passed both serde and `validator` checks.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value): Json<T> = Json::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;
        value
            .validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        Ok(ValidatedJson(value))
    }
}

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Clone, Copy, Deserialize, Validate, IntoParams)]
pub struct PageQuery {
    /// Page size, 1..=200 (default 50)
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<i64>,
    /// Rows to skip (default 0)
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> Result<Page, ApiError> {
        self.validate()
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let default = Page::default();
        Ok(Page::new(
            self.limit.unwrap_or(default.limit),
            self.offset.unwrap_or(default.offset),
        ))
    }
}
