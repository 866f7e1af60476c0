//! Redemption requests and meal records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use super::error::RedeemError;
use crate::core_types::{LedgerEntryId, MealTransactionId, MenuItemId, UserId, VendorId, WalletId};

/// Status stored on every persisted meal; rejected attempts never get a row.
pub const MEAL_STATUS_COMPLETED: &str = "completed";

/// How the paying student is identified. Exactly one path per attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Identity {
    /// Student showed their code; the vendor device scanned it
    SubjectToken { signed: String },
    /// Student scanned the vendor's code and supplied their own id
    CounterToken { signed: String, student_id: UserId },
    /// Trusted internal caller names the student directly
    Direct { student_id: UserId },
}

/// Fully validated redemption attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RedeemRequest {
    pub identity: Identity,
    pub vendor_id: VendorId,
    pub menu_item_id: MenuItemId,
    /// Overrides the item's list price when present
    pub amount: Option<Decimal>,
}

impl RedeemRequest {
    pub fn by_subject_token(
        signed: impl Into<String>,
        vendor_id: VendorId,
        menu_item_id: MenuItemId,
        amount: Option<Decimal>,
    ) -> Self {
        Self {
            identity: Identity::SubjectToken {
                signed: signed.into(),
            },
            vendor_id,
            menu_item_id,
            amount,
        }
    }

    pub fn by_counter_token(
        signed: impl Into<String>,
        student_id: UserId,
        vendor_id: VendorId,
        menu_item_id: MenuItemId,
        amount: Option<Decimal>,
    ) -> Self {
        Self {
            identity: Identity::CounterToken {
                signed: signed.into(),
                student_id,
            },
            vendor_id,
            menu_item_id,
            amount,
        }
    }

    pub fn direct(
        student_id: UserId,
        vendor_id: VendorId,
        menu_item_id: MenuItemId,
        amount: Option<Decimal>,
    ) -> Self {
        Self {
            identity: Identity::Direct { student_id },
            vendor_id,
            menu_item_id,
            amount,
        }
    }

    /// Build from the loose optional fields of a wire request.
    ///
    /// Exactly one identity path must be present; `trusted` gates the direct
    /// path. Anything else is `AmbiguousIdentity`.
    pub fn from_parts(
        subject_token: Option<String>,
        counter_token: Option<String>,
        student_id: Option<UserId>,
        trusted: bool,
        vendor_id: VendorId,
        menu_item_id: MenuItemId,
        amount: Option<Decimal>,
    ) -> Result<Self, RedeemError> {
        let subject_token = subject_token.filter(|s| !s.is_empty());
        let counter_token = counter_token.filter(|s| !s.is_empty());
        let identity = match (subject_token, counter_token, student_id) {
            (Some(signed), None, None) => Identity::SubjectToken { signed },
            (None, Some(signed), Some(student_id)) => Identity::CounterToken { signed, student_id },
            (None, None, Some(student_id)) if trusted => Identity::Direct { student_id },
            (None, None, Some(_)) => return Err(RedeemError::Forbidden),
            _ => return Err(RedeemError::AmbiguousIdentity),
        };
        Ok(Self {
            identity,
            vendor_id,
            menu_item_id,
            amount,
        })
    }

    /// Signed payload carried by this request, if any
    pub fn token(&self) -> Option<&str> {
        match &self.identity {
            Identity::SubjectToken { signed } | Identity::CounterToken { signed, .. } => {
                Some(signed)
            }
            Identity::Direct { .. } => None,
        }
    }
}

/// One completed meal purchase. Never updated after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MealTransaction {
    #[schema(value_type = Uuid)]
    pub id: MealTransactionId,
    #[schema(value_type = Uuid)]
    pub student_id: UserId,
    #[schema(value_type = Uuid)]
    pub wallet_id: WalletId,
    #[schema(value_type = Uuid)]
    pub vendor_id: VendorId,
    #[schema(value_type = Uuid)]
    pub menu_item_id: MenuItemId,
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
    pub meal_type: String,
    pub item_name: String,
    /// Hash of the token that identified the student
    pub token_hash: Option<String>,
    #[schema(value_type = Uuid)]
    pub ledger_entry_id: LedgerEntryId,
    pub status: &'static str,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}
