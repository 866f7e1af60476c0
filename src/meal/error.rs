use thiserror::Error;

use crate::money::MoneyError;
use crate::store::StoreError;
use crate::token::TokenError;
use crate::wallet::LedgerError;

/// Meal redemption rejection
#[derive(Error, Debug)]
pub enum RedeemError {
    // === Identity ===
    #[error("Exactly one of student token, counter token or student id is required")]
    AmbiguousIdentity,

    #[error("Caller is not allowed to redeem on this path")]
    Forbidden,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Token is bound to a different vendor")]
    VendorMismatch,

    // === Vendor & item ===
    #[error("Vendor not found")]
    VendorNotFound,

    #[error("Vendor is not active")]
    VendorInactive,

    #[error("Menu item not found for this vendor")]
    MenuItemNotFound,

    #[error("Menu item is not available")]
    ItemUnavailable,

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),

    // === Student ===
    #[error("Student not found")]
    StudentNotFound,

    #[error("User is not a student")]
    NotAStudent,

    #[error("Student account is inactive")]
    StudentInactive,

    // === Money / infrastructure ===
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RedeemError {
    pub fn code(&self) -> &'static str {
        match self {
            RedeemError::AmbiguousIdentity => "AMBIGUOUS_IDENTITY",
            RedeemError::Forbidden => "FORBIDDEN",
            RedeemError::Token(e) => e.code(),
            RedeemError::VendorMismatch => "VENDOR_MISMATCH",
            RedeemError::VendorNotFound => "VENDOR_NOT_FOUND",
            RedeemError::VendorInactive => "VENDOR_INACTIVE",
            RedeemError::MenuItemNotFound => "MENU_ITEM_NOT_FOUND",
            RedeemError::ItemUnavailable => "ITEM_UNAVAILABLE",
            RedeemError::InvalidAmount(_) => "INVALID_AMOUNT",
            RedeemError::StudentNotFound => "STUDENT_NOT_FOUND",
            RedeemError::NotAStudent => "NOT_A_STUDENT",
            RedeemError::StudentInactive => "STUDENT_INACTIVE",
            RedeemError::Ledger(e) => e.code(),
            RedeemError::Store(e) => e.code(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            RedeemError::AmbiguousIdentity
            | RedeemError::VendorMismatch
            | RedeemError::InvalidAmount(_) => 400,
            RedeemError::Forbidden => 403,
            RedeemError::Token(e) => e.http_status(),
            RedeemError::VendorNotFound
            | RedeemError::MenuItemNotFound
            | RedeemError::StudentNotFound => 404,
            RedeemError::VendorInactive
            | RedeemError::ItemUnavailable
            | RedeemError::NotAStudent
            | RedeemError::StudentInactive => 422,
            RedeemError::Ledger(e) => e.http_status(),
            RedeemError::Store(e) => e.http_status(),
        }
    }

    /// True when a token was rejected as already consumed
    pub fn is_already_used(&self) -> bool {
        matches!(
            self,
            RedeemError::Token(TokenError::Rejected(
                crate::token::TokenReason::AlreadyUsed
            ))
        )
    }
}
