use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Invalid period: start must not be after end")]
    InvalidPeriod,

    #[error("Settlement window has not closed yet")]
    PeriodNotClosed,

    #[error("Commission rate must be between 0 and 100 with at most 2 decimals")]
    InvalidRate,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Vendor not found")]
    VendorNotFound,

    #[error("Settlement already exists for this vendor and period")]
    DuplicateSettlement,

    #[error("Settlement not found")]
    SettlementNotFound,

    #[error("Settlement already paid")]
    AlreadyPaid,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SettlementError {
    pub fn code(&self) -> &'static str {
        match self {
            SettlementError::InvalidPeriod => "INVALID_PERIOD",
            SettlementError::PeriodNotClosed => "PERIOD_NOT_CLOSED",
            SettlementError::InvalidRate => "INVALID_RATE",
            SettlementError::InvalidParameter(_) => "INVALID_PARAMETER",
            SettlementError::VendorNotFound => "VENDOR_NOT_FOUND",
            SettlementError::DuplicateSettlement => "DUPLICATE_SETTLEMENT",
            SettlementError::SettlementNotFound => "SETTLEMENT_NOT_FOUND",
            SettlementError::AlreadyPaid => "ALREADY_PAID",
            SettlementError::Store(e) => e.code(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            SettlementError::InvalidPeriod
            | SettlementError::PeriodNotClosed
            | SettlementError::InvalidRate
            | SettlementError::InvalidParameter(_) => 400,
            SettlementError::VendorNotFound | SettlementError::SettlementNotFound => 404,
            SettlementError::DuplicateSettlement | SettlementError::AlreadyPaid => 409,
            SettlementError::Store(e) => e.http_status(),
        }
    }
}
