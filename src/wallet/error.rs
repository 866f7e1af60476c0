use rust_decimal::Decimal;
use thiserror::Error;

use crate::money::MoneyError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum LedgerError {
    // === Validation Errors ===
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Balance limit exceeded: balance {balance} plus {amount} is above {limit}")]
    BalanceLimitExceeded {
        balance: Decimal,
        amount: Decimal,
        limit: Decimal,
    },

    // === Conflict Errors ===
    #[error("Insufficient wallet balance: available {available}, requested {requested}")]
    InsufficientFunds {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Mess fee already paid for academic year {0}")]
    MessFeeAlreadyPaid(String),

    // === Lookup Errors ===
    #[error("Wallet not found")]
    WalletNotFound,

    // === System Errors ===
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InvalidParameter(_) => "INVALID_PARAMETER",
            LedgerError::BalanceLimitExceeded { .. } => "BALANCE_LIMIT_EXCEEDED",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::MessFeeAlreadyPaid(_) => "MESS_FEE_ALREADY_PAID",
            LedgerError::WalletNotFound => "WALLET_NOT_FOUND",
            LedgerError::Store(e) => e.code(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidParameter(_)
            | LedgerError::BalanceLimitExceeded { .. } => 400,
            LedgerError::InsufficientFunds { .. } => 422,
            LedgerError::MessFeeAlreadyPaid(_) => 409,
            LedgerError::WalletNotFound => 404,
            LedgerError::Store(e) => e.http_status(),
        }
    }
}
