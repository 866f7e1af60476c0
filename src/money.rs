//! Money Conversion Module
//!
//! Unified conversion between client-facing strings and the internal
//! `Decimal` representation. All conversions at the API boundary MUST go
//! through this module.
//!
//! ## Design Principles
//! 1. Fixed-point only: balances are `rust_decimal::Decimal`, never `f64`
//! 2. Explicit Error Handling: no silent truncation or rounding
//! 3. Positive amounts: every money-moving call takes a strictly positive value
//!
//! ## Usage
//! ```rust
//! use mealpay::money::{parse_amount, format_amount};
//!
//! let amount = parse_amount("120.50").unwrap();
//! assert_eq!(format_amount(amount), "120.50");
//! ```

use rust_decimal::prelude::*;
use thiserror::Error;

/// Fractional digits carried by the wallet currency (paise for INR).
pub const CURRENCY_DECIMALS: u32 = 2;

/// Integer digits a stored amount or balance may carry (NUMERIC(14, 2)).
pub const MAX_INTEGER_DIGITS: u32 = 12;

/// Largest amount or balance the ledger stores: 999,999,999,999.99
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(276_447_231, 23_283, 0, false, 2);

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Amount exceeds {max_digits} integer digits")]
    AmountTooLarge { max_digits: u32 },

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Parse: Client → Internal (String → Decimal)
// ============================================================================

/// Convert a client amount string to a validated `Decimal`.
///
/// # Errors
/// * `InvalidFormat` - empty, `.5`, `5.`, scientific notation, sign prefix
/// * `PrecisionOverflow` - more than [`CURRENCY_DECIMALS`] fractional digits
/// * `InvalidAmount` - zero
/// * `AmountTooLarge` - more than [`MAX_INTEGER_DIGITS`] integer digits
pub fn parse_amount(amount_str: &str) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') || amount_str.starts_with('+') {
        return Err(MoneyError::InvalidAmount);
    }

    if amount_str.contains(['e', 'E']) {
        return Err(MoneyError::InvalidFormat(
            "scientific notation not allowed".into(),
        ));
    }

    let parts: Vec<&str> = amount_str.split('.').collect();
    match parts.len() {
        1 => {}
        2 => {
            // Strict check: require both sides of the dot
            if parts[0].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if parts[1].is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            if parts[1].len() > CURRENCY_DECIMALS as usize {
                return Err(MoneyError::PrecisionOverflow {
                    provided: parts[1].len() as u32,
                    max: CURRENCY_DECIMALS,
                });
            }
        }
        _ => return Err(MoneyError::InvalidFormat("multiple decimal points".into())),
    }

    let integer_digits = parts[0].trim_start_matches('0').len();
    if integer_digits > MAX_INTEGER_DIGITS as usize {
        return Err(MoneyError::AmountTooLarge {
            max_digits: MAX_INTEGER_DIGITS,
        });
    }

    if !amount_str.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in amount: {}",
            amount_str
        )));
    }

    let decimal = Decimal::from_str(amount_str)
        .map_err(|e| MoneyError::InvalidFormat(e.to_string()))?;

    ensure_positive(decimal)
}

/// Validate an already-typed `Decimal` amount.
///
/// Used by internal callers that never went through a string.
pub fn ensure_positive(amount: Decimal) -> Result<Decimal, MoneyError> {
    if amount.is_sign_negative() || amount.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }
    if amount.normalize().scale() > CURRENCY_DECIMALS {
        return Err(MoneyError::PrecisionOverflow {
            provided: amount.normalize().scale(),
            max: CURRENCY_DECIMALS,
        });
    }
    if amount > MAX_AMOUNT {
        return Err(MoneyError::AmountTooLarge {
            max_digits: MAX_INTEGER_DIGITS,
        });
    }
    Ok(amount)
}

// ============================================================================
// Format: Internal → Client (Decimal → String)
// ============================================================================

/// Render an amount with exactly [`CURRENCY_DECIMALS`] fractional digits.
pub fn format_amount(value: Decimal) -> String {
    let mut v = value;
    v.rescale(CURRENCY_DECIMALS);
    v.to_string()
}
