use thiserror::Error;

use super::codec::CodecError;
use super::types::TokenReason;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum TokenError {
    /// Validation or consumption failed for a specific, caller-visible reason
    #[error("Token rejected: {0}")]
    Rejected(TokenReason),

    // === Issuance ===
    #[error("Only active students can request a payment code")]
    IneligibleSubject,

    #[error("Vendor not found")]
    VendorNotFound,

    #[error("Vendor is not active")]
    VendorInactive,

    #[error("Caller does not operate this vendor")]
    NotVendorOwner,

    #[error("Token encoding failed: {0}")]
    Codec(#[from] CodecError),

    #[error("QR render failed: {0}")]
    Render(String),

    // === Infrastructure ===
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TokenError {
    /// Rejection reason, if this is a business rejection
    pub fn reason(&self) -> Option<TokenReason> {
        match self {
            TokenError::Rejected(r) => Some(*r),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            TokenError::Rejected(reason) => reason_code(*reason),
            TokenError::IneligibleSubject => "INELIGIBLE_SUBJECT",
            TokenError::VendorNotFound => "VENDOR_NOT_FOUND",
            TokenError::VendorInactive => "VENDOR_INACTIVE",
            TokenError::NotVendorOwner => "FORBIDDEN",
            TokenError::Codec(e) => e.code(),
            TokenError::Render(_) => "SYSTEM_ERROR",
            TokenError::Store(e) => e.code(),
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            TokenError::Rejected(TokenReason::AlreadyUsed) => 409,
            TokenError::Rejected(TokenReason::NotFound) => 404,
            TokenError::Rejected(_) => 400,
            TokenError::IneligibleSubject | TokenError::NotVendorOwner => 403,
            TokenError::VendorNotFound => 404,
            TokenError::VendorInactive => 422,
            TokenError::Codec(_) | TokenError::Render(_) => 500,
            TokenError::Store(e) => e.http_status(),
        }
    }
}

/// Stable machine code for each rejection reason
pub fn reason_code(reason: TokenReason) -> &'static str {
    match reason {
        TokenReason::Signature => "INVALID_SIGNATURE",
        TokenReason::Purpose => "INVALID_PURPOSE",
        TokenReason::Expired => "EXPIRED",
        TokenReason::NotFound => "TOKEN_NOT_FOUND",
        TokenReason::AlreadyUsed => "ALREADY_USED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_codes_distinct() {
        let reasons = [
            TokenReason::Signature,
            TokenReason::Purpose,
            TokenReason::Expired,
            TokenReason::NotFound,
            TokenReason::AlreadyUsed,
        ];
        let codes: std::collections::HashSet<_> =
            reasons.iter().map(|r| reason_code(*r)).collect();
        assert_eq!(codes.len(), reasons.len());
    }

    #[test]
    fn test_already_used_is_conflict() {
        let e = TokenError::Rejected(TokenReason::AlreadyUsed);
        assert_eq!(e.code(), "ALREADY_USED");
        assert_eq!(e.http_status(), 409);
        assert_eq!(e.reason(), Some(TokenReason::AlreadyUsed));
    }
}
