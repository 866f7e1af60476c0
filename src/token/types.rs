//! Token records and rejection reasons

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::core_types::{UserId, VendorId};

/// Which party displays the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
    /// Student shows the code, the vendor device scans it
    SubjectPresented,
    /// Vendor displays the code, the student device scans it
    CounterPresented,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::SubjectPresented => "subject-presented",
            Purpose::CounterPresented => "counter-presented",
        }
    }
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Purpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subject-presented" => Ok(Purpose::SubjectPresented),
            "counter-presented" => Ok(Purpose::CounterPresented),
            other => Err(format!("unknown token purpose: {}", other)),
        }
    }
}

/// Why a token failed validation. Each step of the check maps to one reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TokenReason {
    Signature,
    Purpose,
    Expired,
    NotFound,
    AlreadyUsed,
}

impl TokenReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenReason::Signature => "signature",
            TokenReason::Purpose => "purpose",
            TokenReason::Expired => "expired",
            TokenReason::NotFound => "not-found",
            TokenReason::AlreadyUsed => "already-used",
        }
    }
}

impl fmt::Display for TokenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted registry row. Keyed by the hash of the signed payload; the raw
/// signed bytes are never stored.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TokenRecord {
    pub code_hash: String,
    /// Student for subject-presented codes
    #[schema(value_type = Option<Uuid>)]
    pub subject_id: Option<UserId>,
    /// Issuing vendor for counter-presented codes, or the bound counterparty
    #[schema(value_type = Option<Uuid>)]
    pub vendor_id: Option<VendorId>,
    pub purpose: Purpose,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub used_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<Uuid>)]
    pub used_by: Option<UserId>,
    pub transaction_id: Option<Uuid>,
    pub metadata: serde_json::Value,
}

impl TokenRecord {
    #[inline]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
