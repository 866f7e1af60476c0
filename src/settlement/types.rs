//! Settlement records

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::core_types::{SettlementId, UserId, VendorId};

/// Fractional digits a commission rate may carry (NUMERIC(5, 2)).
/// With two-decimal amounts the commission then needs at most six.
pub const RATE_DECIMALS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Paid,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Pending => "pending",
            SettlementStatus::Paid => "paid",
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, SettlementStatus::Paid)
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SettlementStatus::Pending),
            "paid" => Ok(SettlementStatus::Paid),
            other => Err(format!("unknown settlement status: {}", other)),
        }
    }
}

/// Computed payout for a vendor over a closed window. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SettlementSummary {
    #[schema(value_type = Uuid)]
    pub vendor_id: VendorId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub transaction_count: i64,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub commission_rate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub commission_amount: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub net_amount: Decimal,
}

impl SettlementSummary {
    /// `commission = total * rate / 100`, `net = total - commission`
    pub fn compute(
        vendor_id: VendorId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        transaction_count: i64,
        total_amount: Decimal,
        commission_rate: Decimal,
    ) -> Self {
        let commission_amount = total_amount * commission_rate / Decimal::ONE_HUNDRED;
        Self {
            vendor_id,
            period_start,
            period_end,
            transaction_count,
            total_amount,
            commission_rate,
            commission_amount,
            net_amount: total_amount - commission_amount,
        }
    }
}

/// Persisted settlement; transitions pending -> paid exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct VendorSettlement {
    #[schema(value_type = Uuid)]
    pub id: SettlementId,
    #[serde(flatten)]
    pub summary: SettlementSummary,
    pub status: SettlementStatus,
    pub payment_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    #[schema(value_type = Option<Uuid>)]
    pub paid_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_commission_math() {
        let now = Utc::now();
        let s = SettlementSummary::compute(
            Uuid::new_v4(),
            now,
            now,
            3,
            Decimal::new(36000, 2),
            Decimal::new(5, 0),
        );
        assert_eq!(s.commission_amount, Decimal::new(1800, 2));
        assert_eq!(s.net_amount, Decimal::new(34200, 2));
    }

    #[test]
    fn test_zero_rate_keeps_total() {
        let now = Utc::now();
        let s = SettlementSummary::compute(
            Uuid::new_v4(),
            now,
            now,
            1,
            Decimal::new(12000, 2),
            Decimal::ZERO,
        );
        assert_eq!(s.net_amount, s.total_amount);
        assert!(s.commission_amount.is_zero());
    }

    #[test]
    fn test_two_decimal_rate_fits_six_decimal_commission() {
        let now = Utc::now();
        let s = SettlementSummary::compute(
            Uuid::new_v4(),
            now,
            now,
            1,
            Decimal::new(1, 2),
            Decimal::new(1, RATE_DECIMALS),
        );
        assert_eq!(s.commission_amount, Decimal::new(1, 6));
        assert!(s.commission_amount.normalize().scale() <= 6);
        assert_eq!(s.net_amount + s.commission_amount, s.total_amount);
    }

    #[test]
    fn test_status_terminal() {
        assert!(SettlementStatus::Paid.is_terminal());
        assert!(!SettlementStatus::Pending.is_terminal());
        assert_eq!("paid".parse::<SettlementStatus>().unwrap(), SettlementStatus::Paid);
    }
}
