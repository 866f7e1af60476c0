//! Vendor payout rollups over committed meal transactions

pub mod aggregator;
pub mod error;
pub mod types;

pub use aggregator::SettlementAggregator;
pub use error::SettlementError;
pub use types::{SettlementStatus, SettlementSummary, VendorSettlement};
