//! Core identifier types used throughout the system
//!
//! Every persisted record is keyed by a UUID. The aliases give each key a
//! semantic name so signatures read as `debit(user_id: UserId, ..)` rather than
//! a wall of `Uuid`s.

use uuid::Uuid;

/// User ID - students, vendor operators and admins share one id space.
///
/// Supplied by the upstream identity service; the core never mints them.
pub type UserId = Uuid;

/// Vendor (mess or canteen counter) ID
pub type VendorId = Uuid;

/// Menu item ID, always scoped to one vendor
pub type MenuItemId = Uuid;

/// Wallet ID - exactly one per user
pub type WalletId = Uuid;

/// Ledger entry ID
pub type LedgerEntryId = Uuid;

/// Meal transaction ID
pub type MealTransactionId = Uuid;

/// Vendor settlement ID
pub type SettlementId = Uuid;

/// Allocate a fresh random identifier.
#[inline]
pub fn new_id() -> Uuid {
    Uuid::new_v4()
}
