//! MealPay - Campus Dining Wallet Ledger
//!
//! Prepaid wallets, signed single-use QR codes and atomic meal redemption.
//!
//! # Modules
//!
//! - [`core_types`] - Identifier aliases (UserId, VendorId, etc.)
//! - [`money`] - Amount parsing and formatting
//! - [`clock`] - Injectable time source
//! - [`directory`] - Users, vendors and menu items (read-only)
//! - [`store`] - Storage seam, PostgreSQL and in-process backends
//! - [`token`] - Signed token codec, registry, cache and QR rendering
//! - [`wallet`] - Wallet ledger
//! - [`meal`] - Redemption orchestrator
//! - [`settlement`] - Vendor settlement aggregator
//! - [`gateway`] - HTTP surface

// Core types - must be first!
pub mod core_types;

pub mod clock;
pub mod directory;
pub mod money;

// Persistence
pub mod db;
pub mod store;

// Domain components
pub mod meal;
pub mod settlement;
pub mod token;
pub mod wallet;

// Service plumbing
pub mod config;
pub mod gateway;
pub mod logging;

// Convenient re-exports at crate root
pub use clock::{Clock, ManualClock, SystemClock};
pub use core_types::{MealTransactionId, MenuItemId, SettlementId, UserId, VendorId, WalletId};
pub use meal::{MealOrchestrator, MealTransaction, RedeemError, RedeemRequest};
pub use settlement::{SettlementAggregator, SettlementError, VendorSettlement};
pub use store::{MemoryStore, PgStore, Storage, StoreError, UnitOfWork};
pub use token::{Purpose, TokenError, TokenReason, TokenRegistry};
pub use wallet::{LedgerEntry, LedgerError, Wallet, WalletLedger};
