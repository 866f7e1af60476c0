//! Per-user prepaid wallets and their append-only ledger

pub mod error;
pub mod ledger;
pub mod models;

pub use error::LedgerError;
pub use ledger::{DEFAULT_CURRENCY, WalletLedger};
pub use models::{
    Direction, EntryDraft, LedgerEntry, LedgerTotals, MessFeeRecord, RefKind, Wallet,
    WalletSummary,
};
