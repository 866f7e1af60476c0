//! Meal redemption: identity resolution, debit, record and token consumption
//! as one atomic unit.

pub mod error;
pub mod orchestrator;
pub mod state;
pub mod types;

pub use error::RedeemError;
pub use orchestrator::MealOrchestrator;
pub use state::{RedemptionState, RedemptionTrace};
pub use types::{Identity, MealTransaction, RedeemRequest};
