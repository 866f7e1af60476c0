//! Redemption state machine
//!
//! Terminal states: COMPLETED, REJECTED. A rejection from any state leaves
//! no persisted effect because every write happens in one unit of work that
//! is only committed on the way to COMPLETED.

use std::fmt;
use tracing::debug;

use super::error::RedeemError;
use crate::core_types::MealTransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RedemptionState {
    Received,
    IdentityResolved,
    VendorResolved,
    StudentResolved,
    Debited,
    Recorded,
    TokenConsumed,
    Completed,
    Rejected,
}

impl RedemptionState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RedemptionState::Completed | RedemptionState::Rejected)
    }

    /// Legal forward moves. Token consumption is skipped on the direct path.
    pub fn can_advance_to(&self, next: RedemptionState) -> bool {
        use RedemptionState::*;
        match (self, next) {
            (s, Rejected) => !s.is_terminal(),
            (Received, IdentityResolved)
            | (IdentityResolved, VendorResolved)
            | (VendorResolved, StudentResolved)
            | (StudentResolved, Debited)
            | (Debited, Recorded)
            | (Recorded, TokenConsumed)
            | (Recorded, Completed)
            | (TokenConsumed, Completed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionState::Received => "RECEIVED",
            RedemptionState::IdentityResolved => "IDENTITY_RESOLVED",
            RedemptionState::VendorResolved => "VENDOR_RESOLVED",
            RedemptionState::StudentResolved => "STUDENT_RESOLVED",
            RedemptionState::Debited => "DEBITED",
            RedemptionState::Recorded => "RECORDED",
            RedemptionState::TokenConsumed => "TOKEN_CONSUMED",
            RedemptionState::Completed => "COMPLETED",
            RedemptionState::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for RedemptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tracks one attempt through the machine and logs each transition.
#[derive(Debug)]
pub struct RedemptionTrace {
    attempt: MealTransactionId,
    state: RedemptionState,
}

impl RedemptionTrace {
    pub fn new(attempt: MealTransactionId) -> Self {
        Self {
            attempt,
            state: RedemptionState::Received,
        }
    }

    pub fn state(&self) -> RedemptionState {
        self.state
    }

    pub fn advance(&mut self, next: RedemptionState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal redemption transition {} -> {}",
            self.state,
            next
        );
        debug!(attempt = %self.attempt, from = %self.state, to = %next, "Redemption transition");
        self.state = next;
    }

    pub fn reject(&mut self, error: &RedeemError) {
        debug!(
            attempt = %self.attempt,
            from = %self.state,
            code = error.code(),
            "Redemption rejected"
        );
        self.state = RedemptionState::Rejected;
    }
}
