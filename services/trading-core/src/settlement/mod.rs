//! Settlement against the external ledger
//!
//! The ledger holds cash/position truth. This module consumes its contract:
//! reserve on admission, confirm per trade leg, cancel reservations, and
//! compensate when one leg of a trade succeeded and the other failed. Every
//! call returns a tagged outcome value; callers branch explicitly, and
//! nothing here signals business rules by unwinding.

pub mod client;
pub mod compensation;
pub mod saga;

pub use client::{
    CancelReservationRequest, CompensationKind, CompensationRequest, ConfirmFullRequest,
    ConfirmPartialRequest, HttpLedgerClient, LedgerClient, ReserveRequest,
};
pub use compensation::{CompensationQueue, CompensationStats};
pub use saga::{settle_trade, LegView, SagaResult, SagaState};

use serde::{Deserialize, Serialize};

/// Result of a reserve/confirm/cancel call against the ledger
///
/// `BusinessRejected` is permanent and never retried. `TransportFailed`
/// is a candidate for retry or compensation and is never converted into a
/// business rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    Accepted,
    BusinessRejected(RejectReason),
    TransportFailed(String),
}

impl SettlementOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SettlementOutcome::Accepted)
    }
}

/// Why the ledger rejected a request on business grounds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    InsufficientBalance(String),
    InsufficientStock(String),
    Other(String),
}

/// Result of a compensation call
///
/// A critical failure means the ledger may now disagree with the book;
/// it is escalated to the operator queue and never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompensationOutcome {
    Completed,
    Failed { critical: bool, reason: String },
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_is_accepted() {
        assert!(SettlementOutcome::Accepted.is_accepted());
        assert!(!SettlementOutcome::TransportFailed("timeout".into()).is_accepted());
        assert!(
            !SettlementOutcome::BusinessRejected(RejectReason::Other("no".into())).is_accepted()
        );
    }
}
