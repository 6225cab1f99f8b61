//! Error taxonomy for the trading core
//!
//! Validation failures are rejected before any side effect. Business
//! rejections from the ledger are permanent and roll back admission.
//! Transport failures are retryable at the caller's discretion and are
//! never converted into business rejections.

use crate::ids::OrderId;
use crate::numeric::Quantity;
use crate::order::OrderStatus;
use thiserror::Error;

/// Malformed request; rejected before any side effect
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("quantity must be at least one share")]
    ZeroQuantity,

    #[error("limit and stop orders require a price")]
    MissingPrice,

    #[error("stop orders require a trigger price")]
    MissingStopPrice,

    #[error("stop-loss orders must be sell orders")]
    StopMustSell,

    #[error("symbol must not be empty")]
    EmptySymbol,
}

/// Order admission and lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("order not found: {order_id}")]
    NotFound { order_id: OrderId },

    #[error("order {order_id} is {status:?} and cannot be cancelled")]
    NotCancellable {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("fill of {fill} exceeds remaining {remaining} on order {order_id}")]
    FillExceedsRemaining {
        order_id: OrderId,
        fill: Quantity,
        remaining: Quantity,
    },

    #[error("insufficient balance: {0}")]
    InsufficientBalance(String),

    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("ledger rejected the request: {0}")]
    LedgerRejected(String),

    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("no reference price available for {symbol}")]
    ReferencePriceUnavailable { symbol: String },
}

impl OrderError {
    /// Whether the failure is permanent (retrying cannot help)
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            OrderError::Validation(_)
                | OrderError::InsufficientBalance(_)
                | OrderError::InsufficientStock(_)
                | OrderError::LedgerRejected(_)
                | OrderError::NotCancellable { .. }
        )
    }
}
