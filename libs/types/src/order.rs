//! Order lifecycle types
//!
//! An order is created on admission, mutated only by the component holding
//! its symbol lock, and reaches exactly one terminal state.

use crate::errors::OrderError;
use crate::ids::{AccountId, OrderId, Symbol, TenantId};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Scale of the volume-weighted average fill price
const AVG_PRICE_DP: u32 = 4;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderKind {
    /// Execute at the stated price or better
    Limit,
    /// Execute at the prevailing reference price
    Market,
    /// Sell-side stop: spawns a limit sell once the reference price falls
    /// to the trigger price
    StopLossSell,
}

impl OrderKind {
    /// Whether this kind requires a limit price
    pub fn requires_price(&self) -> bool {
        matches!(self, OrderKind::Limit | OrderKind::StopLossSell)
    }

    /// Whether this kind requires a stop-trigger price
    pub fn requires_stop_price(&self) -> bool {
        matches!(self, OrderKind::StopLossSell)
    }
}

/// Order status state machine
///
/// `New → {PartiallyFilled ⇄ …, Filled}`; `New | PartiallyFilled →
/// Cancelled` (ledger cancellation must succeed first); `New →
/// PendingTrigger → Active → …` for gate-held orders. PendingTrigger also
/// marks a stop order that has spawned its replacement. Filled and
/// Cancelled are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PendingTrigger,
    Active,
    PartiallyFilled,
    Filled,
    Cancelled,
}

impl OrderStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }

    /// Whether an order in this status may still be cancelled
    pub fn can_cancel(&self) -> bool {
        matches!(
            self,
            OrderStatus::New
                | OrderStatus::PendingTrigger
                | OrderStatus::Active
                | OrderStatus::PartiallyFilled
        )
    }
}

/// A buy/sell order for an equity symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    /// Limit price; required for Limit and StopLossSell, optional for Market
    pub price: Option<Price>,
    /// Trigger price; StopLossSell only
    pub stop_price: Option<Price>,
    pub quantity: Quantity,
    pub filled: Quantity,
    /// Volume-weighted average fill price across all fills
    pub avg_fill_price: Option<Price>,
    pub status: OrderStatus,
    /// Generated by the liquidity simulator; never settled externally
    pub synthetic: bool,
    /// Monotonic per-symbol admission sequence; the deterministic
    /// tie-breaking key for equal-price and same-tick decisions
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order in status New with zero fills
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tenant_id: TenantId,
        account_id: AccountId,
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        price: Option<Price>,
        stop_price: Option<Price>,
        quantity: Quantity,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            tenant_id,
            account_id,
            symbol,
            side,
            kind,
            price,
            stop_price,
            quantity,
            filled: Quantity::zero(),
            avg_fill_price: None,
            status: OrderStatus::New,
            synthetic: false,
            seq: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Unfilled quantity; always derived, never stored
    pub fn remaining(&self) -> Quantity {
        self.quantity.saturating_sub(self.filled)
    }

    pub fn is_filled(&self) -> bool {
        self.filled == self.quantity
    }

    pub fn has_fills(&self) -> bool {
        !self.filled.is_zero()
    }

    /// Apply a fill, recomputing the volume-weighted average price and
    /// moving the status to PartiallyFilled or Filled.
    pub fn apply_fill(&mut self, quantity: Quantity, price: Price) -> Result<(), OrderError> {
        if quantity.is_zero() || quantity > self.remaining() {
            return Err(OrderError::FillExceedsRemaining {
                order_id: self.id,
                fill: quantity,
                remaining: self.remaining(),
            });
        }

        let notional = match self.avg_fill_price {
            Some(avg) => {
                avg.as_decimal() * self.filled.as_decimal()
                    + price.as_decimal() * quantity.as_decimal()
            }
            None => price.as_decimal() * quantity.as_decimal(),
        };
        self.filled = self.filled + quantity;
        let avg = (notional / self.filled.as_decimal())
            .round_dp_with_strategy(AVG_PRICE_DP, RoundingStrategy::MidpointAwayFromZero);
        self.avg_fill_price = Price::try_new(avg);

        self.status = if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Move to a new status, stamping the update time
    pub fn set_status(&mut self, status: OrderStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Total value of the order at its limit price, if priced
    pub fn notional(&self) -> Option<Decimal> {
        self.price
            .map(|p| p.as_decimal() * self.quantity.as_decimal())
    }
}
