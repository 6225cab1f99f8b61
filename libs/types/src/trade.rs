//! Committed trade types
//!
//! A trade exists only after both settlement legs succeeded. Candidates
//! whose settlement fails are discarded and never constructed into this
//! type's committed form.

use crate::ids::{AccountId, OrderId, Symbol, TenantId, TradeId};
use crate::numeric::{Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An executed exchange between one buy and one sell order
///
/// Immutable once committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub symbol: Symbol,
    /// Execution price: always the resting (maker) order's price
    pub price: Price,
    pub quantity: Quantity,
    pub buy_account_id: AccountId,
    pub sell_account_id: AccountId,
    pub tenant_id: TenantId,
    /// One leg was generated by the liquidity simulator
    pub synthetic_counterparty: bool,
    pub executed_at: DateTime<Utc>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        symbol: Symbol,
        price: Price,
        quantity: Quantity,
        buy_account_id: AccountId,
        sell_account_id: AccountId,
        tenant_id: TenantId,
        synthetic_counterparty: bool,
    ) -> Self {
        Self {
            id: TradeId::new(),
            buy_order_id,
            sell_order_id,
            symbol,
            price,
            quantity,
            buy_account_id,
            sell_account_id,
            tenant_id,
            synthetic_counterparty,
            executed_at: Utc::now(),
        }
    }

    /// Trade value (price × quantity)
    pub fn value(&self) -> Decimal {
        self.price.as_decimal() * self.quantity.as_decimal()
    }
}
