//! Reference-price feed boundary
//!
//! The feed's own simulation and broadcast mechanics live elsewhere; the
//! core only reads the current price and reacts to update notifications
//! pushed through `TradingCore::on_price_update`.

use async_trait::async_trait;
use dashmap::DashMap;
use types::ids::Symbol;
use types::numeric::Price;

/// Read side of the reference-price feed
#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current reference price, if the symbol is known
    async fn current_price(&self, symbol: &Symbol) -> Option<Price>;
}

/// Settable in-process feed for tests and demos
#[derive(Debug, Default)]
pub struct StaticPriceFeed {
    prices: DashMap<Symbol, Price>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: Symbol, price: Price) {
        self.prices.insert(symbol, price);
    }
}

#[async_trait]
impl PriceFeed for StaticPriceFeed {
    async fn current_price(&self, symbol: &Symbol) -> Option<Price> {
        self.prices.get(symbol).map(|entry| *entry.value())
    }
}
