//! Ask (sell-side) order book
//!
//! Sell orders sorted by price ascending (best ask first). BTreeMap keys
//! give deterministic iteration; within a level, time priority is FIFO.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::PriceLevel;

/// Ask (sell) side of a symbol's book
#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Insert an order at its price level
    pub fn insert(&mut self, price: Price, seq: u64, order_id: OrderId) {
        self.levels
            .entry(price)
            .or_insert_with(PriceLevel::new)
            .push(seq, order_id);
    }

    /// Remove an order; empty levels are dropped to keep the book clean
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> bool {
        if let Some(level) = self.levels.get_mut(&price) {
            if level.remove(order_id) {
                if level.is_empty() {
                    self.levels.remove(&price);
                }
                return true;
            }
        }
        false
    }

    /// Best (lowest) ask price
    pub fn best_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Resting orders that cross an incoming buy limited at `limit`,
    /// best price first and FIFO within a price. A buy crosses an ask
    /// when the ask price is at or below the limit; market buys
    /// (no limit) cross every ask.
    pub fn crossing_candidates(&self, limit: Option<Price>) -> Vec<OrderId> {
        self.levels
            .iter()
            .take_while(|(price, _)| match limit {
                Some(limit) => **price <= limit,
                None => true,
            })
            .flat_map(|(_, level)| level.iter().map(|e| e.order_id))
            .collect()
    }

    /// Top `depth` levels, quantities resolved through the order table
    pub fn depth<F>(&self, depth: usize, remaining: F) -> Vec<(Price, Quantity, usize)>
    where
        F: Fn(&OrderId) -> Quantity,
    {
        self.levels
            .iter()
            .take(depth)
            .map(|(price, level)| {
                let total = level
                    .iter()
                    .fold(Quantity::zero(), |acc, e| acc + remaining(&e.order_id));
                (*price, total, level.len())
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
