//! Bid (buy-side) order book
//!
//! Buy orders sorted by price descending (best bid first). BTreeMap keys
//! give deterministic iteration; within a level, time priority is FIFO.

use std::collections::BTreeMap;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::PriceLevel;

/// Bid (buy) side of a symbol's book
#[derive(Debug, Clone, Default)]
pub struct BidBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
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

    /// Best (highest) bid price
    pub fn best_price(&self) -> Option<Price> {
        // BTreeMap iterates ascending, so the best bid is last
        self.levels.keys().next_back().copied()
    }

    /// Resting orders that cross an incoming sell limited at `limit`,
    /// best price first and FIFO within a price. A sell crosses a bid
    /// when the bid price is at or above the limit; market sells
    /// (no limit) cross every bid.
    pub fn crossing_candidates(&self, limit: Option<Price>) -> Vec<OrderId> {
        self.levels
            .iter()
            .rev()
            .take_while(|(price, _)| match limit {
                Some(limit) => **price >= limit,
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
            .rev()
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
