//! Price level with FIFO queue
//!
//! A price level holds the resting orders at one price point in strict
//! arrival order, enforcing time priority among equal prices. Entries
//! reference orders by id; remaining quantities live in the symbol book's
//! order table, the single source of truth.

use std::collections::VecDeque;
use types::ids::OrderId;

/// Entry in the price level queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelEntry {
    /// Admission sequence of the order, for deterministic diagnostics
    pub seq: u64,
    pub order_id: OrderId,
}

/// Resting orders at a single price, FIFO by insertion
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    entries: VecDeque<LevelEntry>,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append an order at the back of the queue (time priority)
    pub fn push(&mut self, seq: u64, order_id: OrderId) {
        self.entries.push_back(LevelEntry { seq, order_id });
    }

    /// Remove an order by id; true if it was present
    pub fn remove(&mut self, order_id: &OrderId) -> bool {
        match self.entries.iter().position(|e| &e.order_id == order_id) {
            Some(position) => {
                self.entries.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.entries.iter().any(|e| &e.order_id == order_id)
    }

    /// Entries in time priority order
    pub fn iter(&self) -> impl Iterator<Item = &LevelEntry> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
