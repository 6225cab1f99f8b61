//! Per-symbol order book
//!
//! Owns both sides plus the resting-order table. The table is the single
//! source of truth for remaining quantities; the sides hold only id
//! references in priority order. An order id rests in at most one side of
//! at most one book at any time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use types::errors::OrderError;
use types::ids::{OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, Side};

use super::ask_book::AskBook;
use super::bid_book::BidBook;

/// One symbol's book: bids, asks and the resting-order table
#[derive(Debug)]
pub struct SymbolBook {
    symbol: Symbol,
    bids: BidBook,
    asks: AskBook,
    orders: HashMap<OrderId, Order>,
    next_seq: u64,
}

impl SymbolBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BidBook::new(),
            asks: AskBook::new(),
            orders: HashMap::new(),
            next_seq: 1,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Next admission sequence number for this symbol
    pub fn assign_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Insert a priced order as resting
    pub fn insert(&mut self, order: Order) -> Result<(), OrderError> {
        let price = order.price.ok_or(OrderError::Validation(
            types::errors::ValidationError::MissingPrice,
        ))?;
        debug_assert!(
            !self.orders.contains_key(&order.id),
            "order already resting"
        );
        match order.side {
            Side::Buy => self.bids.insert(price, order.seq, order.id),
            Side::Sell => self.asks.insert(price, order.seq, order.id),
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    /// Remove a resting order, returning it
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Order> {
        let order = self.orders.remove(order_id)?;
        if let Some(price) = order.price {
            match order.side {
                Side::Buy => self.bids.remove(order_id, price),
                Side::Sell => self.asks.remove(order_id, price),
            };
        }
        Some(order)
    }

    pub fn order(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id)
    }

    pub fn order_mut(&mut self, order_id: &OrderId) -> Option<&mut Order> {
        self.orders.get_mut(order_id)
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    pub fn resting_count(&self) -> usize {
        self.orders.len()
    }

    /// Resting orders on the opposite side that cross an incoming order,
    /// in price-time priority
    pub fn crossing_candidates(
        &self,
        incoming_side: Side,
        limit: Option<Price>,
    ) -> Vec<OrderId> {
        match incoming_side {
            Side::Buy => self.asks.crossing_candidates(limit),
            Side::Sell => self.bids.crossing_candidates(limit),
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.best_price()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.best_price()
    }

    /// Ask minus bid; None unless both sides are populated
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.as_decimal() - bid.as_decimal()),
            _ => None,
        }
    }

    /// Consistent read of both sides, computed under the symbol lock
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let remaining = |id: &OrderId| {
            self.orders
                .get(id)
                .map(|o| o.remaining())
                .unwrap_or(Quantity::zero())
        };
        BookSnapshot {
            symbol: self.symbol.clone(),
            best_bid: self.best_bid(),
            best_ask: self.best_ask(),
            spread: self.spread(),
            bids: self
                .bids
                .depth(depth, remaining)
                .into_iter()
                .map(DepthLevel::from)
                .collect(),
            asks: self
                .asks
                .depth(depth, remaining)
                .into_iter()
                .map(DepthLevel::from)
                .collect(),
            taken_at: Utc::now(),
        }
    }
}

/// Aggregated quantity at one price level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub orders: usize,
}

impl From<(Price, Quantity, usize)> for DepthLevel {
    fn from((price, quantity, orders): (Price, Quantity, usize)) -> Self {
        Self {
            price,
            quantity,
            orders,
        }
    }
}

/// Point-in-time view of one symbol's book
#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    pub best_bid: Option<Price>,
    pub best_ask: Option<Price>,
    pub spread: Option<Decimal>,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub taken_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::{AccountId, TenantId};
    use types::order::OrderKind;

    fn resting(side: Side, price: &str, quantity: u64, seq: u64) -> Order {
        let mut order = Order::new(
            TenantId::new(),
            AccountId::new(),
            Symbol::new("AKBNK"),
            side,
            OrderKind::Limit,
            Some(price.parse().unwrap()),
            None,
            Quantity::new(quantity),
        );
        order.seq = seq;
        order
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));
        let order = resting(Side::Buy, "50.00", 100, book.assign_seq());
        let id = order.id;

        book.insert(order).unwrap();
        assert!(book.contains(&id));
        assert_eq!(book.best_bid(), Some("50.00".parse().unwrap()));
        assert_eq!(book.resting_count(), 1);
    }

    #[test]
    fn test_insert_unpriced_rejected() {
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));
        let mut order = resting(Side::Buy, "50.00", 100, 1);
        order.price = None;
        assert!(book.insert(order).is_err());
    }

    #[test]
    fn test_remove_clears_both_structures() {
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));
        let order = resting(Side::Sell, "51.00", 100, book.assign_seq());
        let id = order.id;

        book.insert(order).unwrap();
        let removed = book.remove(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(!book.contains(&id));
        assert_eq!(book.best_ask(), None);
    }

    #[test]
    fn test_spread() {
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));
        assert_eq!(book.spread(), None);

        let seq = book.assign_seq();
        book.insert(resting(Side::Buy, "49.50", 100, seq)).unwrap();
        let seq = book.assign_seq();
        book.insert(resting(Side::Sell, "50.00", 100, seq)).unwrap();

        assert_eq!(book.spread(), Some(Decimal::new(50, 2)));
    }

    #[test]
    fn test_snapshot_depth_bounded() {
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));
        for i in 1..=5u64 {
            let seq = book.assign_seq();
            book.insert(resting(Side::Sell, &format!("5{i}.00"), 100, seq))
                .unwrap();
        }

        let snapshot = book.snapshot(3);
        assert_eq!(snapshot.asks.len(), 3);
        assert_eq!(snapshot.asks[0].price, "51.00".parse().unwrap());
        assert!(snapshot.bids.is_empty());
    }

    #[test]
    fn test_crossing_candidates_route_by_side() {
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));
        let seq = book.assign_seq();
        let ask = resting(Side::Sell, "50.00", 100, seq);
        let ask_id = ask.id;
        book.insert(ask).unwrap();

        let buys = book.crossing_candidates(Side::Buy, Some("50.00".parse().unwrap()));
        assert_eq!(buys, vec![ask_id]);

        let sells = book.crossing_candidates(Side::Sell, Some("50.00".parse().unwrap()));
        assert!(sells.is_empty());
    }
}
