//! Price-tolerance admission gate
//!
//! Limit orders priced too far from the reference price are not admitted to
//! the book; they are held with status PendingTrigger until a later price
//! update brings them inside tolerance. Reservation has already happened by
//! the time an order is held, and activation does not re-reserve.
//!
//! Activation order within one price tick is the order of arrival in the
//! pending queue, which is deterministic.

use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::info;
use types::ids::{OrderId, Symbol};
use types::numeric::Price;
use types::order::{Order, OrderStatus};

/// A held order awaiting price re-entry
#[derive(Debug, Clone)]
pub struct PendingActivation {
    pub order: Order,
    /// Reference price at submission time
    pub market_price_at_submit: Price,
    pub submitted_price: Price,
}

/// Holds out-of-tolerance limit orders until the price comes to them
pub struct AdmissionGate {
    /// Maximum relative deviation from the reference price
    tolerance: Decimal,
    pending: DashMap<Symbol, Vec<PendingActivation>>,
}

impl AdmissionGate {
    pub fn new(tolerance: Decimal) -> Self {
        Self {
            tolerance,
            pending: DashMap::new(),
        }
    }

    /// Whether a submitted price is within tolerance of the reference
    pub fn within_tolerance(&self, reference: Price, submitted: Price) -> bool {
        let reference = reference.as_decimal();
        let deviation = (submitted.as_decimal() - reference).abs() / reference;
        deviation <= self.tolerance
    }

    /// Hold an order pending activation; its status becomes PendingTrigger
    pub fn hold(&self, mut order: Order, market_price: Price, submitted_price: Price) -> Order {
        order.set_status(OrderStatus::PendingTrigger);
        info!(
            order_id = %order.id,
            symbol = %order.symbol,
            %submitted_price,
            %market_price,
            "order held pending price activation"
        );
        let held = order.clone();
        self.pending
            .entry(order.symbol.clone())
            .or_default()
            .push(PendingActivation {
                order,
                market_price_at_submit: market_price,
                submitted_price,
            });
        held
    }

    /// Remove and return every held order for the symbol whose price now
    /// falls within tolerance of the updated reference price, in arrival
    /// order, each flipped to Active
    pub fn take_activatable(&self, symbol: &Symbol, new_price: Price) -> Vec<Order> {
        let mut activated = Vec::new();
        if let Some(mut entry) = self.pending.get_mut(symbol) {
            let queue = entry.value_mut();
            let mut index = 0;
            while index < queue.len() {
                if self.within_tolerance(new_price, queue[index].submitted_price) {
                    let mut pending = queue.remove(index);
                    pending.order.set_status(OrderStatus::Active);
                    info!(
                        order_id = %pending.order.id,
                        symbol = %symbol,
                        %new_price,
                        "pending order activated"
                    );
                    activated.push(pending.order);
                } else {
                    index += 1;
                }
            }
        }
        activated
    }

    /// Remove a held order (cancellation path); no book interaction
    pub fn remove(&self, order_id: &OrderId) -> Option<Order> {
        for mut entry in self.pending.iter_mut() {
            let queue = entry.value_mut();
            if let Some(position) = queue.iter().position(|p| &p.order.id == order_id) {
                return Some(queue.remove(position).order);
            }
        }
        None
    }

    /// Look up a held order without removing it
    pub fn get(&self, order_id: &OrderId) -> Option<Order> {
        self.pending.iter().find_map(|entry| {
            entry
                .value()
                .iter()
                .find(|p| &p.order.id == order_id)
                .map(|p| p.order.clone())
        })
    }

    /// Held orders for a symbol, in arrival order
    pub fn pending_for(&self, symbol: &Symbol) -> Vec<Order> {
        self.pending
            .get(symbol)
            .map(|entry| entry.value().iter().map(|p| p.order.clone()).collect())
            .unwrap_or_default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.iter().map(|entry| entry.value().len()).sum()
    }
}
