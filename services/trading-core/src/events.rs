//! Core event stream
//!
//! Committed trades, order status transitions and compensation alerts are
//! published for out-of-scope presentation layers. Broadcast semantics:
//! slow receivers lose messages rather than backpressure the core.

use serde::Serialize;
use tokio::sync::broadcast;
use types::ids::{OrderId, Symbol, TradeId};
use types::order::OrderStatus;
use types::trade::Trade;

/// Events produced by the trading core
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoreEvent {
    TradeCommitted {
        trade: Trade,
    },
    OrderStatusChanged {
        order_id: OrderId,
        symbol: Symbol,
        status: OrderStatus,
    },
    CompensationAlert {
        order_id: OrderId,
        trade_id: Option<TradeId>,
        critical: bool,
        reason: String,
    },
}

/// Broadcast fan-out of core events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; silently dropped when nobody listens
    pub fn publish(&self, event: CoreEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
