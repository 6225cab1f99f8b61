//! Order admission front door
//!
//! Orchestrates the full pipeline: validation → reservation → price gate →
//! matching → stop-loss watching → liquidity handoff. Reservation happens
//! before the gate decision, so a held order has already tied up funds or
//! stock; activation later does not re-reserve.

use std::sync::Arc;
use tracing::{error, info, warn};
use types::errors::{OrderError, ValidationError};
use types::ids::{AccountId, OrderId, Symbol, TenantId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderKind, OrderStatus, Side};
use types::trade::Trade;

use crate::admission::AdmissionGate;
use crate::book::BookSnapshot;
use crate::config::CoreConfig;
use crate::events::{CoreEvent, EventBus};
use crate::liquidity::LiquiditySimulator;
use crate::matching::MatchingEngine;
use crate::pricefeed::PriceFeed;
use crate::registry::OrderBookRegistry;
use crate::settlement::client::{CancelReservationRequest, ReserveRequest};
use crate::settlement::{
    CompensationQueue, CompensationStats, LedgerClient, RejectReason, SettlementOutcome,
};
use crate::stoploss::{StopLossWatcherSet, StopWatcher, WatcherStore};
use tokio::sync::broadcast;

/// An order submission from the transport layer
#[derive(Debug, Clone)]
pub struct NewOrderRequest {
    pub tenant_id: TenantId,
    pub account_id: AccountId,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    pub quantity: u64,
}

/// What the caller gets back from admission
///
/// Held orders carry status PendingTrigger: a distinct outcome, not an
/// error.
#[derive(Debug, Clone)]
pub struct OrderTicket {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub filled: Quantity,
    pub avg_fill_price: Option<Price>,
    pub trades: Vec<Trade>,
}

impl OrderTicket {
    fn from_order(order: &Order, trades: Vec<Trade>) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            filled: order.filled,
            avg_fill_price: order.avg_fill_price,
            trades,
        }
    }
}

/// The trading core: one instance owns every component
pub struct TradingCore {
    config: CoreConfig,
    registry: Arc<OrderBookRegistry>,
    engine: Arc<MatchingEngine>,
    ledger: Arc<dyn LedgerClient>,
    gate: AdmissionGate,
    stops: StopLossWatcherSet,
    liquidity: Arc<LiquiditySimulator>,
    feed: Arc<dyn PriceFeed>,
    compensation: Arc<CompensationQueue>,
    events: EventBus,
}

impl TradingCore {
    pub fn new(
        config: CoreConfig,
        ledger: Arc<dyn LedgerClient>,
        feed: Arc<dyn PriceFeed>,
        watcher_store: Arc<dyn WatcherStore>,
    ) -> Arc<Self> {
        let events = EventBus::default();
        let compensation = Arc::new(CompensationQueue::new(events.clone()));
        let registry = Arc::new(OrderBookRegistry::new());
        let engine = Arc::new(MatchingEngine::new(
            ledger.clone(),
            compensation.clone(),
            events.clone(),
        ));
        let liquidity =
            LiquiditySimulator::new(config.liquidity.clone(), registry.clone(), engine.clone());
        liquidity.start();

        Arc::new(Self {
            gate: AdmissionGate::new(config.price_tolerance),
            stops: StopLossWatcherSet::load(watcher_store),
            config,
            registry,
            engine,
            ledger,
            liquidity,
            feed,
            compensation,
            events,
        })
    }

    /// Admit a new order through the full pipeline
    pub async fn place_order(&self, request: NewOrderRequest) -> Result<OrderTicket, OrderError> {
        self.submit_pipeline(request, false).await
    }

    /// The admission pipeline. Stop-replacement orders are gate-exempt:
    /// they were synthesized at the reference price that triggered them.
    async fn submit_pipeline(
        &self,
        request: NewOrderRequest,
        gate_exempt: bool,
    ) -> Result<OrderTicket, OrderError> {
        let symbol = validate(&request)?;

        let mut order = Order::new(
            request.tenant_id,
            request.account_id,
            symbol.clone(),
            request.side,
            request.kind,
            request.price,
            request.stop_price,
            Quantity::new(request.quantity),
        );

        let reference = self.feed.current_price(&symbol).await;

        // A market order becomes a marketable limit at the reference price,
        // which is also its reservation price
        if order.kind == OrderKind::Market && order.price.is_none() {
            match reference {
                Some(price) => order.price = Some(price),
                None => {
                    return Err(OrderError::ReferencePriceUnavailable {
                        symbol: symbol.to_string(),
                    })
                }
            }
        }

        // The order must never become visible before its reservation holds
        self.reserve(&order).await?;

        // Gate applies to limit orders only; market and stop-replacement
        // orders bypass it. Reservation above stands either way.
        if order.kind == OrderKind::Limit && !gate_exempt {
            match (reference, order.price) {
                (Some(reference), Some(submitted))
                    if !self.gate.within_tolerance(reference, submitted) =>
                {
                    let held = self.gate.hold(order, reference, submitted);
                    self.events.publish(CoreEvent::OrderStatusChanged {
                        order_id: held.id,
                        symbol: held.symbol.clone(),
                        status: held.status,
                    });
                    return Ok(OrderTicket::from_order(&held, Vec::new()));
                }
                (None, _) => {
                    warn!(%symbol, "no reference price, admitting limit order ungated");
                }
                _ => {}
            }
        }

        let trades = self.admit(&mut order).await;

        if order.kind == OrderKind::StopLossSell {
            if let Err(err) = self.stops.watch(&order) {
                error!(order_id = %order.id, %err, "failed to register stop-loss watcher");
            }
        }

        if !order.remaining().is_zero() {
            self.liquidity.schedule(&order);
        }

        info!(
            order_id = %order.id,
            %symbol,
            status = ?order.status,
            trades = trades.len(),
            "order admitted"
        );
        Ok(OrderTicket::from_order(&order, trades))
    }

    /// Cancel an order across gate, book and watchers.
    ///
    /// The ledger must release the reservation first; when it refuses or is
    /// unreachable the order stays exactly where it was.
    pub async fn cancel_order(&self, order_id: &OrderId, symbol: &Symbol) -> Result<(), OrderError> {
        // Held orders: release the reservation, no book interaction
        if let Some(held) = self.gate.get(order_id) {
            self.release_reservation(&held, "pending order cancelled")
                .await?;
            if let Some(mut removed) = self.gate.remove(order_id) {
                removed.set_status(OrderStatus::Cancelled);
                self.events.publish(CoreEvent::OrderStatusChanged {
                    order_id: removed.id,
                    symbol: removed.symbol.clone(),
                    status: removed.status,
                });
            }
            info!(%order_id, "pending order cancelled");
            return Ok(());
        }

        let book_arc = self
            .registry
            .get(symbol)
            .ok_or(OrderError::NotFound { order_id: *order_id })?;
        // Cancellation takes the symbol lock, so it cannot race a matching
        // pass already underway for this order
        let mut book = book_arc.lock().await;
        let resting = book
            .order(order_id)
            .ok_or(OrderError::NotFound { order_id: *order_id })?;
        if !resting.status.can_cancel() {
            return Err(OrderError::NotCancellable {
                order_id: *order_id,
                status: resting.status,
            });
        }
        let resting = resting.clone();

        self.release_reservation(&resting, "user requested cancellation")
            .await?;

        let mut removed = book
            .remove(order_id)
            .ok_or(OrderError::NotFound { order_id: *order_id })?;
        removed.set_status(OrderStatus::Cancelled);
        drop(book);

        self.events.publish(CoreEvent::OrderStatusChanged {
            order_id: removed.id,
            symbol: removed.symbol.clone(),
            status: removed.status,
        });
        if removed.kind == OrderKind::StopLossSell {
            self.stops.remove(order_id, symbol);
        }
        self.liquidity.retract(order_id);
        info!(%order_id, %symbol, "order cancelled");
        Ok(())
    }

    /// React to a reference-price update: first re-evaluate gate-held
    /// orders, then stop-loss watchers, both for this symbol only
    pub async fn on_price_update(&self, symbol: &Symbol, price: Price) {
        for mut order in self.gate.take_activatable(symbol, price) {
            self.events.publish(CoreEvent::OrderStatusChanged {
                order_id: order.id,
                symbol: order.symbol.clone(),
                status: order.status,
            });
            // Activation admits without re-reservation
            let trades = self.admit(&mut order).await;
            if !order.remaining().is_zero() {
                self.liquidity.schedule(&order);
            }
            info!(
                order_id = %order.id,
                %symbol,
                trades = trades.len(),
                "activated pending order"
            );
        }

        for watcher in self.stops.take_triggered(symbol, price) {
            self.handle_stop_trigger(watcher, price).await;
        }
    }

    /// Consistent snapshot of one symbol's book
    pub async fn snapshot(&self, symbol: &Symbol) -> Option<BookSnapshot> {
        self.registry
            .snapshot(symbol, self.config.snapshot_depth)
            .await
    }

    pub async fn best_bid(&self, symbol: &Symbol) -> Option<Price> {
        self.snapshot(symbol).await?.best_bid
    }

    pub async fn best_ask(&self, symbol: &Symbol) -> Option<Price> {
        self.snapshot(symbol).await?.best_ask
    }

    pub async fn spread(&self, symbol: &Symbol) -> Option<rust_decimal::Decimal> {
        self.snapshot(symbol).await?.spread
    }

    /// Look up an order in the gate or the book
    pub async fn order(&self, order_id: &OrderId, symbol: &Symbol) -> Option<Order> {
        if let Some(held) = self.gate.get(order_id) {
            return Some(held);
        }
        let book_arc = self.registry.get(symbol)?;
        let book = book_arc.lock().await;
        book.order(order_id).cloned()
    }

    /// All committed trades so far
    pub fn trades(&self) -> Vec<Trade> {
        self.engine.trade_log().all()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn compensation_stats(&self) -> CompensationStats {
        self.compensation.stats()
    }

    /// Re-drive retryable compensations (operator action)
    pub async fn retry_failed_compensations(&self) -> usize {
        self.compensation.retry_failed(self.ledger.as_ref()).await
    }

    pub fn is_watching_stop(&self, order_id: &OrderId) -> bool {
        self.stops.is_watching(order_id)
    }

    pub fn shutdown(&self) {
        self.liquidity.stop();
    }

    /// Lock the symbol's book, stamp the admission sequence and run the
    /// matching walk
    async fn admit(&self, order: &mut Order) -> Vec<Trade> {
        let book_arc = self.registry.book(&order.symbol);
        let mut book = book_arc.lock().await;
        order.seq = book.assign_seq();
        self.engine.submit(&mut book, order).await
    }

    /// Reserve funds (buy) or stock (sell) for the order
    async fn reserve(&self, order: &Order) -> Result<(), OrderError> {
        let request = ReserveRequest {
            account_id: order.account_id,
            symbol: order.symbol.clone(),
            order_id: order.id,
            quantity: order.quantity,
            price: order.price,
        };
        let outcome = match order.side {
            Side::Buy => self.ledger.reserve_buy(&request).await,
            Side::Sell => self.ledger.reserve_sell(&request).await,
        };
        match outcome_to_result(outcome) {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(order_id = %order.id, %err, "reservation failed, rolling back order");
                Err(err)
            }
        }
    }

    async fn release_reservation(&self, order: &Order, reason: &str) -> Result<(), OrderError> {
        let request = CancelReservationRequest {
            order_id: order.id,
            account_id: order.account_id,
            symbol: order.symbol.clone(),
            kind: order.kind,
            original_quantity: order.quantity,
            filled_quantity: order.filled,
            reason: reason.to_string(),
        };
        outcome_to_result(self.ledger.cancel_reservation(&request).await)
    }

    /// A fired stop-loss watcher: mark the original order, re-validate the
    /// position with a throwaway reserve-then-cancel, then synthesize the
    /// replacement limit sell through the full pipeline
    async fn handle_stop_trigger(&self, watcher: StopWatcher, price: Price) {
        // Audit marker on the original order
        if let Some(book_arc) = self.registry.get(&watcher.symbol) {
            let mut book = book_arc.lock().await;
            if let Some(original) = book.order_mut(&watcher.order_id) {
                original.set_status(OrderStatus::PendingTrigger);
                let status = original.status;
                self.events.publish(CoreEvent::OrderStatusChanged {
                    order_id: watcher.order_id,
                    symbol: watcher.symbol.clone(),
                    status,
                });
            }
        }

        // Throwaway reserve-then-cancel check: does the account still hold
        // the shares?
        let probe_id = OrderId::new();
        let probe = ReserveRequest {
            account_id: watcher.account_id,
            symbol: watcher.symbol.clone(),
            order_id: probe_id,
            quantity: watcher.quantity,
            price: None,
        };
        match self.ledger.reserve_sell(&probe).await {
            SettlementOutcome::Accepted => {
                let release = CancelReservationRequest {
                    order_id: probe_id,
                    account_id: watcher.account_id,
                    symbol: watcher.symbol.clone(),
                    kind: OrderKind::Limit,
                    original_quantity: watcher.quantity,
                    filled_quantity: Quantity::zero(),
                    reason: "stop-loss position check".to_string(),
                };
                if let SettlementOutcome::TransportFailed(reason) =
                    self.ledger.cancel_reservation(&release).await
                {
                    warn!(
                        order_id = %watcher.order_id,
                        %reason,
                        "failed to release stop-loss validation reservation"
                    );
                }
            }
            outcome => {
                warn!(
                    order_id = %watcher.order_id,
                    symbol = %watcher.symbol,
                    ?outcome,
                    "abandoning stop trigger, position check failed"
                );
                return;
            }
        }

        // Replacement limit sell at the triggering price, full pipeline
        let request = NewOrderRequest {
            tenant_id: watcher.tenant_id,
            account_id: watcher.account_id,
            symbol: watcher.symbol.to_string(),
            side: Side::Sell,
            kind: OrderKind::Limit,
            price: Some(price),
            stop_price: None,
            quantity: watcher.quantity.as_u64(),
        };
        match self.submit_pipeline(request, true).await {
            Ok(ticket) => info!(
                original = %watcher.order_id,
                replacement = %ticket.order_id,
                %price,
                "stop-loss replacement order admitted"
            ),
            Err(err) => error!(
                original = %watcher.order_id,
                %err,
                "stop-loss replacement order rejected"
            ),
        }
    }
}

fn validate(request: &NewOrderRequest) -> Result<Symbol, ValidationError> {
    let symbol = Symbol::try_new(&request.symbol).ok_or(ValidationError::EmptySymbol)?;
    if request.quantity == 0 {
        return Err(ValidationError::ZeroQuantity);
    }
    if request.kind.requires_price() && request.price.is_none() {
        return Err(ValidationError::MissingPrice);
    }
    if request.kind.requires_stop_price() && request.stop_price.is_none() {
        return Err(ValidationError::MissingStopPrice);
    }
    if request.kind == OrderKind::StopLossSell && request.side != Side::Sell {
        return Err(ValidationError::StopMustSell);
    }
    Ok(symbol)
}

fn outcome_to_result(outcome: SettlementOutcome) -> Result<(), OrderError> {
    match outcome {
        SettlementOutcome::Accepted => Ok(()),
        SettlementOutcome::BusinessRejected(reason) => Err(match reason {
            RejectReason::InsufficientBalance(message) => {
                OrderError::InsufficientBalance(message)
            }
            RejectReason::InsufficientStock(message) => OrderError::InsufficientStock(message),
            RejectReason::Other(message) => OrderError::LedgerRejected(message),
        }),
        SettlementOutcome::TransportFailed(message) => {
            Err(OrderError::LedgerUnavailable(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: OrderKind, side: Side) -> NewOrderRequest {
        NewOrderRequest {
            tenant_id: TenantId::new(),
            account_id: AccountId::new(),
            symbol: "AKBNK".to_string(),
            side,
            kind,
            price: Some("50.00".parse().unwrap()),
            stop_price: None,
            quantity: 100,
        }
    }

    #[test]
    fn test_validate_accepts_limit() {
        assert!(validate(&request(OrderKind::Limit, Side::Buy)).is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_quantity() {
        let mut req = request(OrderKind::Limit, Side::Buy);
        req.quantity = 0;
        assert_eq!(validate(&req), Err(ValidationError::ZeroQuantity));
    }

    #[test]
    fn test_validate_rejects_unpriced_limit() {
        let mut req = request(OrderKind::Limit, Side::Buy);
        req.price = None;
        assert_eq!(validate(&req), Err(ValidationError::MissingPrice));
    }

    #[test]
    fn test_validate_rejects_stop_without_trigger() {
        let req = request(OrderKind::StopLossSell, Side::Sell);
        assert_eq!(validate(&req), Err(ValidationError::MissingStopPrice));
    }

    #[test]
    fn test_validate_rejects_buy_side_stop() {
        let mut req = request(OrderKind::StopLossSell, Side::Buy);
        req.stop_price = Some("45.00".parse().unwrap());
        assert_eq!(validate(&req), Err(ValidationError::StopMustSell));
    }

    #[test]
    fn test_validate_rejects_blank_symbol() {
        let mut req = request(OrderKind::Limit, Side::Buy);
        req.symbol = "  ".to_string();
        assert_eq!(validate(&req), Err(ValidationError::EmptySymbol));
    }

    #[test]
    fn test_outcome_mapping() {
        assert!(outcome_to_result(SettlementOutcome::Accepted).is_ok());
        assert!(matches!(
            outcome_to_result(SettlementOutcome::BusinessRejected(
                RejectReason::InsufficientBalance("x".into())
            )),
            Err(OrderError::InsufficientBalance(_))
        ));
        assert!(matches!(
            outcome_to_result(SettlementOutcome::TransportFailed("x".into())),
            Err(OrderError::LedgerUnavailable(_))
        ));
    }
}
