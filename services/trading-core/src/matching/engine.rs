//! Matching engine
//!
//! Walks the opposite side of a symbol's book in price-time priority and
//! settles every candidate trade before applying it. A failed settlement
//! discards the candidate and continues the walk; it never aborts the pass.
//! Every method takes the already-locked symbol book, so the caller decides
//! the locking scope.

use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use types::errors::OrderError;
use types::ids::{AccountId, OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderKind, Side};
use types::trade::Trade;

use crate::book::SymbolBook;
use crate::events::{CoreEvent, EventBus};
use crate::settlement::saga::{settle_trade, LegView, SagaResult};
use crate::settlement::{CompensationQueue, LedgerClient};

/// In-memory log of committed trades
///
/// Candidates that fail settlement are never recorded here.
#[derive(Debug, Default)]
pub struct TradeLog {
    inner: Mutex<Vec<Trade>>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, trade: Trade) {
        self.inner.lock().expect("trade log poisoned").push(trade);
    }

    pub fn all(&self) -> Vec<Trade> {
        self.inner.lock().expect("trade log poisoned").clone()
    }

    pub fn for_symbol(&self, symbol: &Symbol) -> Vec<Trade> {
        self.inner
            .lock()
            .expect("trade log poisoned")
            .iter()
            .filter(|t| &t.symbol == symbol)
            .cloned()
            .collect()
    }
}

/// One candidate's fields copied out of the book before awaiting settlement
struct Candidate {
    order_id: OrderId,
    account_id: AccountId,
    synthetic: bool,
    remaining: Quantity,
    price: Price,
}

/// Price-time priority matcher with settle-before-apply semantics
pub struct MatchingEngine {
    ledger: Arc<dyn LedgerClient>,
    compensation: Arc<CompensationQueue>,
    events: EventBus,
    trades: TradeLog,
}

impl MatchingEngine {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        compensation: Arc<CompensationQueue>,
        events: EventBus,
    ) -> Self {
        Self {
            ledger,
            compensation,
            events,
            trades: TradeLog::new(),
        }
    }

    pub fn trade_log(&self) -> &TradeLog {
        &self.trades
    }

    /// Match an incoming order against the book, then rest any remainder.
    ///
    /// Caller must hold the symbol lock and must have assigned `order.seq`.
    /// Returns the committed trades; the order reflects its fills on return.
    /// The remainder (if any) is inserted into its own side of the book.
    pub async fn submit(&self, book: &mut SymbolBook, order: &mut Order) -> Vec<Trade> {
        let mut trades = Vec::new();
        // A market order always crosses; its assigned price is only for
        // reservation and resting
        let limit = match order.kind {
            OrderKind::Market => None,
            _ => order.price,
        };
        let candidates = book.crossing_candidates(order.side, limit);

        for candidate_id in candidates {
            if order.remaining().is_zero() {
                break;
            }
            let Some(snapshot) = Self::snapshot_candidate(book, &candidate_id) else {
                continue;
            };

            match self.try_execute(book, order, &snapshot).await {
                Some(trade) => trades.push(trade),
                None => continue,
            }
        }

        if order.has_fills() {
            self.events.publish(CoreEvent::OrderStatusChanged {
                order_id: order.id,
                symbol: order.symbol.clone(),
                status: order.status,
            });
        }

        if !order.remaining().is_zero() {
            if let Err(err) = book.insert(order.clone()) {
                error!(order_id = %order.id, %err, "failed to rest order remainder");
            }
        }

        trades
    }

    /// Fill a resting order directly against a synthetic counter-order.
    ///
    /// Caller must hold the symbol lock. The counter-order belongs to the
    /// liquidity account, is priced at the target's own price, and never
    /// settles against the ledger; only the target's leg does.
    pub async fn execute_synthetic_fill(
        &self,
        book: &mut SymbolBook,
        target_id: &OrderId,
        quantity: Quantity,
    ) -> Option<Trade> {
        let target = book.order(target_id)?;
        let quantity = quantity.min(target.remaining());
        if quantity.is_zero() {
            return None;
        }
        let price = target.price?;

        let mut counter = Order::new(
            target.tenant_id,
            AccountId::liquidity(),
            target.symbol.clone(),
            target.side.opposite(),
            OrderKind::Limit,
            Some(price),
            None,
            quantity,
        );
        counter.synthetic = true;

        let snapshot = Candidate {
            order_id: target.id,
            account_id: target.account_id,
            synthetic: target.synthetic,
            remaining: target.remaining(),
            price,
        };

        let trade = self.orient_and_settle(&counter, &snapshot, quantity, price, true).await?;

        if counter.apply_fill(quantity, price).is_err() {
            error!(order_id = %counter.id, "synthetic counter-order fill arithmetic failed");
        }
        self.apply_to_resting(book, target_id, quantity, price);
        self.trades.record(trade.clone());
        self.events.publish(CoreEvent::TradeCommitted {
            trade: trade.clone(),
        });
        info!(
            trade_id = %trade.id,
            order_id = %target_id,
            %quantity,
            %price,
            "synthetic liquidity trade committed"
        );
        Some(trade)
    }

    /// Copy the fields needed for settlement out of the book so no borrow
    /// is held across the await
    fn snapshot_candidate(book: &SymbolBook, candidate_id: &OrderId) -> Option<Candidate> {
        let candidate = book.order(candidate_id)?;
        if candidate.remaining().is_zero() {
            return None;
        }
        Some(Candidate {
            order_id: candidate.id,
            account_id: candidate.account_id,
            synthetic: candidate.synthetic,
            remaining: candidate.remaining(),
            price: candidate.price?,
        })
    }

    /// Settle and apply one candidate trade; None means the candidate was
    /// skipped and the walk should continue
    async fn try_execute(
        &self,
        book: &mut SymbolBook,
        order: &mut Order,
        candidate: &Candidate,
    ) -> Option<Trade> {
        let quantity = order.remaining().min(candidate.remaining);
        let price = candidate.price;

        let trade = self
            .orient_and_settle(order, candidate, quantity, price, false)
            .await?;

        if let Err(err) = order.apply_fill(quantity, price) {
            // Settled but unappliable: arithmetic bug, not a ledger state
            error!(order_id = %order.id, %err, "fill could not be applied after settlement");
            return None;
        }
        self.apply_to_resting(book, &candidate.order_id, quantity, price);

        self.trades.record(trade.clone());
        self.events.publish(CoreEvent::TradeCommitted {
            trade: trade.clone(),
        });
        info!(
            trade_id = %trade.id,
            taker = %order.id,
            maker = %candidate.order_id,
            %quantity,
            %price,
            "trade committed"
        );
        Some(trade)
    }

    /// Build the trade in buy/sell orientation and run the settlement saga
    async fn orient_and_settle(
        &self,
        incoming: &Order,
        candidate: &Candidate,
        quantity: Quantity,
        price: Price,
        synthetic_counterparty: bool,
    ) -> Option<Trade> {
        let incoming_leg = LegView {
            order_id: incoming.id,
            account_id: incoming.account_id,
            synthetic: incoming.synthetic,
            remaining_after: incoming.remaining().saturating_sub(quantity),
        };
        let candidate_leg = LegView {
            order_id: candidate.order_id,
            account_id: candidate.account_id,
            synthetic: candidate.synthetic,
            remaining_after: candidate.remaining.saturating_sub(quantity),
        };
        let (buy_leg, sell_leg) = match incoming.side {
            Side::Buy => (incoming_leg, candidate_leg),
            Side::Sell => (candidate_leg, incoming_leg),
        };

        let trade = Trade::new(
            buy_leg.order_id,
            sell_leg.order_id,
            incoming.symbol.clone(),
            price,
            quantity,
            buy_leg.account_id,
            sell_leg.account_id,
            incoming.tenant_id,
            synthetic_counterparty || incoming.synthetic || candidate.synthetic,
        );

        match settle_trade(
            self.ledger.as_ref(),
            &self.compensation,
            &trade,
            &buy_leg,
            &sell_leg,
        )
        .await
        {
            SagaResult::Committed => Some(trade),
            SagaResult::Aborted {
                failed_leg,
                outcome,
                final_state,
            } => {
                warn!(
                    trade_id = %trade.id,
                    ?failed_leg,
                    ?outcome,
                    ?final_state,
                    "candidate trade discarded, continuing matching pass"
                );
                None
            }
        }
    }

    /// Apply a committed fill to a resting order and prune it when filled
    fn apply_to_resting(
        &self,
        book: &mut SymbolBook,
        order_id: &OrderId,
        quantity: Quantity,
        price: Price,
    ) {
        let (status, symbol, filled) = match book.order_mut(order_id) {
            Some(resting) => {
                if let Err(err) = resting.apply_fill(quantity, price) {
                    match err {
                        OrderError::FillExceedsRemaining { .. } => {
                            error!(%order_id, %err, "resting fill arithmetic failed")
                        }
                        other => error!(%order_id, err = %other, "resting fill failed"),
                    }
                    return;
                }
                (resting.status, resting.symbol.clone(), resting.is_filled())
            }
            None => {
                error!(%order_id, "resting order vanished mid-pass");
                return;
            }
        };

        self.events.publish(CoreEvent::OrderStatusChanged {
            order_id: *order_id,
            symbol,
            status,
        });
        if filled {
            book.remove(order_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::testing::StubLedger;
    use crate::settlement::SettlementOutcome;
    use std::sync::atomic::Ordering;
    use types::ids::TenantId;
    use types::order::OrderStatus;

    fn engine_with(ledger: Arc<StubLedger>) -> MatchingEngine {
        let events = EventBus::default();
        let compensation = Arc::new(CompensationQueue::new(events.clone()));
        MatchingEngine::new(ledger, compensation, events)
    }

    fn order(side: Side, price: &str, quantity: u64) -> Order {
        Order::new(
            TenantId::new(),
            AccountId::new(),
            Symbol::new("AKBNK"),
            side,
            OrderKind::Limit,
            Some(price.parse().unwrap()),
            None,
            Quantity::new(quantity),
        )
    }

    async fn rest(book: &mut SymbolBook, engine: &MatchingEngine, mut order: Order) -> Order {
        order.seq = book.assign_seq();
        engine.submit(book, &mut order).await;
        order
    }

    #[tokio::test]
    async fn test_empty_book_rests_order() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger);
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        let mut buy = order(Side::Buy, "50.00", 100);
        buy.seq = book.assign_seq();
        let trades = engine.submit(&mut book, &mut buy).await;

        assert!(trades.is_empty());
        assert_eq!(buy.remaining(), Quantity::new(100));
        assert!(book.contains(&buy.id));
        assert_eq!(book.best_bid(), Some("50.00".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_exact_cross_fills_both() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger);
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        let sell = rest(&mut book, &engine, order(Side::Sell, "50.00", 100)).await;

        let mut buy = order(Side::Buy, "50.00", 100);
        buy.seq = book.assign_seq();
        let trades = engine.submit(&mut book, &mut buy).await;

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, Quantity::new(100));
        assert_eq!(trades[0].price, "50.00".parse().unwrap());
        assert_eq!(trades[0].buy_order_id, buy.id);
        assert_eq!(trades[0].sell_order_id, sell.id);

        assert_eq!(buy.status, OrderStatus::Filled);
        assert!(!book.contains(&sell.id));
        assert!(!book.contains(&buy.id));
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
    }

    #[tokio::test]
    async fn test_partial_fill_rests_remainder() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger);
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        let sell = rest(&mut book, &engine, order(Side::Sell, "50.00", 60)).await;

        let mut buy = order(Side::Buy, "50.00", 100);
        buy.seq = book.assign_seq();
        let trades = engine.submit(&mut book, &mut buy).await;

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].quantity, Quantity::new(60));
        assert_eq!(buy.status, OrderStatus::PartiallyFilled);
        assert_eq!(buy.remaining(), Quantity::new(40));

        // Sell gone, buy remainder resting
        assert!(!book.contains(&sell.id));
        assert!(book.contains(&buy.id));
        assert_eq!(book.best_bid(), Some("50.00".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_maker_price_wins() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger);
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        rest(&mut book, &engine, order(Side::Sell, "49.50", 100)).await;

        // Taker is willing to pay 50.00 but executes at the maker's 49.50
        let mut buy = order(Side::Buy, "50.00", 100);
        buy.seq = book.assign_seq();
        let trades = engine.submit(&mut book, &mut buy).await;

        assert_eq!(trades[0].price, "49.50".parse().unwrap());
        assert_eq!(buy.avg_fill_price, Some("49.50".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_price_time_priority_among_equal_prices() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger);
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        let first = rest(&mut book, &engine, order(Side::Sell, "50.00", 100)).await;
        let second = rest(&mut book, &engine, order(Side::Sell, "50.00", 100)).await;

        let mut buy = order(Side::Buy, "50.00", 30);
        buy.seq = book.assign_seq();
        let trades = engine.submit(&mut book, &mut buy).await;

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].sell_order_id, first.id);
        assert_eq!(
            book.order(&first.id).unwrap().remaining(),
            Quantity::new(70)
        );
        assert_eq!(
            book.order(&second.id).unwrap().remaining(),
            Quantity::new(100)
        );
    }

    #[tokio::test]
    async fn test_walk_spans_price_levels() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger);
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        rest(&mut book, &engine, order(Side::Sell, "49.00", 40)).await;
        rest(&mut book, &engine, order(Side::Sell, "50.00", 40)).await;
        rest(&mut book, &engine, order(Side::Sell, "51.00", 40)).await;

        let mut buy = order(Side::Buy, "50.00", 100);
        buy.seq = book.assign_seq();
        let trades = engine.submit(&mut book, &mut buy).await;

        // 49 then 50 cross; 51 does not
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].price, "49.00".parse().unwrap());
        assert_eq!(trades[1].price, "50.00".parse().unwrap());
        assert_eq!(buy.remaining(), Quantity::new(20));
        assert_eq!(book.best_ask(), Some("51.00".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_failed_settlement_skips_candidate_and_continues() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger.clone());
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        let poisoned = rest(&mut book, &engine, order(Side::Sell, "50.00", 50)).await;
        let healthy = rest(&mut book, &engine, order(Side::Sell, "50.00", 50)).await;
        ledger.fail_confirms_for(
            poisoned.id,
            SettlementOutcome::TransportFailed("ledger down".to_string()),
        );

        let mut buy = order(Side::Buy, "50.00", 50);
        buy.seq = book.assign_seq();
        let trades = engine.submit(&mut book, &mut buy).await;

        // Poisoned candidate skipped, healthy one filled
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].sell_order_id, healthy.id);
        assert_eq!(buy.status, OrderStatus::Filled);

        // Poisoned candidate untouched by the failed attempt
        assert_eq!(
            book.order(&poisoned.id).unwrap().remaining(),
            Quantity::new(50)
        );

        // The buy leg settled before the sell leg failed, so it was
        // compensated exactly once
        assert_eq!(ledger.compensate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_synthetic_fill_settles_only_real_leg() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger.clone());
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        let resting = rest(&mut book, &engine, order(Side::Buy, "50.00", 100)).await;
        let confirms_before = ledger.confirm_calls.load(Ordering::SeqCst);

        let trade = engine
            .execute_synthetic_fill(&mut book, &resting.id, Quantity::new(40))
            .await
            .unwrap();

        assert!(trade.synthetic_counterparty);
        assert_eq!(trade.quantity, Quantity::new(40));
        assert_eq!(trade.buy_order_id, resting.id);
        assert!(trade.sell_account_id.is_liquidity());
        assert_eq!(
            book.order(&resting.id).unwrap().remaining(),
            Quantity::new(60)
        );
        // Exactly one leg (the real one) settled
        assert_eq!(ledger.confirm_calls.load(Ordering::SeqCst), confirms_before + 1);
    }

    #[tokio::test]
    async fn test_synthetic_fill_of_missing_order_is_noop() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger);
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        let result = engine
            .execute_synthetic_fill(&mut book, &OrderId::new(), Quantity::new(10))
            .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_trade_log_records_committed_only() {
        let ledger = Arc::new(StubLedger::accept_all());
        let engine = engine_with(ledger.clone());
        let mut book = SymbolBook::new(Symbol::new("AKBNK"));

        let sell = rest(&mut book, &engine, order(Side::Sell, "50.00", 100)).await;
        ledger.fail_confirms_for(
            sell.id,
            SettlementOutcome::TransportFailed("down".to_string()),
        );

        let mut buy = order(Side::Buy, "50.00", 100);
        buy.seq = book.assign_seq();
        let trades = engine.submit(&mut book, &mut buy).await;

        assert!(trades.is_empty());
        assert!(engine.trade_log().all().is_empty());
    }
}
