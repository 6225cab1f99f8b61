//! Synthetic liquidity
//!
//! Keeps the book from looking permanently stuck for orders no real
//! counterparty picked up. Each eligible order receives at most two
//! executed attempts: the first a short delay after admission, the second
//! after a longer delay. Every attempt draws a strategy (full fill,
//! partial fill or no fill) and fills the target directly with a
//! counter-order from the liquidity account. Synthetic legs never settle
//! against the external ledger.

pub mod scheduler;

pub use scheduler::AttemptScheduler;

use dashmap::DashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use types::ids::{OrderId, Symbol};
use types::numeric::Quantity;
use types::order::Order;

use crate::config::LiquidityConfig;
use crate::matching::MatchingEngine;
use crate::registry::OrderBookRegistry;

/// Outcome distribution of one executed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillStrategy {
    FullFill,
    PartialFill,
    NoFill,
}

/// Scheduled, probabilistic synthetic counter-order generator
pub struct LiquiditySimulator {
    config: LiquidityConfig,
    registry: Arc<OrderBookRegistry>,
    engine: Arc<MatchingEngine>,
    scheduler: Arc<AttemptScheduler>,
    /// Executed attempts per order; once at the cap the order is
    /// permanently ineligible
    attempts: DashMap<OrderId, u8>,
    /// Symbol routing for scheduled order ids
    symbols: DashMap<OrderId, Symbol>,
    rng: Mutex<ChaCha8Rng>,
}

impl LiquiditySimulator {
    pub fn new(
        config: LiquidityConfig,
        registry: Arc<OrderBookRegistry>,
        engine: Arc<MatchingEngine>,
    ) -> Arc<Self> {
        let rng = match config.rng_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Arc::new(Self {
            config,
            registry,
            engine,
            scheduler: AttemptScheduler::new(),
            attempts: DashMap::new(),
            symbols: DashMap::new(),
            rng: Mutex::new(rng),
        })
    }

    /// Spawn the dispatch loop
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let simulator = Arc::clone(self);
        self.scheduler.spawn(move |order_id| {
            let simulator = Arc::clone(&simulator);
            async move { simulator.execute_attempt(order_id).await }
        })
    }

    pub fn stop(&self) {
        self.scheduler.shutdown();
    }

    /// Executed attempts so far for an order
    pub fn attempt_count(&self, order_id: &OrderId) -> u8 {
        self.attempts.get(order_id).map(|e| *e.value()).unwrap_or(0)
    }

    pub fn eligible(&self, order_id: &OrderId) -> bool {
        self.attempt_count(order_id) < self.config.max_attempts
    }

    /// Schedule the next attempt for an order left resting after matching.
    /// Synthetic orders never receive synthetic liquidity.
    pub fn schedule(&self, order: &Order) {
        if order.synthetic || !self.eligible(&order.id) {
            return;
        }
        let delay = if self.attempt_count(&order.id) == 0 {
            self.config.first_attempt_delay()
        } else {
            self.config.retry_delay()
        };
        self.symbols.insert(order.id, order.symbol.clone());
        self.scheduler.schedule(order.id, delay);
        debug!(order_id = %order.id, ?delay, "liquidity attempt scheduled");
    }

    /// Retract any pending attempt; called when the order fills or is
    /// cancelled before the attempt fires
    pub fn retract(&self, order_id: &OrderId) {
        self.scheduler.cancel(order_id);
        self.symbols.remove(order_id);
    }

    /// One executed attempt. Re-reads the order under the symbol lock: a
    /// fired attempt for a gone, terminal or fully filled order does
    /// nothing and consumes no attempt.
    pub(crate) async fn execute_attempt(&self, order_id: OrderId) {
        let Some(symbol) = self.symbols.get(&order_id).map(|e| e.value().clone()) else {
            return;
        };
        let Some(book_arc) = self.registry.get(&symbol) else {
            return;
        };
        let mut book = book_arc.lock().await;

        let remaining = match book.order(&order_id) {
            Some(order) if !order.remaining().is_zero() && !order.status.is_terminal() => {
                order.remaining()
            }
            _ => {
                self.symbols.remove(&order_id);
                return;
            }
        };
        if !self.eligible(&order_id) {
            return;
        }

        // The counter is consumed under the same lock as the fill it
        // guards, so concurrent re-entry cannot double-count
        let count = {
            let mut entry = self.attempts.entry(order_id).or_insert(0);
            *entry += 1;
            *entry
        };
        let strategy = self.draw_strategy();
        info!(
            %order_id,
            attempt = count,
            max = self.config.max_attempts,
            ?strategy,
            %remaining,
            "executing liquidity attempt"
        );

        match strategy {
            FillStrategy::FullFill => {
                self.engine
                    .execute_synthetic_fill(&mut book, &order_id, remaining)
                    .await;
            }
            FillStrategy::PartialFill => {
                let quantity = self.partial_quantity(remaining);
                self.engine
                    .execute_synthetic_fill(&mut book, &order_id, quantity)
                    .await;
            }
            FillStrategy::NoFill => {
                debug!(%order_id, "no-fill draw, order stays resting");
            }
        }

        let still_open = book
            .order(&order_id)
            .map(|order| !order.remaining().is_zero())
            .unwrap_or(false);
        drop(book);

        if still_open && count < self.config.max_attempts {
            self.scheduler
                .schedule(order_id, self.config.retry_delay());
        } else {
            self.symbols.remove(&order_id);
        }
    }

    /// Independent uniform draw per attempt
    fn draw_strategy(&self) -> FillStrategy {
        let roll = self
            .rng
            .lock()
            .expect("liquidity rng poisoned")
            .gen_range(0..100u32);
        if roll < self.config.full_fill_weight {
            FillStrategy::FullFill
        } else if roll < self.config.full_fill_weight + self.config.partial_fill_weight {
            FillStrategy::PartialFill
        } else {
            FillStrategy::NoFill
        }
    }

    /// Uniform fraction of remaining, floored to whole shares, minimum one
    fn partial_quantity(&self, remaining: Quantity) -> Quantity {
        let ratio = self
            .rng
            .lock()
            .expect("liquidity rng poisoned")
            .gen_range(self.config.min_partial_ratio..self.config.max_partial_ratio);
        let shares = (remaining.as_u64() as f64 * ratio).floor() as u64;
        Quantity::new(shares.clamp(1, remaining.as_u64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::settlement::testing::StubLedger;
    use crate::settlement::CompensationQueue;
    use types::ids::{AccountId, TenantId};
    use types::numeric::Price;
    use types::order::{OrderKind, OrderStatus, Side};

    fn simulator_with(config: LiquidityConfig) -> (Arc<LiquiditySimulator>, Arc<OrderBookRegistry>) {
        let events = EventBus::default();
        let registry = Arc::new(OrderBookRegistry::new());
        let ledger = Arc::new(StubLedger::accept_all());
        let compensation = Arc::new(CompensationQueue::new(events.clone()));
        let engine = Arc::new(MatchingEngine::new(ledger, compensation, events));
        let simulator = LiquiditySimulator::new(config, registry.clone(), engine);
        (simulator, registry)
    }

    fn forced(full: u32, partial: u32, no_fill: u32) -> LiquidityConfig {
        LiquidityConfig {
            full_fill_weight: full,
            partial_fill_weight: partial,
            no_fill_weight: no_fill,
            rng_seed: Some(42),
            ..LiquidityConfig::default()
        }
    }

    async fn rest_order(registry: &OrderBookRegistry, quantity: u64) -> Order {
        let symbol = Symbol::new("AKBNK");
        let book_arc = registry.book(&symbol);
        let mut book = book_arc.lock().await;
        let mut order = Order::new(
            TenantId::new(),
            AccountId::new(),
            symbol,
            Side::Buy,
            OrderKind::Limit,
            Some(Price::from_u64(50)),
            None,
            Quantity::new(quantity),
        );
        order.seq = book.assign_seq();
        book.insert(order.clone()).unwrap();
        order
    }

    #[tokio::test]
    async fn test_full_fill_strategy_fills_remaining() {
        let (simulator, registry) = simulator_with(forced(100, 0, 0));
        let order = rest_order(&registry, 100).await;
        simulator.symbols.insert(order.id, order.symbol.clone());

        simulator.execute_attempt(order.id).await;

        let book_arc = registry.get(&order.symbol).unwrap();
        let book = book_arc.lock().await;
        // Fully filled orders leave the book
        assert!(!book.contains(&order.id));
        assert_eq!(simulator.attempt_count(&order.id), 1);
    }

    #[tokio::test]
    async fn test_partial_fill_within_band() {
        let (simulator, registry) = simulator_with(forced(0, 100, 0));
        let order = rest_order(&registry, 100).await;
        simulator.symbols.insert(order.id, order.symbol.clone());

        simulator.execute_attempt(order.id).await;

        let book_arc = registry.get(&order.symbol).unwrap();
        let book = book_arc.lock().await;
        let resting = book.order(&order.id).unwrap();
        let filled = resting.filled.as_u64();
        // 30–80 % of 100, floored
        assert!((30..=80).contains(&filled), "filled {filled} out of band");
        assert_eq!(resting.status, OrderStatus::PartiallyFilled);
    }

    #[tokio::test]
    async fn test_no_fill_leaves_order_and_counts_attempt() {
        let (simulator, registry) = simulator_with(forced(0, 0, 100));
        let order = rest_order(&registry, 100).await;
        simulator.symbols.insert(order.id, order.symbol.clone());

        simulator.execute_attempt(order.id).await;

        let book_arc = registry.get(&order.symbol).unwrap();
        let book = book_arc.lock().await;
        assert_eq!(book.order(&order.id).unwrap().remaining(), Quantity::new(100));
        assert_eq!(simulator.attempt_count(&order.id), 1);
        // Second attempt rescheduled
        assert_eq!(simulator.scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_attempt_cap_is_two() {
        let (simulator, registry) = simulator_with(forced(0, 0, 100));
        let order = rest_order(&registry, 100).await;

        for _ in 0..5 {
            simulator.symbols.insert(order.id, order.symbol.clone());
            simulator.execute_attempt(order.id).await;
        }
        assert_eq!(simulator.attempt_count(&order.id), 2);
        assert!(!simulator.eligible(&order.id));
    }

    #[tokio::test]
    async fn test_fired_attempt_for_missing_order_consumes_nothing() {
        let (simulator, registry) = simulator_with(forced(100, 0, 0));
        let symbol = Symbol::new("AKBNK");
        registry.book(&symbol);
        let ghost = OrderId::new();
        simulator.symbols.insert(ghost, symbol);

        simulator.execute_attempt(ghost).await;
        assert_eq!(simulator.attempt_count(&ghost), 0);
    }

    #[tokio::test]
    async fn test_synthetic_orders_not_scheduled() {
        let (simulator, registry) = simulator_with(forced(100, 0, 0));
        let mut order = rest_order(&registry, 100).await;
        order.synthetic = true;

        simulator.schedule(&order);
        assert_eq!(simulator.scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_attempt_fires_end_to_end() {
        let (simulator, registry) = simulator_with(forced(100, 0, 0));
        simulator.start();
        let order = rest_order(&registry, 100).await;

        simulator.schedule(&order);
        tokio::time::sleep(std::time::Duration::from_secs(4)).await;

        let book_arc = registry.get(&order.symbol).unwrap();
        let book = book_arc.lock().await;
        assert!(!book.contains(&order.id), "full-fill attempt should have fired");
    }

    #[tokio::test]
    async fn test_retract_cancels_pending_attempt() {
        let (simulator, registry) = simulator_with(forced(100, 0, 0));
        let order = rest_order(&registry, 100).await;

        simulator.schedule(&order);
        assert_eq!(simulator.scheduler.pending(), 1);

        simulator.retract(&order.id);
        assert_eq!(simulator.scheduler.pending(), 0);
    }
}
