//! Stop-loss watchers
//!
//! A watcher is registered when a stop-loss sell order is admitted. On
//! every reference-price update it fires once the price falls to the
//! trigger, exactly once, and is then removed. The trigger action itself
//! (position re-validation and synthesis of the replacement limit sell)
//! lives in the core front door, which owns the ledger and the admission
//! pipeline.
//!
//! Watchers survive restarts through the `WatcherStore` seam and are
//! reloaded into the in-memory set used for per-tick evaluation.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use types::errors::{OrderError, ValidationError};
use types::ids::{AccountId, OrderId, Symbol, TenantId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderKind};

/// A standing downside-trigger rule for one stop-loss order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopWatcher {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub account_id: AccountId,
    pub tenant_id: TenantId,
    pub trigger_price: Price,
    pub quantity: Quantity,
    pub triggered: bool,
    pub check_count: u64,
    pub created_at: DateTime<Utc>,
}

impl StopWatcher {
    fn from_order(order: &Order, trigger_price: Price) -> Self {
        Self {
            order_id: order.id,
            symbol: order.symbol.clone(),
            account_id: order.account_id,
            tenant_id: order.tenant_id,
            trigger_price,
            quantity: order.quantity,
            triggered: false,
            check_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Durable storage seam for watchers
///
/// The persistence schema is out of scope; this trait is the boundary.
pub trait WatcherStore: Send + Sync {
    /// Active, untriggered watchers to reload at process start
    fn load_active(&self) -> Vec<StopWatcher>;
    fn insert(&self, watcher: &StopWatcher);
    fn mark_triggered(&self, order_id: &OrderId);
    fn deactivate(&self, order_id: &OrderId);
}

/// In-process store; keeps the same lifecycle as a durable one
#[derive(Debug, Default)]
pub struct InMemoryWatcherStore {
    rows: DashMap<OrderId, StoredWatcher>,
}

#[derive(Debug, Clone)]
struct StoredWatcher {
    watcher: StopWatcher,
    active: bool,
}

impl InMemoryWatcherStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatcherStore for InMemoryWatcherStore {
    fn load_active(&self) -> Vec<StopWatcher> {
        let mut active: Vec<StopWatcher> = self
            .rows
            .iter()
            .filter(|entry| entry.value().active && !entry.value().watcher.triggered)
            .map(|entry| entry.value().watcher.clone())
            .collect();
        active.sort_by_key(|w| w.created_at);
        active
    }

    fn insert(&self, watcher: &StopWatcher) {
        self.rows.insert(
            watcher.order_id,
            StoredWatcher {
                watcher: watcher.clone(),
                active: true,
            },
        );
    }

    fn mark_triggered(&self, order_id: &OrderId) {
        if let Some(mut entry) = self.rows.get_mut(order_id) {
            entry.value_mut().watcher.triggered = true;
        }
    }

    fn deactivate(&self, order_id: &OrderId) {
        if let Some(mut entry) = self.rows.get_mut(order_id) {
            entry.value_mut().active = false;
        }
    }
}

/// In-memory set of untriggered watchers, evaluated per price tick
pub struct StopLossWatcherSet {
    store: Arc<dyn WatcherStore>,
    watchers: DashMap<Symbol, Vec<StopWatcher>>,
}

impl StopLossWatcherSet {
    /// Reload active watchers from the store
    pub fn load(store: Arc<dyn WatcherStore>) -> Self {
        let set = Self {
            store,
            watchers: DashMap::new(),
        };
        let reloaded = set.store.load_active();
        let count = reloaded.len();
        for watcher in reloaded {
            set.watchers
                .entry(watcher.symbol.clone())
                .or_default()
                .push(watcher);
        }
        if count > 0 {
            info!(count, "stop-loss watchers reloaded from store");
        }
        set
    }

    /// Register a watcher for an admitted stop-loss sell order
    pub fn watch(&self, order: &Order) -> Result<(), OrderError> {
        if order.kind != OrderKind::StopLossSell {
            return Err(ValidationError::StopMustSell.into());
        }
        let trigger_price = order
            .stop_price
            .ok_or(OrderError::Validation(ValidationError::MissingStopPrice))?;

        let watcher = StopWatcher::from_order(order, trigger_price);
        self.store.insert(&watcher);
        info!(
            order_id = %order.id,
            symbol = %order.symbol,
            %trigger_price,
            quantity = %order.quantity,
            "stop-loss watcher registered"
        );
        self.watchers
            .entry(order.symbol.clone())
            .or_default()
            .push(watcher);
        Ok(())
    }

    /// Remove a watcher (order cancelled); true if one was watching
    pub fn remove(&self, order_id: &OrderId, symbol: &Symbol) -> bool {
        let removed = self
            .watchers
            .get_mut(symbol)
            .map(|mut entry| {
                let queue = entry.value_mut();
                let before = queue.len();
                queue.retain(|w| &w.order_id != order_id);
                queue.len() != before
            })
            .unwrap_or(false);
        if removed {
            self.store.deactivate(order_id);
            info!(%order_id, "stop-loss watcher removed");
        }
        removed
    }

    pub fn is_watching(&self, order_id: &OrderId) -> bool {
        self.watchers
            .iter()
            .any(|entry| entry.value().iter().any(|w| &w.order_id == order_id))
    }

    /// Fire every untriggered watcher for the symbol whose trigger the
    /// price has reached (downside-only). Fired watchers are marked
    /// triggered, persisted as such, and removed from the set, so each
    /// fires exactly once. Survivors get their check counter bumped.
    pub fn take_triggered(&self, symbol: &Symbol, current_price: Price) -> Vec<StopWatcher> {
        let mut fired = Vec::new();
        if let Some(mut entry) = self.watchers.get_mut(symbol) {
            let queue = entry.value_mut();
            let mut index = 0;
            while index < queue.len() {
                let watcher = &mut queue[index];
                if !watcher.triggered && current_price <= watcher.trigger_price {
                    watcher.triggered = true;
                    self.store.mark_triggered(&watcher.order_id);
                    info!(
                        order_id = %watcher.order_id,
                        symbol = %symbol,
                        trigger = %watcher.trigger_price,
                        %current_price,
                        "stop-loss triggered"
                    );
                    fired.push(queue.remove(index));
                } else {
                    watcher.check_count += 1;
                    index += 1;
                }
            }
        }
        fired
    }

    pub fn count_for(&self, symbol: &Symbol) -> usize {
        self.watchers
            .get(symbol)
            .map(|entry| entry.value().len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::order::Side;

    fn stop_sell(symbol: &str, trigger: &str, quantity: u64) -> Order {
        Order::new(
            TenantId::new(),
            AccountId::new(),
            Symbol::new(symbol),
            Side::Sell,
            OrderKind::StopLossSell,
            Some(trigger.parse().unwrap()),
            Some(trigger.parse().unwrap()),
            Quantity::new(quantity),
        )
    }

    fn set() -> StopLossWatcherSet {
        StopLossWatcherSet::load(Arc::new(InMemoryWatcherStore::new()))
    }

    #[test]
    fn test_watch_requires_stop_order() {
        let set = set();
        let mut not_stop = stop_sell("AKBNK", "45.00", 100);
        not_stop.kind = OrderKind::Limit;
        assert!(set.watch(&not_stop).is_err());

        let mut missing_trigger = stop_sell("AKBNK", "45.00", 100);
        missing_trigger.stop_price = None;
        assert!(set.watch(&missing_trigger).is_err());
    }

    #[test]
    fn test_trigger_fires_once_at_or_below() {
        let set = set();
        let order = stop_sell("AKBNK", "45.00", 100);
        set.watch(&order).unwrap();

        // Price sequence 50 → 48 → 46: no trigger
        for price in ["50.00", "48.00", "46.00"] {
            assert!(set
                .take_triggered(&Symbol::new("AKBNK"), price.parse().unwrap())
                .is_empty());
        }
        assert_eq!(set.count_for(&Symbol::new("AKBNK")), 1);

        // 44 ≤ 45: fires
        let fired = set.take_triggered(&Symbol::new("AKBNK"), "44.00".parse().unwrap());
        assert_eq!(fired.len(), 1);
        assert!(fired[0].triggered);
        assert_eq!(fired[0].order_id, order.id);

        // Exactly once: a second crossing finds nothing
        assert!(set
            .take_triggered(&Symbol::new("AKBNK"), "43.00".parse().unwrap())
            .is_empty());
        assert_eq!(set.count_for(&Symbol::new("AKBNK")), 0);
    }

    #[test]
    fn test_trigger_at_exact_price() {
        let set = set();
        set.watch(&stop_sell("AKBNK", "45.00", 100)).unwrap();

        let fired = set.take_triggered(&Symbol::new("AKBNK"), "45.00".parse().unwrap());
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_check_counter_increments_on_miss() {
        let store = Arc::new(InMemoryWatcherStore::new());
        let set = StopLossWatcherSet::load(store);
        set.watch(&stop_sell("AKBNK", "45.00", 100)).unwrap();

        set.take_triggered(&Symbol::new("AKBNK"), "50.00".parse().unwrap());
        set.take_triggered(&Symbol::new("AKBNK"), "49.00".parse().unwrap());

        let entry = set.watchers.get(&Symbol::new("AKBNK")).unwrap();
        assert_eq!(entry.value()[0].check_count, 2);
    }

    #[test]
    fn test_symbols_are_independent() {
        let set = set();
        set.watch(&stop_sell("AKBNK", "45.00", 100)).unwrap();
        set.watch(&stop_sell("THYAO", "200.00", 50)).unwrap();

        let fired = set.take_triggered(&Symbol::new("AKBNK"), "44.00".parse().unwrap());
        assert_eq!(fired.len(), 1);
        assert_eq!(set.count_for(&Symbol::new("THYAO")), 1);
    }

    #[test]
    fn test_remove_deactivates() {
        let set = set();
        let order = stop_sell("AKBNK", "45.00", 100);
        set.watch(&order).unwrap();

        assert!(set.is_watching(&order.id));
        assert!(set.remove(&order.id, &order.symbol));
        assert!(!set.is_watching(&order.id));
        assert!(!set.remove(&order.id, &order.symbol));
    }

    #[test]
    fn test_reload_from_store() {
        let store = Arc::new(InMemoryWatcherStore::new());
        {
            let set = StopLossWatcherSet::load(store.clone());
            set.watch(&stop_sell("AKBNK", "45.00", 100)).unwrap();
            set.watch(&stop_sell("THYAO", "200.00", 50)).unwrap();
        }

        // A fresh set reloads the untriggered watchers
        let reloaded = StopLossWatcherSet::load(store.clone());
        assert_eq!(reloaded.count_for(&Symbol::new("AKBNK")), 1);
        assert_eq!(reloaded.count_for(&Symbol::new("THYAO")), 1);

        // Triggered watchers stay gone across restarts
        reloaded.take_triggered(&Symbol::new("AKBNK"), "44.00".parse().unwrap());
        let after_trigger = StopLossWatcherSet::load(store);
        assert_eq!(after_trigger.count_for(&Symbol::new("AKBNK")), 0);
        assert_eq!(after_trigger.count_for(&Symbol::new("THYAO")), 1);
    }
}
