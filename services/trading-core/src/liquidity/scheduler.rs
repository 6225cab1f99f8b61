//! Delayed-attempt scheduler
//!
//! A deadline priority queue keyed by order id, driving the liquidity
//! simulator's delayed attempts. Cancellation is generation-based: each
//! schedule supersedes the previous one for that order, and a cancel
//! retracts a not-yet-fired attempt so a fill or user cancel can pull the
//! plug on pending synthetic liquidity.

use dashmap::DashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;
use types::ids::OrderId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Scheduled {
    deadline: Instant,
    generation: u64,
    order_id: OrderId,
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.generation.cmp(&other.generation))
    }
}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Deadline queue with per-order cancellation
pub struct AttemptScheduler {
    heap: Mutex<BinaryHeap<Reverse<Scheduled>>>,
    /// Latest live generation per order; heap entries with a stale
    /// generation are dead on arrival
    generations: DashMap<OrderId, u64>,
    next_generation: AtomicU64,
    notify: Notify,
    shutdown: AtomicBool,
}

impl AttemptScheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            heap: Mutex::new(BinaryHeap::new()),
            generations: DashMap::new(),
            next_generation: AtomicU64::new(1),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Schedule (or reschedule) the order's next attempt after `delay`
    pub fn schedule(&self, order_id: OrderId, delay: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        self.generations.insert(order_id, generation);
        self.heap
            .lock()
            .expect("scheduler heap poisoned")
            .push(Reverse(Scheduled {
                deadline: Instant::now() + delay,
                generation,
                order_id,
            }));
        debug!(%order_id, ?delay, "attempt scheduled");
        self.notify.notify_one();
    }

    /// Retract any not-yet-fired attempt for the order
    pub fn cancel(&self, order_id: &OrderId) {
        if self.generations.remove(order_id).is_some() {
            debug!(%order_id, "scheduled attempt cancelled");
        }
    }

    /// Orders with a live scheduled attempt
    pub fn pending(&self) -> usize {
        self.generations.len()
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Spawn the dispatch loop; fired attempts run `handler` serially
    pub fn spawn<F, Fut>(self: &Arc<Self>, handler: F) -> JoinHandle<()>
    where
        F: Fn(OrderId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if scheduler.shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let next_deadline = {
                    let heap = scheduler.heap.lock().expect("scheduler heap poisoned");
                    heap.peek().map(|Reverse(entry)| entry.deadline)
                };
                match next_deadline {
                    None => scheduler.notify.notified().await,
                    Some(deadline) if deadline <= Instant::now() => {
                        let due = scheduler
                            .heap
                            .lock()
                            .expect("scheduler heap poisoned")
                            .pop();
                        if let Some(Reverse(entry)) = due {
                            let live = scheduler
                                .generations
                                .remove_if(&entry.order_id, |_, generation| {
                                    *generation == entry.generation
                                })
                                .is_some();
                            if live {
                                handler(entry.order_id).await;
                            }
                        }
                    }
                    Some(deadline) => {
                        tokio::select! {
                            _ = sleep_until(deadline) => {}
                            _ = scheduler.notify.notified() => {}
                        }
                    }
                }
            }
        })
    }
}
