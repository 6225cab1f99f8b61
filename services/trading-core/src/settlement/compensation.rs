//! Compensation queue
//!
//! When a settlement leg succeeded and its sibling failed, the succeeded
//! leg must be undone. This queue runs those undos, classifies failures as
//! retryable or critical, and exposes counters an operator can inspect.
//! Critical failures are never retried automatically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{error, info, warn};

use super::client::{CompensationRequest, LedgerClient};
use super::CompensationOutcome;
use crate::events::{CoreEvent, EventBus};

/// Counter snapshot for operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompensationStats {
    pub pending: u64,
    pub failed: u64,
    pub critical: u64,
    pub retryable: u64,
}

/// Operator-inspectable compensation processor
pub struct CompensationQueue {
    pending: AtomicU64,
    failed: AtomicU64,
    critical: AtomicU64,
    retryable: AtomicU64,
    retryable_requests: Mutex<Vec<CompensationRequest>>,
    critical_requests: Mutex<Vec<CompensationRequest>>,
    events: EventBus,
}

impl CompensationQueue {
    pub fn new(events: EventBus) -> Self {
        Self {
            pending: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            critical: AtomicU64::new(0),
            retryable: AtomicU64::new(0),
            retryable_requests: Mutex::new(Vec::new()),
            critical_requests: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Run one compensation against the ledger, recording the outcome
    pub async fn run(
        &self,
        ledger: &dyn LedgerClient,
        request: CompensationRequest,
    ) -> CompensationOutcome {
        self.pending.fetch_add(1, Ordering::SeqCst);
        info!(
            order_id = %request.order_id,
            kind = ?request.kind,
            reason = %request.reason,
            "running compensation"
        );

        let outcome = ledger.compensate(&request).await;
        self.pending.fetch_sub(1, Ordering::SeqCst);

        match &outcome {
            CompensationOutcome::Completed => {
                info!(order_id = %request.order_id, "compensation completed");
            }
            CompensationOutcome::Failed { critical, reason } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                self.events.publish(CoreEvent::CompensationAlert {
                    order_id: request.order_id,
                    trade_id: request.trade_id,
                    critical: *critical,
                    reason: reason.clone(),
                });
                if *critical {
                    error!(
                        order_id = %request.order_id,
                        trade_id = ?request.trade_id,
                        reason = %reason,
                        "CRITICAL compensation failure, escalated to operator queue"
                    );
                    self.critical.fetch_add(1, Ordering::SeqCst);
                    self.critical_requests
                        .lock()
                        .expect("critical queue poisoned")
                        .push(request);
                } else {
                    warn!(
                        order_id = %request.order_id,
                        reason = %reason,
                        "compensation failed, queued for retry"
                    );
                    self.retryable.fetch_add(1, Ordering::SeqCst);
                    self.retryable_requests
                        .lock()
                        .expect("retry queue poisoned")
                        .push(request);
                }
            }
        }
        outcome
    }

    /// Re-drive the retryable queue; critical entries are untouched.
    /// Skipped entirely unless the ledger reports healthy.
    pub async fn retry_failed(&self, ledger: &dyn LedgerClient) -> usize {
        if !ledger.health_check().await {
            warn!("skipping compensation retry, ledger unhealthy");
            return 0;
        }

        let batch: Vec<CompensationRequest> = {
            let mut queue = self
                .retryable_requests
                .lock()
                .expect("retry queue poisoned");
            std::mem::take(&mut *queue)
        };
        if batch.is_empty() {
            return 0;
        }
        self.retryable
            .fetch_sub(batch.len() as u64, Ordering::SeqCst);

        let mut completed = 0;
        for request in batch {
            if matches!(
                self.run(ledger, request).await,
                CompensationOutcome::Completed
            ) {
                completed += 1;
            }
        }
        info!(completed, "compensation retry pass finished");
        completed
    }

    /// Critical failures awaiting manual intervention
    pub fn critical_requests(&self) -> Vec<CompensationRequest> {
        self.critical_requests
            .lock()
            .expect("critical queue poisoned")
            .clone()
    }

    pub fn stats(&self) -> CompensationStats {
        CompensationStats {
            pending: self.pending.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            critical: self.critical.load(Ordering::SeqCst),
            retryable: self.retryable.load(Ordering::SeqCst),
        }
    }
}
