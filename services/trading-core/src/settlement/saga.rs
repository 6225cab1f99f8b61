//! Trade settlement saga
//!
//! A trade touches two ledger accounts through two independent network
//! calls with no shared transaction. The saga confirms the buy leg, then
//! the sell leg; if the second fails after the first succeeded, it issues a
//! compensating rollback for the first. Synthetic-account legs are skipped
//! entirely. The trade is committed only when both legs are settled.

use tracing::{debug, warn};
use types::numeric::Quantity;
use types::order::Side;
use types::trade::Trade;

use super::client::{
    CompensationKind, CompensationRequest, ConfirmFullRequest, ConfirmPartialRequest, LedgerClient,
};
use super::compensation::CompensationQueue;
use super::{CompensationOutcome, SettlementOutcome};
use types::ids::{AccountId, OrderId};

/// Per-leg inputs to the saga
#[derive(Debug, Clone, Copy)]
pub struct LegView {
    pub order_id: OrderId,
    pub account_id: AccountId,
    /// Synthetic legs belong to the liquidity account and never settle
    pub synthetic: bool,
    /// The order's remaining quantity after this trade would apply;
    /// selects confirm-partial vs confirm-full
    pub remaining_after: Quantity,
}

/// Saga progression, keyed by trade id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    PendingBuyLeg,
    PendingSellLeg,
    Committed,
    Compensating,
    Compensated,
    CriticalFailure,
}

/// Final verdict for the candidate trade
#[derive(Debug, Clone, PartialEq)]
pub enum SagaResult {
    /// Both legs settled; the trade is real
    Committed,
    /// A leg failed; the candidate must be discarded
    Aborted {
        failed_leg: Side,
        outcome: SettlementOutcome,
        final_state: SagaState,
    },
}

impl SagaResult {
    pub fn is_committed(&self) -> bool {
        matches!(self, SagaResult::Committed)
    }
}

/// Settle one candidate trade's two legs
///
/// Idempotency: confirm and compensate requests carry the trade and order
/// ids, so a retried call cannot double-apply on the ledger.
pub async fn settle_trade(
    ledger: &dyn LedgerClient,
    compensation: &CompensationQueue,
    trade: &Trade,
    buy: &LegView,
    sell: &LegView,
) -> SagaResult {
    let mut state = SagaState::PendingBuyLeg;
    debug!(trade_id = %trade.id, state = ?state, "settling trade");

    let buy_outcome = confirm_leg(ledger, trade, buy).await;
    if !buy_outcome.is_accepted() {
        // Nothing settled yet; no compensation required
        warn!(
            trade_id = %trade.id,
            order_id = %buy.order_id,
            outcome = ?buy_outcome,
            "buy leg failed, discarding candidate trade"
        );
        return SagaResult::Aborted {
            failed_leg: Side::Buy,
            outcome: buy_outcome,
            final_state: state,
        };
    }

    state = SagaState::PendingSellLeg;
    let sell_outcome = confirm_leg(ledger, trade, sell).await;
    if !sell_outcome.is_accepted() {
        warn!(
            trade_id = %trade.id,
            order_id = %sell.order_id,
            outcome = ?sell_outcome,
            "sell leg failed after buy leg settled"
        );
        // Undo the buy leg unless it was a synthetic no-op
        if !buy.synthetic {
            state = SagaState::Compensating;
            let request = CompensationRequest {
                kind: CompensationKind::TradeRollback,
                order_id: buy.order_id,
                trade_id: Some(trade.id),
                amount: Some(trade.value()),
                quantity: Some(trade.quantity),
                reason: "sell leg confirmation failed".to_string(),
            };
            state = match compensation.run(ledger, request).await {
                CompensationOutcome::Completed => SagaState::Compensated,
                CompensationOutcome::Failed { .. } => SagaState::CriticalFailure,
            };
        }
        return SagaResult::Aborted {
            failed_leg: Side::Sell,
            outcome: sell_outcome,
            final_state: state,
        };
    }

    debug!(trade_id = %trade.id, "both legs settled, trade committed");
    SagaResult::Committed
}

/// Confirm one leg, choosing partial vs full by post-trade remaining
async fn confirm_leg(
    ledger: &dyn LedgerClient,
    trade: &Trade,
    leg: &LegView,
) -> SettlementOutcome {
    if leg.synthetic {
        return SettlementOutcome::Accepted;
    }
    if leg.remaining_after.is_zero() {
        ledger
            .confirm_full(&ConfirmFullRequest {
                trade_id: trade.id,
                order_id: leg.order_id,
                quantity: trade.quantity,
                price: trade.price,
            })
            .await
    } else {
        ledger
            .confirm_partial(&ConfirmPartialRequest {
                trade_id: trade.id,
                order_id: leg.order_id,
                partial_quantity: trade.quantity,
                remaining_quantity: leg.remaining_after,
                price: trade.price,
            })
            .await
    }
}
