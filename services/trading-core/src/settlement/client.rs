//! Ledger service client
//!
//! The consumed contract of the external ledger, idempotency-keyed by the
//! order/trade ids carried in each request: retrying a confirm or
//! compensate with the same ids is safe on the ledger side.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use types::ids::{AccountId, OrderId, Symbol, TradeId};
use types::numeric::{Price, Quantity};
use types::order::OrderKind;

use super::{CompensationOutcome, RejectReason, SettlementOutcome};
use crate::config::LedgerConfig;

/// Reserve funds (buy) or stock (sell) for an order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub order_id: OrderId,
    pub quantity: Quantity,
    /// Required for buys (cash to lock); optional for sells
    pub price: Option<Price>,
}

/// Confirm the final fill of an order's leg of a trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmFullRequest {
    pub trade_id: TradeId,
    pub order_id: OrderId,
    pub quantity: Quantity,
    pub price: Price,
}

/// Confirm a partial fill, leaving the rest of the reservation in place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmPartialRequest {
    pub trade_id: TradeId,
    pub order_id: OrderId,
    pub partial_quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub price: Price,
}

/// Release an order's remaining reservation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelReservationRequest {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub symbol: Symbol,
    pub kind: OrderKind,
    pub original_quantity: Quantity,
    pub filled_quantity: Quantity,
    pub reason: String,
}

/// What a compensation undoes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationKind {
    /// Roll back a trade leg that was confirmed before the other leg failed
    TradeRollback,
    /// Release a reservation that should no longer exist
    ReservationRelease,
}

/// Undo request for a half-applied settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationRequest {
    pub kind: CompensationKind,
    pub order_id: OrderId,
    pub trade_id: Option<TradeId>,
    pub amount: Option<Decimal>,
    pub quantity: Option<Quantity>,
    pub reason: String,
}

/// The external ledger contract
///
/// Synchronous request/response; outcomes are returned, never thrown.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn reserve_buy(&self, req: &ReserveRequest) -> SettlementOutcome;
    async fn reserve_sell(&self, req: &ReserveRequest) -> SettlementOutcome;
    async fn confirm_full(&self, req: &ConfirmFullRequest) -> SettlementOutcome;
    async fn confirm_partial(&self, req: &ConfirmPartialRequest) -> SettlementOutcome;
    async fn cancel_reservation(&self, req: &CancelReservationRequest) -> SettlementOutcome;
    async fn compensate(&self, req: &CompensationRequest) -> CompensationOutcome;
    async fn health_check(&self) -> bool;
}

/// Ledger service wire response
#[derive(Debug, Clone, Deserialize)]
struct LedgerResponse {
    success: bool,
    error_code: Option<String>,
    message: Option<String>,
}

/// HTTP implementation of the ledger contract
pub struct HttpLedgerClient {
    http: Client,
    base_url: String,
}

impl HttpLedgerClient {
    pub fn new(config: &LedgerConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> SettlementOutcome {
        let url = format!("{}{}", self.base_url, path);
        let response = match self.http.post(&url).json(body).send().await {
            Ok(response) => response,
            Err(err) => return SettlementOutcome::TransportFailed(err.to_string()),
        };

        if response.status().is_server_error() {
            return SettlementOutcome::TransportFailed(format!(
                "ledger returned {}",
                response.status()
            ));
        }

        match response.json::<LedgerResponse>().await {
            Ok(body) => classify(body),
            Err(err) => SettlementOutcome::TransportFailed(format!("malformed response: {err}")),
        }
    }
}

/// Map a ledger response to the tagged outcome
fn classify(response: LedgerResponse) -> SettlementOutcome {
    if response.success {
        return SettlementOutcome::Accepted;
    }
    let message = response.message.unwrap_or_default();
    match response.error_code.as_deref() {
        Some("INSUFFICIENT_BALANCE") => {
            SettlementOutcome::BusinessRejected(RejectReason::InsufficientBalance(message))
        }
        Some("INSUFFICIENT_STOCK") => {
            SettlementOutcome::BusinessRejected(RejectReason::InsufficientStock(message))
        }
        Some(code) => SettlementOutcome::BusinessRejected(RejectReason::Other(format!(
            "{code}: {message}"
        ))),
        None => SettlementOutcome::TransportFailed(message),
    }
}

/// Compensation failures where the ledger's own state is suspect;
/// these go to the operator queue instead of the retry path.
fn is_critical_code(code: &str) -> bool {
    code.contains("CRITICAL")
        || code.contains("CORRUPTION")
        || code.contains("INCONSISTENCY")
        || code.contains("MANUAL_INTERVENTION_REQUIRED")
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn reserve_buy(&self, req: &ReserveRequest) -> SettlementOutcome {
        self.post("/reservations/buy", req).await
    }

    async fn reserve_sell(&self, req: &ReserveRequest) -> SettlementOutcome {
        self.post("/reservations/sell", req).await
    }

    async fn confirm_full(&self, req: &ConfirmFullRequest) -> SettlementOutcome {
        self.post("/trades/confirm-full", req).await
    }

    async fn confirm_partial(&self, req: &ConfirmPartialRequest) -> SettlementOutcome {
        self.post("/trades/confirm-partial", req).await
    }

    async fn cancel_reservation(&self, req: &CancelReservationRequest) -> SettlementOutcome {
        self.post("/reservations/cancel", req).await
    }

    async fn compensate(&self, req: &CompensationRequest) -> CompensationOutcome {
        let url = format!("{}/compensations", self.base_url);
        let response = match self.http.post(&url).json(req).send().await {
            Ok(response) => response,
            // The undo may or may not have applied; operator territory.
            Err(err) => {
                return CompensationOutcome::Failed {
                    critical: true,
                    reason: err.to_string(),
                }
            }
        };

        if response.status().is_server_error() {
            return CompensationOutcome::Failed {
                critical: true,
                reason: format!("ledger returned {}", response.status()),
            };
        }

        match response.json::<LedgerResponse>().await {
            Ok(body) if body.success => CompensationOutcome::Completed,
            Ok(body) => {
                let code = body.error_code.unwrap_or_default();
                CompensationOutcome::Failed {
                    critical: is_critical_code(&code),
                    reason: format!("{code}: {}", body.message.unwrap_or_default()),
                }
            }
            Err(err) => CompensationOutcome::Failed {
                critical: true,
                reason: format!("malformed response: {err}"),
            },
        }
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
