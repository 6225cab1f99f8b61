//! Core configuration
//!
//! Constructed once and injected by reference; never read from process-wide
//! globals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the trading core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Maximum relative deviation between a limit price and the reference
    /// price before the order is held for activation (0.015 = 1.5 %)
    pub price_tolerance: Decimal,

    /// Price levels returned per side in a book snapshot
    pub snapshot_depth: usize,

    pub ledger: LedgerConfig,
    pub liquidity: LiquidityConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            price_tolerance: Decimal::new(15, 3),
            snapshot_depth: 10,
            ledger: LedgerConfig::default(),
            liquidity: LiquidityConfig::default(),
        }
    }
}

/// External ledger service endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8085".to_string(),
            request_timeout_secs: 5,
        }
    }
}

/// Synthetic-liquidity behavior
///
/// Strategy weights must sum to 100.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    /// Delay before the first executed attempt
    pub first_attempt_delay_secs: u64,
    /// Delay before the second (and final) attempt
    pub retry_delay_secs: u64,
    /// Executed attempts allowed per order over its lifetime
    pub max_attempts: u8,
    pub full_fill_weight: u32,
    pub partial_fill_weight: u32,
    pub no_fill_weight: u32,
    /// Partial fills draw uniformly from this fraction of remaining quantity
    pub min_partial_ratio: f64,
    pub max_partial_ratio: f64,
    /// Seed for the strategy RNG; None seeds from entropy
    pub rng_seed: Option<u64>,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            first_attempt_delay_secs: 3,
            retry_delay_secs: 15,
            max_attempts: 2,
            full_fill_weight: 30,
            partial_fill_weight: 40,
            no_fill_weight: 30,
            min_partial_ratio: 0.3,
            max_partial_ratio: 0.8,
            rng_seed: None,
        }
    }
}

impl LiquidityConfig {
    pub fn first_attempt_delay(&self) -> Duration {
        Duration::from_secs(self.first_attempt_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}
