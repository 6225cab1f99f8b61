//! Crossing detection
//!
//! A buy crosses a sell when the buy price is at or above the sell price.
//! Market orders carry no limit and always cross.

use types::numeric::Price;
use types::order::Side;

/// Whether an incoming order crosses a resting order's price
pub fn crosses(incoming_side: Side, incoming_limit: Option<Price>, resting_price: Price) -> bool {
    match (incoming_side, incoming_limit) {
        (_, None) => true,
        (Side::Buy, Some(limit)) => limit >= resting_price,
        (Side::Sell, Some(limit)) => limit <= resting_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(s: &str) -> Price {
        s.parse().unwrap()
    }

    #[test]
    fn test_buy_crosses_at_or_above() {
        assert!(crosses(Side::Buy, Some(price("50.00")), price("49.00")));
        assert!(crosses(Side::Buy, Some(price("50.00")), price("50.00")));
        assert!(!crosses(Side::Buy, Some(price("50.00")), price("51.00")));
    }

    #[test]
    fn test_sell_crosses_at_or_below() {
        assert!(crosses(Side::Sell, Some(price("50.00")), price("51.00")));
        assert!(crosses(Side::Sell, Some(price("50.00")), price("50.00")));
        assert!(!crosses(Side::Sell, Some(price("50.00")), price("49.00")));
    }

    #[test]
    fn test_market_always_crosses() {
        assert!(crosses(Side::Buy, None, price("99999.00")));
        assert!(crosses(Side::Sell, None, price("0.01")));
    }
}
