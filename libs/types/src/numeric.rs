//! Price and quantity types
//!
//! Prices use rust_decimal for deterministic arithmetic (no floating-point
//! errors). Quantities are whole share counts: equities trade in integral
//! lots, and every partial-fill computation floors to a whole number of
//! shares with a minimum of one.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// A strictly positive price
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a price, returning None unless the value is strictly positive
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create a price from a whole number
    ///
    /// # Panics
    /// Panics if `value` is zero
    pub fn from_u64(value: u64) -> Self {
        Self::try_new(Decimal::from(value)).expect("price must be positive")
    }

    /// Get the inner decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error parsing a price from a string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid price: {0}")]
pub struct ParsePriceError(String);

impl FromStr for Price {
    type Err = ParsePriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s).map_err(|_| ParsePriceError(s.to_string()))?;
        Self::try_new(value).ok_or_else(|| ParsePriceError(s.to_string()))
    }
}

/// A whole-share quantity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Quantity(u64);

impl Quantity {
    pub const fn new(shares: u64) -> Self {
        Self(shares)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn as_decimal(&self) -> Decimal {
        Decimal::from(self.0)
    }

    /// The smaller of two quantities
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Subtraction that stops at zero
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Subtraction that fails on underflow
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }
}

impl Add for Quantity {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Quantity {
    fn from(shares: u64) -> Self {
        Self(shares)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_price_positive_only() {
        assert!(Price::try_new(Decimal::new(5025, 2)).is_some());
        assert!(Price::try_new(Decimal::ZERO).is_none());
        assert!(Price::try_new(Decimal::from(-1)).is_none());
    }

    #[test]
    fn test_price_from_str() {
        let price: Price = "50.25".parse().unwrap();
        assert_eq!(price.as_decimal(), Decimal::new(5025, 2));

        assert!("0".parse::<Price>().is_err());
        assert!("-3".parse::<Price>().is_err());
        assert!("abc".parse::<Price>().is_err());
    }

    #[test]
    fn test_price_ordering() {
        let low: Price = "49.99".parse().unwrap();
        let high: Price = "50.00".parse().unwrap();
        assert!(low < high);
    }

    #[test]
    #[should_panic(expected = "price must be positive")]
    fn test_price_from_u64_zero_panics() {
        Price::from_u64(0);
    }

    #[test]
    fn test_quantity_arithmetic() {
        let a = Quantity::new(100);
        let b = Quantity::new(60);

        assert_eq!(a + b, Quantity::new(160));
        assert_eq!(a - b, Quantity::new(40));
        assert_eq!(a.min(b), b);
        assert_eq!(b.saturating_sub(a), Quantity::zero());
        assert_eq!(b.checked_sub(a), None);
    }

    #[test]
    fn test_quantity_serialization() {
        let qty = Quantity::new(250);
        let json = serde_json::to_string(&qty).unwrap();
        assert_eq!(json, "250");

        let deserialized: Quantity = serde_json::from_str(&json).unwrap();
        assert_eq!(qty, deserialized);
    }

    proptest! {
        #[test]
        fn prop_quantity_min_is_bounded(a in 0u64..1_000_000, b in 0u64..1_000_000) {
            let min = Quantity::new(a).min(Quantity::new(b));
            prop_assert!(min <= Quantity::new(a));
            prop_assert!(min <= Quantity::new(b));
        }

        #[test]
        fn prop_quantity_saturating_sub_never_underflows(
            a in 0u64..1_000_000,
            b in 0u64..1_000_000,
        ) {
            let diff = Quantity::new(a).saturating_sub(Quantity::new(b));
            prop_assert!(diff.as_u64() <= a);
        }
    }
}
