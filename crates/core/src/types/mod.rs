//! Fixed-point money and rate newtypes.
//!
//! Backed by [`rust_decimal::Decimal`] rather than `f64` so that the
//! half-up quantization spec.md §3 requires is exact and reproducible —
//! an `f64` can't represent 0.01 precisely, let alone guarantee the same
//! rounding on every platform.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A KRW price or amount, quantized to 0.01 on construction via [`Price::quantized`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(pub Decimal);

impl Price {
    pub fn new(value: Decimal) -> Self {
        Price(value)
    }

    pub fn zero() -> Self {
        Price(Decimal::ZERO)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// Quantize to 0.01, half-up — the amount quantum spec.md §3 names.
    pub fn quantized(&self) -> Self {
        Price(quantize(self.0, 2))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A percentage/rate value (drop rate, rebound rate, profit rate, …),
/// quantized to 0.0001 — the rate quantum spec.md §3 names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rate(pub Decimal);

impl Rate {
    pub fn new(value: Decimal) -> Self {
        Rate(value)
    }

    pub fn zero() -> Self {
        Rate(Decimal::ZERO)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn quantized(&self) -> Self {
        Rate(quantize(self.0, 4))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-up quantization to `scale` decimal digits — the one rounding mode
/// used throughout this engine (spec.md §3: "deterministic half-up rounding").
pub fn quantize(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn quantize_half_up_rounds_away_from_zero_at_midpoint() {
        assert_eq!(
            quantize(Decimal::from_str("1.005").unwrap(), 2),
            Decimal::from_str("1.01").unwrap()
        );
        assert_eq!(
            quantize(Decimal::from_str("-1.005").unwrap(), 2),
            Decimal::from_str("-1.01").unwrap()
        );
    }

    #[test]
    fn price_quantized_truncates_to_two_places() {
        let p = Price::new(Decimal::from_str("100.006").unwrap());
        assert_eq!(p.quantized().as_decimal(), Decimal::from_str("100.01").unwrap());
    }
}
