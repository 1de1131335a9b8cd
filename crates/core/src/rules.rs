//! Threshold predicates and rate math shared by OPM and TSE.
//!
//! Grounded on the original implementation's `tse/rules.py`: thresholds are
//! compared with an epsilon that loosens the *threshold*, not the measured
//! value — `ge_with_eps(left, right, eps) = left >= right - eps`.

use crate::types::{quantize, Rate};
use rust_decimal::Decimal;

pub const DROP_THRESHOLD_PCT: &str = "1.0";
pub const REBOUND_THRESHOLD_PCT: &str = "0.2";
pub const MIN_PROFIT_LOCK_PCT: &str = "1.0";
pub const PROFIT_PRESERVATION_SELL_PCT: &str = "80";
pub const EPSILON: &str = "0.000001";

fn d(s: &str) -> Decimal {
    s.parse().expect("static rule constant")
}

pub fn drop_threshold() -> Decimal {
    d(DROP_THRESHOLD_PCT)
}

pub fn rebound_threshold() -> Decimal {
    d(REBOUND_THRESHOLD_PCT)
}

pub fn min_profit_lock() -> Decimal {
    d(MIN_PROFIT_LOCK_PCT)
}

pub fn profit_preservation_sell() -> Decimal {
    d(PROFIT_PRESERVATION_SELL_PCT)
}

pub fn epsilon() -> Decimal {
    d(EPSILON)
}

/// `left >= right - eps`
pub fn ge_with_eps(left: Decimal, right: Decimal, eps: Decimal) -> bool {
    left >= right - eps
}

/// `left <= right + eps`
pub fn le_with_eps(left: Decimal, right: Decimal, eps: Decimal) -> bool {
    left <= right + eps
}

/// `(base - cur) / base * 100`, quantized to 4dp half-up. `None` when
/// `base <= 0` (spec.md §4.1: "fails when base ≤ 0").
pub fn drop_rate(base: Decimal, cur: Decimal) -> Option<Rate> {
    if base <= Decimal::ZERO {
        return None;
    }
    Some(Rate::new(quantize(
        (base - cur) / base * Decimal::ONE_HUNDRED,
        4,
    )))
}

/// `(cur - low) / low * 100`, quantized to 4dp half-up. `None` when `low <= 0`.
pub fn rebound_rate(low: Decimal, cur: Decimal) -> Option<Rate> {
    if low <= Decimal::ZERO {
        return None;
    }
    Some(Rate::new(quantize(
        (cur - low) / low * Decimal::ONE_HUNDRED,
        4,
    )))
}

/// `current / max * 100`, quantized to 4dp half-up. `None` when `max <= 0`.
pub fn profit_preservation_rate(current: Decimal, max: Decimal) -> Option<Rate> {
    if max <= Decimal::ZERO {
        return None;
    }
    Some(Rate::new(quantize(current / max * Decimal::ONE_HUNDRED, 4)))
}

pub fn is_positive_price(price: Decimal) -> bool {
    price > Decimal::ZERO
}

pub fn should_enter_buy_candidate(drop: Decimal) -> bool {
    ge_with_eps(drop, drop_threshold(), epsilon())
}

pub fn should_update_tracked_low(current: Decimal, tracked_low: Decimal) -> bool {
    current < tracked_low
}

pub fn should_trigger_rebound_buy(rebound: Decimal) -> bool {
    ge_with_eps(rebound, rebound_threshold(), epsilon())
}

pub fn should_lock_min_profit(current_profit_rate: Decimal) -> bool {
    ge_with_eps(current_profit_rate, min_profit_lock(), epsilon())
}

pub fn should_emit_sell_signal(
    min_profit_locked: bool,
    current_profit_rate: Decimal,
    max_profit_rate: Decimal,
) -> bool {
    if !min_profit_locked {
        return false;
    }
    let Some(preservation) = profit_preservation_rate(current_profit_rate, max_profit_rate) else {
        return false;
    };
    le_with_eps(preservation.as_decimal(), profit_preservation_sell(), epsilon())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn drop_rate_exact_threshold_passes() {
        // base=100, cur=99 -> drop = 1.0% exactly
        let drop = drop_rate(dec("100"), dec("99")).unwrap();
        assert!(should_enter_buy_candidate(drop.as_decimal()));
    }

    #[test]
    fn drop_rate_just_below_threshold_fails() {
        // drop = 0.99% - well below 1.0 - epsilon
        let drop = drop_rate(dec("100"), dec("99.02")).unwrap();
        assert!(!should_enter_buy_candidate(drop.as_decimal()));
    }

    #[test]
    fn drop_rate_none_for_nonpositive_base() {
        assert!(drop_rate(dec("0"), dec("10")).is_none());
    }

    #[test]
    fn rebound_rate_within_epsilon_of_threshold_passes() {
        // low=99, cur=99.198 -> rebound = 0.2% exactly (matches seed scenario 1)
        let rebound = rebound_rate(dec("99"), dec("99.198")).unwrap();
        assert!(should_trigger_rebound_buy(rebound.as_decimal()));
    }

    #[test]
    fn sell_signal_requires_lock_first() {
        assert!(!should_emit_sell_signal(false, dec("50"), dec("100")));
    }

    #[test]
    fn sell_signal_fires_at_exactly_80_percent_preservation() {
        // current=80, max=100 -> preservation = 80% exactly
        assert!(should_emit_sell_signal(true, dec("80"), dec("100")));
    }

    #[test]
    fn sell_signal_does_not_fire_above_80_percent_preservation() {
        // current=81, max=100 -> preservation = 81%, above the sell line
        assert!(!should_emit_sell_signal(true, dec("81"), dec("100")));
    }
}
