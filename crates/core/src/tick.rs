//! KOSPI tick-size ladder and tick-aligned limit-price arithmetic.
//!
//! Grounded on the original implementation's `opm/tick_rules.py`.

use crate::errors::{EngineError, Result};
use rust_decimal::Decimal;

fn d(s: &str) -> Decimal {
    s.parse().expect("static tick constant")
}

/// Resolve the KOSPI tick size for a given price level.
pub fn resolve_tick_size(price: Decimal) -> Decimal {
    if price < d("1000") {
        d("1")
    } else if price < d("5000") {
        d("5")
    } else if price < d("10000") {
        d("10")
    } else if price < d("50000") {
        d("50")
    } else if price < d("100000") {
        d("100")
    } else if price < d("500000") {
        d("500")
    } else {
        d("1000")
    }
}

/// Floor-align `price` down to a multiple of `tick`.
pub fn align_to_tick_down(price: Decimal, tick: Decimal) -> Decimal {
    if tick <= Decimal::ZERO {
        return price;
    }
    (price / tick).floor() * tick
}

/// `sellLimit(cur) = alignDown(cur - 2*tick(cur), tick(cur))`; rejects when
/// the aligned result is non-positive.
pub fn compute_sell_limit_price(current_price: Decimal) -> Result<Decimal> {
    let tick = resolve_tick_size(current_price);
    let raw = current_price - (tick * Decimal::TWO);
    let aligned = align_to_tick_down(raw, tick);
    if aligned <= Decimal::ZERO {
        return Err(EngineError::InvalidPrice(format!(
            "sell limit price non-positive for current_price={current_price}"
        )));
    }
    Ok(aligned)
}

/// `buyLimit(cur, ticksUp)` climbs `ticks_up` steps, re-resolving the tick
/// ladder from the running price on every step — a step that crosses a
/// ladder boundary uses the new tick width for the rest of the climb.
pub fn compute_buy_limit_price(current_price: Decimal, ticks_up: u32) -> Result<Decimal> {
    let mut running = current_price;
    for _ in 0..ticks_up {
        let tick = resolve_tick_size(running);
        running = align_to_tick_down(running, tick) + tick;
    }
    if running <= Decimal::ZERO {
        return Err(EngineError::InvalidPrice(format!(
            "buy limit price non-positive for current_price={current_price}"
        )));
    }
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn ladder_boundaries() {
        assert_eq!(resolve_tick_size(dec("999")), dec("1"));
        assert_eq!(resolve_tick_size(dec("1000")), dec("5"));
        assert_eq!(resolve_tick_size(dec("4999")), dec("5"));
        assert_eq!(resolve_tick_size(dec("5000")), dec("10"));
        assert_eq!(resolve_tick_size(dec("9999")), dec("10"));
        assert_eq!(resolve_tick_size(dec("10000")), dec("50"));
        assert_eq!(resolve_tick_size(dec("49999")), dec("50"));
        assert_eq!(resolve_tick_size(dec("50000")), dec("100"));
        assert_eq!(resolve_tick_size(dec("99999")), dec("100"));
        assert_eq!(resolve_tick_size(dec("100000")), dec("500"));
        assert_eq!(resolve_tick_size(dec("499999")), dec("500"));
        assert_eq!(resolve_tick_size(dec("500000")), dec("1000"));
    }

    #[test]
    fn sell_limit_is_tick_aligned_and_two_ticks_below() {
        // cur=70000 -> tick=100, sell = align_down(70000-200, 100) = 69800
        let sell = compute_sell_limit_price(dec("70000")).unwrap();
        assert_eq!(sell, dec("69800"));
        assert_eq!(dec("70000") - sell, dec("200"));
    }

    #[test]
    fn sell_limit_rejects_when_nonpositive() {
        assert!(compute_sell_limit_price(dec("1")).is_err());
    }

    #[test]
    fn buy_limit_rereads_ladder_across_a_boundary_crossing() {
        // cur=9990 (tick=10): step1 -> align_down(9990,10)+10=10000
        // at 10000 the ladder resolves to tick=50: step2 -> align_down(10000,50)+50=10050
        let buy = compute_buy_limit_price(dec("9990"), 2).unwrap();
        assert_eq!(buy, dec("10050"));
    }
}
