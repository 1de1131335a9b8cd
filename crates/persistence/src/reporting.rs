//! FIFO lot matching and daily P&L aggregation.
//! Grounded on the original implementation's `prp/reporting.py`.

use chrono::{NaiveDate, Utc};
use ktengine_core::{DailyReport, ExecutionEvent, Side, TradeDetail};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use tracing::warn;

fn sell_tax_rate() -> Decimal {
    Decimal::from_str("0.002").unwrap()
}

fn sell_fee_rate() -> Decimal {
    Decimal::from_str("0.00011").unwrap()
}

fn q_amount(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn q_return(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

struct BuyLot {
    executed_at: chrono::DateTime<Utc>,
    price: Decimal,
    remaining_qty: i64,
}

#[allow(clippy::type_complexity)]
fn calc_trade_detail(
    buy_price: Decimal,
    sell_price: Decimal,
    quantity: i64,
) -> (Decimal, Decimal, Decimal, Decimal, Decimal, Decimal) {
    let buy_amount = q_amount(buy_price * Decimal::from(quantity));
    let sell_amount = q_amount(sell_price * Decimal::from(quantity));
    let sell_tax = q_amount(sell_amount * sell_tax_rate());
    let sell_fee = q_amount(sell_amount * sell_fee_rate());
    let net_pnl = q_amount(sell_amount - buy_amount - sell_tax - sell_fee);
    let return_rate = if buy_amount.is_zero() {
        Decimal::ZERO
    } else {
        q_return((net_pnl / buy_amount) * Decimal::from(100))
    };
    (buy_amount, sell_amount, sell_tax, sell_fee, net_pnl, return_rate)
}

/// Matches sell executions against buy executions FIFO per symbol, producing
/// one [`TradeDetail`] per matched lot slice. Sells with no matching buy lot
/// (more sold than bought that day) are silently dropped, same as the
/// original; callers that want visibility into that should inspect
/// `anomalies` separately, since it isn't tracked here.
pub fn build_trade_details(executions: &[ExecutionEvent]) -> Vec<TradeDetail> {
    let mut sorted: Vec<&ExecutionEvent> = executions.iter().collect();
    sorted.sort_by(|a, b| a.occurred_at.cmp(&b.occurred_at).then(a.event_id.cmp(&b.event_id)));

    let mut buy_queues: HashMap<String, VecDeque<BuyLot>> = HashMap::new();
    let mut details = Vec::new();

    for event in sorted {
        match event.side {
            Side::Buy => {
                buy_queues
                    .entry(event.symbol.clone())
                    .or_default()
                    .push_back(BuyLot {
                        executed_at: event.occurred_at,
                        price: event.execution_price,
                        remaining_qty: event.execution_qty,
                    });
            }
            Side::Sell => {
                let mut remaining_sell_qty = event.execution_qty;
                let queue = buy_queues.entry(event.symbol.clone()).or_default();
                let mut part = 0;

                while remaining_sell_qty > 0 {
                    let Some(lot) = queue.front_mut() else {
                        warn!(
                            symbol = %event.symbol,
                            execution_id = %event.execution_id,
                            remaining = remaining_sell_qty,
                            "sell execution has no matching buy lot"
                        );
                        break;
                    };
                    let matched_qty = lot.remaining_qty.min(remaining_sell_qty);
                    let (buy_amount, sell_amount, sell_tax, sell_fee, net_pnl, return_rate) =
                        calc_trade_detail(lot.price, event.execution_price, matched_qty);

                    details.push(TradeDetail {
                        id: format!("{}-{}", event.execution_id, part),
                        trading_date: event.trading_date,
                        symbol: event.symbol.clone(),
                        buy_executed_at: lot.executed_at,
                        sell_executed_at: event.occurred_at,
                        quantity: matched_qty,
                        buy_price: lot.price,
                        sell_price: event.execution_price,
                        buy_amount,
                        sell_amount,
                        sell_tax,
                        sell_fee,
                        net_pnl,
                        return_rate,
                    });

                    lot.remaining_qty -= matched_qty;
                    if lot.remaining_qty <= 0 {
                        queue.pop_front();
                    }
                    remaining_sell_qty -= matched_qty;
                    part += 1;
                }
            }
        }
    }

    details
}

pub fn aggregate_daily_report(details: &[TradeDetail], trading_date: NaiveDate) -> DailyReport {
    let total_buy_amount = q_amount(details.iter().map(|d| d.buy_amount).sum());
    let total_sell_amount = q_amount(details.iter().map(|d| d.sell_amount).sum());
    let total_sell_tax = q_amount(details.iter().map(|d| d.sell_tax).sum());
    let total_sell_fee = q_amount(details.iter().map(|d| d.sell_fee).sum());
    let total_net_pnl = q_amount(details.iter().map(|d| d.net_pnl).sum());

    let total_return_rate = if total_buy_amount.is_zero() {
        Decimal::ZERO
    } else {
        q_return((total_net_pnl / total_buy_amount) * Decimal::from(100))
    };

    DailyReport {
        trading_date,
        total_buy_amount,
        total_sell_amount,
        total_sell_tax,
        total_sell_fee,
        total_net_pnl,
        total_return_rate,
        generated_at: Utc::now(),
    }
}

pub fn generate_daily_report(
    executions: &[ExecutionEvent],
    trading_date: NaiveDate,
) -> (Vec<TradeDetail>, DailyReport) {
    let scoped: Vec<ExecutionEvent> = executions
        .iter()
        .filter(|e| e.trading_date == trading_date)
        .cloned()
        .collect();
    let details = build_trade_details(&scoped);
    let report = aggregate_daily_report(&details, trading_date);
    (details, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn exec(
        execution_id: &str,
        side: Side,
        price: &str,
        qty: i64,
        occurred_at: chrono::DateTime<Utc>,
    ) -> ExecutionEvent {
        ExecutionEvent {
            event_id: execution_id.to_string(),
            execution_id: execution_id.to_string(),
            order_id: "ord-1".to_string(),
            trading_date: occurred_at.date_naive(),
            occurred_at,
            symbol: "005930".to_string(),
            side,
            execution_price: Decimal::from_str(price).unwrap(),
            execution_qty: qty,
            cum_qty: qty,
            remaining_qty: 0,
        }
    }

    #[test]
    fn matches_single_buy_against_single_sell() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 19, 9, 5, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 2, 19, 9, 30, 0).unwrap();
        let executions = vec![
            exec("exe-1", Side::Buy, "70000", 10, t0),
            exec("exe-2", Side::Sell, "72000", 10, t1),
        ];

        let details = build_trade_details(&executions);
        assert_eq!(details.len(), 1);
        let detail = &details[0];
        assert_eq!(detail.quantity, 10);
        assert_eq!(detail.buy_amount, Decimal::from(700000));
        assert_eq!(detail.sell_amount, Decimal::from(720000));
        assert_eq!(detail.sell_tax, q_amount(Decimal::from(720000) * sell_tax_rate()));
        assert_eq!(detail.sell_fee, q_amount(Decimal::from(720000) * sell_fee_rate()));
    }

    #[test]
    fn splits_sell_across_two_buy_lots_fifo() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 19, 9, 5, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 2, 19, 9, 10, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 2, 19, 9, 30, 0).unwrap();
        let executions = vec![
            exec("exe-1", Side::Buy, "70000", 5, t0),
            exec("exe-2", Side::Buy, "71000", 5, t1),
            exec("exe-3", Side::Sell, "73000", 8, t2),
        ];

        let details = build_trade_details(&executions);
        assert_eq!(details.len(), 2);
        assert_eq!(details[0].quantity, 5);
        assert_eq!(details[0].buy_price, Decimal::from(70000));
        assert_eq!(details[1].quantity, 3);
        assert_eq!(details[1].buy_price, Decimal::from(71000));
    }

    #[test]
    fn unmatched_sell_quantity_is_dropped_without_panicking() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 19, 9, 30, 0).unwrap();
        let executions = vec![exec("exe-1", Side::Sell, "73000", 10, t0)];
        let details = build_trade_details(&executions);
        assert!(details.is_empty());
    }

    #[test]
    fn daily_report_aggregates_across_all_symbols() {
        let t0 = Utc.with_ymd_and_hms(2026, 2, 19, 9, 5, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 2, 19, 9, 30, 0).unwrap();
        let executions = vec![
            exec("exe-1", Side::Buy, "70000", 10, t0),
            exec("exe-2", Side::Sell, "72000", 10, t1),
        ];
        let (details, report) = generate_daily_report(&executions, t0.date_naive());
        assert_eq!(details.len(), 1);
        assert_eq!(report.total_buy_amount, Decimal::from(700000));
        assert!(report.total_net_pnl > Decimal::ZERO);
    }

    #[test]
    fn empty_day_produces_zero_return_rate_not_division_error() {
        let report = aggregate_daily_report(&[], Utc::now().date_naive());
        assert_eq!(report.total_return_rate, Decimal::ZERO);
    }
}
