//! Order & Position Manager (C5): order lifecycle state machine, FIFO fill
//! reconciliation, interim P&L refresh.
//!
//! Grounded on `original_source/src/opm/{state_machine,service}.py`: the
//! transition table itself lives on `OrderAggregate` in `ktengine-core`;
//! this module owns order creation and the reconcile algorithm that drives
//! it, in the shape of the teacher's `trade_executor.rs` retry/submit flow.

use chrono::{DateTime, NaiveDate, Utc};
use ktengine_core::types::quantize;
use ktengine_core::{
    ExecutionEvent, ExecutionFill, OrderAggregate, OrderEvent, OrderStatus, OrderType,
    PositionModel, PositionSnapshot, Result, Side,
};
use ktengine_persistence::sqlite::{append_execution_event, append_order_event, save_state_snapshot};
use rand::Rng;
use rust_decimal::Decimal;
use sqlx::SqlitePool;

const RAND8_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn rand8() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| RAND8_ALPHABET[rng.gen_range(0..RAND8_ALPHABET.len())] as char)
        .collect()
}

fn side_token(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

pub fn order_status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::PendingSubmit => "PENDING_SUBMIT",
        OrderStatus::Submitted => "SUBMITTED",
        OrderStatus::Accepted => "ACCEPTED",
        OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
        OrderStatus::Filled => "FILLED",
        OrderStatus::Rejected => "REJECTED",
        OrderStatus::Canceled => "CANCELED",
        OrderStatus::Reconciling => "RECONCILING",
    }
}

/// Build a fresh order aggregate in `PENDING_SUBMIT`.
/// Id scheme: `opm-{date}-{symbol}-{side}-{rand8}` (spec.md §4.5).
pub fn create_order(
    trading_date: NaiveDate,
    symbol: &str,
    side: Side,
    order_type: OrderType,
    requested_price: Decimal,
    requested_qty: i64,
    client_order_id: Option<String>,
    now: DateTime<Utc>,
) -> OrderAggregate {
    let order_aggregate_id = format!(
        "opm-{}-{}-{}-{}",
        trading_date.format("%Y%m%d"),
        symbol,
        side_token(side),
        rand8()
    );
    let client_order_id = client_order_id.unwrap_or_else(|| format!("coid-{}", rand8()));

    OrderAggregate {
        order_aggregate_id,
        trading_date,
        symbol: symbol.to_string(),
        side,
        order_type,
        requested_price,
        requested_qty,
        status: OrderStatus::PendingSubmit,
        broker_order_id: None,
        client_order_id,
        cum_executed_qty: 0,
        avg_executed_price: Decimal::ZERO,
        remaining_qty: requested_qty,
        last_error_code: None,
        last_updated_at: now,
    }
}

/// Build an `OrderEvent` snapshot of `order`'s current status, suitable for
/// append-only persistence at every status transition.
pub fn order_event_for(order: &OrderAggregate, reason_code: Option<&str>, now: DateTime<Utc>) -> OrderEvent {
    OrderEvent {
        event_id: format!("oe-{}-v{}", order.order_aggregate_id, order.cum_executed_qty),
        order_id: order.order_aggregate_id.clone(),
        occurred_at: now,
        trading_date: order.trading_date,
        symbol: order.symbol.clone(),
        side: order.side,
        order_type: format!("{:?}", order.order_type).to_uppercase(),
        order_price: order.requested_price,
        quantity: order.requested_qty,
        status: order_status_str(order.status).to_string(),
        client_order_key: order.client_order_id.clone(),
        reason_code: reason_code.map(str::to_string),
        reason_message: None,
    }
}

fn position_snapshot_for(position: &PositionModel, order: &OrderAggregate, now: DateTime<Utc>) -> PositionSnapshot {
    PositionSnapshot {
        snapshot_id: format!("snap-{}-v{}", position.position_id, position.state_version),
        saved_at: now,
        trading_date: position.trading_date,
        symbol: position.symbol.clone(),
        avg_buy_price: position.avg_buy_price,
        quantity: position.quantity,
        current_profit_rate: position.current_profit_rate,
        max_profit_rate: position.max_profit_rate,
        min_profit_locked: position.min_profit_locked,
        last_order_id: Some(order.order_aggregate_id.clone()),
        state_version: position.state_version,
    }
}

/// Apply a batch of broker-reported fills to `order`/`position`, deduplicating
/// on `executionId`, then refresh interim P&L off `latest_mark_price` and
/// persist the resulting execution events, order event, and position
/// snapshot. Grounded on `opm/service.py`'s reconcile routine.
pub async fn reconcile_execution_events(
    pool: &SqlitePool,
    order: &mut OrderAggregate,
    position: &mut PositionModel,
    fills: &[ExecutionFill],
    broker_remaining_qty: i64,
    latest_mark_price: Decimal,
    now: DateTime<Utc>,
) -> Result<()> {
    for fill in fills {
        let execution_event = ExecutionEvent {
            event_id: format!("ee-{}", fill.execution_id),
            execution_id: fill.execution_id.clone(),
            order_id: order.order_aggregate_id.clone(),
            occurred_at: fill.executed_at,
            trading_date: order.trading_date,
            symbol: order.symbol.clone(),
            side: order.side,
            execution_price: fill.price,
            execution_qty: fill.qty,
            cum_qty: order.cum_executed_qty + fill.qty,
            remaining_qty: (order.requested_qty - order.cum_executed_qty - fill.qty).max(0),
        };

        let inserted = append_execution_event(pool, &execution_event).await?;
        if !inserted {
            continue;
        }

        let applied_qty = match order.side {
            Side::Buy => fill.qty,
            Side::Sell => fill.qty.min(position.quantity),
        };
        if applied_qty <= 0 {
            continue;
        }

        let prev_qty = Decimal::from(order.cum_executed_qty);
        let new_cum = order.cum_executed_qty + applied_qty;
        order.avg_executed_price = quantize(
            (order.avg_executed_price * prev_qty + fill.price * Decimal::from(applied_qty))
                / Decimal::from(new_cum),
            4,
        );
        order.cum_executed_qty = new_cum;

        match order.side {
            Side::Buy => position.apply_buy_fill(fill.price, applied_qty),
            Side::Sell => position.apply_sell_fill(fill.price, applied_qty),
        }
    }

    order.remaining_qty = broker_remaining_qty.max(0);

    let promoted = if order.remaining_qty == 0 && order.cum_executed_qty >= order.requested_qty {
        Some(OrderStatus::Filled)
    } else if order.cum_executed_qty > 0 {
        Some(OrderStatus::PartiallyFilled)
    } else {
        None
    };
    if let Some(next) = promoted {
        if matches!(order.status, OrderStatus::Accepted | OrderStatus::Reconciling) && next != order.status {
            order.transition(next, now)?;
        }
    }

    position.current_price = latest_mark_price;
    position.refresh_interim_metrics();
    position.updated_at = now;

    let snapshot = position_snapshot_for(position, order, now);
    save_state_snapshot(pool, &snapshot).await?;
    append_order_event(pool, &order_event_for(order, None, now)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ktengine_persistence::Database;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn create_order_ids_follow_the_opm_scheme() {
        let order = create_order(
            NaiveDate::from_ymd_opt(2026, 2, 17).unwrap(),
            "005930",
            Side::Buy,
            OrderType::Limit,
            dec("69800"),
            10,
            None,
            Utc::now(),
        );
        assert!(order.order_aggregate_id.starts_with("opm-20260217-005930-buy-"));
        assert_eq!(order.status, OrderStatus::PendingSubmit);
        assert_eq!(order.remaining_qty, 10);
    }

    #[tokio::test]
    async fn reconcile_applies_fills_once_and_promotes_to_filled() {
        let db = Database::connect_in_memory().await.unwrap();
        let pool = db.pool();
        let now = Utc::now();
        let trading_date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();

        let mut order = create_order(
            trading_date,
            "005930",
            Side::Buy,
            OrderType::Limit,
            dec("69800"),
            10,
            None,
            now,
        );
        order.status = OrderStatus::Accepted;
        let mut position = PositionModel::empty(trading_date, "005930", now);

        let fills = vec![ExecutionFill {
            execution_id: "exe-1".to_string(),
            broker_order_id: "brk-1".to_string(),
            symbol: "005930".to_string(),
            side: Side::Buy,
            price: dec("69800"),
            qty: 10,
            executed_at: now,
        }];

        reconcile_execution_events(pool, &mut order, &mut position, &fills, 0, dec("69800"), now)
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.cum_executed_qty, 10);
        assert_eq!(position.quantity, 10);

        // replaying the same fill is a dedup no-op
        reconcile_execution_events(pool, &mut order, &mut position, &fills, 0, dec("69800"), now)
            .await
            .unwrap();
        assert_eq!(order.cum_executed_qty, 10);
        assert_eq!(position.quantity, 10);
    }

    #[tokio::test]
    async fn sell_fill_is_clamped_to_current_position_quantity() {
        let db = Database::connect_in_memory().await.unwrap();
        let pool = db.pool();
        let now = Utc::now();
        let trading_date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();

        let mut order = create_order(
            trading_date,
            "005930",
            Side::Sell,
            OrderType::Limit,
            dec("70500"),
            10,
            None,
            now,
        );
        order.status = OrderStatus::Accepted;
        let mut position = PositionModel::empty(trading_date, "005930", now);
        position.apply_buy_fill(dec("69800"), 5);

        let fills = vec![ExecutionFill {
            execution_id: "exe-2".to_string(),
            broker_order_id: "brk-2".to_string(),
            symbol: "005930".to_string(),
            side: Side::Sell,
            price: dec("70500"),
            qty: 10,
            executed_at: now,
        }];

        reconcile_execution_events(pool, &mut order, &mut position, &fills, 0, dec("70500"), now)
            .await
            .unwrap();

        assert_eq!(position.quantity, 0);
        assert_eq!(order.cum_executed_qty, 5);
    }
}
