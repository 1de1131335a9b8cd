//! Event-sourced persistence operations over the six PRP tables.
//! Grounded on the original implementation's `prp/repository.py`.

use crate::reporting::generate_daily_report;
use chrono::NaiveDate;
use ktengine_core::{
    DailyReport, ExecutionEvent, OrderEvent, PositionSnapshot, Side, StrategyEvent,
    StrategyEventType, TradeDetail,
};
use ktengine_core::Result;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::str::FromStr;

fn side_str(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn parse_side(raw: &str) -> Side {
    match raw {
        "SELL" => Side::Sell,
        _ => Side::Buy,
    }
}

fn event_type_str(event_type: &StrategyEventType) -> &'static str {
    match event_type {
        StrategyEventType::BuyCandidateEntered => "BUY_CANDIDATE_ENTERED",
        StrategyEventType::LocalLowUpdated => "LOCAL_LOW_UPDATED",
        StrategyEventType::BuySignal => "BUY_SIGNAL",
        StrategyEventType::MinProfitLocked => "MIN_PROFIT_LOCKED",
        StrategyEventType::SellSignal => "SELL_SIGNAL",
    }
}

fn decimal_opt(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.to_string())
}

pub async fn append_strategy_event(pool: &SqlitePool, event: &StrategyEvent) -> Result<()> {
    let payload_json = if event.metrics.is_empty() {
        None
    } else {
        Some(serde_json::to_string(&event.metrics)?)
    };

    sqlx::query(
        r#"
        INSERT INTO strategy_events(
            event_id, trading_date, occurred_at, symbol, event_type,
            base_price, local_low, current_price, payload_json
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.event_id)
    .bind(event.trading_date.to_string())
    .bind(event.occurred_at.to_rfc3339())
    .bind(&event.symbol)
    .bind(event_type_str(&event.event_type))
    .bind(decimal_opt(event.base_price))
    .bind(decimal_opt(event.local_low))
    .bind(decimal_opt(event.current_price))
    .bind(payload_json)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn append_order_event(pool: &SqlitePool, event: &OrderEvent) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO order_events(
            event_id, order_id, trading_date, occurred_at, symbol, side,
            order_type, order_price, quantity, status, client_order_key,
            reason_code, reason_message
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.event_id)
    .bind(&event.order_id)
    .bind(event.trading_date.to_string())
    .bind(event.occurred_at.to_rfc3339())
    .bind(&event.symbol)
    .bind(side_str(event.side))
    .bind(&event.order_type)
    .bind(event.order_price.to_string())
    .bind(event.quantity)
    .bind(&event.status)
    .bind(&event.client_order_key)
    .bind(&event.reason_code)
    .bind(&event.reason_message)
    .execute(pool)
    .await?;

    Ok(())
}

/// Inserts an execution event, returning `false` (instead of erroring) when
/// an execution with the same `execution_id` was already recorded — the
/// broker can redeliver fills, and this keeps the append idempotent.
pub async fn append_execution_event(pool: &SqlitePool, event: &ExecutionEvent) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO execution_events(
            event_id, execution_id, order_id, trading_date, occurred_at,
            symbol, side, execution_price, execution_qty, cum_qty, remaining_qty
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&event.event_id)
    .bind(&event.execution_id)
    .bind(&event.order_id)
    .bind(event.trading_date.to_string())
    .bind(event.occurred_at.to_rfc3339())
    .bind(&event.symbol)
    .bind(side_str(event.side))
    .bind(event.execution_price.to_string())
    .bind(event.execution_qty)
    .bind(event.cum_qty)
    .bind(event.remaining_qty)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(true),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
        Err(err) => Err(err.into()),
    }
}

pub async fn save_state_snapshot(pool: &SqlitePool, snapshot: &PositionSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO position_snapshots(
            snapshot_id, saved_at, trading_date, symbol, avg_buy_price, quantity,
            current_profit_rate, max_profit_rate, min_profit_locked, last_order_id, state_version
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&snapshot.snapshot_id)
    .bind(snapshot.saved_at.to_rfc3339())
    .bind(snapshot.trading_date.to_string())
    .bind(&snapshot.symbol)
    .bind(snapshot.avg_buy_price.to_string())
    .bind(snapshot.quantity)
    .bind(snapshot.current_profit_rate.to_string())
    .bind(snapshot.max_profit_rate.to_string())
    .bind(snapshot.min_profit_locked as i64)
    .bind(&snapshot.last_order_id)
    .bind(snapshot.state_version as i64)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_latest_state_snapshot(
    pool: &SqlitePool,
    trading_date: NaiveDate,
) -> Result<Option<PositionSnapshot>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        snapshot_id: String,
        saved_at: String,
        trading_date: String,
        symbol: String,
        avg_buy_price: String,
        quantity: i64,
        current_profit_rate: String,
        max_profit_rate: String,
        min_profit_locked: i64,
        last_order_id: Option<String>,
        state_version: i64,
    }

    let row: Option<Row> = sqlx::query_as(
        r#"
        SELECT snapshot_id, saved_at, trading_date, symbol, avg_buy_price, quantity,
               current_profit_rate, max_profit_rate, min_profit_locked, last_order_id, state_version
        FROM position_snapshots
        WHERE trading_date = ?
        ORDER BY saved_at DESC
        LIMIT 1
        "#,
    )
    .bind(trading_date.to_string())
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| PositionSnapshot {
        snapshot_id: row.snapshot_id,
        saved_at: chrono::DateTime::parse_from_rfc3339(&row.saved_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        trading_date: NaiveDate::parse_from_str(&row.trading_date, "%Y-%m-%d").unwrap_or(trading_date),
        symbol: row.symbol,
        avg_buy_price: Decimal::from_str(&row.avg_buy_price).unwrap_or(Decimal::ZERO),
        quantity: row.quantity,
        current_profit_rate: Decimal::from_str(&row.current_profit_rate).unwrap_or(Decimal::ZERO),
        max_profit_rate: Decimal::from_str(&row.max_profit_rate).unwrap_or(Decimal::ZERO),
        min_profit_locked: row.min_profit_locked != 0,
        last_order_id: row.last_order_id,
        state_version: row.state_version as u64,
    }))
}

/// Returns strategy events for `trading_date` (if given), optionally
/// restricted to `event_types`, newest first, clamped to at most 500 rows.
pub async fn list_strategy_events(
    pool: &SqlitePool,
    trading_date: Option<NaiveDate>,
    event_types: Option<&[StrategyEventType]>,
    limit: i64,
) -> Result<Vec<StrategyEvent>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        event_id: String,
        trading_date: String,
        occurred_at: String,
        symbol: String,
        event_type: String,
        base_price: Option<String>,
        local_low: Option<String>,
        current_price: Option<String>,
        payload_json: Option<String>,
    }

    let safe_limit = limit.clamp(1, 500);

    let mut query = String::from(
        "SELECT event_id, trading_date, occurred_at, symbol, event_type, base_price, local_low, current_price, payload_json FROM strategy_events WHERE 1=1",
    );
    if trading_date.is_some() {
        query.push_str(" AND trading_date = ?");
    }
    if let Some(types) = event_types {
        if !types.is_empty() {
            let placeholders = vec!["?"; types.len()].join(", ");
            query.push_str(&format!(" AND event_type IN ({placeholders})"));
        }
    }
    query.push_str(" ORDER BY occurred_at DESC LIMIT ?");

    let mut q = sqlx::query_as::<_, Row>(&query);
    if let Some(date) = trading_date {
        q = q.bind(date.to_string());
    }
    if let Some(types) = event_types {
        for event_type in types {
            q = q.bind(event_type_str(event_type).to_string());
        }
    }
    q = q.bind(safe_limit);

    let rows = q.fetch_all(pool).await?;

    Ok(rows
        .into_iter()
        .map(|row| StrategyEvent {
            event_id: row.event_id,
            occurred_at: chrono::DateTime::parse_from_rfc3339(&row.occurred_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
            trading_date: NaiveDate::parse_from_str(&row.trading_date, "%Y-%m-%d")
                .unwrap_or_else(|_| chrono::Utc::now().date_naive()),
            symbol: row.symbol,
            event_type: parse_event_type(&row.event_type),
            base_price: row.base_price.and_then(|s| Decimal::from_str(&s).ok()),
            local_low: row.local_low.and_then(|s| Decimal::from_str(&s).ok()),
            current_price: row.current_price.and_then(|s| Decimal::from_str(&s).ok()),
            metrics: row
                .payload_json
                .and_then(|s| serde_json::from_str(&s).ok())
                .unwrap_or_default(),
        })
        .collect())
}

fn parse_event_type(raw: &str) -> StrategyEventType {
    match raw {
        "LOCAL_LOW_UPDATED" => StrategyEventType::LocalLowUpdated,
        "BUY_SIGNAL" => StrategyEventType::BuySignal,
        "MIN_PROFIT_LOCKED" => StrategyEventType::MinProfitLocked,
        "SELL_SIGNAL" => StrategyEventType::SellSignal,
        _ => StrategyEventType::BuyCandidateEntered,
    }
}

pub async fn exists_execution(pool: &SqlitePool, execution_id: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM execution_events WHERE execution_id = ? LIMIT 1")
        .bind(execution_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

async fn list_executions_for_date(pool: &SqlitePool, trading_date: NaiveDate) -> Result<Vec<ExecutionEvent>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        event_id: String,
        execution_id: String,
        order_id: String,
        trading_date: String,
        occurred_at: String,
        symbol: String,
        side: String,
        execution_price: String,
        execution_qty: i64,
        cum_qty: i64,
        remaining_qty: i64,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"
        SELECT event_id, execution_id, order_id, trading_date, occurred_at, symbol,
               side, execution_price, execution_qty, cum_qty, remaining_qty
        FROM execution_events
        WHERE trading_date = ?
        ORDER BY occurred_at ASC, event_id ASC
        "#,
    )
    .bind(trading_date.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| ExecutionEvent {
            event_id: row.event_id,
            execution_id: row.execution_id,
            order_id: row.order_id,
            trading_date: NaiveDate::parse_from_str(&row.trading_date, "%Y-%m-%d").unwrap_or(trading_date),
            occurred_at: chrono::DateTime::parse_from_rfc3339(&row.occurred_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .unwrap_or_else(|_| chrono::Utc::now()),
            symbol: row.symbol,
            side: parse_side(&row.side),
            execution_price: Decimal::from_str(&row.execution_price).unwrap_or(Decimal::ZERO),
            execution_qty: row.execution_qty,
            cum_qty: row.cum_qty,
            remaining_qty: row.remaining_qty,
        })
        .collect())
}

async fn upsert_trade_details(pool: &SqlitePool, trading_date: NaiveDate, details: &[TradeDetail]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM trade_details WHERE trading_date = ?")
        .bind(trading_date.to_string())
        .execute(&mut *tx)
        .await?;

    for detail in details {
        sqlx::query(
            r#"
            INSERT INTO trade_details(
                id, trading_date, symbol, buy_executed_at, sell_executed_at,
                quantity, buy_price, sell_price, buy_amount, sell_amount,
                sell_tax, sell_fee, net_pnl, return_rate
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&detail.id)
        .bind(detail.trading_date.to_string())
        .bind(&detail.symbol)
        .bind(detail.buy_executed_at.to_rfc3339())
        .bind(detail.sell_executed_at.to_rfc3339())
        .bind(detail.quantity)
        .bind(detail.buy_price.to_string())
        .bind(detail.sell_price.to_string())
        .bind(detail.buy_amount.to_string())
        .bind(detail.sell_amount.to_string())
        .bind(detail.sell_tax.to_string())
        .bind(detail.sell_fee.to_string())
        .bind(detail.net_pnl.to_string())
        .bind(detail.return_rate.to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn upsert_daily_report(pool: &SqlitePool, report: &DailyReport) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO daily_reports(
            trading_date, total_buy_amount, total_sell_amount, total_sell_tax,
            total_sell_fee, total_net_pnl, total_return_rate, generated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(trading_date) DO UPDATE SET
          total_buy_amount=excluded.total_buy_amount,
          total_sell_amount=excluded.total_sell_amount,
          total_sell_tax=excluded.total_sell_tax,
          total_sell_fee=excluded.total_sell_fee,
          total_net_pnl=excluded.total_net_pnl,
          total_return_rate=excluded.total_return_rate,
          generated_at=excluded.generated_at
        "#,
    )
    .bind(report.trading_date.to_string())
    .bind(report.total_buy_amount.to_string())
    .bind(report.total_sell_amount.to_string())
    .bind(report.total_sell_tax.to_string())
    .bind(report.total_sell_fee.to_string())
    .bind(report.total_net_pnl.to_string())
    .bind(report.total_return_rate.to_string())
    .bind(report.generated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}

/// Recomputes trade details and the daily report for `trading_date` from
/// stored execution events, replacing any previously generated report.
pub async fn generate_and_store_daily_report(pool: &SqlitePool, trading_date: NaiveDate) -> Result<DailyReport> {
    let executions = list_executions_for_date(pool, trading_date).await?;
    let (details, report) = generate_daily_report(&executions, trading_date);
    upsert_trade_details(pool, trading_date, &details).await?;
    upsert_daily_report(pool, &report).await?;
    Ok(report)
}
