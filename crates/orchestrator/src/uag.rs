//! UAG orchestrator (C8): binds CSM settings, the KIA gateway, OPM, TSE, and
//! PRP together — runs the background quote loop and executes the commands
//! it emits.
//!
//! Grounded on the teacher's `gui/src-tauri/src/state.rs`/`lib.rs` module
//! wiring (background task spawned from a `tauri::async_runtime::spawn`
//! block, handles `.manage()`d on the shared app state) and
//! `original_source/src/uag/{bootstrap,service}.py` for the startup guard,
//! buy-sizing formula, and command-execution sequence.

use crate::state::{EngineRuntime, EngineState, SymbolMonitorSnapshot};
use chrono::{DateTime, NaiveDate, Utc};
use ktengine_core::csm::Mode;
use ktengine_core::{
    Command, EngineError, OrderStatus, OrderType, Result, Side, StrategyEventType,
};
pub use ktengine_engine::tse::REFERENCE_CAPTURE_TIME;
use ktengine_engine::{opm, spawn_quote_loop, QuoteEvent, QuoteLoopConfig, QuoteLoopHandle, TseService};
use ktengine_networking::kia::contracts::{OrderAckStatus, OrderKind, SubmitOrderRequest};
use ktengine_networking::KiaGateway;
use ktengine_persistence::sqlite::{append_order_event, append_strategy_event};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;

/// `qty = floor(buyBudget / price)`, `qty ≥ 1` when no budget is set, `0`
/// when budget or price is non-positive (spec.md §4.8 "Buy sizing").
fn compute_buy_quantity(buy_budget: Option<Decimal>, price: Decimal) -> i64 {
    match buy_budget {
        None => 1,
        Some(budget) => {
            if budget <= Decimal::ZERO || price <= Decimal::ZERO {
                0
            } else {
                (budget / price).floor().to_i64().unwrap_or(0)
            }
        }
    }
}

pub struct UagOrchestrator {
    runtime: EngineRuntime,
    pool: sqlx::SqlitePool,
    gateway: Arc<KiaGateway>,
    mode: Option<Mode>,
    account_no: String,
    watch_symbols: Vec<String>,
    buy_budget: Option<Decimal>,
    tse: Arc<Mutex<TseService>>,
    quote_handle: Option<QuoteLoopHandle>,
}

impl UagOrchestrator {
    pub fn new(
        runtime: EngineRuntime,
        pool: sqlx::SqlitePool,
        gateway: Arc<KiaGateway>,
        mode: Option<Mode>,
        account_no: String,
        watch_symbols: Vec<String>,
        buy_budget: Option<Decimal>,
    ) -> Result<Self> {
        let today = Utc::now().date_naive();
        let tse = TseService::new(today, &watch_symbols)?;
        Ok(UagOrchestrator {
            runtime,
            pool,
            gateway,
            mode,
            account_no,
            watch_symbols,
            buy_budget,
            tse: Arc::new(Mutex::new(tse)),
            quote_handle: None,
        })
    }

    pub fn runtime(&self) -> &EngineRuntime {
        &self.runtime
    }

    /// `startTrading`: double-start guard, reference-price backfill, then
    /// spawns the quote loop in a background task (spec.md §4.8).
    pub async fn start_trading(&mut self, trading_date: Option<NaiveDate>, dry_run: bool) -> Result<()> {
        {
            let mut state = self.runtime.engine_state.write().await;
            if *state == EngineState::Running {
                return Err(EngineError::UagEngineAlreadyRunning);
            }
            *state = EngineState::Running;
        }

        let trading_date = trading_date.unwrap_or_else(|| Utc::now().date_naive());
        *self.runtime.trading_date.write().await = Some(trading_date);
        *self.runtime.dry_run.write().await = dry_run;

        {
            let mut tse = self.tse.lock().await;
            tse.on_day_changed(trading_date, &self.watch_symbols)?;
        }

        let restored =
            crate::state::load_monitoring_snapshots(&self.runtime.monitoring_snapshot_path(), trading_date).await;
        {
            let mut monitoring = self.runtime.monitoring.write().await;
            *monitoring = restored;
            monitoring.trading_date = Some(trading_date);
            for symbol in &self.watch_symbols {
                monitoring
                    .symbols
                    .entry(symbol.clone())
                    .or_insert_with(|| SymbolMonitorSnapshot::new(symbol.clone()));
            }
        }

        self.backfill_reference_prices(trading_date).await;

        let (handle, mut rx) = spawn_quote_loop(
            self.gateway.clone(),
            self.tse.clone(),
            self.watch_symbols.clone(),
            QuoteLoopConfig {
                mode: self.mode,
                ..Default::default()
            },
        );
        self.quote_handle = Some(handle);

        let pool = self.pool.clone();
        let gateway = self.gateway.clone();
        let mode = self.mode;
        let account_no = self.account_no.clone();
        let buy_budget = self.buy_budget;
        let runtime = self.runtime.clone();

        tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                let dry_run = *runtime.dry_run.read().await;
                for quote in &outcome.quotes {
                    let mut monitoring = runtime.monitoring.write().await;
                    let snapshot = monitoring
                        .symbols
                        .entry(quote.symbol.clone())
                        .or_insert_with(|| SymbolMonitorSnapshot::new(quote.symbol.clone()));
                    if snapshot.symbol_name.is_none() {
                        snapshot.symbol_name = quote.symbol_name.clone();
                    }
                    snapshot.on_quote(quote.price, quote.as_of);
                }

                for event in &outcome.outputs.events {
                    if let Err(e) = append_strategy_event(&pool, event).await {
                        tracing::error!(error = %e, "failed to persist strategy event");
                    }
                    match (&event.event_type, event.current_price) {
                        (StrategyEventType::BuySignal, Some(price)) => {
                            let mut monitoring = runtime.monitoring.write().await;
                            if let Some(snapshot) = monitoring.symbols.get_mut(&event.symbol) {
                                snapshot.on_buy(event.occurred_at, price);
                            }
                        }
                        (StrategyEventType::SellSignal, Some(price)) => {
                            let mut monitoring = runtime.monitoring.write().await;
                            if let Some(snapshot) = monitoring.symbols.get_mut(&event.symbol) {
                                snapshot.on_sell(event.occurred_at, price);
                            }
                        }
                        _ => {}
                    }
                }

                if !dry_run {
                    for command in &outcome.outputs.commands {
                        execute_command(&pool, &gateway, mode, &account_no, buy_budget, command, Utc::now()).await;
                    }
                }

                runtime.persist_monitoring().await;
            }
        });

        Ok(())
    }

    pub async fn stop_trading(&mut self) {
        if let Some(handle) = self.quote_handle.take() {
            handle.stop();
        }
        *self.runtime.engine_state.write().await = EngineState::Idle;
    }

    /// Best-effort minute-chart backfill when started after reference time
    /// (spec.md §4.8). Seeds each symbol's reference price by replaying it
    /// through `TseService::on_quote`, the same path a live quote takes.
    async fn backfill_reference_prices(&self, trading_date: NaiveDate) {
        if Utc::now().time() < REFERENCE_CAPTURE_TIME {
            return;
        }
        let reference_at = trading_date.and_time(REFERENCE_CAPTURE_TIME).and_utc();
        for symbol in &self.watch_symbols {
            match self.gateway.fetch_reference_price_0903(self.mode, symbol).await {
                Ok(Some(price)) => {
                    let mut tse = self.tse.lock().await;
                    tse.on_quote(QuoteEvent {
                        trading_date,
                        symbol: symbol.clone(),
                        price,
                        occurred_at: reference_at,
                        sequence: 0,
                    });
                }
                Ok(None) => {
                    tracing::warn!(symbol = %symbol, "no reference-minute chart row found for backfill");
                }
                Err(e) => {
                    tracing::warn!(symbol = %symbol, error = %e, "reference price backfill failed");
                }
            }
        }
    }
}

/// Execute one emitted command: create the order aggregate, submit to the
/// broker, and record the outcome. Failures are logged and do not stop the
/// cycle (spec.md §7) — the next command or cycle proceeds regardless.
async fn execute_command(
    pool: &sqlx::SqlitePool,
    gateway: &KiaGateway,
    mode: Option<Mode>,
    account_no: &str,
    buy_budget: Option<Decimal>,
    command: &Command,
    now: DateTime<Utc>,
) {
    let (trading_date, symbol, side, price, qty, reason_code) = match command {
        Command::PlaceBuy(cmd) => (
            cmd.trading_date,
            cmd.symbol.clone(),
            Side::Buy,
            cmd.order_price,
            compute_buy_quantity(buy_budget, cmd.order_price),
            cmd.reason_code,
        ),
        Command::PlaceSell(cmd) => (
            cmd.trading_date,
            cmd.symbol.clone(),
            Side::Sell,
            cmd.order_price,
            1,
            cmd.reason_code,
        ),
    };

    if qty <= 0 {
        tracing::warn!(symbol = %symbol, "buy sizing produced a non-positive quantity, skipping order");
        return;
    }

    let mut order = opm::create_order(trading_date, &symbol, side, OrderType::Limit, price, qty, None, now);

    if let Err(e) = order.transition(OrderStatus::Submitted, now) {
        tracing::error!(order_id = %order.order_aggregate_id, error = %e, "illegal transition to SUBMITTED");
        return;
    }
    if let Err(e) = append_order_event(pool, &opm::order_event_for(&order, Some(reason_code), now)).await {
        tracing::error!(error = %e, "failed to persist order event");
    }

    let submit_req = SubmitOrderRequest {
        mode,
        account_no: account_no.to_string(),
        symbol: symbol.clone(),
        side,
        order_type: OrderKind::Limit,
        price: Some(price),
        quantity: qty,
        client_order_id: order.client_order_id.clone(),
    };

    let transition_result = match gateway.submit_order(submit_req).await {
        Ok(result) if result.status == OrderAckStatus::Accepted => {
            order.broker_order_id = Some(result.broker_order_id);
            order.transition(OrderStatus::Accepted, now)
        }
        Ok(_) => {
            order.last_error_code = Some(EngineError::OpmKiaSubmitFailed.code().to_string());
            order.transition(OrderStatus::Rejected, now)
        }
        Err(e) => {
            tracing::warn!(order_id = %order.order_aggregate_id, error = %e, "broker submit failed");
            order.last_error_code = Some(EngineError::OpmKiaSubmitFailed.code().to_string());
            order.transition(OrderStatus::Rejected, now)
        }
    };
    if let Err(e) = transition_result {
        tracing::error!(order_id = %order.order_aggregate_id, error = %e, "illegal post-submit transition");
    }

    if let Err(e) = append_order_event(pool, &opm::order_event_for(&order, Some(reason_code), now)).await {
        tracing::error!(error = %e, "failed to persist order event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ktengine_networking::KiaApiClient;
    use ktengine_persistence::Database;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn buy_quantity_defaults_to_one_share_with_no_budget() {
        assert_eq!(compute_buy_quantity(None, dec("69800")), 1);
    }

    #[test]
    fn buy_quantity_floors_budget_over_price() {
        assert_eq!(compute_buy_quantity(Some(dec("500000")), dec("69800")), 7);
        assert_eq!(compute_buy_quantity(Some(dec("69800")), dec("69800")), 1);
    }

    #[test]
    fn buy_quantity_is_zero_for_non_positive_budget_or_price() {
        assert_eq!(compute_buy_quantity(Some(dec("0")), dec("69800")), 0);
        assert_eq!(compute_buy_quantity(Some(dec("-100")), dec("69800")), 0);
        assert_eq!(compute_buy_quantity(Some(dec("500000")), dec("0")), 0);
    }

    #[tokio::test]
    async fn start_trading_twice_returns_already_running() {
        let db = Database::connect_in_memory().await.unwrap();
        let dir = std::env::temp_dir().join(format!("ktengine-uag-test-{}", std::process::id()));
        let runtime = EngineRuntime::new(dir.clone());
        let gateway = Arc::new(KiaGateway::new(KiaApiClient::mock()));

        let mut orchestrator = UagOrchestrator::new(
            runtime,
            db.pool().clone(),
            gateway,
            Some(Mode::Mock),
            "12345678-01".to_string(),
            vec!["005930".to_string()],
            None,
        )
        .unwrap();

        let trading_date = NaiveDate::from_ymd_opt(2026, 2, 17).unwrap();
        orchestrator.start_trading(Some(trading_date), true).await.unwrap();

        let err = orchestrator
            .start_trading(Some(trading_date), true)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UagEngineAlreadyRunning));

        orchestrator.stop_trading().await;
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
