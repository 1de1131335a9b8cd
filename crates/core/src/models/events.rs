//! Event-sourced shapes persisted by PRP (spec.md §4.2) plus the in-memory
//! strategy events emitted by TSE.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::order::Side;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "eventType")]
pub enum StrategyEventType {
    BuyCandidateEntered,
    LocalLowUpdated,
    BuySignal,
    MinProfitLocked,
    SellSignal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyEvent {
    pub event_id: String,
    pub occurred_at: DateTime<Utc>,
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub event_type: StrategyEventType,
    pub base_price: Option<Decimal>,
    pub local_low: Option<Decimal>,
    pub current_price: Option<Decimal>,
    /// Free-form metrics carried per event (dropRate, reboundRate, …) —
    /// a closed set of typed variants isn't practical here since each event
    /// type carries a different metric bag, so this stays a map at the
    /// persistence boundary while call sites build it from typed values.
    pub metrics: HashMap<String, Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_id: String,
    pub order_id: String,
    pub occurred_at: DateTime<Utc>,
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub side: Side,
    pub order_type: String,
    pub order_price: Decimal,
    pub quantity: i64,
    pub status: String,
    pub client_order_key: String,
    pub reason_code: Option<String>,
    pub reason_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub event_id: String,
    pub execution_id: String,
    pub order_id: String,
    pub occurred_at: DateTime<Utc>,
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub side: Side,
    pub execution_price: Decimal,
    pub execution_qty: i64,
    pub cum_qty: i64,
    pub remaining_qty: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub snapshot_id: String,
    pub saved_at: DateTime<Utc>,
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub avg_buy_price: Decimal,
    pub quantity: i64,
    pub current_profit_rate: Decimal,
    pub max_profit_rate: Decimal,
    pub min_profit_locked: bool,
    pub last_order_id: Option<String>,
    pub state_version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDetail {
    pub id: String,
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub buy_executed_at: DateTime<Utc>,
    pub sell_executed_at: DateTime<Utc>,
    pub quantity: i64,
    pub buy_price: Decimal,
    pub sell_price: Decimal,
    pub buy_amount: Decimal,
    pub sell_amount: Decimal,
    pub sell_tax: Decimal,
    pub sell_fee: Decimal,
    pub net_pnl: Decimal,
    pub return_rate: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    pub trading_date: NaiveDate,
    pub total_buy_amount: Decimal,
    pub total_sell_amount: Decimal,
    pub total_sell_tax: Decimal,
    pub total_sell_fee: Decimal,
    pub total_net_pnl: Decimal,
    pub total_return_rate: Decimal,
    pub generated_at: DateTime<Utc>,
}
