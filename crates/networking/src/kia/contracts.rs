//! Typed request/response shapes the gateway maps broker payloads into.
//! Grounded on the original implementation's `kia/contracts.py`.

use chrono::{DateTime, Utc};
use ktengine_core::csm::Mode;
use ktengine_core::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    Auth,
    Quote,
    Chart,
    Order,
    Execution,
}

#[derive(Debug, Clone)]
pub struct FetchQuoteRequest {
    pub mode: Option<Mode>,
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketQuote {
    pub symbol: String,
    pub symbol_name: Option<String>,
    pub price: Decimal,
    pub tick_size: i64,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SubmitOrderRequest {
    pub mode: Option<Mode>,
    pub account_no: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderKind,
    pub price: Option<Decimal>,
    pub quantity: i64,
    pub client_order_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderKind {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAckStatus {
    Accepted,
    Rejected,
    Pending,
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub broker_order_id: String,
    pub client_order_id: String,
    pub status: OrderAckStatus,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct FetchExecutionRequest {
    pub mode: Option<Mode>,
    pub account_no: String,
    pub broker_order_id: String,
}

#[derive(Debug, Clone)]
pub struct ExecutionFillWire {
    pub execution_id: String,
    pub price: Decimal,
    pub quantity: i64,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub broker_order_id: String,
    pub fills: Vec<ExecutionFillWire>,
    pub remaining_qty: i64,
}

#[derive(Debug, Clone)]
pub struct FetchPositionRequest {
    pub mode: Option<Mode>,
    pub account_no: String,
    pub symbol: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PositionSnapshotWire {
    pub account_no: String,
    pub symbol: String,
    pub quantity: i64,
    pub avg_buy_price: Decimal,
}

#[derive(Debug, Clone)]
pub struct PollQuotesRequest {
    pub mode: Option<Mode>,
    pub symbols: Vec<String>,
    pub poll_cycle_id: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PollQuoteError {
    pub symbol: String,
    pub code: String,
    pub retryable: bool,
}

#[derive(Debug, Clone)]
pub struct PollQuotesResult {
    pub poll_cycle_id: String,
    pub quotes: Vec<MarketQuote>,
    pub errors: Vec<PollQuoteError>,
    pub partial: bool,
}
