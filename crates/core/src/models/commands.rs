//! Commands emitted by TSE and executed by UAG — a closed sum type rather
//! than a free-form dictionary (spec.md §9: "prefer a closed set of typed
//! variants").

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBuyOrderCommand {
    pub command_id: String,
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub order_price: Decimal,
    pub reason_code: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceSellOrderCommand {
    pub command_id: String,
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub order_price: Decimal,
    pub reason_code: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    PlaceBuy(PlaceBuyOrderCommand),
    PlaceSell(PlaceSellOrderCommand),
}

pub const REASON_TSE_REBOUND_BUY_SIGNAL: &str = "TSE_REBOUND_BUY_SIGNAL";
pub const REASON_TSE_PROFIT_PRESERVATION_BREAK: &str = "TSE_PROFIT_PRESERVATION_BREAK";
