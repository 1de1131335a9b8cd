//! Per-symbol strategy state, recreated at day rollover.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolState {
    WaitReference,
    Tracking,
    BuyCandidate,
    BuyTriggered,
    BuyBlocked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolContext {
    pub symbol: String,
    pub watch_rank: u32,
    pub state: SymbolState,
    pub reference_price: Option<Decimal>,
    pub tracked_low: Option<Decimal>,
    pub last_quote_at: Option<DateTime<Utc>>,
    pub last_sequence: u64,
}

impl SymbolContext {
    pub fn new(symbol: impl Into<String>, watch_rank: u32) -> Self {
        SymbolContext {
            symbol: symbol.into(),
            watch_rank,
            state: SymbolState::WaitReference,
            reference_price: None,
            tracked_low: None,
            last_quote_at: None,
            last_sequence: 0,
        }
    }
}
