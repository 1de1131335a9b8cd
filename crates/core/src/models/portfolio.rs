//! Singleton per-day portfolio gate state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioState {
    NoPosition,
    BuyRequested,
    PositionOpen,
    SellRequested,
    PositionClosed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioContext {
    pub state: PortfolioState,
    pub gate_open: bool,
    pub active_symbol: Option<String>,
    pub min_profit_locked: bool,
    pub sell_signaled: bool,
}

impl Default for PortfolioContext {
    fn default() -> Self {
        PortfolioContext {
            state: PortfolioState::NoPosition,
            gate_open: true,
            active_symbol: None,
            min_profit_locked: false,
            sell_signaled: false,
        }
    }
}
