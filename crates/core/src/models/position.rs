//! Position model and its interim P&L math (spec.md §4.5).

use crate::types::quantize;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const SELL_TAX_RATE: &str = "0.002";
pub const SELL_FEE_RATE: &str = "0.00011";

pub fn sell_tax_rate() -> Decimal {
    SELL_TAX_RATE.parse().expect("static rate constant")
}

pub fn sell_fee_rate() -> Decimal {
    SELL_FEE_RATE.parse().expect("static rate constant")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    Flat,
    LongOpen,
    Exiting,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionModel {
    pub position_id: String,
    pub trading_date: NaiveDate,
    pub symbol: String,
    pub state: PositionState,
    pub quantity: i64,
    pub avg_buy_price: Decimal,
    pub buy_notional: Decimal,
    pub sell_quantity: i64,
    pub avg_sell_price: Decimal,
    pub sell_notional: Decimal,
    pub current_price: Decimal,
    pub gross_interim_pnl: Decimal,
    pub estimated_sell_tax: Decimal,
    pub estimated_sell_fee: Decimal,
    pub net_interim_pnl: Decimal,
    pub current_profit_rate: Decimal,
    pub max_profit_rate: Decimal,
    pub min_profit_locked: bool,
    pub state_version: u64,
    pub updated_at: DateTime<Utc>,
}

impl PositionModel {
    pub fn empty(trading_date: NaiveDate, symbol: &str, now: DateTime<Utc>) -> Self {
        PositionModel {
            position_id: format!("pos-{}-{}", trading_date.format("%Y-%m-%d"), symbol),
            trading_date,
            symbol: symbol.to_string(),
            state: PositionState::Flat,
            quantity: 0,
            avg_buy_price: Decimal::ZERO,
            buy_notional: Decimal::ZERO,
            sell_quantity: 0,
            avg_sell_price: Decimal::ZERO,
            sell_notional: Decimal::ZERO,
            current_price: Decimal::ZERO,
            gross_interim_pnl: Decimal::ZERO,
            estimated_sell_tax: Decimal::ZERO,
            estimated_sell_fee: Decimal::ZERO,
            net_interim_pnl: Decimal::ZERO,
            current_profit_rate: Decimal::ZERO,
            max_profit_rate: Decimal::ZERO,
            min_profit_locked: false,
            state_version: 0,
            updated_at: now,
        }
    }

    /// Recompute mark-to-market interim P&L from `self.current_price`.
    /// Grounded on `opm/service.py::_refresh_interim_metrics`.
    pub fn refresh_interim_metrics(&mut self) {
        let qty = Decimal::from(self.quantity);
        let mark_to_market = self.current_price * qty;
        self.gross_interim_pnl = mark_to_market - (self.avg_buy_price * qty);
        self.estimated_sell_tax = quantize(mark_to_market * sell_tax_rate(), 4);
        self.estimated_sell_fee = quantize(mark_to_market * sell_fee_rate(), 4);
        self.net_interim_pnl =
            self.gross_interim_pnl - self.estimated_sell_tax - self.estimated_sell_fee;

        let buy_notional = self.avg_buy_price * qty;
        self.current_profit_rate = if buy_notional > Decimal::ZERO {
            quantize(self.net_interim_pnl / buy_notional * Decimal::ONE_HUNDRED, 4)
        } else {
            Decimal::ZERO
        };

        if self.current_profit_rate > self.max_profit_rate {
            self.max_profit_rate = self.current_profit_rate;
        }
        self.min_profit_locked = self.current_profit_rate >= Decimal::ONE;
    }

    /// Apply a BUY fill: grows quantity/notional and recomputes avg buy price.
    pub fn apply_buy_fill(&mut self, price: Decimal, qty: i64) {
        self.buy_notional += price * Decimal::from(qty);
        self.quantity += qty;
        if self.quantity > 0 {
            self.avg_buy_price =
                quantize(self.buy_notional / Decimal::from(self.quantity), 4);
        }
        self.state = PositionState::LongOpen;
        self.state_version += 1;
    }

    /// Apply a SELL fill, clamped to the remaining position quantity.
    pub fn apply_sell_fill(&mut self, price: Decimal, qty: i64) {
        let applied_qty = qty.min(self.quantity);
        self.sell_notional += price * Decimal::from(applied_qty);
        self.sell_quantity += applied_qty;
        self.quantity -= applied_qty;
        if self.sell_quantity > 0 {
            self.avg_sell_price =
                quantize(self.sell_notional / Decimal::from(self.sell_quantity), 4);
        }
        self.state = if self.quantity == 0 {
            PositionState::Closed
        } else {
            PositionState::Exiting
        };
        self.state_version += 1;
    }
}
