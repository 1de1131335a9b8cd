//! Order aggregate and its allowed state transitions (spec.md §4.5).

use crate::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingSubmit,
    Submitted,
    Accepted,
    PartiallyFilled,
    Filled,
    Rejected,
    Canceled,
    Reconciling,
}

/// Allowed transitions out of each status. Grounded on `opm/state_machine.py`.
fn allowed_next(status: OrderStatus) -> HashSet<OrderStatus> {
    use OrderStatus::*;
    match status {
        PendingSubmit => [Submitted].into_iter().collect(),
        Submitted => [Accepted, Rejected, Reconciling].into_iter().collect(),
        Accepted => [PartiallyFilled, Filled, Canceled, Reconciling]
            .into_iter()
            .collect(),
        PartiallyFilled => [Filled, Canceled, Reconciling].into_iter().collect(),
        Reconciling => [Accepted, PartiallyFilled, Filled, Rejected]
            .into_iter()
            .collect(),
        Filled | Rejected | Canceled => HashSet::new(),
    }
}

pub fn is_terminal(status: OrderStatus) -> bool {
    matches!(
        status,
        OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Canceled
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAggregate {
    pub order_aggregate_id: String,
    pub trading_date: chrono::NaiveDate,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub requested_price: Decimal,
    pub requested_qty: i64,
    pub status: OrderStatus,
    pub broker_order_id: Option<String>,
    pub client_order_id: String,
    pub cum_executed_qty: i64,
    pub avg_executed_price: Decimal,
    pub remaining_qty: i64,
    pub last_error_code: Option<String>,
    pub last_updated_at: DateTime<Utc>,
}

impl OrderAggregate {
    /// Apply a status transition, validating it against the allowed-next
    /// table. Any other transition is an `OPM_ILLEGAL_TRANSITION` error that
    /// fails this attempt without killing the caller (spec.md §7).
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<()> {
        if !allowed_next(self.status).contains(&next) {
            return Err(EngineError::OpmIllegalTransition {
                from: format!("{:?}", self.status),
                to: format!("{:?}", next),
            });
        }
        self.status = next;
        self.last_updated_at = now;
        Ok(())
    }
}

/// A single fill reported by the broker for a submitted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionFill {
    pub execution_id: String,
    pub broker_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub qty: i64,
    pub executed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_submit_can_only_move_to_submitted() {
        assert!(allowed_next(OrderStatus::PendingSubmit).contains(&OrderStatus::Submitted));
        assert_eq!(allowed_next(OrderStatus::PendingSubmit).len(), 1);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        assert!(allowed_next(OrderStatus::Filled).is_empty());
        assert!(allowed_next(OrderStatus::Rejected).is_empty());
        assert!(allowed_next(OrderStatus::Canceled).is_empty());
    }

    #[test]
    fn illegal_transition_is_rejected_without_mutating_state() {
        let mut order = OrderAggregate {
            order_aggregate_id: "opm-test".into(),
            trading_date: chrono::NaiveDate::from_ymd_opt(2026, 2, 17).unwrap(),
            symbol: "005930".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            requested_price: Decimal::new(100, 0),
            requested_qty: 10,
            status: OrderStatus::PendingSubmit,
            broker_order_id: None,
            client_order_id: "coid-1".into(),
            cum_executed_qty: 0,
            avg_executed_price: Decimal::ZERO,
            remaining_qty: 10,
            last_error_code: None,
            last_updated_at: Utc::now(),
        };
        let err = order.transition(OrderStatus::Filled, Utc::now());
        assert!(err.is_err());
        assert_eq!(order.status, OrderStatus::PendingSubmit);
    }
}
