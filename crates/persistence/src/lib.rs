//! Event-sourced persistence for strategy/order/execution events, position
//! snapshots, and daily P&L reports.

pub mod reporting;
pub mod sqlite;

pub use sqlite::Database;
