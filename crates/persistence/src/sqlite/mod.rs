//! SQLite database management

mod connection;
mod repository;

pub use connection::{Database, SCHEMA_VERSION};
pub use repository::{
    append_execution_event, append_order_event, append_strategy_event, exists_execution,
    generate_and_store_daily_report, list_strategy_events, load_latest_state_snapshot,
    save_state_snapshot,
};
