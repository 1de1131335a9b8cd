//! Order/position management, trading-strategy state machine, and the
//! quote monitoring loop that drives them.

pub mod opm;
pub mod quote_loop;
pub mod tse;

pub use quote_loop::{spawn_quote_loop, CycleOutcome, QuoteLoopConfig, QuoteLoopHandle, QuoteLoopState};
pub use tse::{BrokerPositionState, PositionUpdateEvent, QuoteEvent, TseOutputs, TseService};
