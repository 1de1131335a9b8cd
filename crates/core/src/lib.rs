//! Shared data models, errors, and pure math for the trading engine.

pub mod csm;
pub mod errors;
pub mod models;
pub mod rules;
pub mod tick;
pub mod types;

pub use errors::{EngineError, Result};
pub use models::*;
pub use types::*;
