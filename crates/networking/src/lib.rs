//! Broker transport layer: mode-routed KIA API client and tolerant gateway.

pub mod kia;

pub use kia::{KiaApiClient, KiaGateway};
