//! Broker transport for the Korea Investment & Ahnmoo (KIA) REST API:
//! mode routing, token refresh, retry, idempotency, and tolerant decoding.

pub mod client;
pub mod contracts;
pub mod endpoint;
pub mod error_mapper;
pub mod gateway;
pub mod idempotency;
pub mod mock_client;
pub mod retry;
pub mod token;

pub use client::KiaApiClient;
pub use gateway::KiaGateway;
