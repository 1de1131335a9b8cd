//! Orchestrator (C8/UAG): wires CSM settings, the KIA broker client, OPM,
//! TSE, and PRP persistence into one running engine, and owns the
//! JSON-backed UI monitoring state.

pub mod state;
pub mod uag;

pub use state::{EngineRuntime, EngineState, MonitoringSnapshotDocument, SymbolMonitorSnapshot};
pub use uag::UagOrchestrator;
