//! # Sentinel Runtime
//!
//! The single owned runtime value that the SDK front door threads
//! through the system. It owns the component registry, the ledger, the
//! gateway, and the fusion pipeline exclusively, and runs the three
//! concurrent tasks of the platform:
//!
//! 1. the event pump,
//! 2. the component update loop (`ai_processing_rate` Hz), and
//! 3. the consensus monitor (5 s cadence).
//!
//! There is no hidden global state; everything reachable from outside
//! goes through [`Runtime`] handles.

mod audit;
mod backoff;
mod controller;
mod dispatch;
mod telemetry;
mod workers;

pub use audit::{AuditRecord, AuditTrail};
pub use backoff::BackoffPolicy;
pub use controller::{
    CommandRejection, Runtime, RuntimeBuilder, RuntimeDiagnostics, CONSENSUS_INTERVAL,
    DRAIN_WINDOW,
};
pub use dispatch::CommandDispatcher;
pub use telemetry::init_telemetry;
pub use workers::{WorkerError, WorkerPool};
