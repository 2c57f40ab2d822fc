//! # AgentScan core
//!
//! The orchestration/scheduler pipeline and consensus engine behind a
//! multi-agent static-analysis platform. A client submits a scan
//! request; the scheduler fans it out to independent analyzer agents
//! with bounded concurrency and retries; the consensus engine merges
//! their findings into a calibrated, deduplicated report.
//!
//! The HTTP edge, persistent stores, and the analyzer agents
//! themselves are external collaborators — this crate defines the
//! abstract interfaces they plug into (`store`, `queue`, `executor::Agent`)
//! and owns the hard engineering: admission, scheduling, execution
//! bookkeeping, and consensus scoring.

/// Admission & lifecycle: submit/status/cancel/retry entry points.
pub mod admission;
/// Runtime configuration.
pub mod config;
/// System-wide default constants.
pub mod constants;
/// Consensus engine: grouping, scoring, calibration.
pub mod consensus;
/// Error taxonomy.
pub mod error;
/// Agent capability trait and the executor that drives it.
pub mod executor;
/// Core data model.
pub mod models;
/// Durable priority queue interface.
pub mod queue;
/// Scheduler: fan-out, retries, cancellation, job lifecycle.
pub mod scheduler;
/// Abstract repository interfaces and in-memory reference impls.
pub mod store;

pub use error::{AgentScanError, Result};
