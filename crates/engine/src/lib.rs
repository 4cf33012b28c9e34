//! # MarketPulse Engine
//!
//! The orchestration layer. For each monitored instrument it loads recent bars,
//! runs the enabled detectors, reconciles their findings and persists them.
//!
//! ## Architectural Principles
//!
//! - **Layer 3 Orchestration:** Depends on the detectors and on the `database`
//!   collaborator traits, never on a concrete store.
//! - **Failure Isolation:** A detector error or panic, an unknown symbol or a bad
//!   window affects only that (instrument, detector) pair and is recorded in the
//!   `RunReport`. Only a persistence failure stops a run.
//! - **Idempotent Runs:** No state survives a run. Findings are keyed naturally and
//!   upserted, so re-running over the same data changes nothing.
//!
//! ## Public API
//!
//! - `Orchestrator`: Builds and runs the detection pipeline (`run`, `run_symbol`).
//! - `reconcile`: Collapses findings that share a natural key.
//! - `RunReport`, `InstrumentOutcome`, `DetectorStats`, `DetectorFailure`: Run results.
//! - `EngineError`: The specific error types that can be returned from this crate.

pub mod error;
pub mod orchestrator;
pub mod reconciler;
pub mod report;

pub use error::EngineError;
pub use orchestrator::Orchestrator;
pub use reconciler::reconcile;
pub use report::{DetectorFailure, DetectorStats, InstrumentOutcome, RunReport};
