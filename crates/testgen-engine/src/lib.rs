//! Autonomous test generation and maintenance engine
//!
//! Orchestrates injected capabilities (synthesis, judging, execution)
//! through a retrying state machine, gates candidates on execution and
//! judged quality, and keeps accepted tests consistent with their source
//! units across edits via the fingerprint store.
//!
//! Entry point: [`TestGenEngine`] with `generate`, `update`, and
//! `affected_units`.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cache;
pub mod capabilities;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod orchestrator;
pub mod report;
pub mod sandbox;
pub mod tracker;

pub use cache::{GateDecision, ResultCache};
pub use capabilities::{
    AttemptFeedback, CodeSynthesizer, Judgment, PytestRunner, QualityJudge, RunOutcome, RunStatus,
    TestRunner, UnitContext,
};
pub use config::EngineConfig;
pub use engine::{Target, TestGenEngine};
pub use error::{EngineError, JudgeError, RunnerError, SynthesisError};
pub use gate::QualityGate;
pub use orchestrator::{CancelFlag, Candidate, GenerationOrchestrator, UnitOutcome};
pub use report::{GenerationReport, MaintenanceReport, UnitChange};
pub use sandbox::{ExecutionResult, ExecutionSandbox};
pub use tracker::MaintenanceTracker;

/// Engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
