//! Error types for the TestGen engine
//!
//! The taxonomy follows the engine's failure semantics:
//! - parse failures abort one file, never the pass
//! - synthesis failures consume a retry attempt
//! - sandbox faults have their own small retry budget and surface as
//!   [`EngineError::ExecutionInfrastructure`] when exhausted
//! - quality rejection and retry-budget exhaustion are normal per-unit
//!   outcomes reported to the caller, not errors
//! - store faults are fatal to the whole pass

use std::path::PathBuf;
use testgen_store::StoreError;
use testgen_unit::ExtractError;

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Source extraction failed (aborts that file only)
    #[error("extraction failed: {0}")]
    Extract(#[from] ExtractError),

    /// Fingerprint store failure (fatal to the pass)
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Sandbox infrastructure fault after its retry budget was spent
    #[error("execution infrastructure failure after {attempts} attempts: {message}")]
    ExecutionInfrastructure {
        /// Sandbox diagnostic
        message: String,
        /// Infra retries consumed
        attempts: u32,
    },

    /// Filesystem failure outside the store (reading sources, writing tests)
    #[error("io error at {path}: {source}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Target string could not be understood
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// The pass was cancelled before this unit was scheduled
    #[error("pass cancelled")]
    Cancelled,
}

impl EngineError {
    /// Wrap an I/O error with the path it concerned
    #[inline]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the error aborts the whole pass (infrastructure-level)
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Io { .. })
    }
}

/// The generation capability failed to produce a candidate
///
/// Consumes one semantic retry attempt, per the orchestrator's budget.
#[derive(Debug, thiserror::Error)]
#[error("synthesis failed: {0}")]
pub struct SynthesisError(pub String);

/// The judging capability failed
///
/// Treated like a rejected attempt: the failure text becomes feedback
/// for the next synthesis call.
#[derive(Debug, thiserror::Error)]
#[error("judgment failed: {0}")]
pub struct JudgeError(pub String);

/// The test-runner capability faulted (spawn failure, broken pipe)
///
/// This is an infrastructure fault, not a test failure; it is retried on
/// the separate infra budget.
#[derive(Debug, thiserror::Error)]
#[error("test runner fault: {0}")]
pub struct RunnerError(pub String);
