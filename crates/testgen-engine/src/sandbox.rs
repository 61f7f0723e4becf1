//! Execution sandbox
//!
//! Runs a candidate against an isolated copy of the working-tree state
//! captured at extraction time, never the live source. Each run gets a
//! fresh temp directory holding the snapshotted source file and the
//! candidate test file; the runner capability executes inside it under a
//! wall-clock timeout. A timeout is a failed result with the timed-out
//! marker, not an infrastructure fault.

use crate::capabilities::{RunStatus, TestRunner, UnitContext};
use crate::error::RunnerError;
use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of running a candidate or an existing test record
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Whether the run counts as passing
    pub passed: bool,
    /// Structured status from the runner
    pub status: RunStatus,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Process exit code, if the run got that far
    pub exit_code: Option<i32>,
    /// Wall-clock duration of the run
    pub duration: Duration,
    /// Set when the per-run timeout fired
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Diagnostic text for gate feedback: stderr if present, stdout
    /// otherwise
    #[must_use]
    pub fn diagnostics(&self) -> &str {
        if self.timed_out {
            "execution timed out"
        } else if !self.stderr.trim().is_empty() {
            &self.stderr
        } else {
            &self.stdout
        }
    }
}

/// Isolated execution of candidate tests
pub struct ExecutionSandbox {
    runner: Arc<dyn TestRunner>,
    timeout: Duration,
}

impl std::fmt::Debug for ExecutionSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSandbox")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ExecutionSandbox {
    /// Create a sandbox around a runner capability
    #[inline]
    #[must_use]
    pub fn new(runner: Arc<dyn TestRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    /// Run `test_source` against the unit's snapshotted file
    ///
    /// The working copy contains the source module (importable under its
    /// file stem) and the test file, which imports the module before the
    /// candidate body.
    ///
    /// # Errors
    /// Returns [`RunnerError`] only for infrastructure faults; timeouts
    /// and failing tests come back as a normal [`ExecutionResult`].
    pub async fn run(
        &self,
        test_source: &str,
        ctx: &UnitContext,
    ) -> Result<ExecutionResult, RunnerError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| RunnerError(format!("failed to create sandbox dir: {e}")))?;

        let module = ctx.module_name();
        let source_path = workdir.path().join(format!("{module}.py"));
        fs::write(&source_path, &ctx.file_source)
            .map_err(|e| RunnerError(format!("failed to write source copy: {e}")))?;

        let test_path = workdir.path().join(format!("test_{module}.py"));
        let test_body = render_test_file(&module, test_source);
        fs::write(&test_path, test_body)
            .map_err(|e| RunnerError(format!("failed to write candidate: {e}")))?;

        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.runner.run(workdir.path(), &test_path))
            .await
        {
            Ok(Ok(outcome)) => {
                let passed = outcome.status == RunStatus::Passed;
                tracing::debug!(
                    unit = %ctx.unit.id,
                    passed,
                    exit_code = outcome.exit_code,
                    "sandbox run finished"
                );
                Ok(ExecutionResult {
                    passed,
                    status: outcome.status,
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                    exit_code: Some(outcome.exit_code),
                    duration: started.elapsed(),
                    timed_out: false,
                })
            }
            Ok(Err(fault)) => Err(fault),
            Err(_) => {
                tracing::warn!(unit = %ctx.unit.id, timeout = ?self.timeout, "sandbox run timed out");
                Ok(ExecutionResult {
                    passed: false,
                    status: RunStatus::Failed,
                    stdout: String::new(),
                    stderr: format!("timed out after {:?}", self.timeout),
                    exit_code: None,
                    duration: started.elapsed(),
                    timed_out: true,
                })
            }
        }
    }
}

/// A test file imports the snapshotted module, then the candidate body
fn render_test_file(module: &str, test_source: &str) -> String {
    if test_source.contains(&format!("import {module}")) {
        test_source.to_string()
    } else {
        format!("from {module} import *\n\n{test_source}")
    }
}
