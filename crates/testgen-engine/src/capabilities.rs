//! External capability seams
//!
//! The engine consumes three long-latency, possibly non-deterministic
//! capabilities through narrow traits so each is independently
//! substitutable: a synthesizer that produces candidate test code, a
//! judge that scores it, and a runner that executes it. Trait objects are
//! injected into the orchestrator; nothing in the engine depends on a
//! concrete implementation.

use crate::error::{JudgeError, RunnerError, SynthesisError};
use std::path::Path;
use std::process::Stdio;
use testgen_unit::Unit;

/// Everything a synthesis attempt may see about its unit
///
/// Carries the full file text snapshotted at extraction time, so the
/// sandbox always executes against the working-tree state the candidate
/// was generated for, never the live source.
#[derive(Debug, Clone)]
pub struct UnitContext {
    /// The unit under test
    pub unit: Unit,
    /// Full source text of the owning file at extraction time
    pub file_source: String,
}

impl UnitContext {
    /// Create a context from a unit and its file snapshot
    #[inline]
    #[must_use]
    pub fn new(unit: Unit, file_source: impl Into<String>) -> Self {
        Self {
            unit,
            file_source: file_source.into(),
        }
    }

    /// Module name the sandbox exposes the file under (`calc` for
    /// `src/calc.py`)
    #[must_use]
    pub fn module_name(&self) -> String {
        Path::new(&self.unit.id.path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("module")
            .to_string()
    }
}

/// Why the previous attempt was rejected, passed forward so retries are
/// informed rather than blind resampling.
#[derive(Debug, Clone)]
pub struct AttemptFeedback {
    /// 0-based index of the attempt that failed
    pub attempt: u32,
    /// Failure text: compile error, assertion output, or judge reasoning
    pub message: String,
}

impl AttemptFeedback {
    /// Create feedback for a failed attempt
    #[inline]
    #[must_use]
    pub fn new(attempt: u32, message: impl Into<String>) -> Self {
        Self {
            attempt,
            message: message.into(),
        }
    }
}

/// Generation capability: produces one candidate test per call
///
/// Output is untrusted and always passes through execution and the
/// quality gate before acceptance.
#[async_trait::async_trait]
pub trait CodeSynthesizer: Send + Sync {
    /// Synthesize candidate test source for a unit
    ///
    /// # Errors
    /// A failure consumes one semantic retry attempt.
    async fn synthesize(
        &self,
        ctx: &UnitContext,
        feedback: Option<&AttemptFeedback>,
    ) -> Result<String, SynthesisError>;
}

/// Outcome of holistic quality judgment
#[derive(Debug, Clone)]
pub struct Judgment {
    /// Score on a 10-point scale
    pub score: f64,
    /// Judge's own pass verdict (advisory; the gate compares against its
    /// configured threshold)
    pub passed: bool,
    /// Free-text reasoning, used as retry feedback
    pub reasoning: String,
}

/// Judging capability: scores test code against criteria
///
/// May be non-deterministic; the result cache in front of it is what
/// makes repeated identical judgments reproducible.
#[async_trait::async_trait]
pub trait QualityJudge: Send + Sync {
    /// Judge test source against the given criteria
    ///
    /// # Errors
    /// A failure is treated like a rejected attempt.
    async fn judge(&self, test_source: &str, criteria: &str) -> Result<Judgment, JudgeError>;
}

/// Structured run status, distinguishing "tests ran and failed" from
/// "no tests collected"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// All tests passed
    Passed,
    /// Tests ran and at least one failed
    Failed,
    /// The runner found nothing to execute
    NoTestsCollected,
}

/// Raw result from the test-runner capability
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Structured status
    pub status: RunStatus,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Process exit code
    pub exit_code: i32,
}

/// Test-execution capability: runs one test file inside a working
/// directory prepared by the sandbox
#[async_trait::async_trait]
pub trait TestRunner: Send + Sync {
    /// Run the test file and report a structured outcome
    ///
    /// # Errors
    /// Only infrastructure faults (spawn failure, I/O breakage) are
    /// errors; failing tests are a normal `RunOutcome`.
    async fn run(&self, workdir: &Path, test_file: &Path) -> Result<RunOutcome, RunnerError>;
}

/// Default runner: pytest as a subprocess
///
/// Exit code mapping follows pytest: 0 passed, 5 no tests collected,
/// anything else is a failure.
#[derive(Debug, Clone, Default)]
pub struct PytestRunner;

#[async_trait::async_trait]
impl TestRunner for PytestRunner {
    async fn run(&self, workdir: &Path, test_file: &Path) -> Result<RunOutcome, RunnerError> {
        let output = tokio::process::Command::new("pytest")
            .arg(test_file)
            .arg("-v")
            .arg("--tb=short")
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RunnerError(format!("failed to spawn pytest: {e}")))?;

        let exit_code = output.status.code().unwrap_or(-1);
        let status = match exit_code {
            0 => RunStatus::Passed,
            5 => RunStatus::NoTestsCollected,
            _ => RunStatus::Failed,
        };
        Ok(RunOutcome {
            status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testgen_unit::UnitExtractor;

    fn sample_context() -> UnitContext {
        let src = "def add(a, b):\n    return a + b\n";
        let unit = UnitExtractor::new()
            .unwrap()
            .extract("src/calc.py", src)
            .unwrap()
            .remove(0);
        UnitContext::new(unit, src)
    }

    #[test]
    fn module_name_from_path() {
        let ctx = sample_context();
        assert_eq!(ctx.module_name(), "calc");
    }

    #[test]
    fn feedback_carries_attempt_index() {
        let fb = AttemptFeedback::new(1, "no meaningful assertion");
        assert_eq!(fb.attempt, 1);
        assert!(fb.message.contains("assertion"));
    }
}
