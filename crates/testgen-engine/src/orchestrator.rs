//! Generation orchestrator
//!
//! Drives the per-unit retry loop: synthesize → execute → judge →
//! accept/retry/abandon. The loop is an explicit state machine with an
//! attempt counter rather than recursion; feedback from each rejected
//! attempt seeds the next synthesis call, so retries are informed.
//!
//! Budgets:
//! - the semantic attempt budget covers synthesis failures and gate
//!   rejections; exhausting it is the terminal `Abandoned` outcome,
//!   reported, never raised
//! - sandbox infrastructure faults retry on a separate, smaller budget
//!   and surface as a distinct infrastructure error when exhausted
//! - a per-unit wall-clock budget forces `Abandoned` even mid-attempt
//!
//! Units within a pass run in parallel under a semaphore; attempts
//! within one unit are strictly sequential. No store lock is held across
//! any await on a capability.

use crate::cache::{GateDecision, ResultCache};
use crate::capabilities::{AttemptFeedback, CodeSynthesizer, UnitContext};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gate::QualityGate;
use crate::sandbox::ExecutionSandbox;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use testgen_store::{FingerprintStore, TestRecord};
use testgen_unit::{Fingerprint, Unit, UnitId};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One generated attempt at a test for a unit
///
/// Immutable after creation; a retry produces a new candidate, never an
/// edit.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Owning unit identity
    pub unit_id: UnitId,
    /// Generated test source
    pub source: String,
    /// 0-based attempt index
    pub attempt: u32,
    /// Canonical hash of (signature, source, criteria)
    pub canonical_hash: Fingerprint,
}

impl Candidate {
    /// Create a candidate for an attempt
    #[must_use]
    pub fn new(unit: &Unit, source: String, attempt: u32, criteria: &str) -> Self {
        let canonical_hash = ResultCache::key(&unit.rendered_signature(), &source, criteria);
        Self {
            unit_id: unit.id.clone(),
            source,
            attempt,
            canonical_hash,
        }
    }
}

/// Phases of one unit's generation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    /// Scheduled, not started
    Pending,
    /// Waiting on the synthesis capability
    Synthesizing,
    /// Running in the sandbox
    Executing,
    /// Waiting on the quality gate
    Judging,
    /// Terminal: candidate promoted to a test record
    Accepted,
    /// Looping back with feedback
    Retry,
    /// Terminal: attempt budget exhausted
    Abandoned,
}

/// Terminal outcome for one unit in a pass
///
/// Every unit gets exactly one outcome; one unit's failure never aborts
/// the batch.
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    /// A candidate was accepted and persisted
    Accepted {
        /// The promoted record
        record: TestRecord,
        /// Attempts consumed (1-based count)
        attempts: u32,
    },
    /// Retry budget exhausted; needs manual attention
    Abandoned {
        /// Attempts consumed
        attempts: u32,
        /// Why the last attempt was rejected
        last_feedback: String,
    },
    /// The unit hit an engine error (infrastructure fault, store failure)
    Errored {
        /// Error description
        message: String,
    },
    /// The pass was cancelled before this unit started
    Cancelled,
}

impl UnitOutcome {
    /// Whether the unit ended with an accepted record
    #[inline]
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Cooperative cancellation for a pass
///
/// Cancelling stops scheduling new units immediately; in-flight attempts
/// finish or hit their own timeouts. Sandboxes are never force-killed
/// mid-write.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives generation for a batch of units
pub struct GenerationOrchestrator {
    synthesizer: Arc<dyn CodeSynthesizer>,
    sandbox: Arc<ExecutionSandbox>,
    gate: Arc<QualityGate>,
    store: Arc<FingerprintStore>,
    config: EngineConfig,
    cancel: CancelFlag,
}

impl std::fmt::Debug for GenerationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GenerationOrchestrator {
    /// Create an orchestrator over injected capabilities and store
    #[must_use]
    pub fn new(
        synthesizer: Arc<dyn CodeSynthesizer>,
        sandbox: Arc<ExecutionSandbox>,
        gate: Arc<QualityGate>,
        store: Arc<FingerprintStore>,
        config: EngineConfig,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            synthesizer,
            sandbox,
            gate,
            store,
            config,
            cancel,
        }
    }

    /// Run a generation pass over a batch of units
    ///
    /// Units are processed in parallel up to the configured concurrency
    /// limit; results come back in unit-identity order. The pass always
    /// completes with an outcome per unit — partial success is the
    /// normal case.
    pub async fn run_pass(
        self: &Arc<Self>,
        contexts: Vec<UnitContext>,
    ) -> Vec<(UnitId, UnitOutcome)> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut join_set = JoinSet::new();
        let mut results: Vec<(UnitId, UnitOutcome)> = Vec::with_capacity(contexts.len());

        for ctx in contexts {
            if self.cancel.is_cancelled() {
                results.push((ctx.unit.id.clone(), UnitOutcome::Cancelled));
                continue;
            }
            let this = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let id = ctx.unit.id.clone();
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (id, UnitOutcome::Cancelled);
                };
                // Queued units count as not yet scheduled
                if this.cancel.is_cancelled() {
                    return (id, UnitOutcome::Cancelled);
                }
                let outcome = this.generate_unit(&ctx).await;
                (id, outcome)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(pair) => results.push(pair),
                Err(e) => tracing::error!("generation task panicked: {e}"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Generate for one unit under the per-unit wall-clock budget
    ///
    /// When the budget fires mid-attempt, the outcome reports the number
    /// of attempts that actually completed.
    pub async fn generate_unit(&self, ctx: &UnitContext) -> UnitOutcome {
        let attempts_run = AtomicU32::new(0);
        match tokio::time::timeout(
            self.config.unit_budget,
            self.attempt_loop(ctx, &attempts_run),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(unit = %ctx.unit.id, "per-unit wall-clock budget exceeded");
                UnitOutcome::Abandoned {
                    attempts: attempts_run.load(Ordering::SeqCst),
                    last_feedback: "per-unit wall-clock budget exceeded".to_string(),
                }
            }
        }
    }

    async fn attempt_loop(&self, ctx: &UnitContext, attempts_run: &AtomicU32) -> UnitOutcome {
        let mut feedback: Option<AttemptFeedback> = None;
        let mut attempt: u32 = 0;
        let mut infra_faults: u32 = 0;

        while attempt < self.config.attempt_budget {
            attempts_run.store(attempt, Ordering::SeqCst);
            tracing::debug!(
                unit = %ctx.unit.id,
                attempt,
                phase = ?AttemptPhase::Synthesizing,
                "attempt started"
            );
            let source = match self.synthesizer.synthesize(ctx, feedback.as_ref()).await {
                Ok(source) => source,
                Err(e) => {
                    // Synthesis failure consumes a semantic attempt
                    tracing::warn!(unit = %ctx.unit.id, attempt, error = %e, "synthesis failed");
                    feedback = Some(AttemptFeedback::new(attempt, e.to_string()));
                    attempt += 1;
                    continue;
                }
            };
            let candidate = Candidate::new(
                &ctx.unit,
                source,
                attempt,
                &self.config.judging_criteria,
            );

            tracing::debug!(
                unit = %ctx.unit.id,
                attempt,
                candidate = %candidate.canonical_hash.short(),
                phase = ?AttemptPhase::Executing,
                "running candidate"
            );
            // Infra faults retry the same candidate on their own budget;
            // the semantic attempt is not consumed and synthesis is not
            // re-invoked.
            let exec = loop {
                match self.sandbox.run(&candidate.source, ctx).await {
                    Ok(result) => break result,
                    Err(fault) => {
                        infra_faults += 1;
                        tracing::warn!(
                            unit = %ctx.unit.id,
                            infra_faults,
                            error = %fault,
                            "sandbox infrastructure fault"
                        );
                        if infra_faults > self.config.infra_retry_budget {
                            let err = EngineError::ExecutionInfrastructure {
                                message: fault.to_string(),
                                attempts: infra_faults,
                            };
                            return UnitOutcome::Errored {
                                message: err.to_string(),
                            };
                        }
                    }
                }
            };

            tracing::debug!(
                unit = %ctx.unit.id,
                attempt,
                phase = ?AttemptPhase::Judging,
                "judging candidate"
            );
            let decision = match self.gate.judge(&ctx.unit, &candidate.source, &exec).await {
                Ok(decision) => decision,
                Err(e) => {
                    feedback = Some(AttemptFeedback::new(attempt, e.to_string()));
                    attempt += 1;
                    continue;
                }
            };

            if decision.accepted {
                tracing::info!(
                    unit = %ctx.unit.id,
                    attempt,
                    score = decision.score,
                    phase = ?AttemptPhase::Accepted,
                    "candidate accepted"
                );
                return match self.promote(ctx, &candidate, &decision).await {
                    Ok(record) => UnitOutcome::Accepted {
                        record,
                        attempts: attempt + 1,
                    },
                    Err(e) => UnitOutcome::Errored {
                        message: e.to_string(),
                    },
                };
            }

            tracing::debug!(
                unit = %ctx.unit.id,
                attempt,
                phase = ?AttemptPhase::Retry,
                feedback = %decision.feedback,
                "candidate rejected"
            );
            feedback = Some(AttemptFeedback::new(attempt, decision.feedback));
            attempt += 1;
        }

        tracing::info!(
            unit = %ctx.unit.id,
            attempts = attempt,
            phase = ?AttemptPhase::Abandoned,
            "abandoned"
        );
        UnitOutcome::Abandoned {
            attempts: attempt,
            last_feedback: feedback.map(|f| f.message).unwrap_or_default(),
        }
    }

    /// Promote an accepted candidate: write the test file, build the
    /// record, commit the store entry.
    async fn promote(
        &self,
        ctx: &UnitContext,
        candidate: &Candidate,
        decision: &GateDecision,
    ) -> Result<TestRecord, EngineError> {
        fs::create_dir_all(&self.config.test_dir)
            .map_err(|e| EngineError::io(&self.config.test_dir, e))?;

        let module = ctx.module_name();
        let unit_slug = ctx.unit.id.qualified_name.replace('.', "_").to_lowercase();
        let location = self
            .config
            .test_dir
            .join(format!("test_{module}_{unit_slug}.py"));
        let body = format!(
            "import pytest\n\nfrom {module} import *\n\n{}\n",
            candidate.source.trim_end()
        );
        fs::write(&location, body).map_err(|e| EngineError::io(&location, e))?;

        let record = TestRecord::new(
            ctx.unit.id.clone(),
            ctx.unit.fingerprint,
            candidate.source.clone(),
            location.to_string_lossy(),
            decision.score,
        );
        self.store
            .commit(ctx.unit.id.clone(), ctx.unit.fingerprint, vec![record.clone()])
            .await?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{
        Judgment, QualityJudge, RunOutcome, RunStatus, TestRunner,
    };
    use crate::error::{JudgeError, RunnerError, SynthesisError};
    use parking_lot::Mutex;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use testgen_unit::UnitExtractor;

    fn sample_context() -> UnitContext {
        let src = "def add(a, b):\n    \"\"\"returns sum of two numbers\"\"\"\n    return a + b\n";
        let unit = UnitExtractor::new()
            .unwrap()
            .extract("src/calc.py", src)
            .unwrap()
            .remove(0);
        UnitContext::new(unit, src)
    }

    struct StubSynthesizer {
        calls: AtomicUsize,
        feedback_log: Mutex<Vec<String>>,
        output: String,
        fail: bool,
    }

    impl StubSynthesizer {
        fn returning(output: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                feedback_log: Mutex::new(Vec::new()),
                output: output.to_string(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                feedback_log: Mutex::new(Vec::new()),
                output: String::new(),
                fail: true,
            }
        }
    }

    #[async_trait::async_trait]
    impl CodeSynthesizer for StubSynthesizer {
        async fn synthesize(
            &self,
            _: &UnitContext,
            feedback: Option<&AttemptFeedback>,
        ) -> Result<String, SynthesisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(fb) = feedback {
                self.feedback_log.lock().push(fb.message.clone());
            }
            if self.fail {
                return Err(SynthesisError("model unavailable".to_string()));
            }
            Ok(self.output.clone())
        }
    }

    struct PassingRunner;

    #[async_trait::async_trait]
    impl TestRunner for PassingRunner {
        async fn run(&self, _: &Path, _: &Path) -> Result<RunOutcome, RunnerError> {
            Ok(RunOutcome {
                status: RunStatus::Passed,
                stdout: "1 passed".to_string(),
                stderr: String::new(),
                exit_code: 0,
            })
        }
    }

    struct FaultyRunner;

    #[async_trait::async_trait]
    impl TestRunner for FaultyRunner {
        async fn run(&self, _: &Path, _: &Path) -> Result<RunOutcome, RunnerError> {
            Err(RunnerError("spawn failed".to_string()))
        }
    }

    struct FixedJudge {
        score: f64,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl QualityJudge for FixedJudge {
        async fn judge(&self, _: &str, _: &str) -> Result<Judgment, JudgeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Judgment {
                score: self.score,
                passed: self.score >= 7.0,
                reasoning: format!("scored {}", self.score),
            })
        }
    }

    fn build(
        synthesizer: Arc<StubSynthesizer>,
        runner: Arc<dyn TestRunner>,
        judge_score: f64,
        store_dir: &Path,
        test_dir: &Path,
    ) -> Arc<GenerationOrchestrator> {
        let config = EngineConfig::new()
            .with_store_dir(store_dir)
            .with_test_dir(test_dir)
            .with_exec_timeout(Duration::from_secs(5));
        let store = Arc::new(FingerprintStore::open(store_dir).unwrap());
        let sandbox = Arc::new(ExecutionSandbox::new(runner, config.exec_timeout));
        let gate = Arc::new(QualityGate::new(
            Arc::new(FixedJudge {
                score: judge_score,
                calls: AtomicUsize::new(0),
            }),
            ResultCache::new(100),
            config.acceptance_threshold,
            config.judging_criteria.clone(),
        ));
        Arc::new(GenerationOrchestrator::new(
            synthesizer,
            sandbox,
            gate,
            store,
            config,
            CancelFlag::new(),
        ))
    }

    #[tokio::test]
    async fn acceptance_promotes_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(StubSynthesizer::returning(
            "def test_add():\n    assert add(2, 3) == 5\n",
        ));
        let orch = build(
            synth.clone(),
            Arc::new(PassingRunner),
            8.0,
            &dir.path().join("store"),
            &dir.path().join("tests"),
        );

        let ctx = sample_context();
        let outcome = orch.generate_unit(&ctx).await;
        let UnitOutcome::Accepted { record, attempts } = outcome else {
            panic!("expected acceptance, got {outcome:?}");
        };
        assert_eq!(attempts, 1);
        assert_eq!(record.score, 8.0);
        assert!(Path::new(&record.location).exists());

        // Store committed the fingerprint with the record set
        let entry = orch.store.lookup(&ctx.unit.id).unwrap();
        assert_eq!(entry.fingerprint, ctx.unit.fingerprint);
        assert_eq!(entry.records.len(), 1);
    }

    #[tokio::test]
    async fn always_failing_synthesis_abandons_at_budget() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(StubSynthesizer::failing());
        let orch = build(
            synth.clone(),
            Arc::new(PassingRunner),
            8.0,
            &dir.path().join("store"),
            &dir.path().join("tests"),
        );

        let outcome = orch.generate_unit(&sample_context()).await;
        let UnitOutcome::Abandoned { attempts, last_feedback } = outcome else {
            panic!("expected abandonment, got {outcome:?}");
        };
        assert_eq!(attempts, 3);
        assert_eq!(synth.calls.load(Ordering::SeqCst), 3);
        assert!(last_feedback.contains("model unavailable"));
    }

    #[tokio::test]
    async fn tautology_feeds_back_no_meaningful_assertion() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(StubSynthesizer::returning(
            "def test_add():\n    assert True\n",
        ));
        let orch = build(
            synth.clone(),
            Arc::new(PassingRunner),
            8.0,
            &dir.path().join("store"),
            &dir.path().join("tests"),
        );

        let outcome = orch.generate_unit(&sample_context()).await;
        assert!(matches!(outcome, UnitOutcome::Abandoned { .. }));

        // Every retry after the first saw the structural feedback
        let log = synth.feedback_log.lock();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|m| m == "no meaningful assertion"));
    }

    struct SlowSynthesizer;

    #[async_trait::async_trait]
    impl CodeSynthesizer for SlowSynthesizer {
        async fn synthesize(
            &self,
            _: &UnitContext,
            _: Option<&AttemptFeedback>,
        ) -> Result<String, SynthesisError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(String::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unit_budget_abandons_mid_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::new()
            .with_store_dir(dir.path().join("store"))
            .with_test_dir(dir.path().join("tests"))
            .with_unit_budget(Duration::from_secs(1));
        let store = Arc::new(FingerprintStore::open(&config.store_dir).unwrap());
        let sandbox = Arc::new(ExecutionSandbox::new(
            Arc::new(PassingRunner),
            config.exec_timeout,
        ));
        let gate = Arc::new(QualityGate::new(
            Arc::new(FixedJudge {
                score: 8.0,
                calls: AtomicUsize::new(0),
            }),
            ResultCache::new(100),
            config.acceptance_threshold,
            config.judging_criteria.clone(),
        ));
        let orch = Arc::new(GenerationOrchestrator::new(
            Arc::new(SlowSynthesizer),
            sandbox,
            gate,
            store,
            config,
            CancelFlag::new(),
        ));

        let outcome = orch.generate_unit(&sample_context()).await;
        let UnitOutcome::Abandoned { attempts, last_feedback } = outcome else {
            panic!("expected abandonment, got {outcome:?}");
        };
        // The deadline hit during the first attempt; none completed
        assert_eq!(attempts, 0);
        assert!(last_feedback.contains("wall-clock"));
    }

    #[tokio::test]
    async fn infra_faults_use_separate_budget() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(StubSynthesizer::returning(
            "def test_add():\n    assert add(2, 3) == 5\n",
        ));
        let orch = build(
            synth.clone(),
            Arc::new(FaultyRunner),
            8.0,
            &dir.path().join("store"),
            &dir.path().join("tests"),
        );

        let outcome = orch.generate_unit(&sample_context()).await;
        let UnitOutcome::Errored { message } = outcome else {
            panic!("expected infrastructure error, got {outcome:?}");
        };
        assert!(message.contains("infrastructure"));
        // Infra retries reran the same candidate; synthesis happened once
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_pass_reports_every_unit() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(StubSynthesizer::returning(
            "def test_add():\n    assert add(2, 3) == 5\n",
        ));
        let orch = build(
            synth,
            Arc::new(PassingRunner),
            8.0,
            &dir.path().join("store"),
            &dir.path().join("tests"),
        );

        let src = "def add(a, b):\n    return a + b\n\ndef sub(a, b):\n    return a - b\n";
        let units = UnitExtractor::new().unwrap().extract("src/calc.py", src).unwrap();
        let contexts: Vec<UnitContext> = units
            .into_iter()
            .map(|u| UnitContext::new(u, src))
            .collect();

        let results = orch.run_pass(contexts).await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, o)| o.is_accepted()));
    }

    #[tokio::test]
    async fn cancellation_stops_scheduling() {
        let dir = tempfile::tempdir().unwrap();
        let synth = Arc::new(StubSynthesizer::returning(
            "def test_add():\n    assert add(2, 3) == 5\n",
        ));
        let orch = build(
            synth,
            Arc::new(PassingRunner),
            8.0,
            &dir.path().join("store"),
            &dir.path().join("tests"),
        );
        orch.cancel.cancel();

        let results = orch.run_pass(vec![sample_context()]).await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0].1, UnitOutcome::Cancelled));
    }
}
