//! Quality gate
//!
//! The composed accept/reject decision, three stages that each
//! short-circuit the next on clear failure:
//! 1. execution check — a failing run is rejected with its error text,
//!    no judgment performed
//! 2. structural check — cheap, purely syntactic: the candidate must
//!    contain at least one meaningful assertion
//! 3. holistic judgment — the external judging capability, consulted
//!    only behind the result cache
//!
//! Stages 1 and 2 are deterministic; the cache is what makes stage 3
//! reproducible across runs.

use crate::cache::{GateDecision, ResultCache};
use crate::capabilities::{QualityJudge, RunStatus};
use crate::error::JudgeError;
use crate::sandbox::ExecutionResult;
use std::sync::Arc;
use testgen_unit::Unit;

/// The composed accept/reject decision procedure
pub struct QualityGate {
    judge: Arc<dyn QualityJudge>,
    cache: ResultCache,
    threshold: f64,
    criteria: String,
}

impl std::fmt::Debug for QualityGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityGate")
            .field("threshold", &self.threshold)
            .field("criteria", &self.criteria)
            .finish_non_exhaustive()
    }
}

impl QualityGate {
    /// Create a gate around a judging capability
    #[must_use]
    pub fn new(
        judge: Arc<dyn QualityJudge>,
        cache: ResultCache,
        threshold: f64,
        criteria: impl Into<String>,
    ) -> Self {
        Self {
            judge,
            cache,
            threshold,
            criteria: criteria.into(),
        }
    }

    /// The result cache (shared with engine-level reporting)
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Judge a candidate given its execution result
    ///
    /// # Errors
    /// Returns [`JudgeError`] only when stage 3 runs and the judging
    /// capability itself fails; rejections are normal decisions.
    pub async fn judge(
        &self,
        unit: &Unit,
        candidate_source: &str,
        exec: &ExecutionResult,
    ) -> Result<GateDecision, JudgeError> {
        // Stage 1: execution outcome
        if !exec.passed {
            let feedback = match exec.status {
                RunStatus::NoTestsCollected => "no tests collected".to_string(),
                _ => exec.diagnostics().to_string(),
            };
            tracing::debug!(unit = %unit.id, "gate: rejected at execution stage");
            return Ok(GateDecision::rejected(feedback));
        }

        // Stage 2: structural assertion check, cheap and syntactic
        if !has_meaningful_assertion(candidate_source) {
            tracing::debug!(unit = %unit.id, "gate: rejected at structural stage");
            return Ok(GateDecision::rejected("no meaningful assertion"));
        }

        // Stage 3: holistic judgment, behind the cache
        let key = ResultCache::key(
            &unit.rendered_signature(),
            candidate_source,
            &self.criteria,
        );
        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(unit = %unit.id, "gate: cache hit, skipping judgment");
            return Ok(cached);
        }

        let judgment = self.judge.judge(candidate_source, &self.criteria).await?;
        let decision = GateDecision {
            accepted: judgment.score >= self.threshold,
            score: judgment.score,
            feedback: judgment.reasoning,
        };
        self.cache.insert(key, decision.clone()).await;
        tracing::debug!(
            unit = %unit.id,
            score = decision.score,
            accepted = decision.accepted,
            "gate: judged"
        );
        Ok(decision)
    }
}

/// Does the candidate contain at least one assertion that could fail?
///
/// Rejects bodies whose only assertions are tautologies (`assert True`,
/// `assert 1`, literal-equals-same-literal). `pytest.raises` blocks
/// count as meaningful.
#[must_use]
pub fn has_meaningful_assertion(source: &str) -> bool {
    for line in source.lines() {
        let line = line.trim();
        if line.starts_with("with pytest.raises") || line.starts_with("pytest.raises") {
            return true;
        }
        let Some(expr) = line.strip_prefix("assert ").or_else(|| {
            (line == "assert").then_some("")
        }) else {
            continue;
        };
        if !is_tautology(expr.trim()) {
            return true;
        }
    }
    false
}

fn is_tautology(expr: &str) -> bool {
    if expr.is_empty() || is_literal(expr) {
        return true;
    }
    // Literal compared with itself: `1 == 1`, `'a' == 'a'`
    if let Some((lhs, rhs)) = expr.split_once("==") {
        let (lhs, rhs) = (lhs.trim(), rhs.trim());
        if lhs == rhs && is_literal(lhs) {
            return true;
        }
    }
    false
}

/// Bare constants whose truthiness never depends on the code under test:
/// numbers, strings, `True`/`False`/`None`, and list/dict/set displays.
/// Comprehensions are excluded since they can be empty at runtime.
fn is_literal(expr: &str) -> bool {
    if expr.parse::<f64>().is_ok() || matches!(expr, "True" | "False" | "None") {
        return true;
    }
    if expr.len() >= 2
        && ((expr.starts_with('\'') && expr.ends_with('\''))
            || (expr.starts_with('"') && expr.ends_with('"')))
    {
        return true;
    }
    let display = (expr.starts_with('[') && expr.ends_with(']'))
        || (expr.starts_with('{') && expr.ends_with('}'));
    display && !expr.contains(" for ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::Judgment;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use testgen_unit::UnitExtractor;

    fn sample_unit() -> Unit {
        UnitExtractor::new()
            .unwrap()
            .extract("src/calc.py", "def add(a, b):\n    return a + b\n")
            .unwrap()
            .remove(0)
    }

    fn passing_exec() -> ExecutionResult {
        ExecutionResult {
            passed: true,
            status: RunStatus::Passed,
            stdout: "1 passed".to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            duration: Duration::from_millis(50),
            timed_out: false,
        }
    }

    fn failing_exec() -> ExecutionResult {
        ExecutionResult {
            passed: false,
            status: RunStatus::Failed,
            stdout: String::new(),
            stderr: "AssertionError: assert 4 == 5".to_string(),
            exit_code: Some(1),
            duration: Duration::from_millis(50),
            timed_out: false,
        }
    }

    /// Judge stub that counts calls and returns scripted scores
    struct ScriptedJudge {
        calls: AtomicUsize,
        scores: Vec<f64>,
    }

    impl ScriptedJudge {
        fn new(scores: Vec<f64>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                scores,
            }
        }
    }

    #[async_trait::async_trait]
    impl QualityJudge for ScriptedJudge {
        async fn judge(&self, _: &str, _: &str) -> Result<Judgment, JudgeError> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            let score = self.scores.get(i).copied().unwrap_or(0.0);
            Ok(Judgment {
                score,
                passed: score >= 7.0,
                reasoning: format!("scored {score}"),
            })
        }
    }

    fn gate(judge: Arc<ScriptedJudge>) -> QualityGate {
        QualityGate::new(judge, ResultCache::new(100), 7.0, "criteria")
    }

    #[tokio::test]
    async fn failing_execution_rejects_without_judgment() {
        let judge = Arc::new(ScriptedJudge::new(vec![10.0]));
        let gate = gate(judge.clone());

        let decision = gate
            .judge(&sample_unit(), "assert add(2, 3) == 5", &failing_exec())
            .await
            .unwrap();
        assert!(!decision.accepted);
        assert!(decision.feedback.contains("AssertionError"));
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tautology_rejects_before_judgment() {
        let judge = Arc::new(ScriptedJudge::new(vec![10.0]));
        let gate = gate(judge.clone());

        let decision = gate
            .judge(&sample_unit(), "def test_x():\n    assert True\n", &passing_exec())
            .await
            .unwrap();
        assert!(!decision.accepted);
        assert_eq!(decision.feedback, "no meaningful assertion");
        assert_eq!(judge.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn accepts_at_threshold() {
        let judge = Arc::new(ScriptedJudge::new(vec![8.0]));
        let gate = gate(judge);

        let decision = gate
            .judge(
                &sample_unit(),
                "def test_add():\n    assert add(2, 3) == 5\n",
                &passing_exec(),
            )
            .await
            .unwrap();
        assert!(decision.accepted);
        assert_eq!(decision.score, 8.0);
    }

    #[tokio::test]
    async fn rejects_below_threshold() {
        let judge = Arc::new(ScriptedJudge::new(vec![5.0]));
        let gate = gate(judge);

        let decision = gate
            .judge(
                &sample_unit(),
                "def test_add():\n    assert add(2, 3) == 5\n",
                &passing_exec(),
            )
            .await
            .unwrap();
        assert!(!decision.accepted);
    }

    #[tokio::test]
    async fn cache_short_circuits_second_judgment() {
        // Judge would return a different score on the second call; the
        // cache must serve the first decision instead.
        let judge = Arc::new(ScriptedJudge::new(vec![8.0, 2.0]));
        let gate = gate(judge.clone());

        let source = "def test_add():\n    assert add(2, 3) == 5\n";
        let first = gate
            .judge(&sample_unit(), source, &passing_exec())
            .await
            .unwrap();
        let second = gate
            .judge(&sample_unit(), source, &passing_exec())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_tests_collected_is_distinct_feedback() {
        let judge = Arc::new(ScriptedJudge::new(vec![]));
        let gate = gate(judge);

        let exec = ExecutionResult {
            passed: false,
            status: RunStatus::NoTestsCollected,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(5),
            duration: Duration::ZERO,
            timed_out: false,
        };
        let decision = gate
            .judge(&sample_unit(), "def helper():\n    pass\n", &exec)
            .await
            .unwrap();
        assert_eq!(decision.feedback, "no tests collected");
    }

    #[test]
    fn structural_check_cases() {
        assert!(has_meaningful_assertion("assert add(2, 3) == 5"));
        assert!(has_meaningful_assertion("with pytest.raises(ValueError):\n    f(-1)"));
        assert!(has_meaningful_assertion("assert result is None"));

        assert!(!has_meaningful_assertion("assert True"));
        assert!(!has_meaningful_assertion("assert 1"));
        assert!(!has_meaningful_assertion("assert 1 == 1"));
        assert!(!has_meaningful_assertion("assert 'a' == 'a'"));
        assert!(!has_meaningful_assertion("assert 'hello'"));
        assert!(!has_meaningful_assertion("assert [1, 2]"));
        assert!(!has_meaningful_assertion("assert {'a': 1}"));
        assert!(!has_meaningful_assertion("def test_x():\n    pass"));
        assert!(!has_meaningful_assertion(""));

        // A comprehension can be empty at runtime, so it can fail
        assert!(has_meaningful_assertion("assert [x for x in xs]"));
    }

    #[test]
    fn real_assertions_beat_tautologies_in_same_body() {
        let body = "def test_x():\n    assert True\n    assert add(1, 1) == 2\n";
        assert!(has_meaningful_assertion(body));
    }
}
