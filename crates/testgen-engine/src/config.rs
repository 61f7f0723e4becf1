//! Engine configuration

use std::path::PathBuf;
use std::time::Duration;

/// Default criteria string handed to the judging capability
pub const DEFAULT_CRITERIA: &str = "well-structured test with meaningful assertions";

/// Configuration for the TestGen engine
///
/// Budgets and thresholds for the generation loop; directories for the
/// store and the written test files.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Where the fingerprint store lives
    pub store_dir: PathBuf,
    /// Where accepted test files are written
    pub test_dir: PathBuf,
    /// Semantic retry budget per unit (synthesis + rejection attempts)
    pub attempt_budget: u32,
    /// Separate, smaller budget for sandbox infrastructure faults
    pub infra_retry_budget: u32,
    /// Minimum judge score (10-point scale) for acceptance
    pub acceptance_threshold: f64,
    /// Criteria string passed to the judging capability
    pub judging_criteria: String,
    /// Wall-clock timeout per execution run
    pub exec_timeout: Duration,
    /// Overall wall-clock budget per unit (sum of retries)
    pub unit_budget: Duration,
    /// Max units processed in parallel within one pass
    pub max_concurrency: usize,
    /// Capacity of the gate-decision result cache
    pub cache_capacity: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from(".testgen/store"),
            test_dir: PathBuf::from("tests"),
            attempt_budget: 3,
            infra_retry_budget: 2,
            acceptance_threshold: 7.0,
            judging_criteria: DEFAULT_CRITERIA.to_string(),
            exec_timeout: Duration::from_secs(30),
            unit_budget: Duration::from_secs(180),
            max_concurrency: 4,
            cache_capacity: 10_000,
        }
    }
}

impl EngineConfig {
    /// Create config with defaults
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the store directory
    #[inline]
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = dir.into();
        self
    }

    /// Set the test output directory
    #[inline]
    #[must_use]
    pub fn with_test_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.test_dir = dir.into();
        self
    }

    /// Set the semantic attempt budget
    #[inline]
    #[must_use]
    pub fn with_attempt_budget(mut self, budget: u32) -> Self {
        self.attempt_budget = budget;
        self
    }

    /// Set the infrastructure retry budget
    #[inline]
    #[must_use]
    pub fn with_infra_retry_budget(mut self, budget: u32) -> Self {
        self.infra_retry_budget = budget;
        self
    }

    /// Set the acceptance threshold (10-point scale)
    #[inline]
    #[must_use]
    pub fn with_acceptance_threshold(mut self, threshold: f64) -> Self {
        self.acceptance_threshold = threshold;
        self
    }

    /// Set the per-run execution timeout
    #[inline]
    #[must_use]
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Set the per-unit wall-clock budget
    #[inline]
    #[must_use]
    pub fn with_unit_budget(mut self, budget: Duration) -> Self {
        self.unit_budget = budget;
        self
    }

    /// Set the pass concurrency limit
    #[inline]
    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }
}
