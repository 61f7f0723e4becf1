//! Result cache for gate decisions
//!
//! Memoizes Quality Gate outcomes keyed by a canonical hash of
//! (unit signature, candidate source, judging criteria). The judging
//! capability may be non-deterministic; serving identical keys from the
//! cache converts repeated judgment calls into deterministic decisions
//! and never double-charges evaluation cost.

use moka::future::Cache;
use testgen_unit::Fingerprint;

/// A gate decision, cached and returned to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    /// Accept or reject
    pub accepted: bool,
    /// Score on a 10-point scale (0.0 when rejected before judgment)
    pub score: f64,
    /// Feedback text: error output, structural diagnosis, or judge
    /// reasoning
    pub feedback: String,
}

impl GateDecision {
    /// A rejection with feedback, scored zero
    #[inline]
    #[must_use]
    pub fn rejected(feedback: impl Into<String>) -> Self {
        Self {
            accepted: false,
            score: 0.0,
            feedback: feedback.into(),
        }
    }
}

/// Memoized gate decisions keyed by canonical hash
#[derive(Debug, Clone)]
pub struct ResultCache {
    inner: Cache<Fingerprint, GateDecision>,
}

impl ResultCache {
    /// Create a cache with max capacity
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Canonical key: hash of (signature, candidate source, criteria)
    ///
    /// Parts are delimiter-separated so the key is injective over its
    /// inputs.
    #[must_use]
    pub fn key(signature: &str, candidate_source: &str, criteria: &str) -> Fingerprint {
        Fingerprint::compute_parts(&[
            signature.as_bytes(),
            candidate_source.as_bytes(),
            criteria.as_bytes(),
        ])
    }

    /// Fetch a cached decision
    #[inline]
    pub async fn get(&self, key: &Fingerprint) -> Option<GateDecision> {
        self.inner.get(key).await
    }

    /// Store a decision
    #[inline]
    pub async fn insert(&self, key: Fingerprint, decision: GateDecision) {
        self.inner.insert(key, decision).await;
    }

    /// Approximate entry count
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}
