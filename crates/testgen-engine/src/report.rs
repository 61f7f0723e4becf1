//! Pass reports
//!
//! A generation or maintenance pass always completes with a report
//! enumerating what happened to every unit — partial success is the
//! normal case. Reports serialize, so presentation layers (CLI, CI) can
//! render them without touching engine internals.

use crate::orchestrator::UnitOutcome;
use serde::Serialize;
use testgen_store::TestRecord;
use testgen_unit::UnitId;

/// Classification of one unit by the maintenance scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitChange {
    /// Current fingerprint equals the stored one
    Unchanged,
    /// Fingerprint differs from the stored one
    Modified,
    /// No stored entry for this identity
    New,
    /// Stored entry whose unit no longer exists in source
    Deleted,
}

/// Result of a generation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationReport {
    /// Units whose candidates were accepted and persisted
    pub accepted: Vec<TestRecord>,
    /// Units that exhausted their retry budget, with the last feedback
    pub abandoned: Vec<(UnitId, String)>,
    /// Units that hit engine errors, with the error text
    pub errored: Vec<(UnitId, String)>,
    /// Units never scheduled because the pass was cancelled
    pub cancelled: Vec<UnitId>,
    /// Units excluded by a focused target (`file.py::name`)
    pub skipped: Vec<UnitId>,
}

impl GenerationReport {
    /// Build a report from per-unit outcomes
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<(UnitId, UnitOutcome)>) -> Self {
        let mut report = Self::default();
        for (id, outcome) in outcomes {
            match outcome {
                UnitOutcome::Accepted { record, .. } => report.accepted.push(record),
                UnitOutcome::Abandoned { last_feedback, .. } => {
                    report.abandoned.push((id, last_feedback));
                }
                UnitOutcome::Errored { message } => report.errored.push((id, message)),
                UnitOutcome::Cancelled => report.cancelled.push(id),
            }
        }
        report
    }

    /// Total units the pass touched (skipped included)
    #[must_use]
    pub fn total(&self) -> usize {
        self.accepted.len()
            + self.abandoned.len()
            + self.errored.len()
            + self.cancelled.len()
            + self.skipped.len()
    }

    /// Whether every scheduled unit was accepted
    #[inline]
    #[must_use]
    pub fn all_accepted(&self) -> bool {
        self.abandoned.is_empty() && self.errored.is_empty() && self.cancelled.is_empty()
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: GenerationReport) {
        self.accepted.extend(other.accepted);
        self.abandoned.extend(other.abandoned);
        self.errored.extend(other.errored);
        self.cancelled.extend(other.cancelled);
        self.skipped.extend(other.skipped);
    }
}

/// Result of a maintenance pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct MaintenanceReport {
    /// Scan classification for every unit in scope, in identity order
    pub classification: Vec<(UnitId, UnitChange)>,
    /// Unchanged units, left alone
    pub kept: Vec<UnitId>,
    /// Modified units whose existing tests still pass; fingerprint
    /// advanced with zero synthesis calls
    pub revalidated: Vec<UnitId>,
    /// Generation outcomes for new and escalated units
    pub generation: GenerationReport,
    /// Deleted units whose records were marked stale; removal requires
    /// explicit caller confirmation via the store
    pub pending_removal: Vec<UnitId>,
    /// Units that failed during revalidation infrastructure
    pub errored: Vec<(UnitId, String)>,
    /// Files skipped because their source failed to parse, with the
    /// diagnostic; their stored units are left untouched
    pub failed_files: Vec<(String, String)>,
}

impl MaintenanceReport {
    /// Total units the scan classified
    #[inline]
    #[must_use]
    pub fn total(&self) -> usize {
        self.classification.len()
    }
}
