//! Maintenance tracker
//!
//! Diffs current fingerprints against the store and schedules
//! regeneration only for the affected subset. The two-tier policy is the
//! cost-control mechanism of the maintenance loop: a modified unit's
//! existing tests are re-run first (cheap); full regeneration happens
//! only when they fail against the new source. Deleted units have their
//! records marked stale and surfaced for confirmation — removal is never
//! automatic.

use crate::capabilities::UnitContext;
use crate::orchestrator::GenerationOrchestrator;
use crate::report::{GenerationReport, MaintenanceReport, UnitChange};
use crate::sandbox::ExecutionSandbox;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use testgen_store::{FingerprintStore, TestRecord};
use testgen_unit::{Unit, UnitId};

/// Outcome of re-running a modified unit's existing records
#[derive(Debug, Clone)]
pub enum Revalidation {
    /// Every active record still passes against the new source
    StillPassing(Vec<TestRecord>),
    /// At least one record failed; the unit escalates to regeneration
    Failing {
        /// Diagnostic from the first failing record
        feedback: String,
    },
    /// The unit has no active records to re-run
    NothingToRun,
}

/// Keeps previously accepted tests consistent with evolving source
pub struct MaintenanceTracker {
    sandbox: Arc<ExecutionSandbox>,
    store: Arc<FingerprintStore>,
    orchestrator: Arc<GenerationOrchestrator>,
}

impl std::fmt::Debug for MaintenanceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceTracker").finish_non_exhaustive()
    }
}

impl MaintenanceTracker {
    /// Create a tracker over the shared sandbox, store, and orchestrator
    #[must_use]
    pub fn new(
        sandbox: Arc<ExecutionSandbox>,
        store: Arc<FingerprintStore>,
        orchestrator: Arc<GenerationOrchestrator>,
    ) -> Self {
        Self {
            sandbox,
            store,
            orchestrator,
        }
    }

    /// Classify every unit in scope against the stored fingerprints
    ///
    /// `scope_paths` bounds deletion detection: a stored entry counts as
    /// deleted only when its file was scanned and the unit is gone.
    #[must_use]
    pub fn scan(
        &self,
        current: &[Unit],
        scope_paths: &BTreeSet<String>,
    ) -> BTreeMap<UnitId, UnitChange> {
        let mut classification = BTreeMap::new();
        let current_ids: BTreeSet<&UnitId> = current.iter().map(|u| &u.id).collect();

        for unit in current {
            let change = match self.store.lookup(&unit.id) {
                None => UnitChange::New,
                Some(entry) if entry.fingerprint == unit.fingerprint => UnitChange::Unchanged,
                Some(_) => UnitChange::Modified,
            };
            classification.insert(unit.id.clone(), change);
        }

        for stored_id in self.store.unit_ids() {
            if scope_paths.contains(&stored_id.path) && !current_ids.contains(&stored_id) {
                classification.insert(stored_id, UnitChange::Deleted);
            }
        }

        tracing::debug!(
            total = classification.len(),
            "maintenance scan classified units"
        );
        classification
    }

    /// Re-run a modified unit's existing records against the new source
    ///
    /// # Errors
    /// Returns the sandbox's infrastructure fault text; test failures are
    /// a normal [`Revalidation::Failing`].
    pub async fn revalidate(&self, ctx: &UnitContext) -> Result<Revalidation, String> {
        let Some(entry) = self.store.lookup(&ctx.unit.id) else {
            return Ok(Revalidation::NothingToRun);
        };
        let active: Vec<TestRecord> = entry.active_records().cloned().collect();
        if active.is_empty() {
            return Ok(Revalidation::NothingToRun);
        }

        for record in &active {
            let exec = self
                .sandbox
                .run(&record.source, ctx)
                .await
                .map_err(|fault| fault.to_string())?;
            if !exec.passed {
                return Ok(Revalidation::Failing {
                    feedback: exec.diagnostics().to_string(),
                });
            }
        }
        Ok(Revalidation::StillPassing(active))
    }

    /// Run a maintenance pass over extracted units
    ///
    /// Applies the scan classification:
    /// - `Unchanged` — kept, no work
    /// - `Modified` — revalidated first; escalated to regeneration only
    ///   on failure
    /// - `New` — scheduled for generation
    /// - `Deleted` — records marked stale, queued for caller-confirmed
    ///   removal
    pub async fn run_maintenance(
        &self,
        contexts: Vec<UnitContext>,
        scope_paths: &BTreeSet<String>,
    ) -> MaintenanceReport {
        let units: Vec<Unit> = contexts.iter().map(|c| c.unit.clone()).collect();
        let classification = self.scan(&units, scope_paths);

        let mut report = MaintenanceReport {
            classification: classification
                .iter()
                .map(|(id, change)| (id.clone(), *change))
                .collect(),
            ..MaintenanceReport::default()
        };
        let mut to_generate: Vec<UnitContext> = Vec::new();

        for ctx in contexts {
            match classification.get(&ctx.unit.id) {
                Some(UnitChange::Unchanged) => report.kept.push(ctx.unit.id.clone()),
                Some(UnitChange::New) => to_generate.push(ctx),
                Some(UnitChange::Modified) => match self.revalidate(&ctx).await {
                    Ok(Revalidation::StillPassing(mut records)) => {
                        // Cheap path: advance the fingerprint, keep the
                        // records, no synthesis
                        for record in &mut records {
                            record.fingerprint = ctx.unit.fingerprint;
                        }
                        match self
                            .store
                            .commit(ctx.unit.id.clone(), ctx.unit.fingerprint, records)
                            .await
                        {
                            Ok(()) => {
                                tracing::info!(unit = %ctx.unit.id, "revalidated without regeneration");
                                report.revalidated.push(ctx.unit.id.clone());
                            }
                            Err(e) => {
                                report.errored.push((ctx.unit.id.clone(), e.to_string()));
                            }
                        }
                    }
                    Ok(Revalidation::Failing { feedback }) => {
                        tracing::info!(
                            unit = %ctx.unit.id,
                            feedback = %feedback,
                            "existing tests fail against modified source, regenerating"
                        );
                        to_generate.push(ctx);
                    }
                    Ok(Revalidation::NothingToRun) => to_generate.push(ctx),
                    Err(fault) => {
                        report.errored.push((ctx.unit.id.clone(), fault));
                    }
                },
                Some(UnitChange::Deleted) | None => {}
            }
        }

        for (id, change) in &classification {
            if *change == UnitChange::Deleted {
                match self.store.mark_stale(id).await {
                    Ok(()) => report.pending_removal.push(id.clone()),
                    Err(e) => report.errored.push((id.clone(), e.to_string())),
                }
            }
        }

        if !to_generate.is_empty() {
            let outcomes = self.orchestrator.run_pass(to_generate).await;
            report.generation = GenerationReport::from_outcomes(outcomes);
        }

        report
    }
}
