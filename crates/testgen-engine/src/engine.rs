//! Engine facade
//!
//! [`TestGenEngine`] wires the store, configuration, and injected
//! capabilities into the three operations exposed to presentation
//! layers: `generate`, `update`, and `affected_units`. The engine owns
//! no UI; callers consume the reports.

use crate::capabilities::{CodeSynthesizer, QualityJudge, TestRunner, UnitContext};
use crate::cache::ResultCache;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::gate::QualityGate;
use crate::orchestrator::{CancelFlag, GenerationOrchestrator};
use crate::report::{GenerationReport, MaintenanceReport, UnitChange};
use crate::sandbox::ExecutionSandbox;
use crate::tracker::MaintenanceTracker;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::sync::Arc;
use testgen_store::FingerprintStore;
use testgen_unit::{ExtractError, Unit, UnitExtractor, UnitId};

/// A generation target: a file, optionally focused on one unit
/// (`src/calc.py::add`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Source file path
    pub path: String,
    /// Qualified unit name, when focused
    pub focus: Option<String>,
}

impl Target {
    /// Parse `file.py` or `file.py::unit`
    ///
    /// # Errors
    /// Returns error for an empty path or empty focus part.
    pub fn parse(target: &str) -> Result<Self, EngineError> {
        let (path, focus) = match target.split_once("::") {
            Some((path, focus)) => (path, Some(focus)),
            None => (target, None),
        };
        if path.is_empty() || focus.is_some_and(str::is_empty) {
            return Err(EngineError::InvalidTarget(target.to_string()));
        }
        Ok(Self {
            path: path.to_string(),
            focus: focus.map(str::to_string),
        })
    }

    fn matches(&self, unit: &Unit) -> bool {
        match &self.focus {
            None => true,
            Some(focus) => {
                let name = &unit.id.qualified_name;
                name == focus || name.ends_with(&format!(".{focus}"))
            }
        }
    }
}

/// The test generation and maintenance engine
///
/// Capabilities are injected as trait objects; the store is the only
/// durable state.
pub struct TestGenEngine {
    config: EngineConfig,
    store: Arc<FingerprintStore>,
    orchestrator: Arc<GenerationOrchestrator>,
    tracker: MaintenanceTracker,
    cancel: CancelFlag,
}

impl std::fmt::Debug for TestGenEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestGenEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TestGenEngine {
    /// Create an engine over injected capabilities
    ///
    /// # Errors
    /// Returns error if the fingerprint store cannot be opened.
    pub fn new(
        config: EngineConfig,
        synthesizer: Arc<dyn CodeSynthesizer>,
        judge: Arc<dyn QualityJudge>,
        runner: Arc<dyn TestRunner>,
    ) -> Result<Self, EngineError> {
        let store = Arc::new(FingerprintStore::open(&config.store_dir)?);
        let sandbox = Arc::new(ExecutionSandbox::new(runner, config.exec_timeout));
        let gate = Arc::new(QualityGate::new(
            judge,
            ResultCache::new(config.cache_capacity),
            config.acceptance_threshold,
            config.judging_criteria.clone(),
        ));
        let cancel = CancelFlag::new();
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            synthesizer,
            Arc::clone(&sandbox),
            gate,
            Arc::clone(&store),
            config.clone(),
            cancel.clone(),
        ));
        let tracker = MaintenanceTracker::new(sandbox, Arc::clone(&store), Arc::clone(&orchestrator));
        Ok(Self {
            config,
            store,
            orchestrator,
            tracker,
            cancel,
        })
    }

    /// The fingerprint store (for caller-confirmed pruning and inspection)
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<FingerprintStore> {
        &self.store
    }

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Request cooperative cancellation of the running pass
    ///
    /// New units stop being scheduled immediately; in-flight attempts
    /// finish or hit their own timeouts.
    #[inline]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Generate tests for a file or a focused unit
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed; per-unit
    /// failures are reported, not raised.
    pub async fn generate(&self, target: &str) -> Result<GenerationReport, EngineError> {
        let target = Target::parse(target)?;
        tracing::info!(path = %target.path, focus = ?target.focus, "generation pass started");

        let contexts = self.load_contexts(&target.path)?;
        let (selected, skipped): (Vec<_>, Vec<_>) = contexts
            .into_iter()
            .partition(|ctx| target.matches(&ctx.unit));

        let outcomes = self.orchestrator.run_pass(selected).await;
        let mut report = GenerationReport::from_outcomes(outcomes);
        report.skipped = skipped.into_iter().map(|ctx| ctx.unit.id).collect();
        tracing::info!(
            accepted = report.accepted.len(),
            abandoned = report.abandoned.len(),
            errored = report.errored.len(),
            "generation pass finished"
        );
        Ok(report)
    }

    /// Maintain tests for a set of changed files
    ///
    /// Classifies every unit as unchanged / modified / new / deleted and
    /// applies the two-tier policy: re-run existing tests before any
    /// regeneration. A file that fails to parse is skipped and reported
    /// in `failed_files`; a file removed from disk keeps its path in
    /// scope so its stored units classify as deleted.
    ///
    /// # Errors
    /// Returns error only for infrastructure-level faults (permission
    /// errors, corrupt store); per-unit and per-file outcomes land in
    /// the report.
    pub async fn update(&self, paths: &[String]) -> Result<MaintenanceReport, EngineError> {
        tracing::info!(files = paths.len(), "maintenance pass started");
        let mut contexts = Vec::new();
        let mut scope = BTreeSet::new();
        let mut failed_files = Vec::new();
        for path in paths {
            match self.load_file(path)? {
                FileUnits::Extracted(units) => {
                    scope.insert(path.clone());
                    contexts.extend(units);
                }
                FileUnits::Missing => {
                    scope.insert(path.clone());
                }
                FileUnits::Failed(message) => {
                    tracing::warn!(path = %path, error = %message, "skipping unparseable file");
                    failed_files.push((path.clone(), message));
                }
            }
        }
        let mut report = self.tracker.run_maintenance(contexts, &scope).await;
        report.failed_files = failed_files;
        tracing::info!(
            kept = report.kept.len(),
            revalidated = report.revalidated.len(),
            pending_removal = report.pending_removal.len(),
            failed_files = report.failed_files.len(),
            "maintenance pass finished"
        );
        Ok(report)
    }

    /// Identities of units whose fingerprints no longer match the store
    ///
    /// Unparseable files are skipped; a file removed from disk
    /// contributes its stored units (they have drifted to deleted).
    ///
    /// # Errors
    /// Returns error only for infrastructure-level read faults.
    pub async fn affected_units(
        &self,
        paths: &[String],
    ) -> Result<BTreeSet<UnitId>, EngineError> {
        let mut units = Vec::new();
        let mut scope = BTreeSet::new();
        for path in paths {
            match self.load_file(path)? {
                FileUnits::Extracted(contexts) => {
                    scope.insert(path.clone());
                    units.extend(contexts.into_iter().map(|c| c.unit));
                }
                FileUnits::Missing => {
                    scope.insert(path.clone());
                }
                FileUnits::Failed(message) => {
                    tracing::warn!(path = %path, error = %message, "skipping unparseable file");
                }
            }
        }
        let affected = self
            .tracker
            .scan(&units, &scope)
            .into_iter()
            .filter(|(_, change)| *change != UnitChange::Unchanged)
            .map(|(id, _)| id)
            .collect();
        Ok(affected)
    }

    /// Read and extract a file, snapshotting its text for the sandbox
    ///
    /// Used by `generate`, where a single unreadable or unparseable
    /// target is the caller's error.
    fn load_contexts(&self, path: &str) -> Result<Vec<UnitContext>, EngineError> {
        let source = fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        let mut extractor = UnitExtractor::new()?;
        let units = extractor.extract(path, &source)?;
        Ok(units
            .into_iter()
            .map(|unit| UnitContext::new(unit, source.clone()))
            .collect())
    }

    /// Load one file of a multi-file pass; per-file faults never abort
    /// the pass.
    fn load_file(&self, path: &str) -> Result<FileUnits, EngineError> {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileUnits::Missing),
            Err(e) => return Err(EngineError::io(path, e)),
        };
        let mut extractor = UnitExtractor::new()?;
        match extractor.extract(path, &source) {
            Ok(units) => Ok(FileUnits::Extracted(
                units
                    .into_iter()
                    .map(|unit| UnitContext::new(unit, source.clone()))
                    .collect(),
            )),
            Err(e @ (ExtractError::Parse { .. } | ExtractError::InvalidUtf8 { .. })) => {
                Ok(FileUnits::Failed(e.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Per-file outcome when loading a multi-file pass
enum FileUnits {
    /// Parsed; ready for classification
    Extracted(Vec<UnitContext>),
    /// Gone from disk; stored units classify as deleted
    Missing,
    /// Unparseable; the file is skipped and its stored units left alone
    Failed(String),
}
