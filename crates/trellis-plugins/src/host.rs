//! One-call wiring of the whole pipeline for embedding hosts.

use std::collections::BTreeSet;
use std::sync::Arc;

use trellis_config::Config;

use crate::catalog::Catalog;
use crate::error::PluginError;
use crate::lifecycle::{ActivationOptions, ActivationReport, CancellationFlag, LifecycleManager};
use crate::loader::{Linker, LoadOutcome, PluginLoader};
use crate::observer::{LifecycleObserver, StructuredObserver};
use crate::resolver::{self, Resolution};
use crate::scanner::{Candidate, PathScanner};
use crate::selection::{self, SelectionError};
use crate::services::OverrideRules;

/// Scan, load, resolve, and activate according to a [`Config`].
pub struct PluginHost {
    config: Config,
    linker: Arc<dyn Linker>,
    observer: Arc<dyn LifecycleObserver>,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Result of [`PluginHost::boot`].
#[derive(Debug)]
pub struct Booted {
    /// Manager owning every loaded plugin.
    pub manager: LifecycleManager,
    /// Candidates that could not be loaded or catalogued.
    pub load_errors: Vec<PluginError>,
    /// Unknown, excluded, missing-dependency, and cycle errors.
    pub failures: Vec<PluginError>,
    /// Plugins left out because an ancestor failed resolution.
    pub blocked: Vec<PluginError>,
    /// Per-plugin activation outcomes.
    pub report: ActivationReport,
}

impl Booted {
    /// Returns `true` when nothing failed at any stage.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.load_errors.is_empty()
            && self.failures.is_empty()
            && self.blocked.is_empty()
            && self.report.is_success()
    }
}

impl PluginHost {
    /// Creates a host binding entry points through `linker`.
    #[must_use]
    pub fn new(config: Config, linker: Arc<dyn Linker>) -> Self {
        Self {
            config,
            linker,
            observer: Arc::new(StructuredObserver::new()),
        }
    }

    /// Replaces the lifecycle observer handed to managers started later.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the host configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Discovers candidates under the configured roots.
    #[must_use]
    pub fn scan(&self) -> Vec<Candidate> {
        PathScanner::from_config(&self.config).scan().collect()
    }

    /// Loads candidates with the configured parallelism.
    pub fn load_all<I>(&self, candidates: I) -> LoadOutcome
    where
        I: IntoIterator<Item = Candidate>,
    {
        PluginLoader::new(Arc::clone(&self.linker), self.config.max_parallel_loads)
            .load_all(candidates)
    }

    /// Returns the ids configuration selects from `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError`] for a malformed pattern.
    pub fn requested_ids(&self, catalog: &Catalog) -> Result<Vec<String>, SelectionError> {
        selection::requested_ids(catalog, &self.config)
    }

    /// Returns the ids configuration excludes.
    #[must_use]
    pub fn excluded_ids(&self) -> BTreeSet<String> {
        selection::excluded_ids(&self.config)
    }

    /// Resolves `requested` against `catalog`, honouring exclusions.
    #[must_use]
    pub fn resolve<I, S>(&self, catalog: &Catalog, requested: I) -> Resolution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        resolver::resolve_excluding(catalog, requested, &self.excluded_ids())
    }

    /// Hands `catalog` to a new lifecycle manager.
    #[must_use]
    pub fn start(&self, catalog: Catalog) -> LifecycleManager {
        LifecycleManager::with_observer(
            catalog,
            OverrideRules::from_config(&self.config),
            Arc::clone(&self.observer),
        )
    }

    /// Returns activation options derived from configuration.
    #[must_use]
    pub fn activation_options(&self) -> ActivationOptions {
        ActivationOptions::from_config(&self.config)
    }

    /// Runs the whole pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`SelectionError`] when configuration cannot select plugins.
    /// Per-plugin failures are reported in [`Booted`] instead.
    pub fn boot(&self) -> Result<Booted, SelectionError> {
        self.boot_with(CancellationFlag::new())
    }

    /// Runs the whole pipeline, sharing `cancel` with activation.
    ///
    /// # Errors
    ///
    /// See [`PluginHost::boot`].
    pub fn boot_with(&self, cancel: CancellationFlag) -> Result<Booted, SelectionError> {
        let LoadOutcome {
            catalog,
            errors: load_errors,
        } = self.load_all(self.scan());
        let requested = self.requested_ids(&catalog)?;
        let (plan, failures, blocked) = self.resolve(&catalog, &requested).into_parts();
        let manager = self.start(catalog);
        let options = self.activation_options().with_cancellation(cancel);
        let report = manager.activate(&plan, &options);
        tracing::info!(
            target: "trellis::host",
            event = "boot_completed",
            loaded = manager.states().len(),
            enabled = report.enabled().len(),
            load_errors = load_errors.len(),
            failures = failures.len(),
            blocked = blocked.len(),
            "plugin host booted"
        );
        Ok(Booted {
            manager,
            load_errors,
            failures,
            blocked,
            report,
        })
    }
}
