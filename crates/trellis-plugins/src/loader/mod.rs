//! Conversion of candidates into catalogued descriptors.
//!
//! One [`LoadStrategy`] exists per [`SourceKind`]; all of them produce the
//! same manifest and source shape, and the [`Linker`] supplied by the host
//! binds the entry point. Failures are isolated per candidate. Loading runs
//! with bounded parallelism while catalog inserts happen serially in
//! discovery order, so the first occurrence of a duplicate id always wins.

mod archive;
mod file;
mod linker;
mod package;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use camino::Utf8Path;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use trellis_config::SourceKind;

use crate::catalog::{Catalog, PluginDescriptor, PluginSource};
use crate::error::{LoadFailure, PluginError};
use crate::lifecycle::PluginState;
use crate::manifest::PluginManifest;
use crate::plugin::Plugin;
use crate::scanner::Candidate;

pub use self::archive::ArchiveStrategy;
pub use self::file::FileStrategy;
pub use self::linker::{InertLinker, Linker, PluginFactory, StaticLinker};
pub use self::package::PackageStrategy;

/// Reads the manifest of one packaging form.
pub trait LoadStrategy: Send + Sync {
    /// Returns the packaging form handled.
    fn kind(&self) -> SourceKind;

    /// Reads and validates the manifest at `location` and describes the
    /// unit to bind.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadFailure`] describing why the candidate is unusable.
    fn read(&self, location: &Utf8Path) -> Result<(PluginManifest, PluginSource), LoadFailure>;
}

/// Returns the strategy for `kind`.
#[must_use]
pub fn strategy_for(kind: SourceKind) -> &'static dyn LoadStrategy {
    match kind {
        SourceKind::Package => &PackageStrategy,
        SourceKind::File => &FileStrategy,
        SourceKind::Archive => &ArchiveStrategy,
    }
}

/// Result of loading a batch of candidates.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    /// Successfully loaded descriptors.
    pub catalog: Catalog,
    /// Per-candidate failures, in discovery order.
    pub errors: Vec<PluginError>,
}

/// Loads candidates and links their entry points.
#[derive(Clone)]
pub struct PluginLoader {
    linker: Arc<dyn Linker>,
    max_parallel: usize,
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("max_parallel", &self.max_parallel)
            .finish_non_exhaustive()
    }
}

impl PluginLoader {
    /// Creates a loader running at most `max_parallel` loads at once.
    #[must_use]
    pub fn new(linker: Arc<dyn Linker>, max_parallel: usize) -> Self {
        Self {
            linker,
            max_parallel: max_parallel.max(1),
        }
    }

    /// Loads one candidate into a `loaded` descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Load`] naming the candidate and the cause.
    pub fn load(&self, candidate: &Candidate) -> Result<PluginDescriptor, PluginError> {
        let failed = |cause: LoadFailure| PluginError::Load {
            location: candidate.location().to_owned(),
            kind: candidate.kind(),
            cause,
        };
        let (manifest, source) = strategy_for(candidate.kind())
            .read(candidate.location())
            .map_err(failed)?;
        let entry = self.link(&manifest, &source).map_err(failed)?;
        let mut descriptor = PluginDescriptor::new(manifest, source, entry);
        descriptor.transition(PluginState::Loaded)?;
        tracing::debug!(
            target: "trellis::load",
            event = "plugin_loaded",
            plugin = descriptor.id(),
            version = %descriptor.version(),
            source = %descriptor.source(),
            "plugin loaded"
        );
        Ok(descriptor)
    }

    /// Loads every candidate and catalogues the successes.
    ///
    /// Candidates are catalogued in the order given, which should be
    /// discovery order. A failing candidate never stops the others.
    pub fn load_all<I>(&self, candidates: I) -> LoadOutcome
    where
        I: IntoIterator<Item = Candidate>,
    {
        let batch: Vec<Candidate> = candidates.into_iter().collect();
        let results = self.load_batch(&batch);

        let mut outcome = LoadOutcome::default();
        for result in results {
            let inserted = result.and_then(|descriptor| outcome.catalog.insert(descriptor));
            if let Err(error) = inserted {
                tracing::warn!(
                    target: "trellis::load",
                    event = "load_failed",
                    error = %error,
                    "plugin candidate rejected"
                );
                outcome.errors.push(error);
            }
        }
        tracing::info!(
            target: "trellis::load",
            event = "load_completed",
            loaded = outcome.catalog.len(),
            failed = outcome.errors.len(),
            "plugin loading completed"
        );
        outcome
    }

    fn link(
        &self,
        manifest: &PluginManifest,
        source: &PluginSource,
    ) -> Result<Arc<dyn Plugin>, LoadFailure> {
        panic::catch_unwind(AssertUnwindSafe(|| self.linker.link(manifest, source)))
            .unwrap_or_else(|_| Err(LoadFailure::unlinked(manifest.entry(), "linker panicked")))
    }

    fn load_batch(&self, batch: &[Candidate]) -> Vec<Result<PluginDescriptor, PluginError>> {
        if self.max_parallel == 1 || batch.len() < 2 {
            return batch.iter().map(|candidate| self.load(candidate)).collect();
        }
        match ThreadPoolBuilder::new()
            .num_threads(self.max_parallel)
            .thread_name(|index| format!("trellis-load-{index}"))
            .build()
        {
            Ok(pool) => pool.install(|| {
                batch
                    .par_iter()
                    .map(|candidate| self.load(candidate))
                    .collect()
            }),
            Err(error) => {
                tracing::warn!(
                    target: "trellis::load",
                    event = "pool_unavailable",
                    error = %error,
                    "loading sequentially"
                );
                batch.iter().map(|candidate| self.load(candidate)).collect()
            }
        }
    }
}
