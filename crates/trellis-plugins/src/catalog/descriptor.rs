//! In-memory record of a loaded plugin.

use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use trellis_config::SourceKind;

use crate::error::PluginError;
use crate::lifecycle::PluginState;
use crate::manifest::{Dependency, PluginManifest};
use crate::plugin::Plugin;
use crate::version::Version;

/// Where a plugin was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginSource {
    path: Utf8PathBuf,
    kind: SourceKind,
    inner_root: Option<Utf8PathBuf>,
}

impl PluginSource {
    /// Creates a source bound to `path`.
    pub fn new(path: impl Into<Utf8PathBuf>, kind: SourceKind) -> Self {
        Self {
            path: path.into(),
            kind,
            inner_root: None,
        }
    }

    /// Records the directory inside an archive that holds the plugin.
    #[must_use]
    pub fn with_inner_root(mut self, root: impl Into<Utf8PathBuf>) -> Self {
        self.inner_root = Some(root.into());
        self
    }

    /// Returns the bound path: the package directory, the module file, or
    /// the archive itself.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the packaging form.
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Returns the archive-relative directory holding the plugin, if any.
    #[must_use]
    pub fn inner_root(&self) -> Option<&Utf8Path> {
        self.inner_root.as_deref()
    }
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner_root {
            Some(root) => write!(f, "{}!/{root} ({})", self.path, self.kind),
            None => write!(f, "{} ({})", self.path, self.kind),
        }
    }
}

/// A plugin's identity, dependencies, source, state, and entry point.
///
/// State changes go through [`PluginDescriptor::transition`], which enforces
/// the lifecycle state machine.
pub struct PluginDescriptor {
    manifest: PluginManifest,
    source: PluginSource,
    state: PluginState,
    ordinal: usize,
    entry: Arc<dyn Plugin>,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("id", &self.manifest.id())
            .field("version", &self.manifest.version())
            .field("source", &self.source)
            .field("state", &self.state)
            .field("ordinal", &self.ordinal)
            .finish_non_exhaustive()
    }
}

impl PluginDescriptor {
    /// Creates a descriptor in the `discovered` state.
    pub fn new(manifest: PluginManifest, source: PluginSource, entry: Arc<dyn Plugin>) -> Self {
        Self {
            manifest,
            source,
            state: PluginState::Discovered,
            ordinal: 0,
            entry,
        }
    }

    /// Returns the plugin id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.manifest.id()
    }

    /// Returns the plugin version.
    #[must_use]
    pub const fn version(&self) -> &Version {
        self.manifest.version()
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        self.manifest.dependencies()
    }

    /// Returns the full manifest.
    #[must_use]
    pub const fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    /// Returns the source location.
    #[must_use]
    pub const fn source(&self) -> &PluginSource {
        &self.source
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> PluginState {
        self.state
    }

    /// Returns the discovery order assigned by the catalog.
    #[must_use]
    pub const fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Returns the bound entry point.
    #[must_use]
    pub fn entry(&self) -> Arc<dyn Plugin> {
        Arc::clone(&self.entry)
    }

    /// Moves to `next` if the state machine allows it.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidTransition`] otherwise.
    pub(crate) fn transition(&mut self, next: PluginState) -> Result<PluginState, PluginError> {
        if !self.state.can_transition_to(next) {
            return Err(PluginError::transition(self.id(), self.state, next));
        }
        let previous = self.state;
        self.state = next;
        tracing::trace!(
            target: "trellis::lifecycle",
            event = "state_changed",
            plugin = self.manifest.id(),
            from = %previous,
            to = %next,
            "plugin state changed"
        );
        Ok(previous)
    }

    pub(crate) const fn set_ordinal(&mut self, ordinal: usize) {
        self.ordinal = ordinal;
    }
}
