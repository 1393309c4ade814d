//! Binding of manifest entry points to executable plugin code.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::catalog::PluginSource;
use crate::error::LoadFailure;
use crate::manifest::PluginManifest;
use crate::plugin::{InertPlugin, Plugin};

/// Resolves a manifest's entry-point symbol to a plugin implementation.
///
/// The host decides what an entry point is: a compiled-in factory, a
/// dynamically opened library, or an interpreter session bound to the
/// source.
pub trait Linker: Send + Sync {
    /// Binds the entry point declared by `manifest` for `source`.
    ///
    /// # Errors
    ///
    /// Returns a [`LoadFailure`] when the entry point cannot be bound.
    fn link(
        &self,
        manifest: &PluginManifest,
        source: &PluginSource,
    ) -> Result<Arc<dyn Plugin>, LoadFailure>;
}

/// Constructor registered for an entry-point symbol.
pub type PluginFactory = dyn Fn(&PluginManifest, &PluginSource) -> Arc<dyn Plugin> + Send + Sync;

/// Linker backed by factories compiled into the host.
#[derive(Default, Clone)]
pub struct StaticLinker {
    factories: HashMap<String, Arc<PluginFactory>>,
}

impl fmt::Debug for StaticLinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticLinker")
            .field("symbols", &self.symbols())
            .finish()
    }
}

impl StaticLinker {
    /// Creates a linker with no symbols.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the linker with `symbol` bound to `factory`.
    #[must_use]
    pub fn with_entry<F>(mut self, symbol: &str, factory: F) -> Self
    where
        F: Fn(&PluginManifest, &PluginSource) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(symbol, factory);
        self
    }

    /// Binds `symbol` to `factory`, replacing any earlier binding.
    pub fn register<F>(&mut self, symbol: &str, factory: F)
    where
        F: Fn(&PluginManifest, &PluginSource) -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(symbol.to_owned(), Arc::new(factory));
    }

    /// Returns the bound symbols in lexical order.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.factories.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

impl Linker for StaticLinker {
    fn link(
        &self,
        manifest: &PluginManifest,
        source: &PluginSource,
    ) -> Result<Arc<dyn Plugin>, LoadFailure> {
        let entry = manifest.entry();
        let factory = self
            .factories
            .get(entry)
            .ok_or_else(|| LoadFailure::unlinked(entry, "no factory is registered for the symbol"))?;
        Ok(factory(manifest, source))
    }
}

/// Linker binding every entry point to an [`InertPlugin`].
///
/// Suits tooling that inspects manifests and plans without running plugin
/// code.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertLinker;

impl Linker for InertLinker {
    fn link(
        &self,
        _manifest: &PluginManifest,
        _source: &PluginSource,
    ) -> Result<Arc<dyn Plugin>, LoadFailure> {
        Ok(Arc::new(InertPlugin))
    }
}
