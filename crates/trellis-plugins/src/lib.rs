//! Host-agnostic plugin framework.
//!
//! The pipeline runs in five stages:
//!
//! 1. [`scanner`] walks configured roots and classifies candidates.
//! 2. [`loader`] reads manifests through a per-kind strategy and links entry
//!    points, filling a [`catalog::Catalog`].
//! 3. [`resolver`] turns a requested set into an activation plan ordered by
//!    dependencies.
//! 4. [`lifecycle`] enables, disables, and unloads plugins along a validated
//!    state machine.
//! 5. [`services`] and [`extensions`] carry the capabilities enabled plugins
//!    publish to one another.
//!
//! [`host::PluginHost`] wires the stages together from a
//! [`trellis_config::Config`].

pub mod catalog;
pub mod context;
pub mod error;
pub mod extensions;
pub mod host;
pub mod lifecycle;
pub mod loader;
pub mod manifest;
pub mod observer;
pub mod plugin;
pub mod resolver;
pub mod scanner;
pub mod selection;
pub mod services;
pub mod version;

pub use catalog::{Catalog, PluginDescriptor, PluginSource};
pub use context::PluginContext;
pub use error::{LoadFailure, MissingReason, PluginError};
pub use extensions::{Extension, ExtensionRegistry};
pub use host::{Booted, PluginHost};
pub use lifecycle::{
    ActivationOptions, ActivationOutcome, ActivationReport, CancellationFlag, DisableReport,
    LifecycleManager, PluginState,
};
pub use loader::{InertLinker, Linker, LoadOutcome, LoadStrategy, PluginLoader, StaticLinker};
pub use manifest::{Dependency, PluginManifest, PluginMetadata};
pub use observer::{LifecycleObserver, StructuredObserver};
pub use plugin::{BoxError, HookError, HookPhase, InertPlugin, Plugin};
pub use resolver::{ActivationPlan, Resolution, ResolutionError, resolve, resolve_excluding};
pub use scanner::{Candidate, PathScanner, StrategyTable};
pub use selection::{SelectionError, excluded_ids, requested_ids};
pub use services::{DisplacementListener, OverrideRules, ServiceRegistry, ServiceValue};
pub use trellis_config::{Config, SourceKind};
pub use version::{Version, VersionError, VersionReq};

#[cfg(test)]
mod tests;
