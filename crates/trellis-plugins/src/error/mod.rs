//! Domain errors raised across the plugin pipeline.
//!
//! All errors use `thiserror`-derived enums with structured context so hosts
//! can inspect failures programmatically. Per-candidate load failures carry a
//! [`LoadFailure`] cause; I/O errors are wrapped in `Arc` to keep the error
//! small and cheap to share.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;
use trellis_config::SourceKind;

use crate::lifecycle::PluginState;
use crate::plugin::{HookError, HookPhase};
use crate::version::{Version, VersionReq};

/// Errors arising from discovery, loading, resolution, lifecycle, and
/// service operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A candidate could not be turned into a descriptor.
    #[error("failed to load {kind} candidate '{location}': {cause}")]
    Load {
        /// Candidate location.
        location: Utf8PathBuf,
        /// Strategy that was applied.
        kind: SourceKind,
        /// Underlying cause.
        #[source]
        cause: LoadFailure,
    },

    /// A second candidate declared an id that is already catalogued.
    #[error("plugin id '{id}' from '{duplicate}' is already provided by '{existing}'")]
    DuplicateId {
        /// Conflicting id.
        id: String,
        /// Location of the catalogued plugin, which is kept.
        existing: Utf8PathBuf,
        /// Location of the rejected candidate.
        duplicate: Utf8PathBuf,
    },

    /// A declared dependency is absent, excluded, or of the wrong version.
    #[error("plugin '{dependent}' requires '{dependency}' {constraint}: {reason}")]
    MissingDependency {
        /// Plugin declaring the dependency.
        dependent: String,
        /// Dependency id.
        dependency: String,
        /// Unmet constraint.
        constraint: VersionReq,
        /// Why the dependency is unavailable.
        reason: MissingReason,
    },

    /// Plugins whose dependencies form a cycle.
    #[error("dependency cycle: {}", format_cycle(.cycle))]
    CyclicDependency {
        /// The shortest cycle found, first id not repeated.
        cycle: Vec<String>,
        /// Every plugin in the strongly connected component.
        members: Vec<String>,
    },

    /// A plugin hook returned an error or timed out.
    #[error("{phase} hook of plugin '{id}' failed: {source}")]
    ActivationHook {
        /// Plugin whose hook failed.
        id: String,
        /// Hook that failed.
        phase: HookPhase,
        /// Error reported by the hook.
        #[source]
        source: HookError,
    },

    /// A plugin was not activated because an ancestor failed.
    #[error("plugin '{id}' is blocked by failed ancestor '{ancestor}'")]
    BlockedByAncestor {
        /// Plugin left inactive.
        id: String,
        /// The originating failure.
        ancestor: String,
    },

    /// A service key is already held by a live entry.
    #[error("service '{key}' is already registered by plugin '{owner}'")]
    Conflict {
        /// Contested key.
        key: String,
        /// Current owner.
        owner: String,
    },

    /// No live service is registered under the key.
    #[error("service '{key}' not found")]
    NotFound {
        /// Key that was looked up.
        key: String,
    },

    /// A lifecycle transition not permitted by the state machine.
    #[error("plugin '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        /// Plugin id.
        id: String,
        /// Current state.
        from: PluginState,
        /// Requested state.
        to: PluginState,
    },

    /// A dependency was not enabled when its dependent tried to start.
    #[error("plugin '{id}' cannot enable: dependency '{dependency}' is {state}")]
    DependencyNotEnabled {
        /// Plugin that tried to enable.
        id: String,
        /// Dependency that was not ready.
        dependency: String,
        /// The dependency's state at the time.
        state: PluginState,
    },

    /// A non-cascading disable found enabled dependents.
    #[error("plugin '{id}' has enabled dependents: {}", .dependents.join(", "))]
    ActiveDependents {
        /// Plugin asked to disable.
        id: String,
        /// Enabled plugins depending on it.
        dependents: Vec<String>,
    },

    /// The id is not in the catalog.
    #[error("plugin '{id}' is not in the catalog")]
    UnknownPlugin {
        /// Requested id.
        id: String,
    },

    /// The id was requested but the host excluded it.
    #[error("plugin '{id}' is disabled by configuration")]
    Excluded {
        /// Requested id.
        id: String,
    },

    /// A service exists but holds a value of a different type.
    #[error("service '{key}' is not a {expected}")]
    ServiceTypeMismatch {
        /// Key that was looked up.
        key: String,
        /// Requested type name.
        expected: &'static str,
    },

    /// An extension point id is already declared.
    #[error("extension point '{point}' is already declared by plugin '{owner}'")]
    DuplicateExtensionPoint {
        /// Point id.
        point: String,
        /// Current declaring plugin.
        owner: String,
    },

    /// No extension point is declared under the id.
    #[error("extension point '{point}' is not declared")]
    UnknownExtensionPoint {
        /// Point id.
        point: String,
    },

    /// A plugin context was used after its hook was abandoned.
    #[error("context of plugin '{id}' has been revoked")]
    ContextRevoked {
        /// Plugin id.
        id: String,
    },
}

impl PluginError {
    /// Returns the plugin id the error is attributed to, if any.
    #[must_use]
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            Self::DuplicateId { id, .. }
            | Self::ActivationHook { id, .. }
            | Self::BlockedByAncestor { id, .. }
            | Self::InvalidTransition { id, .. }
            | Self::DependencyNotEnabled { id, .. }
            | Self::ActiveDependents { id, .. }
            | Self::UnknownPlugin { id }
            | Self::Excluded { id }
            | Self::ContextRevoked { id } => Some(id),
            Self::MissingDependency { dependent, .. } => Some(dependent),
            Self::CyclicDependency { cycle, .. } => cycle.first().map(String::as_str),
            Self::Load { .. }
            | Self::Conflict { .. }
            | Self::NotFound { .. }
            | Self::ServiceTypeMismatch { .. }
            | Self::DuplicateExtensionPoint { .. }
            | Self::UnknownExtensionPoint { .. } => None,
        }
    }

    /// Builds an [`PluginError::ActivationHook`] error.
    pub(crate) fn hook(id: &str, phase: HookPhase, source: HookError) -> Self {
        Self::ActivationHook {
            id: id.to_owned(),
            phase,
            source,
        }
    }

    /// Builds an [`PluginError::InvalidTransition`] error.
    pub(crate) fn transition(id: &str, from: PluginState, to: PluginState) -> Self {
        Self::InvalidTransition {
            id: id.to_owned(),
            from,
            to,
        }
    }
}

fn format_cycle(cycle: &[String]) -> String {
    let mut rendered = cycle.join(" -> ");
    if let Some(first) = cycle.first() {
        rendered.push_str(" -> ");
        rendered.push_str(first);
    }
    rendered
}

/// Why a declared dependency could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissingReason {
    /// No plugin with the id is catalogued.
    #[error("not found")]
    Absent,
    /// The catalogued version does not satisfy the constraint.
    #[error("found version {found}")]
    Unsatisfied {
        /// Version present in the catalog.
        found: Box<Version>,
    },
    /// The dependency is excluded by host configuration.
    #[error("disabled by configuration")]
    Excluded,
}

/// Cause of a per-candidate load failure.
#[derive(Debug, Clone, Error)]
pub enum LoadFailure {
    /// Reading the candidate failed.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The candidate has no manifest where one is required.
    #[error("no {expected} found")]
    ManifestMissing {
        /// Description of what was searched for.
        expected: String,
    },

    /// The manifest text is not valid.
    #[error("manifest is malformed: {message}")]
    ManifestParse {
        /// Parser diagnostic.
        message: String,
    },

    /// The manifest parsed but violates a rule.
    #[error("manifest is invalid: {message}")]
    InvalidManifest {
        /// Rule that was violated.
        message: String,
    },

    /// The archive could not be opened or read.
    #[error("archive error: {message}")]
    Archive {
        /// Archive diagnostic.
        message: String,
    },

    /// The host could not bind the declared entry point.
    #[error("entry point '{entry}' could not be linked: {message}")]
    Unlinked {
        /// Declared entry point.
        entry: String,
        /// Linker diagnostic.
        message: String,
    },
}

impl LoadFailure {
    /// Wraps an I/O error.
    #[must_use]
    pub fn io(source: std::io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }

    /// Builds an [`LoadFailure::InvalidManifest`] cause.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidManifest {
            message: message.into(),
        }
    }

    /// Builds an [`LoadFailure::Unlinked`] cause.
    pub fn unlinked(entry: &str, message: impl Into<String>) -> Self {
        Self::Unlinked {
            entry: entry.to_owned(),
            message: message.into(),
        }
    }
}
