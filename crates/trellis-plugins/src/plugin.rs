//! The contract a plugin's entry point satisfies.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::context::PluginContext;

/// Boxed error type hooks may attach as a cause.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Lifecycle callbacks implemented by a loaded plugin.
///
/// Hooks run outside any framework lock and may be invoked from worker
/// threads, so implementations must be thread-safe. The context is the only
/// route to the service registry and extension points.
#[cfg_attr(test, mockall::automock)]
pub trait Plugin: Send + Sync {
    /// Prepares the plugin before activation. Defaults to doing nothing.
    ///
    /// # Errors
    ///
    /// Returning an error fails the plugin without calling
    /// [`Plugin::activate`].
    fn configure(&self, _context: &PluginContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Starts the plugin. Services published here become visible to
    /// plugins activated later.
    ///
    /// # Errors
    ///
    /// Returning an error moves the plugin to `failed`.
    fn activate(&self, context: &PluginContext) -> Result<(), HookError>;

    /// Stops the plugin. Its services are already unregistered when this
    /// runs.
    ///
    /// # Errors
    ///
    /// Returning an error moves the plugin to `failed`.
    fn deactivate(&self, _context: &PluginContext) -> Result<(), HookError> {
        Ok(())
    }

    /// Called when another plugin overrides a service this plugin owned.
    fn service_displaced(&self, _key: &str, _new_owner: &str) {}
}

/// Entry point bound by metadata-only hosts; every hook succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertPlugin;

impl Plugin for InertPlugin {
    fn activate(&self, _context: &PluginContext) -> Result<(), HookError> {
        Ok(())
    }
}

/// The hook a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// [`Plugin::configure`].
    Configure,
    /// [`Plugin::activate`].
    Activate,
    /// [`Plugin::deactivate`].
    Deactivate,
}

impl HookPhase {
    /// Returns the hook name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Activate => "activate",
            Self::Deactivate => "deactivate",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a plugin hook.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HookError {
    /// Creates an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Error used when a hook exceeds the host's timeout.
    #[must_use]
    pub fn timed_out(limit: Duration) -> Self {
        Self::new(format!("timed out after {}ms", limit.as_millis()))
    }

    /// Error used when a hook panics.
    #[must_use]
    pub fn panicked() -> Self {
        Self::new("hook panicked")
    }

    /// Returns the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
