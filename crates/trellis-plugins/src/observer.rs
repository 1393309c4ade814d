//! Structured reporting of lifecycle transitions.

use std::sync::Arc;

use crate::error::PluginError;
use crate::lifecycle::PluginState;

/// Observer notified as plugins move through the lifecycle.
///
/// Callbacks may arrive from activation worker threads.
pub trait LifecycleObserver: Send + Sync {
    /// Invoked when a plugin enters `enabling`.
    fn plugin_enabling(&self, id: &str);

    /// Invoked when a plugin reaches `enabled`.
    fn plugin_enabled(&self, id: &str);

    /// Invoked when a plugin fails to enable or disable.
    fn plugin_failed(&self, id: &str, error: &PluginError);

    /// Invoked when activation skips a plugin because `ancestor` failed.
    fn plugin_skipped(&self, id: &str, ancestor: &str);

    /// Invoked when a plugin reaches `disabled`.
    fn plugin_disabled(&self, id: &str);

    /// Invoked after a plugin is removed from the catalog.
    fn plugin_unloaded(&self, id: &str, last_state: PluginState);
}

impl<T> LifecycleObserver for Arc<T>
where
    T: LifecycleObserver,
{
    fn plugin_enabling(&self, id: &str) {
        (**self).plugin_enabling(id);
    }

    fn plugin_enabled(&self, id: &str) {
        (**self).plugin_enabled(id);
    }

    fn plugin_failed(&self, id: &str, error: &PluginError) {
        (**self).plugin_failed(id, error);
    }

    fn plugin_skipped(&self, id: &str, ancestor: &str) {
        (**self).plugin_skipped(id, ancestor);
    }

    fn plugin_disabled(&self, id: &str) {
        (**self).plugin_disabled(id);
    }

    fn plugin_unloaded(&self, id: &str, last_state: PluginState) {
        (**self).plugin_unloaded(id, last_state);
    }
}

/// Default observer that records transitions using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredObserver;

impl StructuredObserver {
    /// Builds a new observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LifecycleObserver for StructuredObserver {
    fn plugin_enabling(&self, id: &str) {
        tracing::debug!(
            target: "trellis::lifecycle",
            event = "plugin_enabling",
            plugin = id,
            "enabling plugin"
        );
    }

    fn plugin_enabled(&self, id: &str) {
        tracing::info!(
            target: "trellis::lifecycle",
            event = "plugin_enabled",
            plugin = id,
            "plugin enabled"
        );
    }

    fn plugin_failed(&self, id: &str, error: &PluginError) {
        tracing::error!(
            target: "trellis::lifecycle",
            event = "plugin_failed",
            plugin = id,
            error = %error,
            "plugin failed"
        );
    }

    fn plugin_skipped(&self, id: &str, ancestor: &str) {
        tracing::warn!(
            target: "trellis::lifecycle",
            event = "plugin_skipped",
            plugin = id,
            ancestor,
            "plugin skipped after ancestor failure"
        );
    }

    fn plugin_disabled(&self, id: &str) {
        tracing::info!(
            target: "trellis::lifecycle",
            event = "plugin_disabled",
            plugin = id,
            "plugin disabled"
        );
    }

    fn plugin_unloaded(&self, id: &str, last_state: PluginState) {
        tracing::info!(
            target: "trellis::lifecycle",
            event = "plugin_unloaded",
            plugin = id,
            last_state = %last_state,
            "plugin unloaded"
        );
    }
}
