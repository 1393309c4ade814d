//! The per-plugin state machine.

use std::fmt;

/// Lifecycle state of a catalogued plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginState {
    /// Manifest read; entry point not yet bound.
    Discovered,
    /// Entry point bound; ready to enable.
    Loaded,
    /// Hooks are running.
    Enabling,
    /// Active; its services are live.
    Enabled,
    /// Deactivation hook is running.
    Disabling,
    /// Stopped; may be reset to `loaded` and enabled again.
    Disabled,
    /// A hook failed. Only unloading leaves this state.
    Failed,
    /// Descriptor destroyed. Never stored; used to describe unload requests.
    Unloaded,
}

impl PluginState {
    /// Returns the lowercase state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Loaded => "loaded",
            Self::Enabling => "enabling",
            Self::Enabled => "enabled",
            Self::Disabling => "disabling",
            Self::Disabled => "disabled",
            Self::Failed => "failed",
            Self::Unloaded => "unloaded",
        }
    }

    /// Returns `true` when the state machine permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Discovered, Self::Loaded)
                | (Self::Loaded, Self::Enabling)
                | (Self::Enabling, Self::Enabled | Self::Failed)
                | (Self::Enabled, Self::Disabling)
                | (Self::Disabling, Self::Disabled | Self::Failed)
                | (Self::Disabled, Self::Loaded)
                | (
                    Self::Discovered | Self::Loaded | Self::Disabled | Self::Failed,
                    Self::Unloaded
                )
        )
    }

    /// Returns `true` while hooks of the plugin may be running.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Enabling | Self::Disabling)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
