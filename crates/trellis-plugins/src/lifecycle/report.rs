//! Activation options and the reports returned by bulk transitions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use trellis_config::Config;

use crate::error::PluginError;

/// Cooperative cancellation shared between a host and an activation run.
///
/// Plugins whose activation has not begun when the flag is raised are left
/// `loaded`; hooks already running are not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates a flag that is not raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns `true` once the flag is raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Tuning for an activation run.
#[derive(Debug, Clone)]
pub struct ActivationOptions {
    /// Upper bound on plugins enabled concurrently within a wave.
    pub max_parallel: usize,
    /// Time limit per hook; `None` waits indefinitely.
    pub hook_timeout: Option<Duration>,
    /// Flag checked before each plugin starts enabling.
    pub cancel: CancellationFlag,
}

impl Default for ActivationOptions {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            hook_timeout: None,
            cancel: CancellationFlag::new(),
        }
    }
}

impl ActivationOptions {
    /// Reads parallelism and the hook timeout from host configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_parallel: config.max_parallel_loads.max(1),
            hook_timeout: config.hook_timeout(),
            cancel: CancellationFlag::new(),
        }
    }

    /// Replaces the parallelism bound.
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// Replaces the hook timeout.
    #[must_use]
    pub const fn with_hook_timeout(mut self, limit: Duration) -> Self {
        self.hook_timeout = Some(limit);
        self
    }

    /// Shares `cancel` with the run.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

/// What happened to one planned plugin during activation.
#[derive(Debug)]
pub enum ActivationOutcome {
    /// The plugin reached `enabled`.
    Enabled,
    /// The plugin was already `enabled`; nothing ran.
    AlreadyEnabled,
    /// The plugin could not be enabled.
    Failed(PluginError),
    /// A dependency failed earlier in the run.
    Skipped {
        /// The failure the skip originates from.
        blocked_by: String,
    },
    /// Cancellation was requested before the plugin started.
    Cancelled,
}

impl ActivationOutcome {
    /// Returns `true` when the plugin is enabled after the run.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled | Self::AlreadyEnabled)
    }
}

/// Per-plugin outcomes of an activation run, in plan order.
#[derive(Debug, Default)]
pub struct ActivationReport {
    outcomes: Vec<(String, ActivationOutcome)>,
}

impl ActivationReport {
    pub(crate) const fn new(outcomes: Vec<(String, ActivationOutcome)>) -> Self {
        Self { outcomes }
    }

    /// Returns every outcome in plan order.
    #[must_use]
    pub fn outcomes(&self) -> &[(String, ActivationOutcome)] {
        &self.outcomes
    }

    /// Returns the outcome for `id`.
    #[must_use]
    pub fn outcome(&self, id: &str) -> Option<&ActivationOutcome> {
        self.outcomes
            .iter()
            .find(|(entry, _)| entry == id)
            .map(|(_, outcome)| outcome)
    }

    /// Returns the ids that are enabled after the run.
    #[must_use]
    pub fn enabled(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_enabled())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Iterates the failed plugins with their errors.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &PluginError)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            ActivationOutcome::Failed(error) => Some((id.as_str(), error)),
            _ => None,
        })
    }

    /// Returns `true` when every planned plugin is enabled.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_enabled())
    }
}

/// Result of a disable or shutdown request.
#[derive(Debug, Default)]
pub struct DisableReport {
    disabled: Vec<String>,
    failures: Vec<PluginError>,
}

impl DisableReport {
    pub(crate) fn record(&mut self, id: &str, result: Result<(), PluginError>) {
        match result {
            Ok(()) => self.disabled.push(id.to_owned()),
            Err(error) => self.failures.push(error),
        }
    }

    pub(crate) fn push_failure(&mut self, error: PluginError) {
        self.failures.push(error);
    }

    /// Returns the plugins that reached `disabled`, in the order they
    /// stopped.
    #[must_use]
    pub fn disabled(&self) -> &[String] {
        &self.disabled
    }

    /// Returns hook and transition errors met along the way.
    #[must_use]
    pub fn failures(&self) -> &[PluginError] {
        &self.failures
    }

    /// Returns `true` when nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}
