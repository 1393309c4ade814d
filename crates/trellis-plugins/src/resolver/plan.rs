//! Activation plans and the outcome of a resolution pass.

use std::collections::HashMap;

use thiserror::Error;

use crate::error::PluginError;

/// Total order over plugins in which every dependency precedes its
/// dependents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationPlan {
    order: Vec<String>,
    dependencies: HashMap<String, Vec<String>>,
}

impl ActivationPlan {
    /// Builds a plan from an order and each entry's in-plan dependencies.
    ///
    /// The caller guarantees that `order` is topological with respect to
    /// `dependencies`.
    pub(crate) const fn new(
        order: Vec<String>,
        dependencies: HashMap<String, Vec<String>>,
    ) -> Self {
        Self {
            order,
            dependencies,
        }
    }

    /// Returns the ids in activation order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Returns the number of plugins in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` when the plan is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns `true` when `id` is part of the plan.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.dependencies.contains_key(id)
    }

    /// Returns the position of `id` in the activation order.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|entry| entry == id)
    }

    /// Returns the in-plan dependencies of `id`.
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.dependencies.get(id).map_or(&[], Vec::as_slice)
    }

    /// Groups the plan into waves: each wave depends only on earlier waves,
    /// so plugins inside a wave are mutually independent. Order within a
    /// wave follows the plan.
    #[must_use]
    pub fn waves(&self) -> Vec<Vec<String>> {
        let mut depth: HashMap<&str, usize> = HashMap::with_capacity(self.order.len());
        let mut waves: Vec<Vec<String>> = Vec::new();
        for id in &self.order {
            let level = self
                .dependencies_of(id)
                .iter()
                .filter_map(|dependency| depth.get(dependency.as_str()))
                .map(|parent| parent + 1)
                .max()
                .unwrap_or(0);
            depth.insert(id, level);
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            if let Some(wave) = waves.get_mut(level) {
                wave.push(id.clone());
            }
        }
        waves
    }
}

/// Outcome of resolving a requested set against a catalog.
///
/// Every requested id lands in exactly one place: the plan, the failures, or
/// the blocked list.
#[derive(Debug, Default)]
pub struct Resolution {
    plan: ActivationPlan,
    failures: Vec<PluginError>,
    blocked: Vec<PluginError>,
}

impl Resolution {
    pub(crate) const fn new(
        plan: ActivationPlan,
        failures: Vec<PluginError>,
        blocked: Vec<PluginError>,
    ) -> Self {
        Self {
            plan,
            failures,
            blocked,
        }
    }

    /// Returns the satisfiable part of the request.
    #[must_use]
    pub const fn plan(&self) -> &ActivationPlan {
        &self.plan
    }

    /// Returns unknown, excluded, missing-dependency, and cycle errors.
    #[must_use]
    pub fn failures(&self) -> &[PluginError] {
        &self.failures
    }

    /// Returns [`PluginError::BlockedByAncestor`] errors for plugins left
    /// out because something they depend on failed.
    #[must_use]
    pub fn blocked(&self) -> &[PluginError] {
        &self.blocked
    }

    /// Returns `true` when nothing failed or was blocked.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.blocked.is_empty()
    }

    /// Returns the plan when resolution was complete.
    ///
    /// # Errors
    ///
    /// Returns [`ResolutionError`], which still carries the partial plan.
    pub fn into_result(self) -> Result<ActivationPlan, ResolutionError> {
        if self.is_complete() {
            Ok(self.plan)
        } else {
            Err(ResolutionError {
                plan: self.plan,
                failures: self.failures,
                blocked: self.blocked,
            })
        }
    }

    /// Splits the resolution into plan, failures, and blocked errors.
    #[must_use]
    pub fn into_parts(self) -> (ActivationPlan, Vec<PluginError>, Vec<PluginError>) {
        (self.plan, self.failures, self.blocked)
    }
}

/// Resolution that could not satisfy the whole request.
#[derive(Debug, Error)]
#[error(
    "dependency resolution failed: {} error(s), {} blocked plugin(s)",
    .failures.len(),
    .blocked.len()
)]
pub struct ResolutionError {
    /// The satisfiable part of the request.
    pub plan: ActivationPlan,
    /// Unknown, excluded, missing-dependency, and cycle errors.
    pub failures: Vec<PluginError>,
    /// Plugins blocked by a failed ancestor.
    pub blocked: Vec<PluginError>,
}
