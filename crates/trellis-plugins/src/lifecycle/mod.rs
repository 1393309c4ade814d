//! Lifecycle management for catalogued plugins.
//!
//! The manager owns the catalog behind a lock and drives every plugin
//! through the state machine in [`PluginState`]. Hooks always run outside
//! the lock. Activation walks a resolved plan wave by wave; plugins in the
//! same wave are independent and may be enabled concurrently. A plugin whose
//! dependency failed during the run is skipped, as is everything downstream
//! of it, while unrelated plugins continue.

mod hooks;
mod report;
mod state;

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
};

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::catalog::{Catalog, PluginDescriptor};
use crate::context::PluginContext;
use crate::error::PluginError;
use crate::extensions::ExtensionRegistry;
use crate::observer::{LifecycleObserver, StructuredObserver};
use crate::plugin::{HookPhase, Plugin};
use crate::resolver::{self, ActivationPlan, Resolution};
use crate::services::{DisplacementListener, OverrideRules, ServiceRegistry, ServiceValue};

pub use self::report::{
    ActivationOptions, ActivationOutcome, ActivationReport, CancellationFlag, DisableReport,
};
pub use self::state::PluginState;

/// Drives catalogued plugins through their lifecycle.
pub struct LifecycleManager {
    catalog: Arc<RwLock<Catalog>>,
    services: Arc<ServiceRegistry>,
    extensions: Arc<ExtensionRegistry>,
    observer: Arc<dyn LifecycleObserver>,
    enable_sequence: Mutex<Vec<String>>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager")
            .field("plugins", &self.read().len())
            .field("services", &self.services)
            .finish_non_exhaustive()
    }
}

/// Forwards displacement notices to the displaced plugin's entry point.
struct DisplacementNotifier {
    catalog: Weak<RwLock<Catalog>>,
}

impl DisplacementListener for DisplacementNotifier {
    fn displaced(&self, key: &str, previous_owner: &str, new_owner: &str) {
        let Some(catalog) = self.catalog.upgrade() else {
            return;
        };
        let entry = catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(previous_owner)
            .map(PluginDescriptor::entry);
        if let Some(entry) = entry {
            entry.service_displaced(key, new_owner);
        }
    }
}

impl LifecycleManager {
    /// Takes ownership of `catalog`, reporting through [`StructuredObserver`].
    #[must_use]
    pub fn new(catalog: Catalog, rules: OverrideRules) -> Self {
        Self::with_observer(catalog, rules, Arc::new(StructuredObserver::new()))
    }

    /// Takes ownership of `catalog`, reporting through `observer`.
    #[must_use]
    pub fn with_observer(
        catalog: Catalog,
        rules: OverrideRules,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Self {
        let shared = Arc::new(RwLock::new(catalog));
        let services = Arc::new(ServiceRegistry::new(rules));
        let installed = services.set_displacement_listener(Arc::new(DisplacementNotifier {
            catalog: Arc::downgrade(&shared),
        }));
        debug_assert!(installed, "fresh registry has no listener");
        Self {
            catalog: shared,
            services,
            extensions: Arc::new(ExtensionRegistry::new()),
            observer,
            enable_sequence: Mutex::new(Vec::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sequence(&self) -> MutexGuard<'_, Vec<String>> {
        self.enable_sequence
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the shared service registry.
    #[must_use]
    pub const fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Returns the shared extension registry.
    #[must_use]
    pub const fn extensions(&self) -> &Arc<ExtensionRegistry> {
        &self.extensions
    }

    /// Looks up a live service.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotFound`] when no enabled plugin provides
    /// `key`.
    pub fn get_service(&self, key: &str) -> Result<ServiceValue, PluginError> {
        self.services.lookup(key)
    }

    /// Returns the current state of `id`.
    #[must_use]
    pub fn state(&self, id: &str) -> Option<PluginState> {
        self.read().get(id).map(PluginDescriptor::state)
    }

    /// Returns every catalogued id with its state, in discovery order.
    #[must_use]
    pub fn states(&self) -> Vec<(String, PluginState)> {
        self.read()
            .iter()
            .map(|descriptor| (descriptor.id().to_owned(), descriptor.state()))
            .collect()
    }

    /// Returns enabled plugins in the order they were enabled.
    #[must_use]
    pub fn enabled(&self) -> Vec<String> {
        self.sequence().clone()
    }

    /// Runs `inspect` against the catalog under its read lock.
    pub fn with_catalog<R>(&self, inspect: impl FnOnce(&Catalog) -> R) -> R {
        inspect(&self.read())
    }

    /// Adds a descriptor loaded after the manager was created.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DuplicateId`] when the id is catalogued.
    pub fn insert(&self, descriptor: PluginDescriptor) -> Result<(), PluginError> {
        self.write().insert(descriptor)
    }

    /// Resolves `requested` against the current catalog.
    #[must_use]
    pub fn resolve<I, S>(&self, requested: I) -> Resolution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        resolver::resolve(&self.read(), requested)
    }

    /// Resolves `requested` against the current catalog, treating
    /// `excluded` ids as unavailable.
    #[must_use]
    pub fn resolve_excluding<I, S>(&self, requested: I, excluded: &BTreeSet<String>) -> Resolution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        resolver::resolve_excluding(&self.read(), requested, excluded)
    }

    /// Enables every plugin in `plan`, dependencies first.
    ///
    /// Failures never abort the run: the failing plugin moves to `failed`,
    /// its registrations are withdrawn, and its dependents are skipped.
    pub fn activate(&self, plan: &ActivationPlan, options: &ActivationOptions) -> ActivationReport {
        let pool = build_pool(options.max_parallel);
        let mut outcomes: HashMap<String, ActivationOutcome> = HashMap::with_capacity(plan.len());
        let mut origins: HashMap<String, String> = HashMap::new();

        for wave in plan.waves() {
            let step = |id: &String| (id.clone(), self.activate_one(id, plan, &origins, options));
            let results: Vec<(String, ActivationOutcome)> = match &pool {
                Some(pool) if wave.len() > 1 => pool.install(|| wave.par_iter().map(step).collect()),
                _ => wave.iter().map(step).collect(),
            };
            for (id, outcome) in results {
                match &outcome {
                    ActivationOutcome::Failed(_) => {
                        origins.insert(id.clone(), id.clone());
                    }
                    ActivationOutcome::Skipped { blocked_by } => {
                        origins.insert(id.clone(), blocked_by.clone());
                    }
                    _ => {}
                }
                outcomes.insert(id, outcome);
            }
        }

        let ordered = plan
            .ids()
            .iter()
            .filter_map(|id| outcomes.remove(id).map(|outcome| (id.clone(), outcome)))
            .collect();
        let report = ActivationReport::new(ordered);
        tracing::info!(
            target: "trellis::lifecycle",
            event = "activation_completed",
            planned = plan.len(),
            enabled = report.enabled().len(),
            "activation completed"
        );
        report
    }

    fn activate_one(
        &self,
        id: &str,
        plan: &ActivationPlan,
        origins: &HashMap<String, String>,
        options: &ActivationOptions,
    ) -> ActivationOutcome {
        if options.cancel.is_cancelled() {
            return ActivationOutcome::Cancelled;
        }
        let blocked_by = plan
            .dependencies_of(id)
            .iter()
            .find_map(|dependency| origins.get(dependency));
        if let Some(origin) = blocked_by {
            self.observer.plugin_skipped(id, origin);
            return ActivationOutcome::Skipped {
                blocked_by: origin.clone(),
            };
        }

        let (entry, points) = match self.begin_enabling(id) {
            Ok(Some(started)) => started,
            Ok(None) => return ActivationOutcome::AlreadyEnabled,
            Err(error) => {
                self.observer.plugin_failed(id, &error);
                return ActivationOutcome::Failed(error);
            }
        };
        self.observer.plugin_enabling(id);

        let context = self.context_for(id);
        let started = run_enable_hooks(id, &entry, &context, &points, options)
            .and_then(|()| self.finish(id, PluginState::Enabled));
        match started {
            Ok(()) => {
                self.sequence().push(id.to_owned());
                self.observer.plugin_enabled(id);
                ActivationOutcome::Enabled
            }
            Err(error) => {
                context.revoke();
                self.withdraw(id);
                if let Err(transition) = self.finish(id, PluginState::Failed) {
                    tracing::warn!(
                        target: "trellis::lifecycle",
                        event = "transition_rejected",
                        error = %transition,
                        "could not mark plugin failed"
                    );
                }
                self.observer.plugin_failed(id, &error);
                ActivationOutcome::Failed(error)
            }
        }
    }

    /// Checks dependencies and moves `id` to `enabling`. Returns `None` when
    /// the plugin is already enabled.
    fn begin_enabling(
        &self,
        id: &str,
    ) -> Result<Option<(Arc<dyn Plugin>, Vec<String>)>, PluginError> {
        let mut catalog = self.write();
        let descriptor = catalog.get(id).ok_or_else(|| unknown(id))?;
        if descriptor.state() == PluginState::Enabled {
            return Ok(None);
        }
        for dependency in descriptor.dependencies() {
            let state = catalog
                .get(dependency.id())
                .map_or(PluginState::Unloaded, PluginDescriptor::state);
            if state != PluginState::Enabled {
                return Err(PluginError::DependencyNotEnabled {
                    id: id.to_owned(),
                    dependency: dependency.id().to_owned(),
                    state,
                });
            }
        }

        let descriptor = catalog.get_mut(id).ok_or_else(|| unknown(id))?;
        if descriptor.state() == PluginState::Disabled {
            descriptor.transition(PluginState::Loaded)?;
        }
        descriptor.transition(PluginState::Enabling)?;
        Ok(Some((
            descriptor.entry(),
            descriptor.manifest().extension_points().to_vec(),
        )))
    }

    fn finish(&self, id: &str, next: PluginState) -> Result<(), PluginError> {
        self.write()
            .get_mut(id)
            .ok_or_else(|| unknown(id))?
            .transition(next)
            .map(|_| ())
    }

    fn context_for(&self, id: &str) -> PluginContext {
        PluginContext::new(id, Arc::clone(&self.services), Arc::clone(&self.extensions))
    }

    fn withdraw(&self, id: &str) {
        let keys = self.services.unregister_all(id);
        self.extensions.remove_owner(id);
        if !keys.is_empty() {
            tracing::debug!(
                target: "trellis::lifecycle",
                event = "services_withdrawn",
                plugin = id,
                keys = ?keys,
                "withdrew plugin services"
            );
        }
    }

    /// Disables `id`. With `cascade`, enabled dependents are disabled first
    /// in reverse enable order.
    ///
    /// Hook failures are collected in the report; the failing plugin ends in
    /// `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`], [`PluginError::InvalidTransition`]
    /// when `id` is not enabled, or [`PluginError::ActiveDependents`] when
    /// enabled dependents exist and `cascade` is off.
    pub fn disable(&self, id: &str, cascade: bool) -> Result<DisableReport, PluginError> {
        let dependents = {
            let catalog = self.read();
            let state = catalog.get(id).ok_or_else(|| unknown(id))?.state();
            if state != PluginState::Enabled {
                return Err(PluginError::transition(id, state, PluginState::Disabling));
            }
            enabled_dependents(&catalog, id)
        };
        if !dependents.is_empty() && !cascade {
            return Err(PluginError::ActiveDependents {
                id: id.to_owned(),
                dependents: dependents.into_iter().collect(),
            });
        }

        let mut report = DisableReport::default();
        for dependent in self.reverse_enable_order(&dependents) {
            report.record(&dependent, self.disable_one(&dependent));
        }
        report.record(id, self.disable_one(id));
        Ok(report)
    }

    fn reverse_enable_order(&self, ids: &BTreeSet<String>) -> Vec<String> {
        let sequence = self.sequence();
        let mut ordered: Vec<String> = sequence
            .iter()
            .rev()
            .filter(|id| ids.contains(*id))
            .cloned()
            .collect();
        let listed: HashSet<&String> = sequence.iter().collect();
        ordered.extend(ids.iter().filter(|id| !listed.contains(id)).cloned());
        ordered
    }

    fn disable_one(&self, id: &str) -> Result<(), PluginError> {
        let entry = {
            let mut catalog = self.write();
            let descriptor = catalog.get_mut(id).ok_or_else(|| unknown(id))?;
            descriptor.transition(PluginState::Disabling)?;
            descriptor.entry()
        };
        self.sequence().retain(|enabled| enabled != id);
        self.withdraw(id);

        let context = self.context_for(id);
        let outcome = hooks::run(id, HookPhase::Deactivate, &entry, &context, None);
        // Anything the hook published while stopping goes too.
        context.revoke();
        self.withdraw(id);
        match outcome {
            Ok(()) => {
                self.finish(id, PluginState::Disabled)?;
                self.observer.plugin_disabled(id);
                Ok(())
            }
            Err(error) => {
                self.finish(id, PluginState::Failed)?;
                self.observer.plugin_failed(id, &error);
                Err(error)
            }
        }
    }

    /// Moves a `disabled` plugin back to `loaded`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidTransition`] from any other state.
    pub fn reset(&self, id: &str) -> Result<(), PluginError> {
        self.finish(id, PluginState::Loaded)
    }

    /// Removes `id` from the catalog along with anything it registered.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`], or
    /// [`PluginError::InvalidTransition`] unless the plugin is discovered,
    /// loaded, disabled, or failed.
    pub fn unload(&self, id: &str) -> Result<(), PluginError> {
        let last_state = {
            let mut catalog = self.write();
            let state = catalog.get(id).ok_or_else(|| unknown(id))?.state();
            if !state.can_transition_to(PluginState::Unloaded) {
                return Err(PluginError::transition(id, state, PluginState::Unloaded));
            }
            catalog.remove(id);
            state
        };
        self.withdraw(id);
        self.observer.plugin_unloaded(id, last_state);
        Ok(())
    }

    /// Disables every enabled plugin in reverse enable order, then unloads
    /// the whole catalog.
    pub fn shutdown(&self) -> DisableReport {
        let mut report = DisableReport::default();
        let sequence: Vec<String> = self.sequence().iter().rev().cloned().collect();
        for id in sequence {
            if self.state(&id) == Some(PluginState::Enabled) {
                report.record(&id, self.disable_one(&id));
            }
        }
        let remaining = self.read().ids();
        for id in remaining {
            if let Err(error) = self.unload(&id) {
                report.push_failure(error);
            }
        }
        tracing::info!(
            target: "trellis::lifecycle",
            event = "shutdown_completed",
            disabled = report.disabled().len(),
            failures = report.failures().len(),
            "plugin host shut down"
        );
        report
    }
}

fn run_enable_hooks(
    id: &str,
    entry: &Arc<dyn Plugin>,
    context: &PluginContext,
    points: &[String],
    options: &ActivationOptions,
) -> Result<(), PluginError> {
    for point in points {
        context.declare_extension_point(point)?;
    }
    hooks::run(id, HookPhase::Configure, entry, context, options.hook_timeout)?;
    hooks::run(id, HookPhase::Activate, entry, context, options.hook_timeout)
}

/// Transitive dependents of `id` that are currently enabled.
fn enabled_dependents(catalog: &Catalog, id: &str) -> BTreeSet<String> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = catalog.direct_dependents(id).into();
    let mut enabled = BTreeSet::new();
    while let Some(next) = queue.pop_front() {
        if !visited.insert(next.clone()) {
            continue;
        }
        if catalog
            .get(&next)
            .is_some_and(|descriptor| descriptor.state() == PluginState::Enabled)
        {
            enabled.insert(next.clone());
        }
        queue.extend(catalog.direct_dependents(&next));
    }
    enabled
}

fn unknown(id: &str) -> PluginError {
    PluginError::UnknownPlugin { id: id.to_owned() }
}

fn build_pool(max_parallel: usize) -> Option<ThreadPool> {
    if max_parallel < 2 {
        return None;
    }
    ThreadPoolBuilder::new()
        .num_threads(max_parallel)
        .thread_name(|index| format!("trellis-enable-{index}"))
        .build()
        .map_err(|error| {
            tracing::warn!(
                target: "trellis::lifecycle",
                event = "pool_unavailable",
                error = %error,
                "enabling sequentially"
            );
        })
        .ok()
}

#[cfg(test)]
mod tests;
