//! Shared fixtures and end-to-end tests for the plugin pipeline.


use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use trellis_config::SourceKind;

use crate::catalog::{Catalog, PluginDescriptor, PluginSource};
use crate::context::PluginContext;
use crate::lifecycle::PluginState;
use crate::manifest::{Dependency, PluginManifest};
use crate::plugin::{HookError, HookPhase, InertPlugin, Plugin};
use crate::version::Version;

/// Builds a manifest. Dependencies are written `id` or `id@requirement`.
pub(crate) fn manifest(id: &str, version: &str, deps: &[&str]) -> PluginManifest {
    let parsed: Version = version.parse().expect("valid version");
    deps.iter().fold(PluginManifest::new(id, parsed), |built, entry| {
        let dependency = match entry.split_once('@') {
            Some((name, requirement)) => {
                Dependency::new(name, requirement.parse().expect("valid requirement"))
            }
            None => Dependency::new(*entry, crate::version::VersionReq::STAR),
        };
        built.with_dependency(dependency)
    })
}

/// Builds a `loaded` descriptor bound to `entry`.
pub(crate) fn descriptor_with(
    manifest: PluginManifest,
    entry: Arc<dyn Plugin>,
) -> PluginDescriptor {
    let source = PluginSource::new(format!("/plugins/{}", manifest.id()), SourceKind::Package);
    let mut descriptor = PluginDescriptor::new(manifest, source, entry);
    descriptor
        .transition(PluginState::Loaded)
        .expect("discovered descriptors can load");
    descriptor
}

/// Builds a `loaded` descriptor with an inert entry point.
pub(crate) fn descriptor(id: &str, version: &str, deps: &[&str]) -> PluginDescriptor {
    descriptor_with(manifest(id, version, deps), Arc::new(InertPlugin))
}

/// Builds a catalog of version `1.0.0` plugins in the given order.
pub(crate) fn catalog_of(entries: &[(&str, &[&str])]) -> Catalog {
    let mut catalog = Catalog::new();
    for (id, deps) in entries {
        catalog
            .insert(descriptor(id, "1.0.0", deps))
            .expect("unique ids");
    }
    catalog
}

/// Shared log of hook invocations, recorded as `id:phase`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub(crate) fn push(&self, entry: String) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn of_phase(&self, phase: HookPhase) -> Vec<String> {
        let suffix = format!(":{phase}");
        self.entries()
            .into_iter()
            .filter_map(|entry| entry.strip_suffix(&suffix).map(str::to_owned))
            .collect()
    }
}

/// Plugin whose hooks journal themselves and can be told to misbehave.
#[derive(Debug, Clone)]
pub(crate) struct Scripted {
    id: String,
    journal: Journal,
    service: Option<String>,
    fail_on: Option<HookPhase>,
    delay: Option<Duration>,
}

impl Scripted {
    pub(crate) fn new(id: &str, journal: &Journal) -> Self {
        Self {
            id: id.to_owned(),
            journal: journal.clone(),
            service: None,
            fail_on: None,
            delay: None,
        }
    }

    /// Registers `key` during activation, holding the plugin id.
    pub(crate) fn providing(mut self, key: &str) -> Self {
        self.service = Some(key.to_owned());
        self
    }

    pub(crate) const fn failing_on(mut self, phase: HookPhase) -> Self {
        self.fail_on = Some(phase);
        self
    }

    /// Sleeps for `delay` at the start of activation.
    pub(crate) const fn sleeping(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn step(&self, phase: HookPhase) -> Result<(), HookError> {
        self.journal.push(format!("{}:{phase}", self.id));
        if let (HookPhase::Activate, Some(delay)) = (phase, self.delay) {
            thread::sleep(delay);
        }
        Ok(())
    }

    fn verdict(&self, phase: HookPhase) -> Result<(), HookError> {
        if self.fail_on == Some(phase) {
            Err(HookError::new(format!("{} refused to {phase}", self.id)))
        } else {
            Ok(())
        }
    }
}

impl Plugin for Scripted {
    fn configure(&self, _context: &PluginContext) -> Result<(), HookError> {
        self.step(HookPhase::Configure)?;
        self.verdict(HookPhase::Configure)
    }

    fn activate(&self, context: &PluginContext) -> Result<(), HookError> {
        self.step(HookPhase::Activate)?;
        if let Some(key) = &self.service {
            context
                .register_service(key, self.id.clone())
                .map_err(|error| HookError::with_source("service registration failed", error))?;
        }
        self.verdict(HookPhase::Activate)
    }

    fn deactivate(&self, _context: &PluginContext) -> Result<(), HookError> {
        self.step(HookPhase::Deactivate)?;
        self.verdict(HookPhase::Deactivate)
    }
}

/// Catalog of scripted plugins in the given order.
pub(crate) fn scripted_catalog(plugins: &[(Scripted, &[&str])]) -> Catalog {
    let mut catalog = Catalog::new();
    for (plugin, deps) in plugins {
        let entry: Arc<dyn Plugin> = Arc::new(plugin.clone());
        catalog
            .insert(descriptor_with(manifest(&plugin.id, "1.0.0", deps), entry))
            .expect("unique ids");
    }
    catalog
}
