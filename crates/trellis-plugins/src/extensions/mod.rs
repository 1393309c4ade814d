//! Named extension points that plugins declare and contribute to.
//!
//! An extension point is owned by the plugin that declared it. Other plugins
//! contribute extenders: closures evaluated on first access and cached, so an
//! extender runs at most once. Contributions disappear with their owner.
//! When a point's owner goes away, contributions from other plugins are
//! parked under the point name and return if the point is declared again.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::PluginError;

/// Value produced by an extender.
pub type Extension = Arc<dyn Any + Send + Sync>;

pub(crate) type Extender = Box<dyn Fn() -> Extension + Send + Sync>;

struct Contribution {
    owner: String,
    extender: Extender,
    value: OnceLock<Extension>,
}

impl Contribution {
    fn evaluate(&self) -> Extension {
        Arc::clone(self.value.get_or_init(|| (self.extender)()))
    }
}

struct Point {
    owner: String,
    contributions: Vec<Arc<Contribution>>,
}

#[derive(Default)]
struct Points {
    declared: BTreeMap<String, Point>,
    parked: BTreeMap<String, Vec<Arc<Contribution>>>,
}

/// Registry of extension points and their contributions.
#[derive(Default)]
pub struct ExtensionRegistry {
    points: RwLock<Points>,
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("points", &self.points())
            .finish()
    }
}

impl ExtensionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares `point` on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DuplicateExtensionPoint`] when the point is
    /// already declared.
    pub fn declare(&self, point: &str, owner: &str) -> Result<(), PluginError> {
        self.declare_guarded(point, owner, None)
    }

    pub(crate) fn declare_guarded(
        &self,
        point: &str,
        owner: &str,
        revoked: Option<&AtomicBool>,
    ) -> Result<(), PluginError> {
        let mut points = self.write();
        check_revoked(owner, revoked)?;
        if let Some(existing) = points.declared.get(point) {
            return Err(PluginError::DuplicateExtensionPoint {
                point: point.to_owned(),
                owner: existing.owner.clone(),
            });
        }
        let contributions = points.parked.remove(point).unwrap_or_default();
        points.declared.insert(
            point.to_owned(),
            Point {
                owner: owner.to_owned(),
                contributions,
            },
        );
        Ok(())
    }

    /// Adds an extender to `point` on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownExtensionPoint`] when the point is not
    /// declared.
    pub fn contribute<F>(&self, point: &str, owner: &str, extender: F) -> Result<(), PluginError>
    where
        F: Fn() -> Extension + Send + Sync + 'static,
    {
        self.contribute_guarded(point, owner, Box::new(extender), None)
    }

    pub(crate) fn contribute_guarded(
        &self,
        point: &str,
        owner: &str,
        extender: Extender,
        revoked: Option<&AtomicBool>,
    ) -> Result<(), PluginError> {
        let mut points = self.write();
        check_revoked(owner, revoked)?;
        let target = points
            .declared
            .get_mut(point)
            .ok_or_else(|| PluginError::UnknownExtensionPoint {
                point: point.to_owned(),
            })?;
        target.contributions.push(Arc::new(Contribution {
            owner: owner.to_owned(),
            extender,
            value: OnceLock::new(),
        }));
        Ok(())
    }

    /// Evaluates and returns every extension contributed to `point`, in
    /// contribution order.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownExtensionPoint`] when the point is not
    /// declared.
    pub fn extensions(&self, point: &str) -> Result<Vec<Extension>, PluginError> {
        let contributions = self
            .read()
            .declared
            .get(point)
            .map(|target| target.contributions.clone())
            .ok_or_else(|| PluginError::UnknownExtensionPoint {
                point: point.to_owned(),
            })?;
        Ok(contributions
            .iter()
            .map(|contribution| contribution.evaluate())
            .collect())
    }

    /// Returns the extensions of `point` that are of type `T`.
    ///
    /// # Errors
    ///
    /// As [`ExtensionRegistry::extensions`].
    pub fn extensions_of<T>(&self, point: &str) -> Result<Vec<Arc<T>>, PluginError>
    where
        T: Any + Send + Sync,
    {
        Ok(self
            .extensions(point)?
            .into_iter()
            .filter_map(|extension| extension.downcast::<T>().ok())
            .collect())
    }

    /// Returns the declaring plugin of `point`.
    #[must_use]
    pub fn owner_of(&self, point: &str) -> Option<String> {
        self.read()
            .declared
            .get(point)
            .map(|target| target.owner.clone())
    }

    /// Returns the plugins contributing to `point`, in contribution order.
    #[must_use]
    pub fn contributors(&self, point: &str) -> Vec<String> {
        self.read()
            .declared
            .get(point)
            .map(|target| {
                target
                    .contributions
                    .iter()
                    .map(|contribution| contribution.owner.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the declared points in lexical order.
    #[must_use]
    pub fn points(&self) -> Vec<String> {
        self.read().declared.keys().cloned().collect()
    }

    /// Removes every contribution made by `owner` and the points it
    /// declared.
    ///
    /// Other plugins' contributions to a removed point are kept aside and
    /// reattached when the point is declared again.
    pub fn remove_owner(&self, owner: &str) {
        let mut guard = self.write();
        let points = &mut *guard;
        for contributions in points
            .declared
            .values_mut()
            .map(|target| &mut target.contributions)
            .chain(points.parked.values_mut())
        {
            contributions.retain(|contribution| contribution.owner != owner);
        }
        let owned: Vec<String> = points
            .declared
            .iter()
            .filter(|(_, target)| target.owner == owner)
            .map(|(name, _)| name.clone())
            .collect();
        for name in owned {
            if let Some(target) = points.declared.remove(&name) {
                points
                    .parked
                    .entry(name)
                    .or_default()
                    .extend(target.contributions);
            }
        }
        points
            .parked
            .retain(|_, contributions| !contributions.is_empty());
    }

    fn read(&self) -> RwLockReadGuard<'_, Points> {
        self.points.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Points> {
        self.points.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_revoked(owner: &str, revoked: Option<&AtomicBool>) -> Result<(), PluginError> {
    if revoked.is_some_and(|flag| flag.load(Ordering::Acquire)) {
        Err(PluginError::ContextRevoked {
            id: owner.to_owned(),
        })
    } else {
        Ok(())
    }
}
