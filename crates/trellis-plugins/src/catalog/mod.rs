//! Id-keyed store of loaded plugin descriptors.
//!
//! Inserts are serialised by the caller (the catalog is a plain value) and
//! assign each descriptor its discovery ordinal. A duplicate id is rejected
//! and the catalog keeps the first occurrence.

mod descriptor;

use std::collections::{BTreeMap, HashMap};

use glob::Pattern;

use crate::error::PluginError;

pub use self::descriptor::{PluginDescriptor, PluginSource};

/// Loaded descriptors in discovery order.
#[derive(Debug, Default)]
pub struct Catalog {
    descriptors: BTreeMap<usize, PluginDescriptor>,
    index: HashMap<String, usize>,
    next_ordinal: usize,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor, assigning it the next discovery ordinal.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DuplicateId`] when the id is present; the
    /// existing descriptor is kept.
    pub fn insert(&mut self, mut descriptor: PluginDescriptor) -> Result<(), PluginError> {
        if let Some(existing) = self.get(descriptor.id()) {
            return Err(PluginError::DuplicateId {
                id: descriptor.id().to_owned(),
                existing: existing.source().path().to_owned(),
                duplicate: descriptor.source().path().to_owned(),
            });
        }
        let ordinal = self.next_ordinal;
        self.next_ordinal += 1;
        descriptor.set_ordinal(ordinal);
        self.index.insert(descriptor.id().to_owned(), ordinal);
        self.descriptors.insert(ordinal, descriptor);
        Ok(())
    }

    /// Returns the descriptor for `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PluginDescriptor> {
        self.index
            .get(id)
            .and_then(|ordinal| self.descriptors.get(ordinal))
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut PluginDescriptor> {
        let ordinal = self.index.get(id)?;
        self.descriptors.get_mut(ordinal)
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<PluginDescriptor> {
        let ordinal = self.index.remove(id)?;
        self.descriptors.remove(&ordinal)
    }

    /// Returns `true` when `id` is catalogued.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Iterates descriptors in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.descriptors.values()
    }

    /// Returns the ids in discovery order.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        self.iter()
            .map(|descriptor| descriptor.id().to_owned())
            .collect()
    }

    /// Returns the ids matching a glob pattern, in discovery order.
    #[must_use]
    pub fn matching(&self, pattern: &Pattern) -> Vec<String> {
        self.iter()
            .filter(|descriptor| pattern.matches(descriptor.id()))
            .map(|descriptor| descriptor.id().to_owned())
            .collect()
    }

    /// Returns the ids of catalogued plugins that declare a dependency on
    /// `id`, in discovery order.
    #[must_use]
    pub fn direct_dependents(&self, id: &str) -> Vec<String> {
        self.iter()
            .filter(|descriptor| {
                descriptor
                    .dependencies()
                    .iter()
                    .any(|dependency| dependency.id() == id)
            })
            .map(|descriptor| descriptor.id().to_owned())
            .collect()
    }

    /// Returns the number of descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns `true` when the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
