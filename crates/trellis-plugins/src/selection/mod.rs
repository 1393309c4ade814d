//! Selection of the initial activation set from host configuration.

use std::collections::{BTreeSet, HashSet};

use glob::Pattern;
use thiserror::Error;
use trellis_config::Config;

use crate::catalog::Catalog;

/// Errors raised while turning configuration into requested ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// An `enabled_patterns` entry is not a valid glob.
    #[error("invalid plugin pattern '{pattern}': {message}")]
    Pattern {
        /// Offending pattern.
        pattern: String,
        /// Parser diagnostic.
        message: String,
    },
}

/// Returns the ids configuration asks to activate.
///
/// Explicit ids come first in configured order, followed by pattern matches
/// in discovery order. Pattern matches skip excluded ids; an explicit id
/// that is also excluded is kept so resolution can report it. Without any
/// explicit selection, every catalogued plugin enabled by default and not
/// excluded is requested.
///
/// # Errors
///
/// Returns [`SelectionError::Pattern`] for a malformed glob.
pub fn requested_ids(catalog: &Catalog, config: &Config) -> Result<Vec<String>, SelectionError> {
    let excluded = excluded_ids(config);
    if !config.has_explicit_selection() {
        return Ok(catalog
            .iter()
            .filter(|descriptor| descriptor.manifest().enabled_by_default())
            .map(|descriptor| descriptor.id().to_owned())
            .filter(|id| !excluded.contains(id))
            .collect());
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut requested = Vec::new();
    for id in &config.enabled_ids {
        if seen.insert(id.clone()) {
            requested.push(id.clone());
        }
    }
    for raw in &config.enabled_patterns {
        let pattern = Pattern::new(raw).map_err(|error| SelectionError::Pattern {
            pattern: raw.clone(),
            message: error.msg.to_owned(),
        })?;
        for id in catalog.matching(&pattern) {
            if !excluded.contains(&id) && seen.insert(id.clone()) {
                requested.push(id);
            }
        }
    }
    Ok(requested)
}

/// Returns the ids configuration excludes from activation.
#[must_use]
pub fn excluded_ids(config: &Config) -> BTreeSet<String> {
    config.disabled_ids.iter().cloned().collect()
}
