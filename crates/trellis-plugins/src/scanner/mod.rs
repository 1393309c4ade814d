//! Discovery of candidate plugin sources under configured roots.
//!
//! [`PathScanner::scan`] returns a lazy [`Scan`] that reads one root at a
//! time. Candidates come out in root order, then in lexical file-name order
//! within a root; that sequence defines the discovery order used for
//! tie-breaks downstream. Each call to `scan` starts afresh.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::vec;

use camino::{Utf8Path, Utf8PathBuf};
use trellis_config::{Config, SourceKind, normalise_extension};

use crate::manifest::MANIFEST_FILE_NAME;

/// Mapping from file extension to the strategy that loads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyTable {
    extensions: BTreeMap<String, SourceKind>,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self::new(trellis_config::default_strategy_extensions())
    }
}

impl StrategyTable {
    /// Builds a table; `package` entries are ignored because packages are
    /// recognised by their manifest rather than an extension.
    #[must_use]
    pub fn new(extensions: BTreeMap<String, SourceKind>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .filter(|(_, kind)| kind.is_extension_mapped())
                .map(|(extension, kind)| (normalise_extension(&extension), kind))
                .collect(),
        }
    }

    /// Builds the effective table of `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.strategy_table())
    }

    /// Returns a copy with `extension` mapped to `kind`.
    #[must_use]
    pub fn with(mut self, extension: &str, kind: SourceKind) -> Self {
        if kind.is_extension_mapped() {
            self.extensions.insert(normalise_extension(extension), kind);
        }
        self
    }

    /// Classifies a file by its extension.
    #[must_use]
    pub fn classify(&self, path: &Utf8Path) -> Option<SourceKind> {
        let extension = normalise_extension(path.extension()?);
        self.extensions.get(&extension).copied()
    }
}

/// A location that one of the loader strategies may accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    location: Utf8PathBuf,
    kind: SourceKind,
    discovery_index: usize,
}

impl Candidate {
    /// Creates a candidate.
    pub fn new(location: impl Into<Utf8PathBuf>, kind: SourceKind, discovery_index: usize) -> Self {
        Self {
            location: location.into(),
            kind,
            discovery_index,
        }
    }

    /// Returns the candidate location.
    #[must_use]
    pub fn location(&self) -> &Utf8Path {
        &self.location
    }

    /// Returns the packaging form.
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        self.kind
    }

    /// Returns the position of the candidate within its scan.
    #[must_use]
    pub const fn discovery_index(&self) -> usize {
        self.discovery_index
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.kind)
    }
}

/// Enumerates candidates under an ordered list of roots.
#[derive(Debug, Clone)]
pub struct PathScanner {
    roots: Vec<Utf8PathBuf>,
    table: StrategyTable,
}

impl PathScanner {
    /// Creates a scanner over `roots`.
    #[must_use]
    pub const fn new(roots: Vec<Utf8PathBuf>, table: StrategyTable) -> Self {
        Self { roots, table }
    }

    /// Creates a scanner from host configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.plugin_paths.clone(), StrategyTable::from_config(config))
    }

    /// Returns the configured roots.
    #[must_use]
    pub fn roots(&self) -> &[Utf8PathBuf] {
        &self.roots
    }

    /// Starts a new pass over the roots.
    #[must_use]
    pub fn scan(&self) -> Scan<'_> {
        Scan {
            scanner: self,
            next_root: 0,
            pending: Vec::new().into_iter(),
            next_index: 0,
        }
    }

    fn classify(&self, path: &Utf8Path) -> Option<SourceKind> {
        let metadata = fs::metadata(path).ok()?;
        if metadata.is_dir() {
            path.join(MANIFEST_FILE_NAME)
                .is_file()
                .then_some(SourceKind::Package)
        } else if metadata.is_file() {
            self.table.classify(path)
        } else {
            None
        }
    }

    fn read_root(&self, root: &Utf8Path) -> Vec<(Utf8PathBuf, SourceKind)> {
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(error) => {
                tracing::warn!(
                    target: "trellis::scan",
                    event = "root_unreadable",
                    root = %root,
                    error = %error,
                    "skipping plugin root"
                );
                return Vec::new();
            }
        };

        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| match entry.file_name().into_string() {
                Ok(name) => Some(name),
                Err(raw) => {
                    tracing::debug!(
                        target: "trellis::scan",
                        event = "entry_skipped",
                        root = %root,
                        name = ?raw,
                        "skipping entry with a non UTF-8 name"
                    );
                    None
                }
            })
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();

        names
            .into_iter()
            .filter_map(|name| {
                let path = root.join(&name);
                let kind = self.classify(&path);
                if kind.is_none() {
                    tracing::trace!(
                        target: "trellis::scan",
                        event = "entry_skipped",
                        path = %path,
                        "entry is not a plugin candidate"
                    );
                }
                kind.map(|found| (path, found))
            })
            .collect()
    }
}

/// Lazy pass over the scanner's roots.
#[derive(Debug)]
pub struct Scan<'a> {
    scanner: &'a PathScanner,
    next_root: usize,
    pending: vec::IntoIter<(Utf8PathBuf, SourceKind)>,
    next_index: usize,
}

impl Iterator for Scan<'_> {
    type Item = Candidate;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((location, kind)) = self.pending.next() {
                let candidate = Candidate::new(location, kind, self.next_index);
                self.next_index += 1;
                tracing::debug!(
                    target: "trellis::scan",
                    event = "candidate_found",
                    path = %candidate.location(),
                    kind = %candidate.kind(),
                    index = candidate.discovery_index(),
                    "found plugin candidate"
                );
                return Some(candidate);
            }
            let root = self.scanner.roots.get(self.next_root)?;
            self.next_root += 1;
            self.pending = self.scanner.read_root(root).into_iter();
        }
    }
}
