//! Serialisable views over scanner, catalog, and resolver results.

use std::io::{self, Write};

use camino::Utf8PathBuf;
use serde::Serialize;
use trellis_plugins::{Candidate, PluginDescriptor, PluginError, SourceKind};

use super::Report;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct CandidateView {
    pub(crate) index: usize,
    pub(crate) kind: SourceKind,
    pub(crate) location: Utf8PathBuf,
}

impl From<&Candidate> for CandidateView {
    fn from(candidate: &Candidate) -> Self {
        Self {
            index: candidate.discovery_index(),
            kind: candidate.kind(),
            location: candidate.location().to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ScanReport {
    pub(crate) candidates: Vec<CandidateView>,
}

impl Report for ScanReport {
    fn write_human(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.candidates.is_empty() {
            return writeln!(out, "no plugin candidates found");
        }
        for candidate in &self.candidates {
            writeln!(
                out,
                "{:>3}  {:<8} {}",
                candidate.index,
                candidate.kind.as_str(),
                candidate.location
            )?;
        }
        Ok(())
    }

    fn is_clean(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PluginView {
    pub(crate) id: String,
    pub(crate) version: String,
    pub(crate) name: Option<String>,
    pub(crate) enabled_by_default: bool,
    pub(crate) dependencies: Vec<String>,
    pub(crate) extension_points: Vec<String>,
    pub(crate) kind: SourceKind,
    pub(crate) source: String,
}

impl From<&PluginDescriptor> for PluginView {
    fn from(descriptor: &PluginDescriptor) -> Self {
        let manifest = descriptor.manifest();
        Self {
            id: descriptor.id().to_owned(),
            version: descriptor.version().to_string(),
            name: manifest.metadata().name.clone(),
            enabled_by_default: manifest.enabled_by_default(),
            dependencies: descriptor
                .dependencies()
                .iter()
                .map(ToString::to_string)
                .collect(),
            extension_points: manifest.extension_points().to_vec(),
            kind: descriptor.source().kind(),
            source: descriptor.source().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ListReport {
    pub(crate) plugins: Vec<PluginView>,
    pub(crate) errors: Vec<String>,
}

impl Report for ListReport {
    fn write_human(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.plugins.is_empty() {
            writeln!(out, "no plugins loaded")?;
        }
        for plugin in &self.plugins {
            let marker = if plugin.enabled_by_default {
                ""
            } else {
                " (off by default)"
            };
            writeln!(out, "{} {}{marker}", plugin.id, plugin.version)?;
            writeln!(out, "    source: {}", plugin.source)?;
            if !plugin.dependencies.is_empty() {
                writeln!(out, "    depends on: {}", plugin.dependencies.join(", "))?;
            }
            if !plugin.extension_points.is_empty() {
                writeln!(
                    out,
                    "    extension points: {}",
                    plugin.extension_points.join(", ")
                )?;
            }
        }
        Ok(())
    }

    fn diagnostics(&self) -> &[String] {
        &self.errors
    }

    fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct BlockedView {
    pub(crate) id: String,
    pub(crate) ancestor: String,
}

impl BlockedView {
    pub(crate) fn from_error(error: &PluginError) -> Option<Self> {
        match error {
            PluginError::BlockedByAncestor { id, ancestor } => Some(Self {
                id: id.clone(),
                ancestor: ancestor.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct PlanReport {
    pub(crate) requested: Vec<String>,
    pub(crate) order: Vec<String>,
    pub(crate) waves: Vec<Vec<String>>,
    pub(crate) failures: Vec<String>,
    pub(crate) blocked: Vec<BlockedView>,
    pub(crate) load_errors: Vec<String>,
}

impl Report for PlanReport {
    fn write_human(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.order.is_empty() {
            writeln!(out, "activation order: (empty)")?;
        } else {
            writeln!(out, "activation order:")?;
            for (position, id) in self.order.iter().enumerate() {
                writeln!(out, "  {}. {id}", position + 1)?;
            }
        }
        if self.waves.len() > 1 {
            writeln!(out, "waves:")?;
            for (level, wave) in self.waves.iter().enumerate() {
                writeln!(out, "  {}: {}", level + 1, wave.join(", "))?;
            }
        }
        if !self.failures.is_empty() {
            writeln!(out, "failed:")?;
            for failure in &self.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        if !self.blocked.is_empty() {
            writeln!(out, "blocked:")?;
            for blocked in &self.blocked {
                writeln!(out, "  - {} (blocked by {})", blocked.id, blocked.ancestor)?;
            }
        }
        Ok(())
    }

    fn diagnostics(&self) -> &[String] {
        &self.load_errors
    }

    fn is_clean(&self) -> bool {
        self.load_errors.is_empty() && self.failures.is_empty() && self.blocked.is_empty()
    }
}
