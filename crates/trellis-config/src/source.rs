//! Packaging forms recognised for plugin sources.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The packaging form of a plugin candidate.
///
/// Each variant selects one loader strategy. Directory packages are
/// recognised by their manifest; the other kinds are recognised by file
/// extension through the strategy table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SourceKind {
    /// A directory holding a manifest alongside the plugin's files.
    Package,
    /// A single self-describing module file.
    File,
    /// A compressed archive read in place.
    Archive,
}

impl SourceKind {
    /// Returns the canonical lowercase name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::File => "file",
            Self::Archive => "archive",
        }
    }

    /// Returns `true` when the kind can be selected by file extension.
    #[must_use]
    pub const fn is_extension_mapped(self) -> bool {
        matches!(self, Self::File | Self::Archive)
    }
}
