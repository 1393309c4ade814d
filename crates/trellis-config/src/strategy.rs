//! Extension to loader-strategy directives.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::normalise_extension;
use crate::source::SourceKind;

/// Errors produced when parsing a [`StrategyMapping`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyMappingParseError {
    /// The `=` between extension and strategy was missing.
    #[error("mapping '{0}' is missing the assignment '='")]
    MissingAssignment(String),
    /// The strategy name is not a recognised [`SourceKind`].
    #[error("mapping '{input}' names an unknown strategy")]
    UnknownStrategy {
        /// Directive that failed to parse.
        input: String,
        /// Underlying parse error.
        #[source]
        source: strum::ParseError,
    },
}

/// Routes one file extension to the strategy that reads it.
///
/// Written as `ext=kind`, for example `tgz=archive`. The extension is stored
/// normalised, so `.TGZ=archive` and `tgz=archive` are the same directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StrategyMapping {
    extension: String,
    kind: SourceKind,
}

impl StrategyMapping {
    /// Creates a directive routing `extension` to `kind`.
    #[must_use]
    pub fn new(extension: &str, kind: SourceKind) -> Self {
        Self {
            extension: normalise_extension(extension),
            kind,
        }
    }

    /// Returns the normalised extension.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Returns the strategy selected for the extension.
    #[must_use]
    pub const fn kind(&self) -> SourceKind {
        self.kind
    }
}

impl fmt::Display for StrategyMapping {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}={}", self.extension, self.kind)
    }
}

impl FromStr for StrategyMapping {
    type Err = StrategyMappingParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (extension, kind) = input
            .split_once('=')
            .ok_or_else(|| StrategyMappingParseError::MissingAssignment(input.to_owned()))?;
        let parsed = SourceKind::from_str(kind.trim()).map_err(|source| {
            StrategyMappingParseError::UnknownStrategy {
                input: input.to_owned(),
                source,
            }
        })?;
        Ok(Self::new(extension, parsed))
    }
}

impl TryFrom<String> for StrategyMapping {
    type Error = StrategyMappingParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StrategyMapping> for String {
    fn from(mapping: StrategyMapping) -> Self {
        mapping.to_string()
    }
}
