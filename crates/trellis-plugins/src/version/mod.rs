//! Semantic versions and the dependency constraint grammar.
//!
//! Both types wrap the `semver` crate. Manifests may write partial
//! versions (`2`, `0.1`), which are completed with zeros before parsing.
//! [`VersionReq`] accepts the comma-separated comparator grammar of
//! `semver`, with a bare version read as `^V` and an empty constraint read
//! as `*`. Matching is a pure function so the grammar can be exercised
//! without a catalog.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error raised when a version or constraint cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version '{input}': {reason}")]
pub struct VersionError {
    /// Text that failed to parse.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl VersionError {
    fn new(input: &str, reason: impl Into<String>) -> Self {
        Self {
            input: input.to_owned(),
            reason: reason.into(),
        }
    }
}

/// A semantic version.
///
/// Build metadata is carried for display but ignored for equality and
/// precedence.
#[derive(Debug, Clone)]
pub struct Version(semver::Version);

impl Version {
    /// Creates a release version.
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Returns `true` for pre-release versions.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }

    /// Returns the underlying `semver` value.
    #[must_use]
    pub const fn as_semver(&self) -> &semver::Version {
        &self.0
    }
}

/// Pads `1` and `1.2` to three components. Versions carrying a pre-release
/// tag are left alone and must be complete.
fn complete(text: &str) -> Cow<'_, str> {
    let (head, build) = match text.split_once('+') {
        Some((head, build)) => (head, Some(build)),
        None => (text, None),
    };
    if head.contains('-') {
        return Cow::Borrowed(text);
    }
    let padding = match head.matches('.').count() {
        0 => ".0.0",
        1 => ".0",
        _ => return Cow::Borrowed(text),
    };
    Cow::Owned(match build {
        Some(build) => format!("{head}{padding}+{build}"),
        None => format!("{head}{padding}"),
    })
}

impl FromStr for Version {
    type Err = VersionError;

    /// Parses `MAJOR[.MINOR[.PATCH]][-PRE][+BUILD]`; missing components are
    /// zero, so `0.1` reads as `0.1.0`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.trim();
        if text.is_empty() {
            return Err(VersionError::new(input, "empty version"));
        }
        semver::Version::parse(&complete(text))
            .map(Self)
            .map_err(|error| VersionError::new(input, error.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = &self.0;
        let right = &other.0;
        (left.major, left.minor, left.patch, &left.pre).cmp(&(
            right.major,
            right.minor,
            right.patch,
            &right.pre,
        ))
    }
}

/// A conjunction of comparators; the empty conjunction is `*`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionReq(semver::VersionReq);

impl VersionReq {
    /// The constraint matching every release.
    pub const STAR: Self = Self(semver::VersionReq::STAR);

    /// Returns `true` for the `*` constraint.
    #[must_use]
    pub const fn is_any(&self) -> bool {
        self.0.comparators.is_empty()
    }

    /// Tests `version` against every comparator.
    ///
    /// Pre-release versions match only when some comparator names a
    /// pre-release of the same `major.minor.patch`.
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.0.matches(&version.0)
    }

    /// Returns the underlying `semver` value.
    #[must_use]
    pub const fn as_semver(&self) -> &semver::VersionReq {
        &self.0
    }
}

impl FromStr for VersionReq {
    type Err = VersionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let text = input.trim();
        if text.is_empty() || text == "*" {
            return Ok(Self::STAR);
        }
        if text.contains('+') {
            return Err(VersionError::new(
                input,
                "build metadata is not allowed in constraints",
            ));
        }
        semver::VersionReq::parse(text)
            .map(Self)
            .map_err(|error| VersionError::new(input, error.to_string()))
    }
}

impl fmt::Display for VersionReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
