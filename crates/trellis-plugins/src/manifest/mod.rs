//! Plugin manifest parsing and validation.
//!
//! Packages and archives carry a `plugin.toml`; single-file modules embed the
//! same TOML in a front-matter block (see [`extract_front_matter`]). Every
//! strategy funnels through [`PluginManifest::from_toml`] so descriptors have
//! one shape regardless of packaging.

use std::fmt;

use serde::Deserialize;

use crate::error::LoadFailure;
use crate::version::{Version, VersionReq};

/// File name of the manifest inside packages and archives.
pub const MANIFEST_FILE_NAME: &str = "plugin.toml";

/// Fence delimiting front matter in single-file modules.
pub const FRONT_MATTER_FENCE: &str = "+++";

const COMMENT_LEADERS: [&str; 4] = ["//", "#", "--", ";"];

/// A declared dependency on another plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    id: String,
    constraint: VersionReq,
}

impl Dependency {
    /// Creates a dependency on `id` constrained by `constraint`.
    pub fn new(id: impl Into<String>, constraint: VersionReq) -> Self {
        Self {
            id: id.into(),
            constraint,
        }
    }

    /// Returns the dependency id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the version constraint.
    #[must_use]
    pub const fn constraint(&self) -> &VersionReq {
        &self.constraint
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraint.is_any() {
            f.write_str(&self.id)
        } else {
            write!(f, "{}@{}", self.id, self.constraint)
        }
    }
}

/// Descriptive metadata that plays no part in resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginMetadata {
    /// Human-readable name.
    pub name: Option<String>,
    /// Short description.
    pub description: Option<String>,
    /// Authors, optionally with e-mail addresses.
    pub authors: Vec<String>,
    /// Platform the plugin targets.
    pub platform: Option<String>,
}

/// Validated plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginManifest {
    id: String,
    version: Version,
    metadata: PluginMetadata,
    enabled_by_default: bool,
    entry: Option<String>,
    dependencies: Vec<Dependency>,
    extension_points: Vec<String>,
}

impl PluginManifest {
    /// Creates a manifest with no dependencies.
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            metadata: PluginMetadata::default(),
            enabled_by_default: true,
            entry: None,
            dependencies: Vec::new(),
            extension_points: Vec::new(),
        }
    }

    /// Appends a dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Sets the entry-point symbol.
    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Declares an extension point.
    #[must_use]
    pub fn with_extension_point(mut self, point: impl Into<String>) -> Self {
        self.extension_points.push(point.into());
        self
    }

    /// Sets whether the plugin is requested when no explicit selection exists.
    #[must_use]
    pub const fn with_enabled_by_default(mut self, enabled: bool) -> Self {
        self.enabled_by_default = enabled;
        self
    }

    /// Replaces the descriptive metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: PluginMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Parses and validates manifest text.
    ///
    /// # Errors
    ///
    /// Returns [`LoadFailure::ManifestParse`] for malformed TOML and
    /// [`LoadFailure::InvalidManifest`] when a field breaks a rule.
    pub fn from_toml(text: &str) -> Result<Self, LoadFailure> {
        let raw: RawManifest =
            toml::from_str(text).map_err(|error| LoadFailure::ManifestParse {
                message: error.message().to_owned(),
            })?;
        raw.into_manifest()
    }

    /// Checks the invariants every manifest must hold.
    ///
    /// # Errors
    ///
    /// Returns [`LoadFailure::InvalidManifest`] describing the first
    /// violation.
    pub fn validate(&self) -> Result<(), LoadFailure> {
        validate_id("id", &self.id)?;
        if let Some(entry) = &self.entry {
            if entry.trim().is_empty() {
                return Err(LoadFailure::invalid("entry must not be empty"));
            }
        }
        let mut seen: Vec<&str> = Vec::with_capacity(self.dependencies.len());
        for dependency in &self.dependencies {
            validate_id("dependency id", dependency.id())?;
            if seen.contains(&dependency.id()) {
                return Err(LoadFailure::invalid(format!(
                    "dependency '{}' is declared more than once",
                    dependency.id()
                )));
            }
            seen.push(dependency.id());
        }
        for point in &self.extension_points {
            validate_id("extension point", point)?;
        }
        Ok(())
    }

    /// Returns the plugin id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the plugin version.
    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }

    /// Returns the descriptive metadata.
    #[must_use]
    pub const fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Returns `true` when the plugin is requested absent explicit selection.
    #[must_use]
    pub const fn enabled_by_default(&self) -> bool {
        self.enabled_by_default
    }

    /// Returns the entry-point symbol, defaulting to the plugin id.
    #[must_use]
    pub fn entry(&self) -> &str {
        self.entry.as_deref().unwrap_or(&self.id)
    }

    /// Returns the declared dependencies in declaration order.
    #[must_use]
    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    /// Returns the extension points the plugin declares.
    #[must_use]
    pub fn extension_points(&self) -> &[String] {
        &self.extension_points
    }
}

fn validate_id(field: &str, value: &str) -> Result<(), LoadFailure> {
    if value.is_empty() {
        return Err(LoadFailure::invalid(format!("{field} must not be empty")));
    }
    let valid = value
        .bytes()
        .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-' | b'.'));
    if valid {
        Ok(())
    } else {
        Err(LoadFailure::invalid(format!(
            "{field} '{value}' may only contain letters, digits, '_', '-', and '.'"
        )))
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    id: String,
    version: String,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    platform: Option<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    entry: Option<String>,
    #[serde(default)]
    dependencies: Vec<RawDependency>,
    #[serde(default)]
    extension_points: Vec<String>,
}

const fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDependency {
    Bare(String),
    Detailed {
        id: String,
        #[serde(default)]
        version: Option<String>,
    },
}

impl RawManifest {
    fn into_manifest(self) -> Result<PluginManifest, LoadFailure> {
        let version: Version = self
            .version
            .parse()
            .map_err(|error| LoadFailure::invalid(format!("version: {error}")))?;
        let dependencies = self
            .dependencies
            .into_iter()
            .map(RawDependency::into_dependency)
            .collect::<Result<Vec<_>, _>>()?;
        let manifest = PluginManifest {
            id: self.id,
            version,
            metadata: PluginMetadata {
                name: self.name,
                description: self.description,
                authors: self.authors,
                platform: self.platform,
            },
            enabled_by_default: self.enabled,
            entry: self.entry,
            dependencies,
            extension_points: self.extension_points,
        };
        manifest.validate()?;
        Ok(manifest)
    }
}

impl RawDependency {
    fn into_dependency(self) -> Result<Dependency, LoadFailure> {
        let (id, constraint) = match self {
            Self::Bare(id) => (id, None),
            Self::Detailed { id, version } => (id, version),
        };
        let parsed = match constraint {
            Some(text) => text.parse().map_err(|error| {
                LoadFailure::invalid(format!("dependency '{id}' constraint: {error}"))
            })?,
            None => VersionReq::STAR,
        };
        Ok(Dependency::new(id, parsed))
    }
}

/// Extracts the TOML front matter of a single-file module.
///
/// The block opens on the first non-blank line with a `+++` fence and closes
/// on the next fence. The opening fence may sit behind a comment leader
/// (`#`, `//`, `--`, or `;`) so the block can live inside a comment of the
/// module's own language; the same leader is then stripped from every line
/// of the block. Returns `None` when the file has no complete block.
#[must_use]
pub fn extract_front_matter(source: &str) -> Option<String> {
    let mut lines = source.lines().skip_while(|line| line.trim().is_empty());
    let opening = lines.next()?.trim();
    let leader = COMMENT_LEADERS
        .into_iter()
        .find(|candidate| opening.starts_with(candidate))
        .unwrap_or_default();
    if opening.strip_prefix(leader)?.trim() != FRONT_MATTER_FENCE {
        return None;
    }
    let mut body = String::new();
    for line in lines {
        let content = strip_leader(line, leader);
        if content.trim() == FRONT_MATTER_FENCE {
            return Some(body);
        }
        body.push_str(content);
        body.push('\n');
    }
    None
}

fn strip_leader<'a>(line: &'a str, leader: &str) -> &'a str {
    if leader.is_empty() {
        return line;
    }
    line.trim_start()
        .strip_prefix(leader)
        .map_or(line, |rest| rest.strip_prefix(' ').unwrap_or(rest))
}
