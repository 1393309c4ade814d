use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use dirs::data_dir;

use crate::logging::LogFormat;
use crate::policy::OverridePolicy;
use crate::source::SourceKind;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default bound on concurrent plugin loads and activations.
pub const DEFAULT_MAX_PARALLEL_LOADS: usize = 4;

/// Extension used by single-file plugin modules.
pub const DEFAULT_FILE_EXTENSION: &str = "plugin";

/// Extension used by archived plugins.
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "zip";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default override policy applied when overrides are allowed.
#[must_use]
pub const fn default_override_policy() -> OverridePolicy {
    OverridePolicy::Replace
}

pub(crate) const fn default_max_parallel_loads() -> usize {
    DEFAULT_MAX_PARALLEL_LOADS
}

/// Built-in extension to strategy mapping.
///
/// Configured mappings are merged over this table.
#[must_use]
pub fn default_strategy_extensions() -> BTreeMap<String, SourceKind> {
    BTreeMap::from([
        (DEFAULT_ARCHIVE_EXTENSION.to_owned(), SourceKind::Archive),
        (DEFAULT_FILE_EXTENSION.to_owned(), SourceKind::File),
    ])
}

/// Computes the default scan roots.
///
/// Resolves to `<data dir>/trellis/plugins` where the platform exposes a
/// data directory with a UTF-8 path, and to no roots otherwise.
#[must_use]
pub fn default_plugin_paths() -> Vec<Utf8PathBuf> {
    data_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .map(|base| vec![base.join("trellis").join("plugins")])
        .unwrap_or_default()
}
