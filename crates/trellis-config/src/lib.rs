//! Configuration for the trellis plugin host.
//!
//! [`Config`] gathers every option the plugin pipeline recognises: the scan
//! roots, the initial activation set, the service override policy, the
//! extension to loader-strategy mapping, and the concurrency and logging
//! knobs used by hosts. Layering is derived with `ortho_config`: built-in
//! defaults, then a TOML file, then `TRELLIS_*` environment variables, then
//! command-line flags.

mod defaults;
mod error;
mod logging;
mod policy;
mod source;
mod strategy;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_ARCHIVE_EXTENSION, DEFAULT_FILE_EXTENSION, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_PARALLEL_LOADS, default_log_filter, default_log_filter_string,
    default_log_format, default_override_policy, default_plugin_paths,
    default_strategy_extensions,
};
pub use error::ConfigError;
pub use logging::{LogFormat, LogFormatParseError};
pub use policy::OverridePolicy;
pub use source::SourceKind;
pub use strategy::{StrategyMapping, StrategyMappingParseError};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "TRELLIS_CONFIG_PATH";

/// Host configuration for plugin discovery, activation, and logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "TRELLIS")]
pub struct Config {
    /// Ordered scan roots. Earlier roots win discovery-order ties.
    pub plugin_paths: Vec<Utf8PathBuf>,
    /// Plugin ids requested for the initial activation plan.
    pub enabled_ids: Vec<String>,
    /// Glob patterns over plugin ids requested for the initial plan.
    pub enabled_patterns: Vec<String>,
    /// Plugin ids excluded from activation regardless of selection.
    pub disabled_ids: Vec<String>,
    /// Whether explicit service overrides are honoured at all.
    pub allow_override: bool,
    /// How an allowed override treats the entry it replaces.
    pub override_policy: OverridePolicy,
    /// `ext=kind` directives merged over the built-in table; later
    /// directives win.
    pub strategy_extensions: Vec<StrategyMapping>,
    /// Bound on concurrent loads and on concurrent independent activations.
    pub max_parallel_loads: usize,
    /// Optional per-hook timeout in milliseconds.
    pub hook_timeout_ms: Option<u64>,
    /// `tracing` filter expression.
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugin_paths: default_plugin_paths(),
            enabled_ids: Vec::new(),
            enabled_patterns: Vec::new(),
            disabled_ids: Vec::new(),
            allow_override: false,
            override_policy: default_override_policy(),
            strategy_extensions: Vec::new(),
            max_parallel_loads: defaults::default_max_parallel_loads(),
            hook_timeout_ms: None,
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads layered configuration and validates the result.
    ///
    /// `args` is a command line in `ortho_config` form: a program name
    /// followed by optional `--config-path <PATH>` and per-field flags.
    /// Layers apply in increasing precedence: built-in defaults, the
    /// discovered or named TOML file, `TRELLIS_*` environment variables,
    /// then the flags in `args`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] when a layer cannot be read or merged
    /// and [`ConfigError::Invalid`] when the merged configuration fails
    /// validation.
    pub fn load_layered<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = OsString>,
    {
        let config = Self::load_from_iter(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration text; `origin` is used only for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not a valid
    /// configuration document.
    pub fn from_toml(text: &str, origin: &Utf8Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|error| ConfigError::Parse {
            path: origin.to_owned(),
            message: error.message().to_owned(),
        })
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_loads == 0 {
            return Err(ConfigError::Invalid {
                field: "max_parallel_loads",
                message: String::from("must be at least 1"),
            });
        }
        if self.hook_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid {
                field: "hook_timeout_ms",
                message: String::from("must be positive when set"),
            });
        }
        for mapping in &self.strategy_extensions {
            if mapping.extension().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "strategy_extensions",
                    message: String::from("extensions must not be empty"),
                });
            }
            if !mapping.kind().is_extension_mapped() {
                return Err(ConfigError::Invalid {
                    field: "strategy_extensions",
                    message: format!(
                        "'{}' cannot map to the {} strategy",
                        mapping.extension(),
                        mapping.kind()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Returns the effective extension table: built-in entries overlaid
    /// with configured ones, keys normalised to lowercase without a dot.
    #[must_use]
    pub fn strategy_table(&self) -> BTreeMap<String, SourceKind> {
        let mut table = default_strategy_extensions();
        for mapping in &self.strategy_extensions {
            table.insert(mapping.extension().to_owned(), mapping.kind());
        }
        table
    }

    /// Returns the hook timeout as a [`Duration`].
    #[must_use]
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout_ms.map(Duration::from_millis)
    }

    /// Returns the configured log filter.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Returns the configured log format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Returns `true` when ids or patterns select the initial plan.
    #[must_use]
    pub fn has_explicit_selection(&self) -> bool {
        !self.enabled_ids.is_empty() || !self.enabled_patterns.is_empty()
    }
}

/// Normalises a file extension for table lookups.
#[must_use]
pub fn normalise_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}
