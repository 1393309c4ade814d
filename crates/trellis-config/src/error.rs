use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::OrthoError;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A configuration layer could not be read or merged.
    #[error(transparent)]
    Load(#[from] Arc<OrthoError>),

    /// Configuration text is not valid TOML for [`crate::Config`].
    #[error("failed to parse configuration file '{path}': {message}")]
    Parse {
        /// Origin of the text.
        path: Utf8PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A setting holds a value outside its permitted range.
    #[error("invalid setting '{field}': {message}")]
    Invalid {
        /// Setting name.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}
