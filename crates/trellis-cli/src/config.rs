//! Configuration loading for the CLI.
//!
//! The CLI parses its own flags first and forwards only the configuration
//! flags to `ortho_config`, so command tokens never reach the loader.

use std::ffi::OsString;

use camino::Utf8Path;
use trellis_config::Config;

use crate::errors::AppError;

const PROGRAM: &str = "trellis";
const CONFIG_PATH_FLAG: &str = "--config-path";

pub(crate) trait ConfigLoader {
    /// Loads configuration from an `ortho_config` command line.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

/// Layers defaults, the configuration file, `TRELLIS_*` variables, and
/// forwarded flags.
pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_layered(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

/// Builds the command line handed to the configuration loader.
pub(crate) fn config_arguments(config_path: Option<&Utf8Path>) -> Vec<OsString> {
    let mut arguments = vec![OsString::from(PROGRAM)];
    if let Some(path) = config_path {
        arguments.push(OsString::from(CONFIG_PATH_FLAG));
        arguments.push(OsString::from(path.as_str()));
    }
    arguments
}
