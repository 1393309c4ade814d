use std::fs;
use std::io;

use camino::Utf8Path;
use trellis_config::SourceKind;

use super::LoadStrategy;
use crate::catalog::PluginSource;
use crate::error::LoadFailure;
use crate::manifest::{MANIFEST_FILE_NAME, PluginManifest};

/// Loads a directory holding a `plugin.toml`; the directory is the unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageStrategy;

impl LoadStrategy for PackageStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Package
    }

    fn read(&self, location: &Utf8Path) -> Result<(PluginManifest, PluginSource), LoadFailure> {
        let text = fs::read_to_string(location.join(MANIFEST_FILE_NAME)).map_err(|error| {
            if error.kind() == io::ErrorKind::NotFound {
                LoadFailure::ManifestMissing {
                    expected: MANIFEST_FILE_NAME.to_owned(),
                }
            } else {
                LoadFailure::io(error)
            }
        })?;
        let manifest = PluginManifest::from_toml(&text)?;
        Ok((manifest, PluginSource::new(location, SourceKind::Package)))
    }
}
