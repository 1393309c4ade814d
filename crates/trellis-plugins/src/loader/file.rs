use std::fs;

use camino::Utf8Path;
use trellis_config::SourceKind;

use super::LoadStrategy;
use crate::catalog::PluginSource;
use crate::error::LoadFailure;
use crate::manifest::{FRONT_MATTER_FENCE, PluginManifest, extract_front_matter};

/// Loads a self-describing module file whose metadata sits in a
/// front-matter block at the top of the file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileStrategy;

impl LoadStrategy for FileStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn read(&self, location: &Utf8Path) -> Result<(PluginManifest, PluginSource), LoadFailure> {
        let text = fs::read_to_string(location).map_err(LoadFailure::io)?;
        let block = extract_front_matter(&text).ok_or_else(|| LoadFailure::ManifestMissing {
            expected: format!("'{FRONT_MATTER_FENCE}' front-matter declaration"),
        })?;
        let manifest = PluginManifest::from_toml(&block)?;
        Ok((manifest, PluginSource::new(location, SourceKind::File)))
    }
}
