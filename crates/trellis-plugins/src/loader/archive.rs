use std::fs::File;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use trellis_config::SourceKind;
use zip::ZipArchive;

use super::LoadStrategy;
use crate::catalog::PluginSource;
use crate::error::LoadFailure;
use crate::manifest::{MANIFEST_FILE_NAME, PluginManifest};

/// Manifests larger than this are rejected rather than read.
const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

/// Loads a zip archive in place.
///
/// The manifest is read from the archive root, or from a top-level
/// directory: the one named after the archive's stem when present,
/// otherwise the only directory holding a manifest. The archive itself is
/// bound as the executable unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct ArchiveStrategy;

impl LoadStrategy for ArchiveStrategy {
    fn kind(&self) -> SourceKind {
        SourceKind::Archive
    }

    fn read(&self, location: &Utf8Path) -> Result<(PluginManifest, PluginSource), LoadFailure> {
        let file = File::open(location).map_err(LoadFailure::io)?;
        let mut archive = ZipArchive::new(file).map_err(archive_error)?;

        let names: Vec<String> = archive.file_names().map(str::to_owned).collect();
        let inner_root = locate_manifest(&names, location.file_stem())?;
        let manifest_name = inner_root.as_ref().map_or_else(
            || MANIFEST_FILE_NAME.to_owned(),
            |root| format!("{root}/{MANIFEST_FILE_NAME}"),
        );

        let entry = archive.by_name(&manifest_name).map_err(archive_error)?;
        if entry.size() > MAX_MANIFEST_BYTES {
            return Err(LoadFailure::Archive {
                message: format!("{manifest_name} exceeds {MAX_MANIFEST_BYTES} bytes"),
            });
        }
        let mut text = String::new();
        entry
            .take(MAX_MANIFEST_BYTES)
            .read_to_string(&mut text)
            .map_err(LoadFailure::io)?;

        let manifest = PluginManifest::from_toml(&text)?;
        let source = PluginSource::new(location, SourceKind::Archive);
        let bound = match inner_root {
            Some(root) => source.with_inner_root(root),
            None => source,
        };
        Ok((manifest, bound))
    }
}

/// Picks the directory holding the manifest; `None` means the root.
fn locate_manifest(names: &[String], stem: Option<&str>) -> Result<Option<Utf8PathBuf>, LoadFailure> {
    if names.iter().any(|name| name == MANIFEST_FILE_NAME) {
        return Ok(None);
    }
    let nested: Vec<&str> = names
        .iter()
        .filter_map(|name| name.strip_suffix(MANIFEST_FILE_NAME)?.strip_suffix('/'))
        .filter(|directory| !directory.is_empty() && !directory.contains('/'))
        .collect();
    if let Some(preferred) = stem.and_then(|wanted| nested.iter().find(|found| **found == wanted)) {
        return Ok(Some(Utf8PathBuf::from(*preferred)));
    }
    match nested.as_slice() {
        [] => Err(LoadFailure::ManifestMissing {
            expected: format!("{MANIFEST_FILE_NAME} at the archive root or in a top-level directory"),
        }),
        [only] => Ok(Some(Utf8PathBuf::from(*only))),
        _ => Err(LoadFailure::Archive {
            message: format!(
                "several top-level directories hold a {MANIFEST_FILE_NAME}: {}",
                nested.join(", ")
            ),
        }),
    }
}

fn archive_error(error: zip::result::ZipError) -> LoadFailure {
    LoadFailure::Archive {
        message: error.to_string(),
    }
}
