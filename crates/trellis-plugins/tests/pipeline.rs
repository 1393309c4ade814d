//! End-to-end tests driving scan, load, resolve, and activation over an
//! on-disk plugin tree.

use std::fs;
use std::io::Write;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use trellis_plugins::{
    ActivationOutcome, Config, HookError, LoadFailure, MissingReason, Plugin, PluginContext,
    PluginError, PluginHost, PluginState, StaticLinker,
};

#[derive(Debug)]
struct FilesystemManager {
    root: Utf8PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
struct ArchiveFormat(&'static str);

#[derive(Debug)]
struct DirectoryListing {
    entries: usize,
}

fn hook_error(error: PluginError) -> HookError {
    HookError::with_source("plugin setup failed", error)
}

struct Basic {
    root: Utf8PathBuf,
}

impl Plugin for Basic {
    fn activate(&self, context: &PluginContext) -> Result<(), HookError> {
        context
            .register_service(
                "filesystem_manager",
                FilesystemManager {
                    root: self.root.clone(),
                },
            )
            .map_err(hook_error)
    }
}

struct Archiver;

impl Plugin for Archiver {
    fn activate(&self, context: &PluginContext) -> Result<(), HookError> {
        context
            .extend("archivers", || ArchiveFormat("zip"))
            .map_err(hook_error)
    }
}

struct Directory;

impl Plugin for Directory {
    fn activate(&self, context: &PluginContext) -> Result<(), HookError> {
        let manager = context
            .service_as::<FilesystemManager>("filesystem_manager")
            .map_err(hook_error)?;
        let entries = fs::read_dir(&manager.root)
            .map_err(|error| HookError::with_source("cannot list plugin root", error))?
            .count();
        context
            .register_service("directory_listing", DirectoryListing { entries })
            .map_err(hook_error)
    }
}

struct Dummy;

impl Plugin for Dummy {
    fn activate(&self, _context: &PluginContext) -> Result<(), HookError> {
        Ok(())
    }
}

struct Tree {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Tree {
    fn package(&self, name: &str, manifest: &str) {
        let path = self.root.join(name);
        fs::create_dir_all(&path).expect("create package");
        fs::write(path.join("plugin.toml"), manifest).expect("write manifest");
    }

    fn file(&self, name: &str, contents: &str) {
        fs::write(self.root.join(name), contents).expect("write file");
    }

    fn archive(&self, name: &str, entries: &[(&str, &str)]) {
        let file = fs::File::create(self.root.join(name)).expect("create archive");
        let mut writer = ZipWriter::new(file);
        for (entry, contents) in entries {
            writer
                .start_file(*entry, SimpleFileOptions::default())
                .expect("start entry");
            writer.write_all(contents.as_bytes()).expect("write entry");
        }
        writer.finish().expect("finish archive");
    }
}

#[fixture]
fn tree() -> Tree {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
    let tree = Tree { _dir: dir, root };

    tree.package(
        "basic",
        "id = \"basic\"\nversion = \"0.1\"\nextension_points = [\"archivers\"]\n",
    );
    tree.archive(
        "archiver.zip",
        &[(
            "archiver/plugin.toml",
            "id = \"archiver\"\nversion = \"0.1.2\"\ndependencies = [\"basic\"]\n",
        )],
    );
    tree.file(
        "directory.plugin",
        "# +++\n# id = \"directory\"\n# version = \"0.2.0\"\n\
         # dependencies = [{ id = \"basic\", version = \"^0.1\" }]\n# +++\n\nlist entries\n",
    );
    tree.package(
        "dummy",
        "id = \"dummy\"\nversion = \"1.0.0\"\nenabled = false\n",
    );
    tree.package("broken", "id = \"broken\"\n");
    tree.package("zz-copy", "id = \"basic\"\nversion = \"9.9.9\"\n");
    tree.package(".hidden", "id = \"hidden\"\nversion = \"1.0.0\"\n");
    tree.file("notes.txt", "not a plugin");
    tree
}

fn linker(plugin_root: &Utf8Path) -> Arc<StaticLinker> {
    let root = plugin_root.to_owned();
    Arc::new(
        StaticLinker::new()
            .with_entry("basic", move |_, _| {
                Arc::new(Basic { root: root.clone() }) as Arc<dyn Plugin>
            })
            .with_entry("archiver", |_, _| Arc::new(Archiver) as Arc<dyn Plugin>)
            .with_entry("directory", |_, _| Arc::new(Directory) as Arc<dyn Plugin>)
            .with_entry("dummy", |_, _| Arc::new(Dummy) as Arc<dyn Plugin>),
    )
}

fn host(tree: &Tree, configure: impl FnOnce(&mut Config)) -> PluginHost {
    let mut config = Config {
        plugin_paths: vec![tree.root.clone()],
        max_parallel_loads: 2,
        ..Config::default()
    };
    configure(&mut config);
    PluginHost::new(config, linker(&tree.root))
}

#[rstest]
fn boot_activates_default_plugins_in_dependency_order(tree: Tree) {
    let booted = host(&tree, |_| {}).boot().expect("boot");

    let enabled: Vec<&str> = booted.report.enabled();
    assert_eq!(enabled, ["basic", "archiver", "directory"]);
    assert!(booted.failures.is_empty());
    assert!(booted.blocked.is_empty());
    assert_eq!(booted.manager.state("dummy"), Some(PluginState::Loaded));
    assert_eq!(booted.manager.state("hidden"), None);

    let formats = booted
        .manager
        .extensions()
        .extensions_of::<ArchiveFormat>("archivers")
        .expect("declared point");
    assert_eq!(formats.len(), 1);
    assert_eq!(formats.first().map(|format| format.0), Some("zip"));

    let listing = booted
        .manager
        .services()
        .lookup_as::<DirectoryListing>("directory_listing")
        .expect("directory service");
    assert!(listing.entries >= 6);
}

#[rstest]
fn load_failures_are_isolated_and_reported(tree: Tree) {
    let booted = host(&tree, |_| {}).boot().expect("boot");

    assert_eq!(booted.load_errors.len(), 2);
    assert!(booted.load_errors.iter().any(|error| matches!(
        error,
        PluginError::Load {
            cause: LoadFailure::ManifestParse { .. } | LoadFailure::InvalidManifest { .. },
            location,
            ..
        } if location.file_name() == Some("broken")
    )));
    assert!(booted.load_errors.iter().any(|error| matches!(
        error,
        PluginError::DuplicateId { id, duplicate, .. }
            if id == "basic" && duplicate.file_name() == Some("zz-copy")
    )));
    assert!(!booted.is_clean());
    let kept = booted
        .manager
        .with_catalog(|catalog| catalog.get("basic").map(|entry| entry.version().to_string()));
    assert_eq!(kept.as_deref(), Some("0.1.0"));
}

#[rstest]
fn excluded_dependencies_fail_their_dependents(tree: Tree) {
    let booted = host(&tree, |config| config.disabled_ids = vec![String::from("basic")])
        .boot()
        .expect("boot");

    assert!(booted.report.outcomes().is_empty());
    let excluded_dependents: Vec<&str> = booted
        .failures
        .iter()
        .filter_map(|error| match error {
            PluginError::MissingDependency {
                dependent,
                reason: MissingReason::Excluded,
                ..
            } => Some(dependent.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(excluded_dependents, ["archiver", "directory"]);
}

#[rstest]
fn patterns_select_plugins_with_their_dependencies(tree: Tree) {
    let booted = host(&tree, |config| {
        config.enabled_patterns = vec![String::from("dir*")];
    })
    .boot()
    .expect("boot");

    assert_eq!(booted.report.enabled(), ["basic", "directory"]);
    assert_eq!(booted.manager.state("archiver"), Some(PluginState::Loaded));
}

#[rstest]
fn shutdown_unwinds_in_reverse_enable_order(tree: Tree) {
    let booted = host(&tree, |_| {}).boot().expect("boot");
    let report = booted.manager.shutdown();

    assert!(report.is_success());
    assert_eq!(report.disabled(), ["directory", "archiver", "basic"]);
    assert!(booted.manager.services().is_empty());
    assert!(booted.manager.extensions().points().is_empty());
    assert!(booted.manager.states().is_empty());
}

#[rstest]
fn missing_entry_points_fail_loading(tree: Tree) {
    let config = Config {
        plugin_paths: vec![tree.root.clone()],
        enabled_ids: vec![String::from("basic")],
        ..Config::default()
    };
    let host = PluginHost::new(config, Arc::new(StaticLinker::new()));
    let booted = host.boot().expect("boot");

    assert!(booted.load_errors.iter().any(|error| matches!(
        error,
        PluginError::Load {
            cause: LoadFailure::Unlinked { entry, .. },
            ..
        } if entry == "basic"
    )));
    assert!(matches!(
        booted.failures.as_slice(),
        [PluginError::UnknownPlugin { id }] if id == "basic"
    ));
    assert!(
        booted
            .report
            .outcomes()
            .iter()
            .all(|(_, outcome)| !matches!(outcome, ActivationOutcome::Enabled))
    );
}
