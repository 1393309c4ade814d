//! Unit tests for the CLI runtime.

use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};
use rstest::{fixture, rstest};
use serde_json::Value;
use tempfile::TempDir;
use trellis_config::{Config, ConfigError};

use crate::config::{ConfigLoader, config_arguments};
use crate::errors::AppError;
use crate::run_with_loader;

struct FixedLoader(Config);

impl ConfigLoader for FixedLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Ok(self.0.clone())
    }
}

/// Records the forwarded command line and serves a fixed configuration.
struct RecordingLoader {
    inner: FixedLoader,
    seen: RefCell<Vec<OsString>>,
}

impl ConfigLoader for RecordingLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        self.seen.replace(args.to_vec());
        self.inner.load(args)
    }
}

struct RejectingLoader;

impl ConfigLoader for RejectingLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        Err(AppError::LoadConfiguration(ConfigError::Invalid {
            field: "max_parallel_loads",
            message: String::from("must be at least 1"),
        }))
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

    fn loader(&self) -> FixedLoader {
        FixedLoader(Config {
            plugin_paths: vec![self.root.clone()],
            log_filter: String::from("off"),
            ..Config::default()
        })
    }
}

#[fixture]
fn healthy() -> Tree {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 temp path");
    let tree = Tree { _dir: dir, root };
    tree.package("core", "id = \"core\"\nversion = \"1.0.0\"\n");
    tree.package(
        "editor",
        "id = \"editor\"\nversion = \"0.3.0\"\ndependencies = [\"core\"]\n",
    );
    tree.package(
        "viewer",
        "id = \"viewer\"\nversion = \"0.1.0\"\ndependencies = [\"core\"]\n",
    );
    tree
}

#[fixture]
fn damaged(healthy: Tree) -> Tree {
    healthy.package("broken", "id = \"broken\"\n");
    healthy.package(
        "orphan",
        "id = \"orphan\"\nversion = \"0.1.0\"\ndependencies = [\"ghost\"]\n",
    );
    healthy.package(
        "leaf",
        "id = \"leaf\"\nversion = \"0.1.0\"\ndependencies = [\"orphan\"]\n",
    );
    healthy
}

struct Captured {
    exit: ExitCode,
    stdout: String,
    stderr: String,
}

impl Captured {
    fn json(&self) -> Value {
        serde_json::from_str(&self.stdout).expect("json output")
    }

    fn field(&self, pointer: &str) -> Value {
        self.json()
            .pointer(pointer)
            .cloned()
            .unwrap_or_else(|| panic!("missing {pointer}"))
    }
}

fn invoke<L: ConfigLoader>(loader: &L, args: &[&str]) -> Captured {
    let argv: Vec<OsString> = std::iter::once("trellis")
        .chain(args.iter().copied())
        .map(OsString::from)
        .collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = run_with_loader(argv, &mut stdout, &mut stderr, loader);
    Captured {
        exit,
        stdout: String::from_utf8(stdout).expect("utf-8 stdout"),
        stderr: String::from_utf8(stderr).expect("utf-8 stderr"),
    }
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|item| item.as_str().expect("string").to_owned())
        .collect()
}

#[rstest]
fn scan_lists_candidates_in_discovery_order(healthy: Tree) {
    let captured = invoke(&healthy.loader(), &["scan"]);
    assert_eq!(captured.exit, ExitCode::SUCCESS);
    let lines: Vec<&str> = captured.stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.first().is_some_and(|line| line.ends_with("core")));
    assert!(lines.iter().all(|line| line.contains("package")));
}

#[rstest]
fn scan_as_json_reports_index_and_kind(healthy: Tree) {
    let captured = invoke(&healthy.loader(), &["--format", "json", "scan"]);
    assert_eq!(captured.exit, ExitCode::SUCCESS);
    let candidates = captured.field("/candidates");
    assert_eq!(candidates.as_array().map(Vec::len), Some(3));
    assert_eq!(captured.field("/candidates/1/index"), 1);
    assert_eq!(captured.field("/candidates/1/kind"), "package");
}

#[rstest]
fn list_describes_each_plugin(healthy: Tree) {
    let captured = invoke(&healthy.loader(), &["list"]);
    assert_eq!(captured.exit, ExitCode::SUCCESS);
    assert!(captured.stdout.contains("core 1.0.0"));
    assert!(captured.stdout.contains("depends on: core"));
    assert!(captured.stderr.is_empty());
}

#[rstest]
fn list_reports_load_errors_and_fails(damaged: Tree) {
    let captured = invoke(&damaged.loader(), &["--format", "json", "list"]);
    assert_eq!(captured.exit, ExitCode::FAILURE);
    let ids: Vec<String> = captured
        .field("/plugins")
        .as_array()
        .expect("plugins")
        .iter()
        .map(|plugin| plugin["id"].as_str().expect("id").to_owned())
        .collect();
    assert_eq!(ids, ["core", "editor", "leaf", "orphan", "viewer"]);
    let errors = strings(&captured.field("/errors"));
    assert_eq!(errors.len(), 1);
    assert!(errors.iter().all(|error| error.contains("broken")));
}

#[rstest]
fn plan_orders_the_default_selection(healthy: Tree) {
    let captured = invoke(&healthy.loader(), &["--format", "json", "plan"]);
    assert_eq!(captured.exit, ExitCode::SUCCESS);
    assert_eq!(
        strings(&captured.field("/order")),
        ["core", "editor", "viewer"]
    );
    assert_eq!(strings(&captured.field("/waves/0")), ["core"]);
    assert_eq!(strings(&captured.field("/waves/1")), ["editor", "viewer"]);
    assert!(captured.json().pointer("/waves/2").is_none());
}

#[rstest]
fn plan_limits_to_requested_ids(healthy: Tree) {
    let captured = invoke(&healthy.loader(), &["plan", "viewer"]);
    assert_eq!(captured.exit, ExitCode::SUCCESS);
    assert_eq!(
        captured.stdout,
        "activation order:\n  1. core\n  2. viewer\nwaves:\n  1: core\n  2: viewer\n"
    );
}

#[rstest]
fn plan_reports_failures_and_blocked_dependents(damaged: Tree) {
    let captured = invoke(&damaged.loader(), &["plan", "leaf", "editor"]);
    assert_eq!(captured.exit, ExitCode::FAILURE);
    assert!(captured.stdout.contains("  1. core\n  2. editor\n"));
    assert!(captured.stdout.contains("failed:\n"));
    assert!(captured.stdout.contains("ghost"));
    assert!(captured.stdout.contains("  - leaf (blocked by orphan)"));
    assert!(captured.stderr.contains("error: "));
}

#[rstest]
fn unknown_requested_id_fails(healthy: Tree) {
    let captured = invoke(&healthy.loader(), &["--format", "json", "plan", "nope"]);
    assert_eq!(captured.exit, ExitCode::FAILURE);
    let failures = strings(&captured.field("/failures"));
    assert_eq!(failures.len(), 1);
    assert!(failures.iter().all(|failure| failure.contains("nope")));
}

#[test]
fn configuration_errors_are_reported() {
    let captured = invoke(&RejectingLoader, &["scan"]);
    assert_eq!(captured.exit, ExitCode::FAILURE);
    assert!(
        captured
            .stderr
            .starts_with("trellis: failed to load configuration: invalid setting")
    );
    assert!(captured.stdout.is_empty());
}

#[rstest]
#[case::missing_command(&[])]
#[case::unknown_command(&["activate"])]
#[case::unknown_format(&["--format", "yaml", "scan"])]
fn malformed_arguments_exit_with_usage_status(#[case] args: &[&str]) {
    let captured = invoke(&RejectingLoader, args);
    assert_eq!(captured.exit, ExitCode::from(2));
    assert!(captured.stderr.starts_with("error:"));
    assert!(captured.stdout.is_empty());
}

#[test]
fn help_is_written_to_stdout() {
    let captured = invoke(&RejectingLoader, &["--help"]);
    assert_eq!(captured.exit, ExitCode::SUCCESS);
    assert!(captured.stdout.contains("plan"));
    assert!(captured.stderr.is_empty());
}

#[test]
fn missing_command_is_reported_as_an_error() {
    let captured = invoke(&RejectingLoader, &[]);
    assert_eq!(captured.exit, ExitCode::from(2));
    assert!(captured.stderr.contains("requires a subcommand"));
    assert!(captured.stderr.contains("Usage"));
}

#[rstest]
#[case::discovered(None, &["trellis"])]
#[case::named(Some("conf/trellis.toml"), &["trellis", "--config-path", "conf/trellis.toml"])]
fn configuration_flags_are_forwarded(#[case] path: Option<&str>, #[case] expected: &[&str]) {
    let forwarded = config_arguments(path.map(Utf8Path::new));
    let expected: Vec<OsString> = expected.iter().map(OsString::from).collect();
    assert_eq!(forwarded, expected);
}

#[rstest]
fn command_tokens_never_reach_the_configuration_loader(healthy: Tree) {
    let loader = RecordingLoader {
        inner: healthy.loader(),
        seen: RefCell::new(Vec::new()),
    };
    let captured = invoke(
        &loader,
        &["--config-path", "custom.toml", "--format", "json", "plan", "core"],
    );
    assert_eq!(captured.exit, ExitCode::SUCCESS);
    let expected: Vec<OsString> = ["trellis", "--config-path", "custom.toml"]
        .iter()
        .map(OsString::from)
        .collect();
    assert_eq!(*loader.seen.borrow(), expected);
}
