//! CLI argument definitions.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};

/// Output format for command results.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Aligned plain text.
    #[default]
    Human,
    /// A single JSON document.
    Json,
}

/// Inspects plugin trees without running plugin code.
#[derive(Parser, Debug)]
#[command(
    name = "trellis",
    version,
    disable_help_subcommand = true,
    subcommand_required = true,
    arg_required_else_help = false
)]
pub(crate) struct Cli {
    /// Configuration file to load instead of the discovered one.
    #[arg(long, value_name = "PATH")]
    pub(crate) config_path: Option<Utf8PathBuf>,
    /// Controls how results are rendered.
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub(crate) format: OutputFormat,
    /// The operation to run.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Operations supported by the CLI.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Lists discovered candidates in discovery order.
    Scan,
    /// Loads every candidate and lists the catalogued plugins.
    List,
    /// Resolves plugins into an activation order.
    Plan {
        /// Plugin ids to resolve; defaults to the configured selection.
        #[arg(value_name = "ID")]
        ids: Vec<String>,
    },
}
