//! Command-line inspection host for trellis plugin trees.
//!
//! The runtime parses arguments, loads [`trellis_config::Config`], installs
//! telemetry, and runs one of three read-only commands against a
//! [`trellis_plugins::PluginHost`] wired with an inert linker: `scan` lists
//! candidates, `list` loads and catalogues them, and `plan` resolves an
//! activation order. No plugin code runs. IO streams and configuration
//! loading are substitutable so the runtime can be driven from tests.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use trellis_plugins::{InertLinker, PluginHost};

mod cli;
mod commands;
mod config;
mod errors;
mod output;
pub mod telemetry;

use cli::{Cli, CliCommand};
use config::{ConfigLoader, OrthoConfigLoader, config_arguments};
use errors::AppError;
use output::emit;

/// Exit status for malformed command lines, matching clap's convention.
const USAGE_EXIT: u8 = 2;

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    run_with_loader(args, stdout, stderr, &OrthoConfigLoader)
}

pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    loader: &L,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if error.use_stderr() => {
            report(stderr, &error.to_string());
            return ExitCode::from(USAGE_EXIT);
        }
        Err(error) => {
            report(stdout, &error.to_string());
            return ExitCode::SUCCESS;
        }
    };

    match execute(&cli, loader, stdout, stderr) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            report(stderr, &format!("trellis: {error}"));
            ExitCode::FAILURE
        }
    }
}

fn execute<W, E, L>(
    cli: &Cli,
    loader: &L,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<bool, AppError>
where
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let config = loader.load(&config_arguments(cli.config_path.as_deref()))?;
    telemetry::initialise(&config)?;
    let host = PluginHost::new(config, Arc::new(InertLinker));
    let (name, clean) = match &cli.command {
        CliCommand::Scan => ("scan", emit(&commands::scan(&host), cli.format, stdout, stderr)?),
        CliCommand::List => ("list", emit(&commands::list(&host), cli.format, stdout, stderr)?),
        CliCommand::Plan { ids } => (
            "plan",
            emit(&commands::plan(&host, ids)?, cli.format, stdout, stderr)?,
        ),
    };
    tracing::debug!(
        target: "trellis::cli",
        event = "command_completed",
        command = name,
        clean,
        "command completed"
    );
    Ok(clean)
}

fn report<W: Write>(out: &mut W, message: &str) {
    let written = if message.ends_with('\n') {
        out.write_all(message.as_bytes())
    } else {
        writeln!(out, "{message}")
    };
    if let Err(error) = written {
        tracing::error!(
            target: "trellis::cli",
            event = "report_failed",
            error = %error,
            "failed to write diagnostic"
        );
    }
}

#[cfg(test)]
mod tests;
