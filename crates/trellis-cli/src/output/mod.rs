//! Rendering of command reports as plain text or JSON.

mod models;

use std::io::Write;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::errors::AppError;

pub(crate) use models::{
    BlockedView, CandidateView, ListReport, PlanReport, PluginView, ScanReport,
};

/// A command result that can be rendered in either format.
pub(crate) trait Report: Serialize {
    /// Writes the human-readable body.
    fn write_human(&self, out: &mut dyn Write) -> std::io::Result<()>;

    /// Problems reported on stderr in human mode.
    fn diagnostics(&self) -> &[String] {
        &[]
    }

    /// Returns `true` when the command found nothing wrong.
    fn is_clean(&self) -> bool;
}

/// Renders `report` and returns whether it was clean.
pub(crate) fn emit<R, W, E>(
    report: &R,
    format: OutputFormat,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<bool, AppError>
where
    R: Report,
    W: Write,
    E: Write,
{
    match format {
        OutputFormat::Human => {
            report.write_human(stdout)?;
            for diagnostic in report.diagnostics() {
                writeln!(stderr, "error: {diagnostic}")?;
            }
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *stdout, report)?;
            writeln!(stdout)?;
        }
    }
    stdout.flush()?;
    Ok(report.is_clean())
}
