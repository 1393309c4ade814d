//! CLI entrypoint for inspecting trellis plugin trees.
//!
//! The binary delegates to [`trellis_cli::run`], which loads configuration,
//! scans the configured roots, and renders candidates, descriptors, or
//! activation plans.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    trellis_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
