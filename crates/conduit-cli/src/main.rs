//! CLI entrypoint for the Conduit pipeline tool.
//!
//! The binary delegates to [`conduit_cli::run`], which loads configuration,
//! initialises logging, builds the plugin context, and dispatches the
//! requested command.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    conduit_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
}
