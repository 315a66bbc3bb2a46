//! Command-line interface runtime for Conduit.
//!
//! The module owns argument parsing, configuration bootstrapping, logging
//! setup, and command dispatch. The runtime is exercised both from the binary
//! entrypoint and from tests, where configuration loading and the IO streams
//! are substituted.

use std::ffi::OsString;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use conduit_config::{Config, ConfigError, ConfigOverrides};

mod cli;
mod commands;
mod context;
mod errors;
mod telemetry;

use cli::Cli;
use context::Context;
use errors::AppError;

/// Bundles the IO streams provided to the CLI runtime.
///
/// Pipeline records go to `stdout`; diagnostics go to `stderr`.
pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    pub(crate) stdout: &'a mut W,
    pub(crate) stderr: &'a mut E,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self { stdout, stderr }
    }
}

/// Source of the layered configuration.
pub(crate) trait ConfigLoader {
    fn load(&self, overrides: &ConfigOverrides) -> Result<Config, ConfigError>;
}

/// Loads defaults, the configuration file, the environment, and flags.
pub(crate) struct LayeredConfigLoader;

impl ConfigLoader for LayeredConfigLoader {
    fn load(&self, overrides: &ConfigOverrides) -> Result<Config, ConfigError> {
        Config::load(overrides)
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    exit_code(run_with_loader(args, &mut io, &LayeredConfigLoader))
}

/// Runs the CLI with a custom configuration loader and returns the raw exit
/// status.
pub(crate) fn run_with_loader<I, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, W, E>,
    loader: &L,
) -> i32
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    match execute(args, io, loader) {
        Ok(code) => code,
        Err(AppError::CliUsage(error)) => {
            // Help and version output belong on stdout.
            if error.use_stderr() {
                drop(write!(io.stderr, "{error}"));
            } else {
                drop(write!(io.stdout, "{error}"));
            }
            error.exit_code()
        }
        Err(error) => {
            drop(writeln!(io.stderr, "conduit: {error}"));
            error.exit_code()
        }
    }
}

fn execute<I, W, E, L>(
    args: I,
    io: &mut IoStreams<'_, W, E>,
    loader: &L,
) -> Result<i32, AppError>
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
    L: ConfigLoader,
{
    let cli = Cli::try_parse_from(args).map_err(AppError::CliUsage)?;
    let config = loader.load(&cli.global.overrides())?;
    telemetry::initialise(&config)?;
    let mut context = Context::load(config)?;
    commands::dispatch(&cli.command, &mut context, io)
}

/// Clamps a raw status into the range a process can report.
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
