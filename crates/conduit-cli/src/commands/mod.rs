//! Command handlers.
//!
//! Each handler returns the process exit status on success. Failures that
//! abort the command are returned as [`AppError`] and rendered by the runner.

mod merge;
mod pipeline;
mod plugin;
mod registry;

use std::io::Write;

use conduit_pipeline::Consumption;

use crate::IoStreams;
use crate::cli::CliCommand;
use crate::context::Context;
use crate::errors::AppError;

/// Exit status for a command that completed normally.
const EXIT_SUCCESS: i32 = 0;

pub(crate) fn dispatch<W: Write, E: Write>(
    command: &CliCommand,
    context: &mut Context,
    io: &mut IoStreams<'_, W, E>,
) -> Result<i32, AppError> {
    match command {
        CliCommand::Run(args) => pipeline::run(context, args, io.stdout),
        CliCommand::Head(args) => {
            pipeline::window(context, args, Consumption::Head(args.count), io.stdout)
        }
        CliCommand::Tail(args) => {
            pipeline::window(context, args, Consumption::Tail(args.count), io.stdout)
        }
        CliCommand::Merge(args) => merge::merge(context, args, io),
        CliCommand::Explain(args) => pipeline::explain(context, args, io.stdout),
        CliCommand::Plugin { action } => plugin::handle(context, action, io.stdout),
        CliCommand::Registry { action } => registry::handle(context, action, io),
    }
}
