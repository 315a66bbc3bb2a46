//! `merge`: labelled aggregation of several sources.

use std::io::Write;

use conduit_pipeline::{Aggregator, SourceOutcome, SourceSpec};

use crate::IoStreams;
use crate::cli::MergeArgs;
use crate::context::Context;
use crate::errors::AppError;

pub(super) fn merge<W: Write, E: Write>(
    context: &Context,
    args: &MergeArgs,
    io: &mut IoStreams<'_, W, E>,
) -> Result<i32, AppError> {
    let sources = args
        .sources
        .iter()
        .map(|source| SourceSpec::parse(source))
        .collect::<Result<Vec<_>, _>>()?;
    let fail_fast = args.fail_fast && !args.no_fail_fast;

    let aggregator = Aggregator::new(context.builder(None, None), context.engine(args.timeout));
    let report = aggregator.run(&sources, fail_fast, &mut *io.stdout)?;
    io.stdout.flush()?;

    for source in report.sources() {
        match source.outcome() {
            SourceOutcome::Failed { message, .. } => {
                writeln!(io.stderr, "conduit: source '{}' failed: {message}", source.spec())?;
            }
            SourceOutcome::Skipped => {
                writeln!(io.stderr, "conduit: source '{}' skipped", source.spec())?;
            }
            SourceOutcome::Completed { .. } => {}
        }
    }
    Ok(report.exit_code())
}
