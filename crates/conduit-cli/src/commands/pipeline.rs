//! `run`, `head`, `tail`, and `explain`.

use std::io::Write;

use conduit_pipeline::{Consumption, Pipeline, PipelineError};
use tracing::info;

use super::EXIT_SUCCESS;
use crate::cli::{ExplainArgs, PipelineArgs, RunArgs, WindowArgs};
use crate::context::Context;
use crate::errors::AppError;

const PIPELINE_TARGET: &str = "conduit_cli::pipeline";

pub(super) fn run<W: Write>(
    context: &Context,
    args: &RunArgs,
    output: &mut W,
) -> Result<i32, AppError> {
    let consumption = match (args.limit, args.tail) {
        (Some(count), _) => Consumption::Head(count),
        (None, Some(count)) => Consumption::Tail(count),
        (None, None) => Consumption::All,
    };
    execute(context, &args.pipeline, consumption, args.timeout, output)
}

pub(super) fn window<W: Write>(
    context: &Context,
    args: &WindowArgs,
    consumption: Consumption,
    output: &mut W,
) -> Result<i32, AppError> {
    execute(context, &args.pipeline, consumption, args.timeout, output)
}

pub(super) fn explain<W: Write>(
    context: &Context,
    args: &ExplainArgs,
    output: &mut W,
) -> Result<i32, AppError> {
    let pipeline = build(context, &args.pipeline)?;
    if args.json {
        serde_json::to_writer_pretty(&mut *output, &pipeline)?;
        writeln!(output)?;
    } else {
        writeln!(output, "{pipeline}")?;
    }
    Ok(EXIT_SUCCESS)
}

fn execute<W: Write>(
    context: &Context,
    args: &PipelineArgs,
    consumption: Consumption,
    timeout_secs: Option<u64>,
    output: &mut W,
) -> Result<i32, AppError> {
    let pipeline = build(context, args)?;
    let result = context
        .engine(timeout_secs)
        .execute(&pipeline, consumption, output)?
        .into_result()?;
    info!(
        target: PIPELINE_TARGET,
        records = result.records(),
        induced_shutdown = result.induced_shutdown(),
        "pipeline finished"
    );
    Ok(EXIT_SUCCESS)
}

fn build(context: &Context, args: &PipelineArgs) -> Result<Pipeline, PipelineError> {
    context
        .builder(args.plugin.clone(), args.to.clone())
        .build(&args.tokens)
}
