//! Spawning and wiring stage processes.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use conduit_plugins::process;
use tracing::{debug, warn};

use super::ENGINE_TARGET;
use super::report::StageState;
use super::stderr;
use super::supervisor::Supervised;
use crate::error::PipelineError;
use crate::model::{PipelineStep, StepIo};

/// A step paired with the executable that runs it.
#[derive(Debug)]
pub(super) struct PlannedStage<'p> {
    pub(super) step: &'p PipelineStep,
    pub(super) executable: PathBuf,
}

impl PlannedStage<'_> {
    /// `<executable> --mode <mode> [--key value…] [args…]`
    pub(super) fn command(&self) -> Command {
        let mut command = Command::new(&self.executable);
        command.arg("--mode").arg(self.step.kind().mode());
        for (key, value) in self.step.config() {
            command.arg(format!("--{key}")).arg(value.to_string());
        }
        command.args(self.step.args());
        command
    }
}

/// Where the engine reads from once every stage is running.
#[derive(Debug)]
pub(super) enum Tap {
    /// The final stage wrote to a file; nothing to read.
    Detached,
    /// Stdout of the final stage.
    Direct(ChildStdout),
    /// The engine sits between the last upstream stage and the target.
    Interposed {
        upstream: ChildStdout,
        target_stdin: ChildStdin,
        target_stdout: Option<ChildStdout>,
    },
}

#[derive(Debug)]
pub(super) struct Launched {
    pub(super) stages: Vec<Supervised>,
    pub(super) stderr: Vec<JoinHandle<String>>,
    pub(super) tap: Tap,
}

/// Spawns `stages` in order, wiring each stdout to the next stdin.
///
/// With `interpose` set, the final stage gets its stdin from the engine
/// instead of from its predecessor.
pub(super) fn launch(
    stages: &[PlannedStage<'_>],
    interpose: bool,
    stderr_limit: usize,
) -> Result<Launched, PipelineError> {
    let mut launched = Launched {
        stages: Vec::with_capacity(stages.len()),
        stderr: Vec::with_capacity(stages.len()),
        tap: Tap::Detached,
    };
    let mut upstream: Option<ChildStdout> = None;
    let last = stages.len().saturating_sub(1);

    for (index, stage) in stages.iter().enumerate() {
        let is_last = index == last;
        let feeds_from_engine = interpose && is_last;
        let stdin = if feeds_from_engine {
            Stdio::piped()
        } else if let Some(previous) = upstream.take() {
            Stdio::from(previous)
        } else {
            open_input(stage.step.io()).inspect_err(|_| abandon(&mut launched.stages))?
        };
        let stdout = match stage.step.output_file().filter(|_| is_last) {
            Some(path) => create_output(path).inspect_err(|_| abandon(&mut launched.stages))?,
            None => Stdio::piped(),
        };

        let mut command = stage.command();
        command.stdin(stdin).stdout(stdout).stderr(Stdio::piped());
        let spawned = process::spawn(&mut command);
        drop(command);
        let started = Instant::now();
        let mut child = match spawned {
            Ok(child) => child,
            Err(error) => {
                abandon(&mut launched.stages);
                return Err(PipelineError::Spawn {
                    plugin: stage.step.plugin().to_owned(),
                    source: Arc::new(error),
                });
            }
        };
        debug!(
            target: ENGINE_TARGET,
            plugin = stage.step.plugin(),
            kind = %stage.step.kind(),
            pid = child.id(),
            state = %StageState::Spawned,
            "stage spawned"
        );

        if let Some(reader) = child.stderr.take() {
            match stderr::capture(stage.step.plugin().to_owned(), reader, stderr_limit) {
                Ok(handle) => launched.stderr.push(handle),
                Err(error) => {
                    launched.stages.push(Supervised::new(
                        stage.step.plugin().to_owned(),
                        child,
                        started,
                    ));
                    abandon(&mut launched.stages);
                    return Err(PipelineError::Spawn {
                        plugin: stage.step.plugin().to_owned(),
                        source: Arc::new(error),
                    });
                }
            }
        }

        if is_last {
            launched.tap = match (feeds_from_engine, child.stdin.take(), upstream.take()) {
                (true, Some(target_stdin), Some(upstream)) => Tap::Interposed {
                    upstream,
                    target_stdin,
                    target_stdout: child.stdout.take(),
                },
                _ => child.stdout.take().map_or(Tap::Detached, Tap::Direct),
            };
        } else {
            upstream = child.stdout.take();
        }
        launched
            .stages
            .push(Supervised::new(stage.step.plugin().to_owned(), child, started));
    }

    debug!(
        target: ENGINE_TARGET,
        stages = launched.stages.len(),
        state = %StageState::Streaming,
        "pipeline wired"
    );
    Ok(launched)
}

/// Stdin of the first stage.
fn open_input(io: &StepIo) -> Result<Stdio, PipelineError> {
    match io {
        StepIo::ReadFile(path) => File::open(path)
            .map(Stdio::from)
            .map_err(|error| PipelineError::io(path, error)),
        StepIo::ReadStdin => Ok(Stdio::inherit()),
        StepIo::Inherit | StepIo::WriteFile(_) => Ok(Stdio::null()),
    }
}

fn create_output(path: &Path) -> Result<Stdio, PipelineError> {
    File::create(path)
        .map(Stdio::from)
        .map_err(|error| PipelineError::io(path, error))
}

/// Kills and reaps stages spawned before a launch failure.
fn abandon(stages: &mut Vec<Supervised>) {
    for mut stage in stages.drain(..) {
        warn!(
            target: ENGINE_TARGET,
            plugin = %stage.plugin,
            pid = stage.child.id(),
            "killing stage after launch failure"
        );
        drop(stage.child.kill());
        drop(stage.child.wait());
    }
}
