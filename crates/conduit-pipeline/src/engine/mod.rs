//! Process-chaining execution of pipelines.
//!
//! Every stage runs as its own operating system process. The stdout of stage
//! N is handed to stage N+1 as its stdin and the engine drops its own copy, so
//! records move through kernel pipe buffers and a slow consumer stalls its
//! producers. The control thread only reads the end of the chain.
//!
//! Truncated consumption ([`Consumption::Head`]) closes the read end early.
//! Upstream stages then die of `SIGPIPE` or a write error, which the engine
//! attributes to an induced shutdown rather than a failure. Stages that are
//! still alive once the grace period expires are killed. When the pipeline
//! ends in a target the engine places itself in front of the target so that
//! truncation applies to records rather than to encoded output.
//!
//! Two kinds of background threads run alongside the control thread: one
//! stderr drainer per stage and a single supervisor that reaps exits and
//! enforces time limits.

mod launch;
mod report;
mod stderr;
mod supervisor;
mod tap;

use std::fmt;
use std::io::Write;
use std::process::{ChildStdin, ChildStdout};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use conduit_plugins::PluginCatalog;
use tracing::{debug, info, warn};

pub use self::report::{ExecutionResult, KillReason, StageOutcome, StageReport, StageState};

use self::launch::{Launched, PlannedStage, Tap};
use self::report::{exit_code_of, output_error, signal_of};
use self::supervisor::{Control, Finished, Limits, Milestones, Supervised};
use self::tap::TapOutcome;
use crate::error::PipelineError;
use crate::model::{Pipeline, PipelineStep};

const ENGINE_TARGET: &str = "conduit_pipeline::engine";

/// Default time stages may outlive an induced shutdown.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Default number of stderr bytes kept per stage.
pub const DEFAULT_STDERR_LIMIT: usize = 64 * 1024;

/// Default supervisor polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// How much of the stream the caller wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consumption {
    /// Every record.
    #[default]
    All,
    /// The first `n` records, then stop.
    Head(usize),
    /// The last `n` records, emitted at end of stream.
    Tail(usize),
}

impl fmt::Display for Consumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Head(count) => write!(f, "head({count})"),
            Self::Tail(count) => write!(f, "tail({count})"),
        }
    }
}

/// Tunables for an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    stage_timeout: Option<Duration>,
    shutdown_grace: Duration,
    stderr_limit: usize,
    poll_interval: Duration,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            stage_timeout: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            stderr_limit: DEFAULT_STDERR_LIMIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ExecutionOptions {
    /// Kills any stage running longer than `timeout`.
    #[must_use]
    pub const fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Sets how long stages may outlive an induced shutdown.
    #[must_use]
    pub const fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Sets how many stderr bytes are kept per stage.
    #[must_use]
    pub const fn with_stderr_limit(mut self, limit: usize) -> Self {
        self.stderr_limit = limit;
        self
    }

    /// Sets the supervisor polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Per-stage time limit.
    #[must_use]
    pub const fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout
    }

    /// Grace period after an induced shutdown.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Stderr bytes kept per stage.
    #[must_use]
    pub const fn stderr_limit(&self) -> usize {
        self.stderr_limit
    }

    const fn limits(&self) -> Limits {
        Limits {
            stage_timeout: self.stage_timeout,
            shutdown_grace: self.shutdown_grace,
            poll_interval: self.poll_interval,
        }
    }
}

/// Runs pipelines whose plugins are listed in a catalog.
#[derive(Debug, Clone, Copy)]
pub struct Engine<'c> {
    catalog: &'c PluginCatalog,
    options: ExecutionOptions,
}

impl<'c> Engine<'c> {
    /// Creates an engine.
    #[must_use]
    pub const fn new(catalog: &'c PluginCatalog, options: ExecutionOptions) -> Self {
        Self { catalog, options }
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    /// Runs `pipeline` and forwards only its first `count` records.
    ///
    /// # Errors
    ///
    /// See [`Engine::execute`].
    pub fn execute_head<W: Write + ?Sized>(
        &self,
        pipeline: &Pipeline,
        count: usize,
        output: &mut W,
    ) -> Result<ExecutionResult, PipelineError> {
        self.execute(pipeline, Consumption::Head(count), output)
    }

    /// Runs `pipeline` and forwards only its last `count` records.
    ///
    /// # Errors
    ///
    /// See [`Engine::execute`].
    pub fn execute_tail<W: Write + ?Sized>(
        &self,
        pipeline: &Pipeline,
        count: usize,
        output: &mut W,
    ) -> Result<ExecutionResult, PipelineError> {
        self.execute(pipeline, Consumption::Tail(count), output)
    }

    /// Runs `pipeline`, writing whatever reaches its end to `output`.
    ///
    /// Stage failures do not produce an `Err`; they are reported in the
    /// returned [`ExecutionResult`]. Use [`ExecutionResult::into_result`] to
    /// turn them into errors.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownPlugin`] when a step's plugin is not in
    /// the catalog, [`PipelineError::Io`] when a source or target file cannot
    /// be opened, [`PipelineError::Spawn`] when a stage cannot be started, and
    /// [`PipelineError::Output`] when writing to `output` fails. In the last
    /// case every stage has been torn down before the error is returned.
    pub fn execute<W: Write + ?Sized>(
        &self,
        pipeline: &Pipeline,
        consumption: Consumption,
        output: &mut W,
    ) -> Result<ExecutionResult, PipelineError> {
        let planned = self.plan(pipeline)?;
        let has_target = pipeline.target().is_some();
        let interpose = has_target && consumption != Consumption::All;
        let tap_index = if interpose {
            planned.len().saturating_sub(1)
        } else {
            planned.len()
        };
        info!(
            target: ENGINE_TARGET,
            pipeline = %pipeline,
            %consumption,
            "executing pipeline"
        );

        let Launched { stages, stderr, tap } =
            launch::launch(&planned, interpose, self.options.stderr_limit)?;
        let control = Control::new(stages);
        let supervisor = match supervisor::spawn(control.clone(), self.options.limits()) {
            Ok(handle) => handle,
            Err(error) => {
                drop(control.into_stages());
                return Err(PipelineError::Spawn {
                    plugin: String::from("supervisor"),
                    source: Arc::new(error),
                });
            }
        };

        let streamed = match tap {
            Tap::Detached => TapOutcome::default(),
            Tap::Direct(mut reader) => {
                let outcome = if has_target {
                    tap::forward(&mut reader, output)
                } else {
                    tap::drain(&mut reader, consumption, output)
                };
                settle(&control, &outcome);
                drop(reader);
                outcome
            }
            Tap::Interposed {
                upstream,
                target_stdin,
                target_stdout,
            } => feed_target(&control, consumption, upstream, target_stdin, target_stdout, output),
        };

        if supervisor.join().is_err() {
            warn!(target: ENGINE_TARGET, "supervisor thread panicked");
        }
        let milestones = control.milestones();
        let supervised = control.into_stages();
        let mut captured = stderr.into_iter().map(join_stderr);
        let reports: Vec<(StageReport, Instant)> = planned
            .iter()
            .zip(supervised)
            .enumerate()
            .map(|(index, (stage, supervised))| {
                let stderr = captured.next().unwrap_or_default();
                stage_report(index, stage.step, supervised, stderr, milestones, tap_index)
            })
            .collect();

        if let Some(error) = streamed.write_error {
            warn!(target: ENGINE_TARGET, %error, "pipeline output failed, stages torn down");
            return Err(output_error(error));
        }

        let result = summarise(reports, streamed.records, streamed.induced);
        match result.first_failure() {
            Some(stage) => warn!(
                target: ENGINE_TARGET,
                plugin = stage.plugin(),
                kind = %stage.kind(),
                state = %stage.state(),
                "pipeline failed"
            ),
            None => info!(
                target: ENGINE_TARGET,
                records = result.records(),
                induced_shutdown = result.induced_shutdown(),
                "pipeline finished"
            ),
        }
        Ok(result)
    }

    fn plan<'p>(&self, pipeline: &'p Pipeline) -> Result<Vec<PlannedStage<'p>>, PipelineError> {
        pipeline
            .steps()
            .iter()
            .map(|step| {
                let metadata =
                    self.catalog
                        .get(step.plugin())
                        .ok_or_else(|| PipelineError::UnknownPlugin {
                            name: step.plugin().to_owned(),
                        })?;
                Ok(PlannedStage {
                    step,
                    executable: metadata.path().to_path_buf(),
                })
            })
            .collect()
    }
}

/// Records what the control thread's read means for the other stages.
fn settle(control: &Control, outcome: &TapOutcome) {
    if outcome.induced {
        debug!(target: ENGINE_TARGET, records = outcome.records, "closing pipeline early");
        control.begin_shutdown();
    }
    if outcome.write_error.is_some() {
        control.abort();
    }
}

/// Feeds the target from a helper thread while the control thread forwards
/// the target's output.
fn feed_target<W: Write + ?Sized>(
    control: &Control,
    consumption: Consumption,
    mut upstream: ChildStdout,
    mut target_stdin: ChildStdin,
    target_stdout: Option<ChildStdout>,
    output: &mut W,
) -> TapOutcome {
    let feeder_control = control.clone();
    let spawned = thread::Builder::new()
        .name(String::from("pipeline-feeder"))
        .spawn(move || {
            let outcome = tap::drain(&mut upstream, consumption, &mut target_stdin);
            if outcome.induced {
                feeder_control.begin_shutdown();
            }
            if let Some(error) = &outcome.write_error {
                debug!(target: ENGINE_TARGET, %error, "target stopped accepting records");
            }
            outcome
        });
    let feeder = match spawned {
        Ok(handle) => handle,
        Err(error) => {
            warn!(target: ENGINE_TARGET, %error, "cannot start feeder thread");
            control.abort();
            return TapOutcome::default();
        }
    };

    let forwarded = target_stdout.map(|mut reader| tap::forward(&mut reader, output));
    let write_error = forwarded.and_then(|outcome| outcome.write_error);
    if write_error.is_some() {
        control.abort();
    }
    let fed = feeder.join().unwrap_or_default();
    TapOutcome {
        records: fed.records,
        induced: fed.induced,
        write_error,
    }
}

fn join_stderr(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn stage_report(
    index: usize,
    step: &PipelineStep,
    supervised: Supervised,
    stderr: String,
    milestones: Milestones,
    tap_index: usize,
) -> (StageReport, Instant) {
    let Supervised {
        plugin,
        child,
        started,
        finished,
    } = supervised;
    let finished = finished.unwrap_or(Finished {
        status: None,
        killed: Some(KillReason::Aborted),
        at: Instant::now(),
    });
    let state = match finished.killed {
        Some(reason) => StageState::Killed {
            reason,
            signal: signal_of(finished.status),
        },
        None => StageState::Exited {
            code: exit_code_of(finished.status),
        },
    };
    let report = StageReport {
        index,
        kind: step.kind(),
        plugin,
        pid: child.id(),
        state,
        outcome: judge(index, tap_index, &finished, milestones),
        elapsed: finished.at.saturating_duration_since(started),
        stderr,
    };
    (report, finished.at)
}

/// Decides whether a stage ending counts against the pipeline.
///
/// Non-zero exits observed after an abort are collateral. Those reaped
/// strictly after an induced shutdown are expected for stages upstream of the
/// tap; exits that predate it were reaped when the shutdown began and stay
/// failures.
fn judge(
    index: usize,
    tap_index: usize,
    finished: &Finished,
    milestones: Milestones,
) -> StageOutcome {
    let aborted = milestones.aborted_at.is_some_and(|at| finished.at >= at);
    let induced = milestones.shutdown_at.is_some_and(|at| finished.at > at);
    match finished.killed {
        Some(KillReason::Timeout) => StageOutcome::TimedOut,
        Some(KillReason::InducedShutdown) => StageOutcome::InducedShutdown,
        Some(KillReason::Aborted) => StageOutcome::Aborted,
        None if finished.status.is_some_and(|status| status.success()) => StageOutcome::Succeeded,
        None if aborted => StageOutcome::Aborted,
        None if index < tap_index && induced => StageOutcome::InducedShutdown,
        None => StageOutcome::Failed,
    }
}

/// The earliest hard failure wins; stage order breaks ties.
fn summarise(
    reports: Vec<(StageReport, Instant)>,
    records: usize,
    induced_shutdown: bool,
) -> ExecutionResult {
    let first_failure = reports
        .iter()
        .filter(|(report, _)| report.outcome.is_failure())
        .min_by_key(|(report, at)| (*at, report.index))
        .map(|(report, _)| report.index);
    ExecutionResult {
        stages: reports.into_iter().map(|(report, _)| report).collect(),
        records,
        induced_shutdown,
        first_failure,
    }
}
