//! Per-stage outcomes and the overall execution result.

use std::fmt;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{EXIT_FAILURE, PipelineError, SIGNAL_EXIT_OFFSET};
use crate::model::StageKind;

/// Why the engine killed a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillReason {
    /// The stage exceeded its time limit.
    Timeout,
    /// The stage outlived the grace period after the engine stopped reading.
    InducedShutdown,
    /// Another stage timed out or the caller's output failed.
    Aborted,
}

impl KillReason {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::InducedShutdown => "induced_shutdown",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for KillReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a stage process.
///
/// `Pending → Spawned → Streaming → (Exited | Killed)`. Reports always carry
/// one of the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Not started yet.
    Pending,
    /// Process created.
    Spawned,
    /// Wired to its neighbours and running.
    Streaming,
    /// Exited on its own.
    Exited {
        /// Exit status, `128 + signal` for signal deaths.
        code: i32,
    },
    /// Killed by the engine.
    Killed {
        /// Why the engine killed it.
        reason: KillReason,
        /// Signal that ended the process, when known.
        signal: Option<i32>,
    },
}

impl StageState {
    /// Whether the stage has finished.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Exited { .. } | Self::Killed { .. })
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Spawned => f.write_str("spawned"),
            Self::Streaming => f.write_str("streaming"),
            Self::Exited { code } => write!(f, "exited({code})"),
            Self::Killed { reason, .. } => write!(f, "killed({reason})"),
        }
    }
}

/// How a stage's ending is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Exited with status zero.
    Succeeded,
    /// Ended because the engine stopped consuming. Not an error.
    InducedShutdown,
    /// Exited unsuccessfully on its own.
    Failed,
    /// Killed for exceeding its time limit.
    TimedOut,
    /// Torn down because of a failure elsewhere.
    Aborted,
}

impl StageOutcome {
    /// Whether the outcome counts as a hard failure.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

/// What happened to one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub(super) index: usize,
    pub(super) kind: StageKind,
    pub(super) plugin: String,
    pub(super) pid: u32,
    pub(super) state: StageState,
    pub(super) outcome: StageOutcome,
    pub(super) elapsed: Duration,
    pub(super) stderr: String,
}

impl StageReport {
    /// Position in the pipeline.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Stage kind.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        self.kind
    }

    /// Plugin name.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Operating system process id.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Terminal state.
    #[must_use]
    pub const fn state(&self) -> StageState {
        self.state
    }

    /// Judgement of the ending.
    #[must_use]
    pub const fn outcome(&self) -> StageOutcome {
        self.outcome
    }

    /// Exit status, `128 + signal` for signal deaths.
    #[must_use]
    pub const fn exit_code(&self) -> Option<i32> {
        match self.state {
            StageState::Exited { code } => Some(code),
            StageState::Killed {
                signal: Some(signal),
                ..
            } => Some(SIGNAL_EXIT_OFFSET + signal),
            _ => None,
        }
    }

    /// Wall time between spawn and exit.
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Tail of the stage's standard error.
    #[must_use]
    pub const fn stderr(&self) -> &str {
        self.stderr.as_str()
    }

    fn into_error(self) -> PipelineError {
        if self.outcome == StageOutcome::TimedOut {
            return PipelineError::Timeout {
                plugin: self.plugin,
                kind: self.kind,
                elapsed: self.elapsed,
            };
        }
        PipelineError::StageFailed {
            status: self.exit_code().unwrap_or(EXIT_FAILURE),
            plugin: self.plugin,
            kind: self.kind,
            stderr: self.stderr,
        }
    }
}

/// Result of running a pipeline to completion.
///
/// Records already forwarded are never retracted, so a result may describe a
/// failure even though output was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub(super) stages: Vec<StageReport>,
    pub(super) records: usize,
    pub(super) induced_shutdown: bool,
    pub(super) first_failure: Option<usize>,
}

impl ExecutionResult {
    /// Reports in pipeline order.
    #[must_use]
    pub fn stages(&self) -> &[StageReport] {
        &self.stages
    }

    /// Number of records the engine forwarded itself. Zero when the final
    /// stage was a target whose encoded output was copied verbatim or written
    /// to a file.
    #[must_use]
    pub const fn records(&self) -> usize {
        self.records
    }

    /// Whether the engine stopped consuming before end of stream.
    #[must_use]
    pub const fn induced_shutdown(&self) -> bool {
        self.induced_shutdown
    }

    /// Whether no stage failed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.first_failure.is_none()
    }

    /// The earliest hard failure.
    #[must_use]
    pub fn first_failure(&self) -> Option<&StageReport> {
        self.first_failure.and_then(|index| self.stages.get(index))
    }

    /// Process exit code mirroring the result.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.first_failure()
            .map_or(0, |stage| stage.exit_code().unwrap_or(EXIT_FAILURE))
    }

    /// Converts a failed result into the matching error.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Timeout`] or [`PipelineError::StageFailed`]
    /// for the first hard failure.
    pub fn into_result(mut self) -> Result<Self, PipelineError> {
        match self.first_failure {
            Some(index) if index < self.stages.len() => {
                Err(self.stages.swap_remove(index).into_error())
            }
            _ => Ok(self),
        }
    }
}

/// Exit code for a finished process, `128 + signal` for signal deaths.
pub(super) fn exit_code_of(status: Option<ExitStatus>) -> i32 {
    let Some(exit) = status else {
        return EXIT_FAILURE;
    };
    exit.code().unwrap_or_else(|| {
        signal_of(Some(exit)).map_or(EXIT_FAILURE, |signal| SIGNAL_EXIT_OFFSET + signal)
    })
}

#[cfg(unix)]
pub(super) fn signal_of(status: Option<ExitStatus>) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.and_then(|exit| exit.signal())
}

#[cfg(not(unix))]
pub(super) const fn signal_of(_status: Option<ExitStatus>) -> Option<i32> {
    None
}

pub(super) fn output_error(source: std::io::Error) -> PipelineError {
    PipelineError::Output {
        source: Arc::new(source),
    }
}
