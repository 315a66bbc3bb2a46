//! Errors raised while building or running pipelines.
//!
//! Configuration problems surface before any process is spawned. Stage
//! failures are reported through [`ExecutionResult`](crate::ExecutionResult)
//! and converted into [`PipelineError::StageFailed`] or
//! [`PipelineError::Timeout`] only when the caller asks for a `Result`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::model::StageKind;

/// Exit code for configuration and usage problems.
pub const EXIT_CONFIGURATION: i32 = 2;

/// Exit code when no plugin handles a reference.
pub const EXIT_UNRESOLVED: i32 = 3;

/// Exit code for failures that carry no process status.
pub const EXIT_FAILURE: i32 = 1;

/// Offset added to a signal number when a process dies from a signal.
pub const SIGNAL_EXIT_OFFSET: i32 = 128;

const SIGKILL: i32 = 9;

/// Errors arising from pipeline construction or execution.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No tokens were supplied.
    #[error("pipeline is empty")]
    EmptyPipeline,

    /// Filters or a destination were supplied without anything to read.
    #[error("pipeline has no source: supply a file, URL, or command to read from")]
    MissingSource,

    /// The steps violate the `source → filter* → target?` shape.
    #[error("invalid pipeline: {message}")]
    InvalidPipeline {
        /// Description of the violation.
        message: String,
    },

    /// An aggregation source specification is malformed.
    #[error("invalid source '{spec}': {message}")]
    InvalidSource {
        /// Offending specification.
        spec: String,
        /// Description of the problem.
        message: String,
    },

    /// No plugin handles the reference.
    #[error("no plugin handles '{reference}' (classified as {classification})")]
    Unresolved {
        /// Token or address that failed to resolve.
        reference: String,
        /// Name of the classifier that claimed the token.
        classification: String,
    },

    /// A step names a plugin missing from the catalog.
    #[error("plugin '{name}' is not installed")]
    UnknownPlugin {
        /// Plugin name.
        name: String,
    },

    /// A stage process could not be spawned.
    #[error("plugin '{plugin}' failed to start: {source}")]
    Spawn {
        /// Plugin name.
        plugin: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A source or target file could not be opened.
    #[error("cannot open '{path}': {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// A stage exited unsuccessfully on its own.
    #[error("{kind} stage '{plugin}' exited with status {status}{}", stderr_suffix(.stderr))]
    StageFailed {
        /// Plugin name.
        plugin: String,
        /// Stage position.
        kind: StageKind,
        /// Exit status, `128 + signal` for signal deaths.
        status: i32,
        /// Tail of the stage's standard error.
        stderr: String,
    },

    /// A stage exceeded its time limit and was killed.
    #[error("{kind} stage '{plugin}' timed out after {}ms", .elapsed.as_millis())]
    Timeout {
        /// Plugin name.
        plugin: String,
        /// Stage position.
        kind: StageKind,
        /// Time the stage ran before it was killed.
        elapsed: Duration,
    },

    /// Writing records to the caller failed.
    #[error("failed to write pipeline output: {source}")]
    Output {
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl PipelineError {
    /// Whether the error stems from the request itself rather than from a
    /// running process.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::EmptyPipeline
                | Self::MissingSource
                | Self::InvalidPipeline { .. }
                | Self::InvalidSource { .. }
        )
    }

    /// Process exit code that mirrors this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::EmptyPipeline
            | Self::MissingSource
            | Self::InvalidPipeline { .. }
            | Self::InvalidSource { .. } => EXIT_CONFIGURATION,
            Self::Unresolved { .. } | Self::UnknownPlugin { .. } => EXIT_UNRESOLVED,
            Self::StageFailed { status, .. } => *status,
            Self::Timeout { .. } => SIGNAL_EXIT_OFFSET + SIGKILL,
            Self::Spawn { .. } | Self::Io { .. } | Self::Output { .. } => EXIT_FAILURE,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }
}

#[cfg(test)]
mod tests;
