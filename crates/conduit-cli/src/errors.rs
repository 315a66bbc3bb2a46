//! Error types and exit-code mapping for the CLI runtime.

use std::io;
use std::sync::Arc;

use conduit_config::ConfigError;
use conduit_pipeline::PipelineError;
use conduit_pipeline::error::{EXIT_CONFIGURATION, EXIT_FAILURE, EXIT_UNRESOLVED};
use conduit_plugins::PluginError;
use thiserror::Error;

use crate::telemetry::TelemetryError;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("{0}")]
    CliUsage(clap::Error),
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(#[from] ConfigError),
    #[error("failed to initialise logging: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Plugin(#[from] PluginError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("no plugin handles '{reference}'")]
    Unresolved { reference: String },
    #[error("failed to serialise output: {0}")]
    Serialise(Arc<serde_json::Error>),
    #[error("failed to write output: {0}")]
    Write(Arc<io::Error>),
}

impl AppError {
    /// Process exit code reported for this error.
    pub(crate) fn exit_code(&self) -> i32 {
        match self {
            Self::CliUsage(error) => error.exit_code(),
            Self::LoadConfiguration(_) | Self::Telemetry(_) => EXIT_CONFIGURATION,
            Self::Plugin(error) if error.is_configuration() => EXIT_CONFIGURATION,
            Self::Pipeline(error) => error.exit_code(),
            Self::Unresolved { .. } => EXIT_UNRESOLVED,
            Self::Plugin(_) | Self::Serialise(_) | Self::Write(_) => EXIT_FAILURE,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(error: io::Error) -> Self {
        Self::Write(Arc::new(error))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialise(Arc::new(error))
    }
}
