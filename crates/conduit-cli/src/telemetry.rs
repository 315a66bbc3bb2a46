//! Diagnostics for a single `conduit` invocation.
//!
//! Stdout belongs to pipeline records, so every event is written to stderr.
//! The format and level come from the resolved configuration, which means
//! `--log-format json` turns a run into machine-readable diagnostics without
//! touching its output.

use std::io::{self, IsTerminal};

use conduit_config::{Config, LogFormat};
use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

static INSTALLED: OnceCell<()> = OnceCell::new();

type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

/// Errors raised while setting up diagnostics; both map to exit code 2.
#[derive(Debug, thiserror::Error)]
pub(crate) enum TelemetryError {
    #[error("invalid log filter '{filter}': {message}")]
    Filter { filter: String, message: String },
    #[error("cannot install the log subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Routes this invocation's events to stderr. Only the first call in a
/// process installs anything; in-process test runs share that subscriber.
pub(crate) fn initialise(config: &Config) -> Result<(), TelemetryError> {
    INSTALLED
        .get_or_try_init(|| {
            let subscriber = stderr_subscriber(config)?;
            tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
        })
        .map(|_| ())
}

/// Builds the stderr subscriber without installing it.
fn stderr_subscriber(config: &Config) -> Result<BoxedSubscriber, TelemetryError> {
    let directives = config.log_filter();
    let filter = EnvFilter::try_new(directives).map_err(|error| TelemetryError::Filter {
        filter: directives.to_owned(),
        message: error.to_string(),
    })?;
    let events = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());
    let subscriber: BoxedSubscriber = match config.log_format() {
        LogFormat::Json => Box::new(events.json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(events.compact().with_target(false).finish()),
    };
    Ok(subscriber)
}
