//! Introspection of plugin executables.
//!
//! Explicitly registered plugins are asked to describe themselves by running
//! `<plugin> --introspect`, which must print a single JSON object:
//!
//! ```json
//! {"name": "xlsx_", "role": "format", "matches": [".xlsx"],
//!  "streaming": false, "modes": ["read", "write"]}
//! ```
//!
//! The report is validated once, at registration time, so that a plugin whose
//! declared role and supported modes disagree never reaches a pipeline.

use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::metadata::{PluginMetadata, PluginRole};
use crate::process;

const INTROSPECT_TARGET: &str = "conduit_plugins::introspect";

/// Flag passed to a plugin to request its self-description.
pub const INTROSPECT_FLAG: &str = "--introspect";

/// Default time allowed for an introspection call.
pub const DEFAULT_INTROSPECT_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

const KNOWN_MODES: &[&str] = &["read", "filter", "write", "raw"];

#[derive(Debug, Deserialize)]
struct IntrospectionReport {
    name: String,
    role: Option<PluginRole>,
    #[serde(default)]
    matches: Vec<String>,
    #[serde(default)]
    streaming: bool,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    modes: Vec<String>,
}

/// Runs `path --introspect` and validates the reported metadata.
///
/// # Errors
///
/// Returns [`PluginError::SpawnFailed`] when the plugin cannot be started,
/// [`PluginError::Timeout`] when it does not exit within `timeout`,
/// [`PluginError::NonZeroExit`] when it fails, and
/// [`PluginError::InvalidIntrospection`] when the report is malformed or
/// inconsistent.
pub fn introspect(path: &Path, timeout: Duration) -> Result<PluginMetadata, PluginError> {
    let label = path.display().to_string();
    debug!(
        target: INTROSPECT_TARGET,
        plugin = %label,
        "requesting plugin self-description"
    );

    let mut command = Command::new(path);
    command
        .arg(INTROSPECT_FLAG)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = process::spawn(&mut command).map_err(|error| PluginError::SpawnFailed {
        name: label.clone(),
        message: error.to_string(),
        source: Some(Arc::new(error)),
    })?;

    // Both pipes drain while the plugin runs so a chatty plugin never blocks
    // on a full pipe buffer before it exits.
    let readers = (
        drain(&label, "stdout", child.stdout.take()),
        drain(&label, "stderr", child.stderr.take()),
    );
    let (stdout_reader, stderr_reader) = match readers {
        (Ok(out), Ok(err)) => (out, err),
        (Err(error), _) | (_, Err(error)) => {
            drop(child.kill());
            drop(child.wait());
            return Err(PluginError::SpawnFailed {
                name: label,
                message: String::from("failed to start output reader"),
                source: Some(Arc::new(error)),
            });
        }
    };

    let status = wait_for_exit(&label, &mut child, timeout)?;
    let stdout = collect(stdout_reader);
    let stderr = collect(stderr_reader);

    if !status.success() {
        return Err(PluginError::NonZeroExit {
            name: label,
            status: status.code().unwrap_or(-1),
            stderr,
        });
    }

    let report: IntrospectionReport =
        serde_json::from_str(stdout.trim()).map_err(|error| PluginError::InvalidIntrospection {
            name: label.clone(),
            message: format!("output is not a JSON metadata object: {error}"),
        })?;
    into_metadata(&label, path, report)
}

fn into_metadata(
    label: &str,
    path: &Path,
    report: IntrospectionReport,
) -> Result<PluginMetadata, PluginError> {
    let invalid = |message: String| PluginError::InvalidIntrospection {
        name: label.to_owned(),
        message,
    };

    if report.name.trim().is_empty() {
        return Err(invalid(String::from("name must not be empty")));
    }
    let Some(role) = report.role else {
        return Err(invalid(String::from("role must be declared")));
    };
    if report.modes.is_empty() {
        return Err(invalid(String::from("at least one mode must be declared")));
    }
    if let Some(unknown) = report
        .modes
        .iter()
        .find(|mode| !KNOWN_MODES.contains(&mode.as_str()))
    {
        return Err(invalid(format!("unknown mode '{unknown}'")));
    }
    let supports = |mode: &str| report.modes.iter().any(|declared| declared == mode);
    if role.reads() && !supports("read") {
        return Err(invalid(format!("role '{role}' requires the 'read' mode")));
    }
    if role.writes() && !supports("write") {
        return Err(invalid(format!("role '{role}' requires the 'write' mode")));
    }
    if role == PluginRole::Filter && !supports("filter") {
        return Err(invalid(String::from("role 'filter' requires the 'filter' mode")));
    }

    let category = path
        .parent()
        .and_then(Path::file_name)
        .and_then(OsStr::to_str)
        .unwrap_or_default()
        .to_owned();
    let modified = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok();

    Ok(PluginMetadata::new(report.name, path)
        .with_category(category)
        .with_role(Some(role))
        .with_matches(report.matches)
        .with_streaming(report.streaming)
        .with_command(report.command.filter(|command| !command.is_empty()))
        .with_modified(modified))
}

/// Waits for the child to exit, killing it once `timeout` elapses.
fn wait_for_exit(
    label: &str,
    child: &mut Child,
    timeout: Duration,
) -> Result<ExitStatus, PluginError> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    target: INTROSPECT_TARGET,
                    plugin = label,
                    ?status,
                    "introspection exited"
                );
                return Ok(status);
            }
            Ok(None) => {
                if start.elapsed() > timeout {
                    warn!(
                        target: INTROSPECT_TARGET,
                        plugin = label,
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "introspection timed out, killing process"
                    );
                    drop(child.kill());
                    drop(child.wait());
                    return Err(PluginError::Timeout {
                        name: label.to_owned(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(error) => {
                return Err(PluginError::SpawnFailed {
                    name: label.to_owned(),
                    message: String::from("failed to poll process"),
                    source: Some(Arc::new(error)),
                });
            }
        }
    }
}

/// Reads `pipe` to its end on a background thread.
fn drain<R>(label: &str, stream: &str, pipe: Option<R>) -> io::Result<Option<JoinHandle<String>>>
where
    R: Read + Send + 'static,
{
    let Some(mut reader) = pipe else {
        return Ok(None);
    };
    let plugin = label.to_owned();
    thread::Builder::new()
        .name(format!("introspect-{stream}"))
        .spawn(move || {
            let mut bytes = Vec::new();
            if let Err(error) = reader.read_to_end(&mut bytes) {
                warn!(target: INTROSPECT_TARGET, plugin = %plugin, %error, "reading plugin output failed");
            }
            String::from_utf8_lossy(&bytes).into_owned()
        })
        .map(Some)
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default()
}
