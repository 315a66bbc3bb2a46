//! Domain errors raised by plugin discovery, registration, and lookup.
//!
//! I/O and JSON errors are wrapped in `Arc` to satisfy the `result_large_err`
//! Clippy lint and keep the enum cheap to clone into reports.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// A filesystem operation failed.
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The persisted registry could not be parsed.
    #[error("registry file '{path}' is unreadable: {source}")]
    RegistryFormat {
        /// Registry document path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: Arc<serde_json::Error>,
    },

    /// A registry entry failed validation.
    #[error("invalid registry entry: {message}")]
    InvalidEntry {
        /// Description of the validation failure.
        message: String,
    },

    /// A plugin with the same name is already known.
    #[error("plugin '{name}' is already registered")]
    DuplicatePlugin {
        /// Colliding plugin name.
        name: String,
    },

    /// The plugin process could not be spawned.
    #[error("plugin '{name}' failed to start: {message}")]
    SpawnFailed {
        /// Plugin name or path.
        name: String,
        /// Human-readable failure description.
        message: String,
        /// Optional underlying I/O error.
        #[source]
        source: Option<Arc<std::io::Error>>,
    },

    /// The plugin did not finish within the allotted time.
    #[error("plugin '{name}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Plugin name or path.
        name: String,
        /// Allotted time in milliseconds.
        timeout_ms: u64,
    },

    /// The plugin exited with a non-zero status code.
    #[error("plugin '{name}' exited with non-zero status {status}")]
    NonZeroExit {
        /// Plugin name or path.
        name: String,
        /// Process exit status.
        status: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The plugin's self-description is missing or inconsistent.
    #[error("plugin '{name}' reported invalid metadata: {message}")]
    InvalidIntrospection {
        /// Plugin name or path.
        name: String,
        /// Description of the problem.
        message: String,
    },
}

impl PluginError {
    /// Whether the error stems from invalid user-supplied configuration rather
    /// than a runtime failure.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::RegistryFormat { .. } | Self::InvalidEntry { .. } | Self::DuplicatePlugin { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn invalid_entry(message: impl Into<String>) -> Self {
        Self::InvalidEntry {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests;
