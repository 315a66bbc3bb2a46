//! Shared configuration for the Conduit pipeline toolchain.
//!
//! Values are layered from compiled defaults, an optional `conduit.toml`,
//! `CONDUIT_*` environment variables, and finally command-line overrides. The
//! resulting [`Config`] is read-only for the rest of the process.

mod defaults;
mod loader;
mod logging;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

pub use defaults::{
    CONFIG_FILE_NAME, DEFAULT_FALLBACK_ADAPTER, DEFAULT_FILTER_PLUGIN, DEFAULT_LOG_FILTER,
    DEFAULT_SHUTDOWN_GRACE_MS, DEFAULT_STDERR_LIMIT_BYTES, default_builtin_plugin_dir,
    default_home, default_log_filter, default_log_format,
};
pub use loader::{CONFIG_PATH_ENV, ConfigError, ConfigOverrides, ENV_PREFIX, HOME_ENV};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved configuration shared by the CLI and the pipeline runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    home: Utf8PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugin_dir: Option<Utf8PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    builtin_plugin_dir: Option<Utf8PathBuf>,
    fallback_to_builtin: bool,
    log_filter: String,
    log_format: LogFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    stage_timeout_secs: Option<u64>,
    shutdown_grace_ms: u64,
    stderr_limit_bytes: usize,
    filter_plugin: String,
    fallback_adapter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            home: default_home(),
            plugin_dir: None,
            builtin_plugin_dir: default_builtin_plugin_dir(),
            fallback_to_builtin: true,
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
            stage_timeout_secs: None,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            stderr_limit_bytes: DEFAULT_STDERR_LIMIT_BYTES,
            filter_plugin: DEFAULT_FILTER_PLUGIN.to_owned(),
            fallback_adapter: DEFAULT_FALLBACK_ADAPTER.to_owned(),
        }
    }
}

impl Config {
    /// Returns a default configuration rooted at `home`.
    #[must_use]
    pub fn with_home(home: impl Into<Utf8PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Self::default()
        }
    }

    /// Directory holding the registry, the metadata memo, and user plugins.
    #[must_use]
    pub fn home(&self) -> &Utf8Path {
        &self.home
    }

    /// Directory scanned for user plugins.
    #[must_use]
    pub fn plugin_dir(&self) -> Utf8PathBuf {
        self.plugin_dir
            .clone()
            .unwrap_or_else(|| self.home.join("plugins"))
    }

    /// Directory scanned for the plugins shipped with the tool.
    #[must_use]
    pub fn builtin_plugin_dir(&self) -> Option<&Utf8Path> {
        self.builtin_plugin_dir.as_deref()
    }

    /// Whether plugins missing from the user directory fall back to builtins.
    #[must_use]
    pub const fn fallback_to_builtin(&self) -> bool {
        self.fallback_to_builtin
    }

    /// Persisted registry document.
    #[must_use]
    pub fn registry_path(&self) -> Utf8PathBuf {
        self.home.join("registry.json")
    }

    /// Persisted plugin metadata memo.
    #[must_use]
    pub fn plugin_memo_path(&self) -> Utf8PathBuf {
        self.home.join("cache").join("plugins.json")
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Per-stage wall-clock limit, if any.
    #[must_use]
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }

    /// Time upstream stages get to exit on their own after an early close.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Stderr bytes retained per stage.
    #[must_use]
    pub const fn stderr_limit_bytes(&self) -> usize {
        self.stderr_limit_bytes
    }

    /// Plugin handling bare filter expressions.
    #[must_use]
    pub fn filter_plugin(&self) -> &str {
        self.filter_plugin.as_str()
    }

    /// Plugin wrapping arbitrary shell commands.
    #[must_use]
    pub fn fallback_adapter(&self) -> &str {
        self.fallback_adapter.as_str()
    }
}

#[cfg(test)]
mod tests;
