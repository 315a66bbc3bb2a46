use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default log filter expression. Records travel on stdout, so the CLI keeps
/// stderr quiet unless asked otherwise.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Name of the configuration file looked up inside the home directory.
pub const CONFIG_FILE_NAME: &str = "conduit.toml";

/// Plugin used for bare filter expressions such as `select(.age > 30)`.
pub const DEFAULT_FILTER_PLUGIN: &str = "jq_filter";

/// Plugin used when a command token matches no registry entry.
pub const DEFAULT_FALLBACK_ADAPTER: &str = "generic_exec";

/// Upper bound on the stderr bytes retained per stage.
pub const DEFAULT_STDERR_LIMIT_BYTES: usize = 64 * 1024;

/// Grace period granted to upstream stages after an early consumer exit.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Computes the default home directory: `$HOME/.conduit`, or `.conduit`
/// relative to the working directory when no home is known.
#[must_use]
pub fn default_home() -> Utf8PathBuf {
    dirs::home_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .map_or_else(|| Utf8PathBuf::from(".conduit"), |home| home.join(".conduit"))
}

/// Computes the default location of the plugins shipped with the tool.
#[must_use]
pub fn default_builtin_plugin_dir() -> Option<Utf8PathBuf> {
    dirs::data_dir()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .map(|data| data.join("conduit").join("plugins"))
}
