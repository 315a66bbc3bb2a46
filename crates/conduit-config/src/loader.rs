//! Layered configuration loading.
//!
//! Merge order, later layers overriding earlier ones:
//! 1. compiled defaults
//! 2. the configuration file (`--config-path`, `CONDUIT_CONFIG_PATH`, or
//!    `<home>/conduit.toml`)
//! 3. `CONDUIT_*` environment variables
//! 4. command-line overrides

use std::env;

use camino::Utf8PathBuf;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::Serialize;
use thiserror::Error;

use crate::{CONFIG_FILE_NAME, Config, LogFormat, default_home};

/// Prefix shared by every configuration environment variable.
pub const ENV_PREFIX: &str = "CONDUIT_";

/// Environment variable naming an explicit configuration file.
pub const CONFIG_PATH_ENV: &str = "CONDUIT_CONFIG_PATH";

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "CONDUIT_HOME";

/// Errors raised while assembling the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {path}")]
    MissingFile {
        /// Path supplied by the caller.
        path: Utf8PathBuf,
    },
    /// A layer held a value of the wrong shape.
    #[error("invalid configuration: {0}")]
    Extract(#[source] Box<figment::Error>),
    /// The merged configuration violates a constraint.
    #[error("invalid configuration value for '{key}': {message}")]
    Invalid {
        /// Offending key.
        key: &'static str,
        /// Human-readable reason.
        message: String,
    },
}

/// Values supplied on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConfigOverrides {
    /// Explicit configuration file; must exist when set.
    #[serde(skip)]
    pub config_path: Option<Utf8PathBuf>,
    /// Home directory override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<Utf8PathBuf>,
    /// User plugin directory override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_dir: Option<Utf8PathBuf>,
    /// Builtin plugin directory override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builtin_plugin_dir: Option<Utf8PathBuf>,
    /// Builtin fallback toggle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_to_builtin: Option<bool>,
    /// Log filter override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
    /// Log format override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,
    /// Per-stage timeout override in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
}

impl Config {
    /// Loads the configuration from every layer.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an explicit configuration file is missing,
    /// a layer cannot be deserialised, or the merged values are invalid.
    pub fn load(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let config_path = match overrides.config_path.clone() {
            Some(path) => {
                if !path.is_file() {
                    return Err(ConfigError::MissingFile { path });
                }
                path
            }
            None => implicit_config_path(overrides),
        };

        let config: Self = figment(&config_path, overrides)
            .extract()
            .map_err(|error| ConfigError::Extract(Box::new(error)))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from a TOML document and the overrides only,
    /// ignoring the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the document is malformed or the merged
    /// values are invalid.
    pub fn from_toml_str(
        document: &str,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::string(document))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(|error| ConfigError::Extract(Box::new(error)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.filter_plugin.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "filter_plugin",
                message: String::from("must name a plugin"),
            });
        }
        if self.fallback_adapter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "fallback_adapter",
                message: String::from("must name a plugin"),
            });
        }
        if self.stderr_limit_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "stderr_limit_bytes",
                message: String::from("must be greater than zero"),
            });
        }
        if self.stage_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                key: "stage_timeout_secs",
                message: String::from("must be greater than zero when set"),
            });
        }
        Ok(())
    }
}

fn figment(config_path: &Utf8PathBuf, overrides: &ConfigOverrides) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(config_path.as_std_path()))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["config_path"]))
        .merge(Serialized::defaults(overrides))
}

fn implicit_config_path(overrides: &ConfigOverrides) -> Utf8PathBuf {
    if let Some(path) = env_path(CONFIG_PATH_ENV) {
        return path;
    }
    let home = overrides
        .home
        .clone()
        .or_else(|| env_path(HOME_ENV))
        .unwrap_or_else(default_home);
    home.join(CONFIG_FILE_NAME)
}

fn env_path(key: &str) -> Option<Utf8PathBuf> {
    env::var_os(key)
        .filter(|value| !value.is_empty())
        .and_then(|value| Utf8PathBuf::from_path_buf(value.into()).ok())
}
