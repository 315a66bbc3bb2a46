//! Plugin metadata types and the extractor seam.
//!
//! A [`PluginMetadata`] record is produced by a [`MetadataExtractor`] from a
//! plugin's own file and is immutable afterwards: when the file changes the
//! whole record is replaced.

mod extract;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

pub use self::extract::{SCRIPT_PREFIX_LIMIT, ScriptExtractor};

/// What a plugin does within a pipeline.
///
/// # Example
///
/// ```
/// use conduit_plugins::PluginRole;
///
/// let role: PluginRole = "format".parse().expect("known role");
/// assert!(role.reads() && role.writes());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginRole {
    /// Produces records from an external resource.
    Source,
    /// Transforms a record stream.
    Filter,
    /// Encodes records into an output format.
    Target,
    /// Fetches records over a network protocol.
    Protocol,
    /// Decodes and encodes a file format.
    Format,
}

impl PluginRole {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Filter => "filter",
            Self::Target => "target",
            Self::Protocol => "protocol",
            Self::Format => "format",
        }
    }

    /// Whether the plugin can act as the first stage of a pipeline.
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Source | Self::Protocol | Self::Format)
    }

    /// Whether the plugin can act as the last stage of a pipeline.
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Target | Self::Format)
    }
}

impl fmt::Display for PluginRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown plugin role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for PluginRole {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "source" | "reader" => Ok(Self::Source),
            "filter" => Ok(Self::Filter),
            "target" | "writer" => Ok(Self::Target),
            "protocol" => Ok(Self::Protocol),
            "format" => Ok(Self::Format),
            other => Err(UnknownRole(other.to_owned())),
        }
    }
}

/// Descriptive record for one plugin file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMetadata {
    name: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    role: Option<PluginRole>,
    #[serde(default)]
    matches: Vec<String>,
    #[serde(default)]
    streaming: bool,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    requires_runtime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    command: Option<String>,
    path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified: Option<SystemTime>,
}

impl PluginMetadata {
    /// Creates metadata with no role, no patterns, and no category.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            category: String::new(),
            role: None,
            matches: Vec::new(),
            streaming: false,
            dependencies: Vec::new(),
            requires_runtime: None,
            command: None,
            path: path.into(),
            modified: None,
        }
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Sets the role.
    #[must_use]
    pub const fn with_role(mut self, role: Option<PluginRole>) -> Self {
        self.role = role;
        self
    }

    /// Sets the ordered match patterns.
    #[must_use]
    pub fn with_matches(mut self, matches: Vec<String>) -> Self {
        self.matches = matches;
        self
    }

    /// Marks the plugin as streaming (constant memory per record).
    #[must_use]
    pub const fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    /// Sets the declared dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Sets the minimum runtime version.
    #[must_use]
    pub fn with_requires_runtime(mut self, version: Option<String>) -> Self {
        self.requires_runtime = version;
        self
    }

    /// Binds the plugin to a shell command name.
    #[must_use]
    pub fn with_command(mut self, command: Option<String>) -> Self {
        self.command = command;
        self
    }

    /// Records the modification time observed when the file was read.
    #[must_use]
    pub const fn with_modified(mut self, modified: Option<SystemTime>) -> Self {
        self.modified = modified;
        self
    }

    /// Plugin name, derived from the file stem.
    #[must_use]
    pub const fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Name of the directory holding the plugin file.
    #[must_use]
    pub const fn category(&self) -> &str {
        self.category.as_str()
    }

    /// Declared role, if any.
    #[must_use]
    pub const fn role(&self) -> Option<PluginRole> {
        self.role
    }

    /// Ordered match patterns.
    #[must_use]
    pub fn matches(&self) -> &[String] {
        &self.matches
    }

    /// Whether the plugin processes records with bounded memory.
    #[must_use]
    pub const fn streaming(&self) -> bool {
        self.streaming
    }

    /// Declared dependencies.
    #[must_use]
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// Minimum runtime version, if declared.
    #[must_use]
    pub fn requires_runtime(&self) -> Option<&str> {
        self.requires_runtime.as_deref()
    }

    /// Bound shell command name, if any.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Plugin executable path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time recorded at extraction.
    #[must_use]
    pub const fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    /// Whether the plugin can start a pipeline. Plugins without a role are
    /// treated as readers.
    #[must_use]
    pub fn reads(&self) -> bool {
        self.role.is_none_or(PluginRole::reads)
    }

    /// Whether the plugin can end a pipeline.
    #[must_use]
    pub fn writes(&self) -> bool {
        self.role.is_some_and(PluginRole::writes)
    }
}

/// Turns a plugin file into metadata.
///
/// Implementations must never execute the file. `None` means the file is not
/// a plugin at all; a plugin without a declaration block still yields
/// metadata with no role and no patterns.
pub trait MetadataExtractor {
    /// Extracts metadata from the file at `path`.
    fn extract(&self, path: &Path) -> Option<PluginMetadata>;
}

#[cfg(test)]
mod tests;
