//! Pattern-to-plugin lookup table.
//!
//! The [`Registry`] maps references onto plugin names. Patterns come in four
//! shapes:
//!
//! - `scheme://prefix`, matched as a case-insensitive literal prefix of URL
//!   references;
//! - `.ext`, matched against the extension of path references;
//! - `write.ext`, consulted only by [`Registry::resolve_writer`];
//! - anything else (optionally prefixed with `cmd:`), matched exactly against
//!   bare command tokens.
//!
//! When several entries match, the highest priority wins, then the longest
//! pattern, then the most recently added entry.

mod pattern;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::PluginCatalog;
use crate::error::PluginError;
use crate::persist::write_json_atomically;

use self::pattern::{COMMAND_PREFIX, PatternKind, WRITER_PREFIX, is_valid_scheme};
pub use self::pattern::ReferenceKind;

const REGISTRY_TARGET: &str = "conduit_plugins::registry";

/// URL prefixes handled by protocol plugins out of the box.
const URL_DEFAULTS: &[(&str, &str)] = &[
    ("http://", "http_get"),
    ("https://", "http_get"),
    ("ftp://", "ftp_get"),
    ("ftps://", "ftp_get"),
    ("s3://", "s3_get"),
];

/// Who created a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Generated from the plugin catalog; replaced by `rebuild_defaults`.
    Default,
    /// Added explicitly; survives rebuilds.
    User,
}

impl EntrySource {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::User => "user",
        }
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntrySource {
    type Err = PluginError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "user" => Ok(Self::User),
            other => Err(PluginError::invalid_entry(format!(
                "unknown entry source '{other}'"
            ))),
        }
    }
}

/// One pattern-to-plugin mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pattern: String,
    plugin: String,
    #[serde(default)]
    priority: i32,
    source: EntrySource,
}

impl RegistryEntry {
    /// Creates an entry without validating it.
    #[must_use]
    pub fn new(
        pattern: impl Into<String>,
        plugin: impl Into<String>,
        priority: i32,
        source: EntrySource,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            plugin: plugin.into(),
            priority,
            source,
        }
    }

    /// Pattern text.
    #[must_use]
    pub const fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Target plugin name.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Priority; higher wins.
    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Creator of the entry.
    #[must_use]
    pub const fn source(&self) -> EntrySource {
        self.source
    }

    /// Rejects entries that could never match or would match ambiguously.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidEntry`] describing the problem.
    pub fn validate(&self) -> Result<(), PluginError> {
        let pattern = self.pattern.trim();
        if pattern.is_empty() {
            return Err(PluginError::invalid_entry("pattern must not be empty"));
        }
        if pattern != self.pattern {
            return Err(PluginError::invalid_entry(format!(
                "pattern '{}' has surrounding whitespace",
                self.pattern
            )));
        }
        if self.plugin.trim().is_empty() {
            return Err(PluginError::invalid_entry(format!(
                "pattern '{pattern}' must name a plugin"
            )));
        }
        if let Some((scheme, _)) = pattern.split_once("://") {
            if !is_valid_scheme(scheme) {
                return Err(PluginError::invalid_entry(format!(
                    "pattern '{pattern}' has an invalid URL scheme"
                )));
            }
        } else if pattern.ends_with(':') && is_valid_scheme(pattern.trim_end_matches(':')) {
            return Err(PluginError::invalid_entry(format!(
                "URL pattern '{pattern}' must include '://'"
            )));
        }
        if pattern == "write." {
            return Err(PluginError::invalid_entry(
                "writer pattern must name an extension, as in 'write.csv'",
            ));
        }
        if pattern == "." {
            return Err(PluginError::invalid_entry(
                "extension pattern must name an extension, as in '.csv'",
            ));
        }
        if pattern == COMMAND_PREFIX {
            return Err(PluginError::invalid_entry(
                "command pattern must name a command, as in 'cmd:ls'",
            ));
        }
        Ok(())
    }

    fn kind(&self) -> PatternKind {
        PatternKind::parse(&self.pattern)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    entries: Vec<RegistryEntry>,
}

/// Ordered, optionally file-backed set of registry entries.
///
/// # Example
///
/// ```
/// use conduit_plugins::{EntrySource, Registry};
///
/// let mut registry = Registry::new();
/// registry.add_entry(".csv", "csv_", 0, EntrySource::Default)?;
/// registry.add_entry(".csv", "fast_csv", 10, EntrySource::User)?;
/// assert_eq!(registry.resolve("people.CSV"), Some("fast_csv"));
/// # Ok::<(), conduit_plugins::PluginError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<RegistryEntry>,
    path: Option<PathBuf>,
}

impl Registry {
    /// Creates an empty, memory-only registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a memory-only registry holding the defaults for `catalog`.
    #[must_use]
    pub fn with_defaults(catalog: &PluginCatalog) -> Self {
        Self {
            entries: default_entries(catalog),
            path: None,
        }
    }

    /// Loads the registry stored at `path`, or generates defaults when the
    /// file does not exist yet. The result is backed by `path` either way.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn open(file: impl Into<PathBuf>, catalog: &PluginCatalog) -> Result<Self, PluginError> {
        let path = file.into();
        match Self::load(&path) {
            Ok(registry) => Ok(registry),
            Err(PluginError::Io { ref source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                debug!(
                    target: REGISTRY_TARGET,
                    path = %path.display(),
                    "no registry file, using defaults"
                );
                Ok(Self::with_defaults(catalog).backed_by(path))
            }
            Err(error) => Err(error),
        }
    }

    /// Loads the registry stored at `path` and binds it to that file.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the file cannot be read,
    /// [`PluginError::RegistryFormat`] when it is not a registry document,
    /// and [`PluginError::InvalidEntry`] when an entry fails validation.
    pub fn load(file: impl AsRef<Path>) -> Result<Self, PluginError> {
        let path = file.as_ref();
        let contents = fs::read(path).map_err(|error| PluginError::io(path, error))?;
        let document: RegistryDocument =
            serde_json::from_slice(&contents).map_err(|error| PluginError::RegistryFormat {
                path: path.to_path_buf(),
                source: Arc::new(error),
            })?;
        for entry in &document.entries {
            entry.validate()?;
        }
        debug!(
            target: REGISTRY_TARGET,
            path = %path.display(),
            entries = document.entries.len(),
            "registry loaded"
        );
        Ok(Self {
            entries: document.entries,
            path: Some(path.to_path_buf()),
        })
    }

    /// Binds the registry to a backing file; subsequent mutations rewrite it.
    #[must_use]
    pub fn backed_by(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Backing file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Writes the registry to its backing file. Memory-only registries are
    /// left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the file cannot be written.
    pub fn save(&self) -> Result<(), PluginError> {
        match self.path.as_deref() {
            Some(path) => self.save_to(path),
            None => Ok(()),
        }
    }

    /// Writes the registry to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<(), PluginError> {
        write_json_atomically(
            path,
            &RegistryDocument {
                entries: self.entries.clone(),
            },
        )
    }

    /// Adds an entry, replacing in place any entry with the same pattern and
    /// source.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidEntry`] for malformed entries and
    /// [`PluginError::Io`] when the backing file cannot be rewritten.
    pub fn add_entry(
        &mut self,
        pattern: impl Into<String>,
        plugin: impl Into<String>,
        priority: i32,
        source: EntrySource,
    ) -> Result<(), PluginError> {
        let entry = RegistryEntry::new(pattern, plugin, priority, source);
        entry.validate()?;
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|existing| existing.pattern == entry.pattern && existing.source == source)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
        self.save()
    }

    /// Removes the entry with exactly this pattern and source.
    ///
    /// Returns whether an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the backing file cannot be rewritten.
    pub fn remove_entry(&mut self, pattern: &str, source: EntrySource) -> Result<bool, PluginError> {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !(entry.pattern == pattern && entry.source == source));
        let removed = self.entries.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    /// Resolves a URL, path, or command reference to a plugin name.
    #[must_use]
    pub fn resolve(&self, reference: &str) -> Option<&str> {
        let kind = ReferenceKind::of(reference);
        let resolved = self.best(|pattern| pattern.matches(kind, reference));
        debug!(
            target: REGISTRY_TARGET,
            reference,
            %kind,
            plugin = resolved.unwrap_or("<none>"),
            "resolved reference"
        );
        resolved
    }

    /// Resolves the plugin that writes files shaped like `path`.
    #[must_use]
    pub fn resolve_writer(&self, path: &str) -> Option<&str> {
        self.best(|pattern| pattern.matches_writer(path))
    }

    /// Lists entries in insertion order, optionally filtered by source.
    #[must_use]
    pub fn list(&self, source: Option<EntrySource>) -> Vec<&RegistryEntry> {
        self.entries
            .iter()
            .filter(|entry| source.is_none_or(|wanted| entry.source == wanted))
            .collect()
    }

    /// All entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[RegistryEntry] {
        &self.entries
    }

    /// Regenerates default entries from `catalog`, keeping user entries.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when the backing file cannot be rewritten.
    pub fn rebuild_defaults(&mut self, catalog: &PluginCatalog) -> Result<(), PluginError> {
        let mut entries = default_entries(catalog);
        entries.extend(
            self.entries
                .drain(..)
                .filter(|entry| entry.source == EntrySource::User),
        );
        self.entries = entries;
        self.save()
    }

    fn best(&self, matches: impl Fn(&PatternKind) -> bool) -> Option<&str> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| matches(&entry.kind()))
            .max_by(|(left_index, left), (right_index, right)| {
                left.priority
                    .cmp(&right.priority)
                    .then(left.pattern.len().cmp(&right.pattern.len()))
                    .then(left_index.cmp(right_index))
            })
            .map(|(_, entry)| entry.plugin.as_str())
    }
}

/// Derives default entries from plugin declarations plus the URL defaults.
fn default_entries(catalog: &PluginCatalog) -> Vec<RegistryEntry> {
    let mut entries: Vec<RegistryEntry> = Vec::new();
    let mut push = |pattern: String, plugin: &str| {
        let entry = RegistryEntry::new(pattern, plugin, 0, EntrySource::Default);
        if entry.validate().is_ok() && !entries.iter().any(|e| e.pattern == entry.pattern) {
            entries.push(entry);
        }
    };

    for catalog_entry in catalog.iter() {
        let metadata = catalog_entry.metadata();
        for pattern in metadata.matches() {
            match PatternKind::parse(pattern) {
                PatternKind::Extension(_) => {
                    if metadata.reads() {
                        push(pattern.clone(), metadata.name());
                    }
                    if metadata.writes() {
                        push(format!("{WRITER_PREFIX}{pattern}"), metadata.name());
                    }
                }
                PatternKind::Writer(_) => {
                    if metadata.writes() {
                        push(pattern.clone(), metadata.name());
                    }
                }
                PatternKind::Url(_) | PatternKind::Command(_) => {
                    if metadata.reads() {
                        push(pattern.clone(), metadata.name());
                    }
                }
            }
        }
        if let Some(command) = metadata.command() {
            push(command.to_owned(), metadata.name());
        }
    }

    for (pattern, plugin) in URL_DEFAULTS {
        push((*pattern).to_owned(), plugin);
    }
    entries
}
