//! Merged view of user and builtin plugins.
//!
//! User plugins shadow builtins of the same name completely: no field of the
//! builtin record survives. Builtins are only consulted when fallback is
//! enabled.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::cache::PluginCache;
use crate::error::PluginError;
use crate::metadata::{MetadataExtractor, PluginMetadata, PluginRole};

const CATALOG_TARGET: &str = "conduit_plugins::catalog";

/// Where a catalog entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginOrigin {
    /// Discovered in the user plugin directory.
    Custom,
    /// Discovered in the builtin plugin directory.
    Builtin,
    /// Added explicitly, typically after introspection.
    Registered,
}

impl PluginOrigin {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Custom => "custom",
            Self::Builtin => "builtin",
            Self::Registered => "registered",
        }
    }
}

impl fmt::Display for PluginOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A plugin together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    metadata: PluginMetadata,
    origin: PluginOrigin,
}

impl CatalogEntry {
    /// Plugin metadata.
    #[must_use]
    pub const fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    /// Provenance of the entry.
    #[must_use]
    pub const fn origin(&self) -> PluginOrigin {
        self.origin
    }
}

/// Name-indexed set of available plugins.
///
/// # Example
///
/// ```
/// use std::collections::BTreeMap;
/// use conduit_plugins::{PluginCatalog, PluginMetadata, PluginOrigin};
///
/// let custom = BTreeMap::from([(
///     String::from("csv_"),
///     PluginMetadata::new("csv_", "/home/me/plugins/csv_.py"),
/// )]);
/// let builtin = BTreeMap::from([
///     (String::from("csv_"), PluginMetadata::new("csv_", "/usr/share/csv_.py")),
///     (String::from("json_"), PluginMetadata::new("json_", "/usr/share/json_.py")),
/// ]);
///
/// let catalog = PluginCatalog::merge(custom, builtin);
/// assert_eq!(catalog.entry("csv_").map(|e| e.origin()), Some(PluginOrigin::Custom));
/// assert_eq!(catalog.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    entries: BTreeMap<String, CatalogEntry>,
}

impl PluginCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans the user directory and, when `fallback_enabled`, the builtin
    /// directory, then merges them.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when a directory exists but is unreadable.
    pub fn resolve<E: MetadataExtractor>(
        cache: &PluginCache<E>,
        custom_dir: &Path,
        builtin_dir: Option<&Path>,
        fallback_enabled: bool,
    ) -> Result<Self, PluginError> {
        let custom = cache.list(custom_dir)?;
        let builtin = match builtin_dir {
            Some(directory) if fallback_enabled => cache.list(directory)?,
            _ => BTreeMap::new(),
        };
        let catalog = Self::merge(custom, builtin);
        debug!(
            target: CATALOG_TARGET,
            custom_dir = %custom_dir.display(),
            fallback_enabled,
            plugins = catalog.len(),
            "plugin catalog resolved"
        );
        Ok(catalog)
    }

    /// Merges two plugin sets; `custom` wins on name collision.
    #[must_use]
    pub fn merge(
        custom: BTreeMap<String, PluginMetadata>,
        builtin: BTreeMap<String, PluginMetadata>,
    ) -> Self {
        let mut entries: BTreeMap<String, CatalogEntry> = builtin
            .into_iter()
            .map(|(name, metadata)| {
                (
                    name,
                    CatalogEntry {
                        metadata,
                        origin: PluginOrigin::Builtin,
                    },
                )
            })
            .collect();
        for (name, metadata) in custom {
            entries.insert(
                name,
                CatalogEntry {
                    metadata,
                    origin: PluginOrigin::Custom,
                },
            );
        }
        Self { entries }
    }

    /// Adds an explicitly registered plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::DuplicatePlugin`] when the name is taken and
    /// [`PluginError::InvalidEntry`] when the name is empty.
    pub fn register(&mut self, metadata: PluginMetadata) -> Result<(), PluginError> {
        let name = metadata.name().trim().to_owned();
        if name.is_empty() {
            return Err(PluginError::invalid_entry("plugin name must not be empty"));
        }
        if self.entries.contains_key(&name) {
            return Err(PluginError::DuplicatePlugin { name });
        }
        self.entries.insert(
            name,
            CatalogEntry {
                metadata,
                origin: PluginOrigin::Registered,
            },
        );
        Ok(())
    }

    /// Looks up a plugin by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PluginMetadata> {
        self.entries.get(name).map(CatalogEntry::metadata)
    }

    /// Looks up a plugin and its provenance by name.
    #[must_use]
    pub fn entry(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.get(name)
    }

    /// Iterates over entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.values()
    }

    /// Returns the entries whose plugin declares `role`, in name order.
    #[must_use]
    pub fn find_by_role(&self, role: PluginRole) -> Vec<&CatalogEntry> {
        self.iter()
            .filter(|entry| entry.metadata().role() == Some(role))
            .collect()
    }

    /// Returns the number of plugins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the catalog holds no plugins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests;
