//! Plugin discovery, metadata, and reference resolution for Conduit.
//!
//! Plugins are standalone executables that read or write newline-delimited
//! JSON records. Each plugin describes itself in a comment block embedded in
//! its own source, so discovery never has to execute anything:
//!
//! - [`ScriptExtractor`] parses that block into [`PluginMetadata`].
//! - [`PluginCache`] scans a directory and memoises extraction results by
//!   path and modification time.
//! - [`PluginCatalog`] merges user plugins over the builtin set.
//! - [`Registry`] maps references (extensions, URL schemes, command names)
//!   onto plugin names with priority and specificity ordering.
//! - [`introspect`](introspect::introspect) validates a plugin's self-report
//!   before it is registered explicitly.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use conduit_plugins::{PluginCache, PluginCatalog, Registry};
//!
//! let cache = PluginCache::new(Path::new("/home/me/.conduit/cache/plugins.json"));
//! let catalog = PluginCatalog::resolve(
//!     &cache,
//!     Path::new("/home/me/.conduit/plugins"),
//!     None,
//!     false,
//! )?;
//! let registry = Registry::with_defaults(&catalog);
//! assert_eq!(registry.resolve("https://example.com/data.json"), Some("http_get"));
//! # Ok::<(), conduit_plugins::PluginError>(())
//! ```

pub mod cache;
pub mod catalog;
pub mod error;
pub mod introspect;
pub mod metadata;
pub mod process;
pub mod registry;

mod persist;

pub use self::cache::PluginCache;
pub use self::catalog::{CatalogEntry, PluginCatalog, PluginOrigin};
pub use self::error::PluginError;
pub use self::metadata::{MetadataExtractor, PluginMetadata, PluginRole, ScriptExtractor};
pub use self::registry::{EntrySource, ReferenceKind, Registry, RegistryEntry};
