//! Directory scanning with a durable extraction memo.
//!
//! The memo records `{path, modified, metadata}` for every file the cache has
//! examined, including files that turned out not to be plugins. A file is
//! only handed to the extractor again when its modification time differs from
//! the memo. The memo is shared between directories: a scan only prunes
//! entries that live under the directory being scanned.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::PluginError;
use crate::metadata::{MetadataExtractor, PluginMetadata, ScriptExtractor};
use crate::persist::write_json_atomically;

const CACHE_TARGET: &str = "conduit_plugins::cache";

const MEMO_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Memo {
    version: u32,
    entries: Vec<MemoEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoEntry {
    path: PathBuf,
    modified: SystemTime,
    metadata: Option<PluginMetadata>,
}

/// Plugin directory scanner backed by a JSON memo file.
#[derive(Debug, Clone)]
pub struct PluginCache<E = ScriptExtractor> {
    extractor: E,
    memo_path: PathBuf,
}

impl PluginCache<ScriptExtractor> {
    /// Creates a cache using the script extractor.
    #[must_use]
    pub fn new(memo_path: impl Into<PathBuf>) -> Self {
        Self::with_extractor(memo_path, ScriptExtractor::new())
    }
}

impl<E: MetadataExtractor> PluginCache<E> {
    /// Creates a cache using a custom extractor.
    #[must_use]
    pub fn with_extractor(memo_path: impl Into<PathBuf>, extractor: E) -> Self {
        Self {
            extractor,
            memo_path: memo_path.into(),
        }
    }

    /// Location of the memo file.
    #[must_use]
    pub fn memo_path(&self) -> &Path {
        &self.memo_path
    }

    /// Lists the plugins found under `directory`, keyed by name.
    ///
    /// A missing directory yields an empty map. When two files share a name,
    /// the one with the lexically greater path wins and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] when `directory` exists but cannot be read.
    pub fn list(&self, directory: &Path) -> Result<BTreeMap<String, PluginMetadata>, PluginError> {
        let candidates = match collect_files(directory) {
            Ok(candidates) => candidates,
            Err(error) if error.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(error) => return Err(PluginError::io(directory, error)),
        };

        let (mut known, cold) = self.load_memo();
        let mut changed = cold;
        let mut extracted = 0_usize;
        let mut fresh = Vec::with_capacity(candidates.len());

        for (path, modified) in candidates {
            let reusable = known
                .remove(&path)
                .filter(|entry| entry.modified == modified);
            let entry = if let Some(entry) = reusable {
                entry
            } else {
                extracted += 1;
                changed = true;
                let metadata = self
                    .extractor
                    .extract(&path)
                    .map(|metadata| metadata.with_modified(Some(modified)));
                MemoEntry {
                    path,
                    modified,
                    metadata,
                }
            };
            fresh.push(entry);
        }

        let before = known.len();
        known.retain(|path, _| !path.starts_with(directory));
        let removed = before - known.len();
        changed |= removed > 0;

        let plugins = index_by_name(&fresh);

        debug!(
            target: CACHE_TARGET,
            directory = %directory.display(),
            scanned = fresh.len(),
            extracted,
            removed,
            plugins = plugins.len(),
            "plugin scan complete"
        );

        if changed {
            let mut entries: Vec<MemoEntry> = known.into_values().chain(fresh).collect();
            entries.sort_by(|left, right| left.path.cmp(&right.path));
            self.store_memo(&Memo {
                version: MEMO_VERSION,
                entries,
            });
        }

        Ok(plugins)
    }

    /// Returns the memo entries keyed by path and whether the memo was cold.
    fn load_memo(&self) -> (HashMap<PathBuf, MemoEntry>, bool) {
        let contents = match fs::read(&self.memo_path) {
            Ok(contents) => contents,
            Err(error) => {
                if error.kind() != io::ErrorKind::NotFound {
                    warn!(
                        target: CACHE_TARGET,
                        memo = %self.memo_path.display(),
                        %error,
                        "plugin memo unreadable, rescanning"
                    );
                }
                return (HashMap::new(), true);
            }
        };

        match serde_json::from_slice::<Memo>(&contents) {
            Ok(memo) if memo.version == MEMO_VERSION => (
                memo.entries
                    .into_iter()
                    .map(|entry| (entry.path.clone(), entry))
                    .collect(),
                false,
            ),
            Ok(memo) => {
                debug!(
                    target: CACHE_TARGET,
                    found = memo.version,
                    expected = MEMO_VERSION,
                    "plugin memo version mismatch, rescanning"
                );
                (HashMap::new(), true)
            }
            Err(error) => {
                warn!(
                    target: CACHE_TARGET,
                    memo = %self.memo_path.display(),
                    %error,
                    "plugin memo corrupt, rescanning"
                );
                (HashMap::new(), true)
            }
        }
    }

    fn store_memo(&self, memo: &Memo) {
        if let Err(error) = write_json_atomically(&self.memo_path, memo) {
            warn!(
                target: CACHE_TARGET,
                memo = %self.memo_path.display(),
                %error,
                "failed to write plugin memo"
            );
        }
    }
}

fn index_by_name(entries: &[MemoEntry]) -> BTreeMap<String, PluginMetadata> {
    let mut plugins = BTreeMap::new();
    for metadata in entries.iter().filter_map(|entry| entry.metadata.as_ref()) {
        if let Some(previous) = plugins.insert(metadata.name().to_owned(), metadata.clone()) {
            warn!(
                target: CACHE_TARGET,
                plugin = metadata.name(),
                kept = %metadata.path().display(),
                shadowed = %previous.path().display(),
                "duplicate plugin name in directory"
            );
        }
    }
    plugins
}

/// Collects regular files below `root`, skipping hidden entries and
/// `__pycache__`, sorted by path.
fn collect_files(root: &Path) -> io::Result<Vec<(PathBuf, SystemTime)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    let mut first = true;

    while let Some(directory) = pending.pop() {
        let entries = match fs::read_dir(&directory) {
            Ok(entries) => entries,
            Err(error) if first => return Err(error),
            Err(error) => {
                warn!(
                    target: CACHE_TARGET,
                    directory = %directory.display(),
                    %error,
                    "skipping unreadable plugin directory"
                );
                continue;
            }
        };
        first = false;

        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if name.starts_with('.') || name == "__pycache__" {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let path = entry.path();
            if metadata.is_dir() {
                pending.push(path);
            } else if metadata.is_file() {
                let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                files.push((path, modified));
            }
        }
    }

    files.sort_by(|left, right| left.0.cmp(&right.0));
    Ok(files)
}
