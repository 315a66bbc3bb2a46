//! Atomic JSON persistence shared by the memo and the registry.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::PluginError;

/// Serialises `value` next to `path` and renames it into place, so readers
/// never observe a half-written document.
pub(crate) fn write_json_atomically<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), PluginError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|error| PluginError::io(parent, error))?;

    let staging = NamedTempFile::new_in(parent).map_err(|error| PluginError::io(parent, error))?;
    {
        let mut writer = BufWriter::new(staging.as_file());
        serde_json::to_writer_pretty(&mut writer, value)
            .map_err(|error| PluginError::io(path, error.into()))?;
        writer
            .write_all(b"\n")
            .and_then(|()| writer.flush())
            .map_err(|error| PluginError::io(path, error))?;
    }
    staging
        .persist(path)
        .map_err(|error| PluginError::io(path, error.error))?;
    Ok(())
}
