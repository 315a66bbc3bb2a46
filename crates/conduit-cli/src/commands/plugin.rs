//! `plugin list` and `plugin check`.

use std::io::Write;
use std::path::{Path, PathBuf};

use camino::Utf8Path;
use conduit_plugins::introspect::{DEFAULT_INTROSPECT_TIMEOUT, introspect};
use conduit_plugins::{PluginCatalog, PluginError, PluginRole};

use super::EXIT_SUCCESS;
use crate::cli::PluginAction;
use crate::context::Context;
use crate::errors::AppError;

pub(super) fn handle<W: Write>(
    context: &Context,
    action: &PluginAction,
    output: &mut W,
) -> Result<i32, AppError> {
    match action {
        PluginAction::List { json, role } => list(context.catalog(), *role, *json, output),
        PluginAction::Check { path } => check(context.catalog(), path, output),
    }
}

fn list<W: Write>(
    catalog: &PluginCatalog,
    role: Option<PluginRole>,
    json: bool,
    output: &mut W,
) -> Result<i32, AppError> {
    let entries = match role {
        Some(wanted) => catalog.find_by_role(wanted),
        None => catalog.iter().collect(),
    };
    for entry in entries {
        if json {
            serde_json::to_writer(&mut *output, entry)?;
            writeln!(output)?;
            continue;
        }
        let metadata = entry.metadata();
        writeln!(
            output,
            "{name}\t{role}\t{origin}\t{matches}",
            name = metadata.name(),
            role = metadata.role().map_or("-", PluginRole::as_str),
            origin = entry.origin(),
            matches = metadata.matches().join(","),
        )?;
    }
    Ok(EXIT_SUCCESS)
}

/// Introspects the plugin at `path` and checks that registering it would not
/// shadow a different plugin of the same name.
fn check<W: Write>(
    catalog: &PluginCatalog,
    path: &Utf8Path,
    output: &mut W,
) -> Result<i32, AppError> {
    let executable = runnable_path(path.as_std_path());
    let metadata = introspect(&executable, DEFAULT_INTROSPECT_TIMEOUT)?;
    if catalog
        .get(metadata.name())
        .is_some_and(|existing| !same_file(existing.path(), &executable))
    {
        return Err(PluginError::DuplicatePlugin {
            name: metadata.name().to_owned(),
        }
        .into());
    }
    writeln!(
        output,
        "{name}: {role}, matches [{matches}]{streaming}",
        name = metadata.name(),
        role = metadata.role().map_or("-", PluginRole::as_str),
        matches = metadata.matches().join(", "),
        streaming = if metadata.streaming() { ", streaming" } else { "" },
    )?;
    Ok(EXIT_SUCCESS)
}

/// Relative paths are anchored to the working directory so they are never
/// looked up on `PATH`.
fn runnable_path(path: &Path) -> PathBuf {
    if path.is_relative() && path.components().count() == 1 {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}

fn same_file(left: &Path, right: &Path) -> bool {
    match (left.canonicalize(), right.canonicalize()) {
        (Ok(left), Ok(right)) => left == right,
        _ => left == right,
    }
}
