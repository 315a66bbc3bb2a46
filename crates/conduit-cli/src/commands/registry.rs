//! `registry` subcommands.

use std::io::Write;

use conduit_pipeline::error::EXIT_FAILURE;
use conduit_plugins::EntrySource;
use tracing::info;

use super::EXIT_SUCCESS;
use crate::IoStreams;
use crate::cli::RegistryAction;
use crate::context::Context;
use crate::errors::AppError;

const REGISTRY_TARGET: &str = "conduit_cli::registry";

pub(super) fn handle<W: Write, E: Write>(
    context: &mut Context,
    action: &RegistryAction,
    io: &mut IoStreams<'_, W, E>,
) -> Result<i32, AppError> {
    match action {
        RegistryAction::List { source } => {
            for entry in context.registry().list(*source) {
                writeln!(
                    io.stdout,
                    "{}\t{}\t{}\t{}",
                    entry.pattern(),
                    entry.plugin(),
                    entry.priority(),
                    entry.source()
                )?;
            }
            Ok(EXIT_SUCCESS)
        }
        RegistryAction::Add {
            pattern,
            plugin,
            priority,
        } => {
            context
                .registry_mut()
                .add_entry(pattern, plugin, *priority, EntrySource::User)?;
            info!(
                target: REGISTRY_TARGET,
                pattern = %pattern,
                plugin = %plugin,
                priority = *priority,
                "registry entry added"
            );
            Ok(EXIT_SUCCESS)
        }
        RegistryAction::Remove { pattern, source } => {
            if context.registry_mut().remove_entry(pattern, *source)? {
                info!(target: REGISTRY_TARGET, pattern = %pattern, %source, "registry entry removed");
                Ok(EXIT_SUCCESS)
            } else {
                writeln!(io.stderr, "conduit: no {source} entry for '{pattern}'")?;
                Ok(EXIT_FAILURE)
            }
        }
        RegistryAction::Resolve { reference } => {
            let registry = context.registry();
            let plugin = registry
                .resolve(reference)
                .or_else(|| registry.resolve_writer(reference))
                .ok_or_else(|| AppError::Unresolved {
                    reference: reference.clone(),
                })?;
            writeln!(io.stdout, "{plugin}")?;
            Ok(EXIT_SUCCESS)
        }
        RegistryAction::Rebuild => {
            context.rebuild_registry()?;
            writeln!(
                io.stdout,
                "registry rebuilt with {} entries",
                context.registry().entries().len()
            )?;
            Ok(EXIT_SUCCESS)
        }
    }
}
