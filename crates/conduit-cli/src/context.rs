//! Per-invocation state shared by every command.

use std::time::Duration;

use camino::Utf8Path;
use conduit_config::Config;
use conduit_pipeline::{BuildOptions, Engine, ExecutionOptions, PipelineBuilder};
use conduit_plugins::{PluginCache, PluginCatalog, PluginError, Registry};
use tracing::debug;

const CONTEXT_TARGET: &str = "conduit_cli::context";

/// Configuration, plugin catalog, and registry for one invocation.
#[derive(Debug)]
pub(crate) struct Context {
    config: Config,
    catalog: PluginCatalog,
    registry: Registry,
}

impl Context {
    /// Discovers plugins and opens the registry described by `config`.
    pub(crate) fn load(config: Config) -> Result<Self, PluginError> {
        let cache = PluginCache::new(config.plugin_memo_path().into_std_path_buf());
        let catalog = PluginCatalog::resolve(
            &cache,
            config.plugin_dir().as_std_path(),
            config.builtin_plugin_dir().map(Utf8Path::as_std_path),
            config.fallback_to_builtin(),
        )?;
        let registry = Registry::open(config.registry_path().into_std_path_buf(), &catalog)?;
        debug!(
            target: CONTEXT_TARGET,
            home = %config.home(),
            plugins = catalog.len(),
            entries = registry.entries().len(),
            "context ready"
        );
        Ok(Self {
            config,
            catalog,
            registry,
        })
    }

    pub(crate) const fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    pub(crate) const fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) const fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Regenerates default registry entries from the current catalog.
    pub(crate) fn rebuild_registry(&mut self) -> Result<(), PluginError> {
        self.registry.rebuild_defaults(&self.catalog)
    }

    /// Builder honouring the configured filter plugin and fallback adapter.
    pub(crate) fn builder(
        &self,
        source: Option<String>,
        target: Option<String>,
    ) -> PipelineBuilder<'_> {
        let options = BuildOptions::default()
            .with_source_plugin(source)
            .with_target_plugin(target)
            .with_filter_plugin(self.config.filter_plugin())
            .with_fallback_adapter(self.config.fallback_adapter());
        PipelineBuilder::new(&self.registry, options)
    }

    /// Engine honouring the configured limits; `timeout_secs` overrides the
    /// configured stage timeout.
    pub(crate) fn engine(&self, timeout_secs: Option<u64>) -> Engine<'_> {
        let stage_timeout = timeout_secs
            .map(Duration::from_secs)
            .or_else(|| self.config.stage_timeout());
        let options = ExecutionOptions::default()
            .with_stage_timeout(stage_timeout)
            .with_shutdown_grace(self.config.shutdown_grace())
            .with_stderr_limit(self.config.stderr_limit_bytes());
        Engine::new(&self.catalog, options)
    }
}
