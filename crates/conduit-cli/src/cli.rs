//! CLI argument definitions for the Conduit pipeline tool.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use conduit_config::{ConfigOverrides, LogFormat};
use conduit_plugins::{EntrySource, PluginRole};

/// Number of records `head` and `tail` keep when `-n` is omitted.
pub(crate) const DEFAULT_WINDOW: usize = 10;

/// Command-line interface for Conduit.
#[derive(Parser, Debug)]
#[command(
    name = "conduit",
    version,
    about = "Stream records between files, URLs, and commands through plugin pipelines",
    disable_help_subcommand = true
)]
pub(crate) struct Cli {
    /// Configuration overrides shared by every command.
    #[command(flatten)]
    pub(crate) global: GlobalArgs,
    /// The command to run.
    #[command(subcommand)]
    pub(crate) command: CliCommand,
}

/// Flags that feed the configuration layers.
#[derive(Args, Debug, Default, Clone)]
pub(crate) struct GlobalArgs {
    /// Reads configuration from this file instead of `<home>/conduit.toml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub(crate) config_path: Option<Utf8PathBuf>,
    /// Tracing filter directive, for example `conduit_pipeline=debug`.
    #[arg(long, global = true, value_name = "FILTER")]
    pub(crate) log_filter: Option<String>,
    /// Log output format (`json` or `compact`).
    #[arg(long, global = true, value_name = "FORMAT")]
    pub(crate) log_format: Option<LogFormat>,
    /// Directory scanned for user plugins.
    #[arg(long, global = true, value_name = "DIR")]
    pub(crate) plugin_dir: Option<Utf8PathBuf>,
    /// Directory holding the builtin plugins.
    #[arg(long, global = true, value_name = "DIR")]
    pub(crate) builtin_plugin_dir: Option<Utf8PathBuf>,
    /// Ignores builtin plugins entirely.
    #[arg(long, global = true)]
    pub(crate) no_builtin: bool,
}

impl GlobalArgs {
    /// Converts the flags into the top configuration layer.
    pub(crate) fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config_path.clone(),
            plugin_dir: self.plugin_dir.clone(),
            builtin_plugin_dir: self.builtin_plugin_dir.clone(),
            fallback_to_builtin: self.no_builtin.then_some(false),
            log_filter: self.log_filter.clone(),
            log_format: self.log_format,
            ..ConfigOverrides::default()
        }
    }
}

/// Top-level commands.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum CliCommand {
    /// Builds a pipeline from tokens and runs it.
    Run(RunArgs),
    /// Runs a pipeline and keeps only its first records.
    Head(WindowArgs),
    /// Runs a pipeline and keeps only its last records.
    Tail(WindowArgs),
    /// Concatenates several labelled sources into one record stream.
    Merge(MergeArgs),
    /// Prints the pipeline the tokens would build without running it.
    Explain(ExplainArgs),
    /// Inspects installed plugins.
    Plugin {
        /// The plugin action to perform.
        #[command(subcommand)]
        action: PluginAction,
    },
    /// Inspects or edits the reference registry.
    Registry {
        /// The registry action to perform.
        #[command(subcommand)]
        action: RegistryAction,
    },
}

/// Tokens and plugin overrides shared by pipeline commands.
#[derive(Args, Debug, Clone)]
pub(crate) struct PipelineArgs {
    /// Forces the source plugin.
    #[arg(long, value_name = "PLUGIN")]
    pub(crate) plugin: Option<String>,
    /// Forces the target plugin; without a destination token, output goes
    /// to stdout encoded by this plugin.
    #[arg(long, value_name = "PLUGIN")]
    pub(crate) to: Option<String>,
    /// Files, URLs, commands, filter expressions, and destinations.
    #[arg(
        value_name = "TOKEN",
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub(crate) tokens: Vec<String>,
}

/// Arguments for `conduit run`.
#[derive(Args, Debug, Clone)]
pub(crate) struct RunArgs {
    /// Keeps only the first N records.
    #[arg(long, value_name = "N", conflicts_with = "tail")]
    pub(crate) limit: Option<usize>,
    /// Keeps only the last N records.
    #[arg(long, value_name = "N")]
    pub(crate) tail: Option<usize>,
    /// Kills any stage still running after SECS seconds.
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,
    #[command(flatten)]
    pub(crate) pipeline: PipelineArgs,
}

/// Arguments for `conduit head` and `conduit tail`.
#[derive(Args, Debug, Clone)]
pub(crate) struct WindowArgs {
    /// Number of records to keep.
    #[arg(short = 'n', long = "lines", value_name = "N", default_value_t = DEFAULT_WINDOW)]
    pub(crate) count: usize,
    /// Kills any stage still running after SECS seconds.
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,
    #[command(flatten)]
    pub(crate) pipeline: PipelineArgs,
}

/// Arguments for `conduit merge`.
#[derive(Args, Debug, Clone)]
pub(crate) struct MergeArgs {
    /// Stops at the first failing source.
    #[arg(long, overrides_with = "no_fail_fast")]
    pub(crate) fail_fast: bool,
    /// Records failing sources inline and keeps going (the default).
    #[arg(long, overrides_with = "fail_fast")]
    pub(crate) no_fail_fast: bool,
    /// Kills any stage still running after SECS seconds.
    #[arg(long, value_name = "SECS")]
    pub(crate) timeout: Option<u64>,
    /// Sources of the form `ADDRESS[:label=LABEL]`.
    #[arg(value_name = "SOURCE", required = true, num_args = 1..)]
    pub(crate) sources: Vec<String>,
}

/// Arguments for `conduit explain`.
#[derive(Args, Debug, Clone)]
pub(crate) struct ExplainArgs {
    /// Prints the pipeline as JSON.
    #[arg(long)]
    pub(crate) json: bool,
    #[command(flatten)]
    pub(crate) pipeline: PipelineArgs,
}

/// Plugin actions.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum PluginAction {
    /// Lists discovered plugins.
    List {
        /// Prints one JSON object per plugin.
        #[arg(long)]
        json: bool,
        /// Only lists plugins declaring this role.
        #[arg(long, value_name = "ROLE")]
        role: Option<PluginRole>,
    },
    /// Validates a plugin executable through its `--introspect` report.
    Check {
        /// Path to the plugin executable.
        #[arg(value_name = "PATH")]
        path: Utf8PathBuf,
    },
}

/// Registry actions.
#[derive(Subcommand, Debug, Clone)]
pub(crate) enum RegistryAction {
    /// Lists registry entries.
    List {
        /// Only entries from this source (`default` or `user`).
        #[arg(long, value_name = "SOURCE")]
        source: Option<EntrySource>,
    },
    /// Maps a pattern to a plugin.
    Add {
        /// Extension (`.csv`), writer (`write.csv`), URL prefix, or command.
        #[arg(value_name = "PATTERN")]
        pattern: String,
        /// Plugin name.
        #[arg(value_name = "PLUGIN")]
        plugin: String,
        /// Higher priorities win.
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        priority: i32,
    },
    /// Removes a pattern.
    Remove {
        /// Pattern to remove.
        #[arg(value_name = "PATTERN")]
        pattern: String,
        /// Entry source to remove from.
        #[arg(long, value_name = "SOURCE", default_value = "user")]
        source: EntrySource,
    },
    /// Shows which plugin a reference resolves to.
    Resolve {
        /// File name, URL, or command.
        #[arg(value_name = "REFERENCE")]
        reference: String,
    },
    /// Regenerates default entries from the installed plugins.
    Rebuild,
}
