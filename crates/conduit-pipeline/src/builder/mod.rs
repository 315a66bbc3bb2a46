//! Turns command tokens into a normalised [`Pipeline`].
//!
//! Tokens are classified one at a time (see [`crate::classify`]) with the
//! state accumulated so far. Whatever order the tokens arrive in, the result
//! is ordered `[source, filter*, target?]`: the first source-like token
//! becomes the source, filter expressions keep their relative order, and the
//! first destination becomes the target. Tokens that fit nowhere else are
//! appended to the source's arguments.
//!
//! A URL whose path ends in an extension with a registered reader becomes two
//! stages: the protocol plugin fetches raw bytes and the reader decodes them.
//! A `-` marker offered before any source reads standard input through the
//! reader named by its `~plugin` suffix, its `-.<ext>` extension, or the
//! forced source plugin.

use std::ffi::OsStr;
use std::path::Path;

use conduit_plugins::{ReferenceKind, Registry};
use tracing::{debug, warn};
use url::Url;

use crate::classify::{
    Candidate, ClassifyContext, STDOUT_MARKER, TokenClass, classify, is_stdout_marker,
};
use crate::error::PipelineError;
use crate::model::{Pipeline, PipelineStep, StageKind, StepIo};

const BUILDER_TARGET: &str = "conduit_pipeline::builder";

/// Default plugin that evaluates filter expressions.
pub const DEFAULT_FILTER_PLUGIN: &str = "jq_filter";

/// Default adapter for commands the registry does not know.
pub const DEFAULT_FALLBACK_ADAPTER: &str = "generic_exec";

/// Plugin choices that apply to a whole build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    source_plugin: Option<String>,
    target_plugin: Option<String>,
    filter_plugin: String,
    fallback_adapter: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            source_plugin: None,
            target_plugin: None,
            filter_plugin: String::from(DEFAULT_FILTER_PLUGIN),
            fallback_adapter: String::from(DEFAULT_FALLBACK_ADAPTER),
        }
    }
}

impl BuildOptions {
    /// Forces the plugin used for the source.
    #[must_use]
    pub fn with_source_plugin(mut self, plugin: Option<String>) -> Self {
        self.source_plugin = plugin;
        self
    }

    /// Forces the plugin used for the target. Without a destination token
    /// the target writes to standard output.
    #[must_use]
    pub fn with_target_plugin(mut self, plugin: Option<String>) -> Self {
        self.target_plugin = plugin;
        self
    }

    /// Overrides the filter plugin.
    #[must_use]
    pub fn with_filter_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.filter_plugin = plugin.into();
        self
    }

    /// Overrides the fallback adapter.
    #[must_use]
    pub fn with_fallback_adapter(mut self, plugin: impl Into<String>) -> Self {
        self.fallback_adapter = plugin.into();
        self
    }

    /// Forced source plugin.
    #[must_use]
    pub fn source_plugin(&self) -> Option<&str> {
        self.source_plugin.as_deref()
    }

    /// Forced target plugin.
    #[must_use]
    pub fn target_plugin(&self) -> Option<&str> {
        self.target_plugin.as_deref()
    }

    /// Filter plugin name.
    #[must_use]
    pub const fn filter_plugin(&self) -> &str {
        self.filter_plugin.as_str()
    }

    /// Fallback adapter name.
    #[must_use]
    pub const fn fallback_adapter(&self) -> &str {
        self.fallback_adapter.as_str()
    }
}

/// Builds pipelines against a registry.
#[derive(Debug, Clone)]
pub struct PipelineBuilder<'r> {
    registry: &'r Registry,
    options: BuildOptions,
}

#[derive(Debug, Default)]
struct Draft {
    fetch: Option<PipelineStep>,
    source: Option<PipelineStep>,
    source_takes_args: bool,
    filters: Vec<PipelineStep>,
    target: Option<PipelineStep>,
    destination_claimed: bool,
    deferred: Vec<String>,
}

impl<'r> PipelineBuilder<'r> {
    /// Creates a builder.
    #[must_use]
    pub const fn new(registry: &'r Registry, options: BuildOptions) -> Self {
        Self { registry, options }
    }

    /// Options in effect.
    #[must_use]
    pub const fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Builds a pipeline from `tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyPipeline`] for no tokens,
    /// [`PipelineError::MissingSource`] when nothing can be read from, and
    /// [`PipelineError::Unresolved`] when a source or destination has no
    /// plugin.
    pub fn build<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Pipeline, PipelineError> {
        if tokens.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }

        let mut draft = Draft::default();
        let last = tokens.len() - 1;
        for (index, token) in tokens.iter().enumerate() {
            self.accept(&mut draft, token.as_ref(), index == last)?;
        }
        self.finish(draft)
    }

    fn accept(&self, draft: &mut Draft, raw: &str, is_last: bool) -> Result<(), PipelineError> {
        let candidate = Candidate::parse(raw);
        let context = ClassifyContext {
            registry: self.registry,
            has_source: draft.source.is_some(),
            is_last,
            target_forced: self.options.target_plugin.is_some(),
        };
        let class = classify(&candidate, &context);
        debug!(target: BUILDER_TARGET, token = raw, class = %class, "classified token");

        match class {
            TokenClass::FilterExpression => {
                draft.filters.push(
                    PipelineStep::new(StageKind::Filter, self.options.filter_plugin.as_str())
                        .with_config("query", raw),
                );
            }
            TokenClass::Destination if !draft.destination_claimed => {
                draft.destination_claimed = true;
                draft.target = self.target_step(candidate)?;
            }
            _ if draft.source.is_none() && class.is_source() => {
                draft.source_takes_args =
                    matches!(class, TokenClass::KnownCommand | TokenClass::Fallback);
                let SourceSteps { fetch, source } = self.source_steps(class, candidate)?;
                draft.fetch = fetch;
                draft.source = Some(source);
            }
            _ => {
                if !draft.source_takes_args {
                    warn!(
                        target: BUILDER_TARGET,
                        token = raw,
                        class = %class,
                        "token does not fit the pipeline, passing it to the source as an argument"
                    );
                }
                draft.deferred.push(raw.to_owned());
            }
        }
        Ok(())
    }

    fn finish(&self, draft: Draft) -> Result<Pipeline, PipelineError> {
        let Draft {
            fetch,
            source,
            filters,
            mut target,
            destination_claimed,
            deferred,
            ..
        } = draft;
        let Some(mut source) = source else {
            return Err(PipelineError::MissingSource);
        };
        for arg in deferred {
            source.push_arg(arg);
        }
        if !destination_claimed {
            target = self
                .options
                .target_plugin
                .as_deref()
                .map(|plugin| PipelineStep::new(StageKind::Target, plugin));
        }

        let assembled = Pipeline::new(source, filters, target)?;
        let pipeline = match fetch {
            Some(step) => assembled.with_fetch(step)?,
            None => assembled,
        };
        debug!(
            target: BUILDER_TARGET,
            pipeline = %pipeline,
            "built pipeline"
        );
        Ok(pipeline)
    }

    fn source_steps(
        &self,
        class: TokenClass,
        candidate: Candidate<'_>,
    ) -> Result<SourceSteps, PipelineError> {
        match class {
            TokenClass::Url => self.url_steps(candidate),
            TokenClass::Stdin => self.stdin_step(candidate).map(SourceSteps::single),
            _ => self.local_step(class, candidate).map(SourceSteps::single),
        }
    }

    fn local_step(
        &self,
        class: TokenClass,
        candidate: Candidate<'_>,
    ) -> Result<PipelineStep, PipelineError> {
        let base = candidate.base().to_owned();
        let forced = candidate
            .plugin()
            .or(self.options.source_plugin.as_deref())
            .map(str::to_owned);
        let plugin = forced.map_or_else(|| self.resolve_source(class, &base), Ok)?;

        let configured = PipelineStep::new(StageKind::Source, plugin);
        let step = if class == TokenClass::ExistingPath {
            configured.with_io(StepIo::ReadFile(base.into()))
        } else {
            configured.with_config("command", base.as_str())
        };
        Ok(step.with_params(candidate.into_params()))
    }

    /// Reads standard input through the forced reader, or through the reader
    /// registered for a `-.<ext>` marker.
    fn stdin_step(&self, candidate: Candidate<'_>) -> Result<PipelineStep, PipelineError> {
        let plugin = candidate
            .plugin()
            .or(self.options.source_plugin.as_deref())
            .or_else(|| {
                candidate
                    .base()
                    .strip_prefix(STDOUT_MARKER)
                    .filter(|extension| !extension.is_empty())
                    .and_then(|extension| self.registry.resolve(extension))
            })
            .map(str::to_owned)
            .ok_or_else(|| PipelineError::Unresolved {
                reference: candidate.raw().to_owned(),
                classification: TokenClass::Stdin.name().to_owned(),
            })?;
        Ok(PipelineStep::new(StageKind::Source, plugin)
            .with_io(StepIo::ReadStdin)
            .with_params(candidate.into_params()))
    }

    /// A forced source plugin reads the URL itself. Otherwise a reader
    /// chosen by `~plugin` or by the URL path's extension decodes what the
    /// protocol plugin fetches.
    fn url_steps(&self, candidate: Candidate<'_>) -> Result<SourceSteps, PipelineError> {
        let base = candidate.base().to_owned();
        if let Some(plugin) = self.options.source_plugin.as_deref() {
            return Ok(SourceSteps::single(
                PipelineStep::new(StageKind::Source, plugin).with_config("url", base.as_str()),
            ));
        }
        let protocol = self.resolve_source(TokenClass::Url, &base)?;
        let decoder = candidate
            .plugin()
            .map(str::to_owned)
            .or_else(|| {
                url_extension(&base)
                    .and_then(|extension| self.registry.resolve(&extension))
                    .map(str::to_owned)
            })
            .filter(|reader| *reader != protocol);

        let Some(reader) = decoder else {
            return Ok(SourceSteps::single(
                PipelineStep::new(StageKind::Source, protocol)
                    .with_config("url", base.as_str())
                    .with_params(candidate.into_params()),
            ));
        };
        debug!(
            target: BUILDER_TARGET,
            url = %base,
            protocol = %protocol,
            reader = %reader,
            "splitting URL source into fetch and decode stages"
        );
        Ok(SourceSteps {
            fetch: Some(
                PipelineStep::new(StageKind::Fetch, protocol).with_config("url", base.as_str()),
            ),
            source: PipelineStep::new(StageKind::Source, reader)
                .with_params(candidate.into_params()),
        })
    }

    fn resolve_source(&self, class: TokenClass, base: &str) -> Result<String, PipelineError> {
        match class {
            TokenClass::Fallback if ReferenceKind::of(base) == ReferenceKind::Extension => {
                Err(PipelineError::Unresolved {
                    reference: base.to_owned(),
                    classification: String::from("path"),
                })
            }
            TokenClass::Fallback => Ok(self.options.fallback_adapter.clone()),
            _ => self
                .registry
                .resolve(base)
                .map(str::to_owned)
                .ok_or_else(|| PipelineError::Unresolved {
                    reference: base.to_owned(),
                    classification: class.name().to_owned(),
                }),
        }
    }

    fn target_step(&self, candidate: Candidate<'_>) -> Result<Option<PipelineStep>, PipelineError> {
        let base = candidate.base().to_owned();
        let forced = candidate
            .plugin()
            .or(self.options.target_plugin.as_deref())
            .map(str::to_owned);
        if base == STDOUT_MARKER && forced.is_none() {
            return Ok(None);
        }
        let plugin = forced
            .or_else(|| self.registry.resolve_writer(&base).map(str::to_owned))
            .ok_or_else(|| PipelineError::Unresolved {
                reference: base.clone(),
                classification: TokenClass::Destination.name().to_owned(),
            })?;

        let configured = PipelineStep::new(StageKind::Target, plugin);
        let step = if is_stdout_marker(&base) {
            configured
        } else {
            configured.with_io(StepIo::WriteFile(base.into()))
        };
        Ok(Some(step.with_params(candidate.into_params())))
    }
}

/// Steps that produce the record stream.
#[derive(Debug)]
struct SourceSteps {
    fetch: Option<PipelineStep>,
    source: PipelineStep,
}

impl SourceSteps {
    const fn single(source: PipelineStep) -> Self {
        Self {
            fetch: None,
            source,
        }
    }
}

/// `.ext` of the URL's path, if it has one.
fn url_extension(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    Path::new(parsed.path())
        .extension()
        .and_then(OsStr::to_str)
        .filter(|extension| !extension.is_empty())
        .map(|extension| format!(".{extension}"))
}
