//! Pipeline data model.
//!
//! A [`Pipeline`] is built fresh for every invocation and never mutated
//! afterwards. Its steps always appear as an optional fetch, one source, any
//! number of filters in the order given, and at most one target.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::PipelineError;

/// Position of a stage within a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Streams raw bytes for the source to decode.
    Fetch,
    /// Produces records.
    Source,
    /// Transforms records.
    Filter,
    /// Encodes records.
    Target,
}

impl StageKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Source => "source",
            Self::Filter => "filter",
            Self::Target => "target",
        }
    }

    /// Value passed to the plugin's `--mode` flag.
    #[must_use]
    pub const fn mode(self) -> &'static str {
        match self {
            Self::Fetch => "raw",
            Self::Source => "read",
            Self::Filter => "filter",
            Self::Target => "write",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar configuration value passed to a plugin.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// `true` or `false`.
    Bool(bool),
    /// Signed integer.
    Integer(i64),
    /// Finite floating point number.
    Float(f64),
    /// Anything else.
    Text(String),
}

impl ConfigValue {
    /// Infers the most specific type for a raw parameter value.
    ///
    /// ```
    /// use conduit_pipeline::ConfigValue;
    ///
    /// assert_eq!(ConfigValue::infer("TRUE"), ConfigValue::Bool(true));
    /// assert_eq!(ConfigValue::infer("42"), ConfigValue::Integer(42));
    /// assert_eq!(ConfigValue::infer("0.5"), ConfigValue::Float(0.5));
    /// assert_eq!(ConfigValue::infer("x"), ConfigValue::Text("x".into()));
    /// ```
    #[must_use]
    pub fn infer(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            return Self::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return Self::Bool(false);
        }
        if let Ok(integer) = raw.parse::<i64>() {
            return Self::Integer(integer);
        }
        match raw.parse::<f64>() {
            Ok(float) if float.is_finite() => Self::Float(float),
            _ => Self::Text(raw.to_owned()),
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

/// How a stage's outer end connects to the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "binding", content = "path")]
pub enum StepIo {
    /// Wired to the neighbouring stage, or to the caller at the ends.
    Inherit,
    /// The source reads this file on stdin.
    ReadFile(PathBuf),
    /// The source reads the caller's standard input.
    ReadStdin,
    /// The target writes this file from stdout.
    WriteFile(PathBuf),
}

/// One stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStep {
    kind: StageKind,
    plugin: String,
    config: BTreeMap<String, ConfigValue>,
    args: Vec<String>,
    io: StepIo,
}

impl PipelineStep {
    /// Creates a step with no configuration, no arguments, and inherited I/O.
    #[must_use]
    pub fn new(kind: StageKind, plugin: impl Into<String>) -> Self {
        Self {
            kind,
            plugin: plugin.into(),
            config: BTreeMap::new(),
            args: Vec::new(),
            io: StepIo::Inherit,
        }
    }

    /// Adds a configuration entry, replacing any previous value for `key`.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Merges configuration entries; later entries win.
    #[must_use]
    pub fn with_params(mut self, params: BTreeMap<String, ConfigValue>) -> Self {
        self.config.extend(params);
        self
    }

    /// Sets the I/O binding.
    #[must_use]
    pub fn with_io(mut self, io: StepIo) -> Self {
        self.io = io;
        self
    }

    /// Appends a positional argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub(crate) fn push_arg(&mut self, arg: impl Into<String>) {
        self.args.push(arg.into());
    }

    /// Stage position.
    #[must_use]
    pub const fn kind(&self) -> StageKind {
        self.kind
    }

    /// Resolved plugin name.
    #[must_use]
    pub const fn plugin(&self) -> &str {
        self.plugin.as_str()
    }

    /// Configuration passed as `--key value` pairs.
    #[must_use]
    pub const fn config(&self) -> &BTreeMap<String, ConfigValue> {
        &self.config
    }

    /// Extra positional arguments.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// I/O binding.
    #[must_use]
    pub const fn io(&self) -> &StepIo {
        &self.io
    }

    /// File read by a source step, if any.
    #[must_use]
    pub fn input_file(&self) -> Option<&Path> {
        match &self.io {
            StepIo::ReadFile(path) => Some(path),
            _ => None,
        }
    }

    /// File written by a target step, if any.
    #[must_use]
    pub fn output_file(&self) -> Option<&Path> {
        match &self.io {
            StepIo::WriteFile(path) => Some(path),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        let mut parts = vec![format!("{} {}", self.kind, self.plugin)];
        match &self.io {
            StepIo::ReadFile(path) => parts.push(format!("< {}", path.display())),
            StepIo::ReadStdin => parts.push(String::from("< stdin")),
            StepIo::WriteFile(path) => parts.push(format!("> {}", path.display())),
            StepIo::Inherit => {}
        }
        parts.extend(
            self.config
                .iter()
                .map(|(key, value)| format!("{key}={value:?}", value = value.to_string())),
        );
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// Ordered, validated list of steps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
}

impl Pipeline {
    /// Assembles a pipeline from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidPipeline`] when a step's kind does not
    /// match its position.
    pub fn new(
        source: PipelineStep,
        filters: Vec<PipelineStep>,
        target: Option<PipelineStep>,
    ) -> Result<Self, PipelineError> {
        let misplaced = |step: &PipelineStep, expected: StageKind| PipelineError::InvalidPipeline {
            message: format!(
                "step '{}' is a {} stage but sits in the {expected} position",
                step.plugin, step.kind
            ),
        };
        if source.kind != StageKind::Source {
            return Err(misplaced(&source, StageKind::Source));
        }
        if let Some(step) = filters.iter().find(|step| step.kind != StageKind::Filter) {
            return Err(misplaced(step, StageKind::Filter));
        }
        if let Some(step) = target.as_ref().filter(|step| step.kind != StageKind::Target) {
            return Err(misplaced(step, StageKind::Target));
        }

        let mut steps = Vec::with_capacity(filters.len() + 3);
        steps.push(source);
        steps.extend(filters);
        steps.extend(target);
        Ok(Self { steps })
    }

    /// Places `fetch` in front of the source so that the source decodes the
    /// bytes it streams.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidPipeline`] when `fetch` is not a fetch
    /// stage, the pipeline already has one, or the source reads a file or
    /// standard input of its own.
    pub fn with_fetch(mut self, fetch: PipelineStep) -> Result<Self, PipelineError> {
        if fetch.kind != StageKind::Fetch {
            return Err(PipelineError::InvalidPipeline {
                message: format!(
                    "step '{}' is a {} stage but sits in the {} position",
                    fetch.plugin,
                    fetch.kind,
                    StageKind::Fetch
                ),
            });
        }
        let occupied = self.steps.first().is_some_and(|first| {
            first.kind == StageKind::Fetch || first.io != StepIo::Inherit
        });
        if occupied {
            return Err(PipelineError::InvalidPipeline {
                message: format!("step '{}' has no source left to feed", fetch.plugin),
            });
        }
        self.steps.insert(0, fetch);
        Ok(self)
    }

    /// All steps in execution order.
    #[must_use]
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// The source step.
    #[must_use]
    pub fn source(&self) -> Option<&PipelineStep> {
        self.steps
            .iter()
            .find(|step| step.kind == StageKind::Source)
    }

    /// The fetch step feeding the source, if any.
    #[must_use]
    pub fn fetch(&self) -> Option<&PipelineStep> {
        self.steps
            .first()
            .filter(|step| step.kind == StageKind::Fetch)
    }

    /// Filter steps in order.
    pub fn filters(&self) -> impl Iterator<Item = &PipelineStep> {
        self.steps
            .iter()
            .filter(|step| step.kind == StageKind::Filter)
    }

    /// The target step, if any.
    #[must_use]
    pub fn target(&self) -> Option<&PipelineStep> {
        self.steps
            .last()
            .filter(|step| step.kind == StageKind::Target)
    }

    /// Renders a one-line human description.
    #[must_use]
    pub fn describe(&self) -> String {
        let mut rendered = self
            .steps
            .iter()
            .map(PipelineStep::describe)
            .collect::<Vec<_>>()
            .join(" | ");
        if self.target().is_none() {
            rendered.push_str(" | stdout");
        }
        rendered
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests;
