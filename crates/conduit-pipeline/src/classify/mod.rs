//! Token classification.
//!
//! Each token of a pipeline request is offered to an ordered list of named
//! predicates; the first predicate that accepts the token decides its class.
//! Every predicate is a plain function so it can be tested on its own.
//!
//! Tokens other than filter expressions may carry two decorations, which
//! [`Candidate::parse`] strips before classification:
//!
//! - a `~plugin` suffix forcing the plugin for that token;
//! - a `?key=value&…` query whose values become step configuration. URL
//!   tokens keep their query string because it belongs to the URL.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use conduit_plugins::{ReferenceKind, Registry};
use serde::Serialize;

use crate::model::ConfigValue;

/// Marker directing records to standard output, or reading standard input
/// when it comes before any source.
pub const STDOUT_MARKER: &str = "-";

const FILTER_VERBS: &[&str] = &[
    "select(",
    "map(",
    "group_by(",
    "sort_by(",
    "to_entries",
    "with_entries(",
];

/// A token split into its address, forced plugin, and parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'t> {
    raw: &'t str,
    base: String,
    plugin: Option<String>,
    params: BTreeMap<String, ConfigValue>,
}

impl<'t> Candidate<'t> {
    /// Splits `raw` into its parts.
    ///
    /// ```
    /// use conduit_pipeline::{Candidate, ConfigValue};
    ///
    /// let candidate = Candidate::parse("data.txt?delimiter=%7C&header=false~csv_");
    /// assert_eq!(candidate.base(), "data.txt");
    /// assert_eq!(candidate.plugin(), Some("csv_"));
    /// assert_eq!(candidate.params()["delimiter"], ConfigValue::Text("|".into()));
    /// assert_eq!(candidate.params()["header"], ConfigValue::Bool(false));
    /// ```
    #[must_use]
    pub fn parse(raw: &'t str) -> Self {
        let (address, plugin) = split_plugin_suffix(raw);
        if ReferenceKind::of(address) == ReferenceKind::Url {
            return Self {
                raw,
                base: address.to_owned(),
                plugin,
                params: BTreeMap::new(),
            };
        }
        let (base, params) = match address.split_once('?') {
            Some((base, query)) => (base, parse_query(query)),
            None => (address, BTreeMap::new()),
        };
        Self {
            raw,
            base: base.to_owned(),
            plugin,
            params,
        }
    }

    /// The token as typed.
    #[must_use]
    pub const fn raw(&self) -> &'t str {
        self.raw
    }

    /// The address with decorations removed.
    #[must_use]
    pub const fn base(&self) -> &str {
        self.base.as_str()
    }

    /// Plugin forced with a `~plugin` suffix.
    #[must_use]
    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// Typed query parameters.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, ConfigValue> {
        &self.params
    }

    pub(crate) fn into_params(self) -> BTreeMap<String, ConfigValue> {
        self.params
    }
}

fn split_plugin_suffix(raw: &str) -> (&str, Option<String>) {
    match raw.rsplit_once('~') {
        Some((address, plugin))
            if !address.is_empty()
                && !plugin.is_empty()
                && plugin
                    .chars()
                    .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-')) =>
        {
            (address, Some(plugin.to_owned()))
        }
        _ => (raw, None),
    }
}

fn parse_query(query: &str) -> BTreeMap<String, ConfigValue> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), ConfigValue::infer(&value)))
        .collect()
}

/// What the pipeline builder should do with a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenClass {
    /// A filter expression evaluated by the filter plugin.
    FilterExpression,
    /// The caller's standard input, decoded by a reader.
    Stdin,
    /// Where records are written.
    Destination,
    /// A URL read by a protocol plugin.
    Url,
    /// An existing file read by a format plugin.
    ExistingPath,
    /// A command the registry knows an adapter for.
    KnownCommand,
    /// Anything else; run through the generic adapter.
    Fallback,
}

impl TokenClass {
    /// Name of the classifier that produces this class.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::FilterExpression => "filter-expression",
            Self::Stdin => "stdin",
            Self::Destination => "destination",
            Self::Url => "url",
            Self::ExistingPath => "existing-path",
            Self::KnownCommand => "known-command",
            Self::Fallback => "fallback",
        }
    }

    /// Whether the class can start a pipeline.
    #[must_use]
    pub const fn is_source(self) -> bool {
        matches!(
            self,
            Self::Stdin | Self::Url | Self::ExistingPath | Self::KnownCommand | Self::Fallback
        )
    }
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State of the pipeline under construction, as seen by the classifiers.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext<'r> {
    /// Registry consulted for readers, writers, and commands.
    pub registry: &'r Registry,
    /// Whether a source has already been chosen.
    pub has_source: bool,
    /// Whether the token is the last one supplied.
    pub is_last: bool,
    /// Whether the caller forced a target plugin.
    pub target_forced: bool,
}

/// A named classification predicate.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    class: TokenClass,
    predicate: fn(&Candidate<'_>, &ClassifyContext<'_>) -> bool,
}

impl Classifier {
    /// Class produced when the predicate accepts a token.
    #[must_use]
    pub const fn class(&self) -> TokenClass {
        self.class
    }

    /// Evaluates the predicate.
    #[must_use]
    pub fn accepts(&self, candidate: &Candidate<'_>, context: &ClassifyContext<'_>) -> bool {
        (self.predicate)(candidate, context)
    }
}

/// Classifiers in the order they are consulted.
pub const CLASSIFIERS: &[Classifier] = &[
    Classifier {
        class: TokenClass::FilterExpression,
        predicate: is_filter_expression,
    },
    Classifier {
        class: TokenClass::Stdin,
        predicate: is_stdin,
    },
    Classifier {
        class: TokenClass::Destination,
        predicate: is_destination,
    },
    Classifier {
        class: TokenClass::Url,
        predicate: is_url,
    },
    Classifier {
        class: TokenClass::ExistingPath,
        predicate: is_existing_path,
    },
    Classifier {
        class: TokenClass::KnownCommand,
        predicate: is_known_command,
    },
    Classifier {
        class: TokenClass::Fallback,
        predicate: is_fallback,
    },
];

/// Returns the class chosen by the first accepting classifier.
#[must_use]
pub fn classify(candidate: &Candidate<'_>, context: &ClassifyContext<'_>) -> TokenClass {
    CLASSIFIERS
        .iter()
        .find(|classifier| classifier.accepts(candidate, context))
        .map_or(TokenClass::Fallback, Classifier::class)
}

/// Accepts jq-style expressions: a leading `.` that is not a relative path
/// or existing file, a known verb, or a pipe.
#[must_use]
pub fn is_filter_expression(candidate: &Candidate<'_>, _context: &ClassifyContext<'_>) -> bool {
    let raw = candidate.raw();
    if raw.starts_with('.')
        && !raw.starts_with("./")
        && !raw.starts_with("../")
        && !Path::new(raw).exists()
    {
        return true;
    }
    raw.contains('|') || FILTER_VERBS.iter().any(|verb| raw.contains(verb))
}

/// Accepts a `-` or `-.<ext>` marker offered before any source exists.
#[must_use]
pub fn is_stdin(candidate: &Candidate<'_>, context: &ClassifyContext<'_>) -> bool {
    !context.has_source && is_stdout_marker(candidate.base())
}

/// Accepts the stdout markers and writable paths with a registered writer.
#[must_use]
pub fn is_destination(candidate: &Candidate<'_>, context: &ClassifyContext<'_>) -> bool {
    let base = candidate.base();
    if is_stdout_marker(base) {
        return true;
    }
    if ReferenceKind::of(base) != ReferenceKind::Extension {
        return false;
    }
    let has_writer = candidate.plugin().is_some()
        || context.target_forced
        || context.registry.resolve_writer(base).is_some();
    if !has_writer {
        return false;
    }
    let path = Path::new(base);
    if path.exists() {
        return path.is_file() && context.has_source && context.is_last;
    }
    path.parent()
        .is_none_or(|parent| parent.as_os_str().is_empty() || parent.is_dir())
}

/// Accepts `scheme://…` references.
#[must_use]
pub fn is_url(candidate: &Candidate<'_>, _context: &ClassifyContext<'_>) -> bool {
    ReferenceKind::of(candidate.base()) == ReferenceKind::Url
}

/// Accepts existing regular files.
#[must_use]
pub fn is_existing_path(candidate: &Candidate<'_>, _context: &ClassifyContext<'_>) -> bool {
    Path::new(candidate.base()).is_file()
}

/// Accepts bare tokens the registry maps to a command adapter.
#[must_use]
pub fn is_known_command(candidate: &Candidate<'_>, context: &ClassifyContext<'_>) -> bool {
    let base = candidate.base();
    ReferenceKind::of(base) == ReferenceKind::Command && context.registry.resolve(base).is_some()
}

/// Accepts everything.
#[must_use]
pub const fn is_fallback(_candidate: &Candidate<'_>, _context: &ClassifyContext<'_>) -> bool {
    true
}

/// Whether `base` is `-` or `-.<ext>`.
#[must_use]
pub fn is_stdout_marker(base: &str) -> bool {
    base == STDOUT_MARKER
        || base
            .strip_prefix("-.")
            .is_some_and(|extension| !extension.is_empty())
}

#[cfg(test)]
mod tests;
