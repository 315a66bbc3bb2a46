//! Classification of registry patterns and lookup references.

use std::fmt;

use serde::Serialize;

/// Prefix marking a pattern that only matches when resolving writers.
pub(crate) const WRITER_PREFIX: &str = "write";

/// Optional prefix marking a command pattern explicitly.
pub(crate) const COMMAND_PREFIX: &str = "cmd:";

/// How a lookup reference was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// `scheme://…`
    Url,
    /// A path or name ending in `.ext`.
    Extension,
    /// A bare command token.
    Command,
}

impl ReferenceKind {
    /// Interprets `reference`.
    ///
    /// ```
    /// use conduit_plugins::ReferenceKind;
    ///
    /// assert_eq!(ReferenceKind::of("s3://bucket/key"), ReferenceKind::Url);
    /// assert_eq!(ReferenceKind::of("data/People.CSV"), ReferenceKind::Extension);
    /// assert_eq!(ReferenceKind::of("ls"), ReferenceKind::Command);
    /// ```
    #[must_use]
    pub fn of(reference: &str) -> Self {
        if url_scheme(reference).is_some() {
            Self::Url
        } else if extension_of(reference).is_some() {
            Self::Extension
        } else {
            Self::Command
        }
    }

    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Extension => "extension",
            Self::Command => "command",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of a registry pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PatternKind {
    /// Literal, case-insensitive URL prefix.
    Url(String),
    /// Lower-cased extension including the leading dot.
    Extension(String),
    /// Lower-cased extension consulted only for writers.
    Writer(String),
    /// Exact command name.
    Command(String),
}

impl PatternKind {
    pub(crate) fn parse(pattern: &str) -> Self {
        if pattern.contains("://") {
            return Self::Url(pattern.to_ascii_lowercase());
        }
        if let Some(extension) = pattern.strip_prefix(WRITER_PREFIX) {
            if extension.starts_with('.') {
                return Self::Writer(extension.to_ascii_lowercase());
            }
        }
        if let Some(command) = pattern.strip_prefix(COMMAND_PREFIX) {
            return Self::Command(command.to_owned());
        }
        if pattern.starts_with('.') {
            return Self::Extension(pattern.to_ascii_lowercase());
        }
        Self::Command(pattern.to_owned())
    }

    /// Whether this pattern matches `reference` of the given kind.
    pub(crate) fn matches(&self, kind: ReferenceKind, reference: &str) -> bool {
        match (self, kind) {
            (Self::Url(prefix), ReferenceKind::Url) => reference
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
            (Self::Extension(extension), ReferenceKind::Extension) => {
                extension_of(reference).is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            }
            (Self::Command(command), ReferenceKind::Command) => command == reference,
            _ => false,
        }
    }

    /// Whether this writer pattern matches the extension of `path`.
    pub(crate) fn matches_writer(&self, path: &str) -> bool {
        match self {
            Self::Writer(extension) => {
                extension_of(path).is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            }
            _ => false,
        }
    }
}

/// Returns the scheme of `reference` when it has the form `scheme://…`.
pub(crate) fn url_scheme(reference: &str) -> Option<&str> {
    let (scheme, _) = reference.split_once("://")?;
    is_valid_scheme(scheme).then_some(scheme)
}

pub(crate) fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

/// Returns the trailing `.ext` of the last path segment, dot included.
///
/// A bare `.csv` counts as an extension so callers can resolve formats
/// directly.
pub(crate) fn extension_of(reference: &str) -> Option<&str> {
    let segment = reference.rsplit(['/', '\\']).next().unwrap_or(reference);
    let dot = segment.rfind('.')?;
    let extension = segment.get(dot..)?;
    (extension.len() > 1).then_some(extension)
}
