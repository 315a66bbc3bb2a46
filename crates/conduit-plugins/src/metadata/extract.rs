//! Declaration-block extraction for script plugins.
//!
//! Two declaration forms are recognised inside the first
//! [`SCRIPT_PREFIX_LIMIT`] bytes of a file:
//!
//! ```text
//! # /// script
//! # requires-python = ">=3.11"
//! # dependencies = ["openpyxl"]
//! # [tool.conduit]
//! # matches = [".xlsx"]
//! # role = "format"
//! # ///
//! ```
//!
//! and the single-line legacy form
//! `# META: type=source, handles=[".csv"], streaming=true`.

use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{MetadataExtractor, PluginMetadata, PluginRole};

/// Bytes of each file scanned for a declaration block.
pub const SCRIPT_PREFIX_LIMIT: usize = 64 * 1024;

const EXTRACT_TARGET: &str = "conduit_plugins::metadata";

const SCRIPT_EXTENSIONS: &[&str] = &["py", "sh", "bash", "js", "rb", "pl"];

#[expect(clippy::expect_used, reason = "the pattern is a compile-time literal")]
static BLOCK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^# /// (?P<kind>[A-Za-z0-9-]+)[ \t]*\n(?P<body>(?:^#(?: .*)?\n)*?)^# ///[ \t]*$")
        .expect("block pattern compiles")
});

#[expect(clippy::expect_used, reason = "the pattern is a compile-time literal")]
static LEGACY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^#\s*META:\s*(?P<body>.+?)\s*$").expect("legacy pattern compiles")
});

/// Production extractor that reads script headers without executing them.
///
/// # Example
///
/// ```rust,no_run
/// use std::path::Path;
/// use conduit_plugins::{MetadataExtractor, ScriptExtractor};
///
/// let metadata = ScriptExtractor::new().extract(Path::new("plugins/formats/csv_.py"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ScriptExtractor {
    prefix_limit: usize,
}

impl Default for ScriptExtractor {
    fn default() -> Self {
        Self {
            prefix_limit: SCRIPT_PREFIX_LIMIT,
        }
    }
}

impl ScriptExtractor {
    /// Creates an extractor scanning the default prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the number of bytes scanned per file.
    #[must_use]
    pub const fn with_prefix_limit(mut self, prefix_limit: usize) -> Self {
        self.prefix_limit = prefix_limit;
        self
    }
}

impl MetadataExtractor for ScriptExtractor {
    fn extract(&self, path: &Path) -> Option<PluginMetadata> {
        let file_name = path.file_name().and_then(OsStr::to_str)?;
        if file_name == "__init__.py" || file_name.starts_with("test_") {
            return None;
        }

        let prefix = match read_prefix(path, self.prefix_limit) {
            Ok(prefix) => prefix,
            Err(error) => {
                debug!(
                    target: EXTRACT_TARGET,
                    path = %path.display(),
                    %error,
                    "skipping unreadable file"
                );
                return None;
            }
        };
        let text = String::from_utf8_lossy(&prefix).replace("\r\n", "\n");
        if !is_script(path, &text) {
            return None;
        }

        let name = path.file_stem().and_then(OsStr::to_str)?.to_owned();
        let category = path
            .parent()
            .and_then(Path::file_name)
            .and_then(OsStr::to_str)
            .unwrap_or_default()
            .to_owned();
        let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok();

        let block = parse_script_block(path, &text);
        let declaration = match block.tool.conduit {
            Some(declaration) => declaration,
            None => parse_legacy_line(&text).unwrap_or_default(),
        };

        Some(
            PluginMetadata::new(name, path)
                .with_category(category)
                .with_role(declaration.role(path))
                .with_matches(declaration.matches)
                .with_streaming(declaration.streaming)
                .with_dependencies(block.dependencies)
                .with_requires_runtime(block.requires_runtime)
                .with_command(declaration.command.filter(|command| !command.is_empty()))
                .with_modified(modified),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
struct ScriptBlock {
    #[serde(default, rename = "requires-runtime", alias = "requires-python")]
    requires_runtime: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    tool: ToolTables,
}

#[derive(Debug, Default, Deserialize)]
struct ToolTables {
    conduit: Option<Declaration>,
}

#[derive(Debug, Default, Deserialize)]
struct Declaration {
    #[serde(default)]
    matches: Vec<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    streaming: bool,
    #[serde(default)]
    command: Option<String>,
}

impl Declaration {
    fn role(&self, path: &Path) -> Option<PluginRole> {
        let raw = self.role.as_deref()?;
        match raw.parse() {
            Ok(role) => Some(role),
            Err(error) => {
                debug!(
                    target: EXTRACT_TARGET,
                    path = %path.display(),
                    %error,
                    "ignoring unknown role"
                );
                None
            }
        }
    }
}

fn read_prefix(path: &Path, limit: usize) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut buffer = Vec::new();
    file.take(u64::try_from(limit).unwrap_or(u64::MAX))
        .read_to_end(&mut buffer)?;
    Ok(buffer)
}

fn is_script(path: &Path, text: &str) -> bool {
    if text.starts_with("#!") {
        return true;
    }
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext))
}

fn parse_script_block(path: &Path, text: &str) -> ScriptBlock {
    let Some(body) = BLOCK_PATTERN
        .captures_iter(text)
        .find(|captures| captures.name("kind").is_some_and(|kind| kind.as_str() == "script"))
        .and_then(|captures| captures.name("body"))
    else {
        return ScriptBlock::default();
    };

    let document = body
        .as_str()
        .lines()
        .map(|line| {
            line.strip_prefix("# ")
                .or_else(|| line.strip_prefix('#'))
                .unwrap_or(line)
        })
        .collect::<Vec<_>>()
        .join("\n");

    toml::from_str(&document).unwrap_or_else(|error| {
        debug!(
            target: EXTRACT_TARGET,
            path = %path.display(),
            %error,
            "treating malformed script block as absent"
        );
        ScriptBlock::default()
    })
}

fn parse_legacy_line(text: &str) -> Option<Declaration> {
    let body = LEGACY_PATTERN.captures(text)?.name("body")?.as_str();
    let mut declaration = Declaration::default();
    for pair in split_top_level(body) {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        match key.trim() {
            "type" | "role" => declaration.role = Some(unquote(value).to_owned()),
            "handles" | "matches" => declaration.matches = parse_list(value),
            "streaming" => declaration.streaming = unquote(value).eq_ignore_ascii_case("true"),
            "command" => declaration.command = Some(unquote(value).to_owned()),
            _ => {}
        }
    }
    Some(declaration)
}

/// Splits on commas that sit outside brackets and quotes.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (index, ch) in body.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                if let Some(part) = body.get(start..index) {
                    parts.push(part);
                }
                start = index + 1;
            }
            _ => {}
        }
    }
    if let Some(rest) = body.get(start..) {
        if !rest.trim().is_empty() {
            parts.push(rest);
        }
    }
    parts
}

fn parse_list(value: &str) -> Vec<String> {
    let trimmed = value.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    inner
        .split(',')
        .map(unquote)
        .filter(|item| !item.is_empty())
        .map(str::to_owned)
        .collect()
}

fn unquote(value: &str) -> &str {
    let trimmed = value.trim();
    ['"', '\'']
        .into_iter()
        .find_map(|quote| {
            trimmed
                .strip_prefix(quote)
                .and_then(|rest| rest.strip_suffix(quote))
        })
        .unwrap_or(trimmed)
}
