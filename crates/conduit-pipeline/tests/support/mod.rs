//! Shell-script plugins for exercising the engine against real processes.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use conduit_pipeline::{BuildOptions, PipelineBuilder};
use conduit_plugins::{PluginCatalog, PluginMetadata, PluginRole, Registry};
use tempfile::TempDir;

/// Reads CSV on stdin and prints one JSON object per row. Integer cells stay
/// numeric.
pub const CSV_READER: &str = r#"exec awk -F, '
NR == 1 { for (i = 1; i <= NF; i++) header[i] = $i; next }
{
    printf "{"
    for (i = 1; i <= NF; i++) {
        sep = (i > 1) ? "," : ""
        if ($i ~ /^-?[0-9]+$/) printf "%s\"%s\":%s", sep, header[i], $i
        else printf "%s\"%s\":\"%s\"", sep, header[i], $i
    }
    print "}"
}'
"#;

/// Understands `select(.field > N)` and nothing else.
pub const RANGE_FILTER: &str = r#"query=""
while [ $# -gt 0 ]; do
    case "$1" in
        --query) query="$2"; shift 2 ;;
        *) shift ;;
    esac
done
field=$(printf '%s' "$query" | sed -n 's/^select(\.\([a-z_]*\) > \([0-9]*\))$/\1/p')
limit=$(printf '%s' "$query" | sed -n 's/^select(\.\([a-z_]*\) > \([0-9]*\))$/\2/p')
exec awk -v field="$field" -v limit="$limit" '{
    pattern = "\"" field "\":[0-9]+"
    if (match($0, pattern)) {
        value = substr($0, RSTART + length(field) + 3, RLENGTH - length(field) - 3)
        if (value + 0 > limit + 0) print
    }
}'
"#;

/// Encodes JSON lines as a JSON array.
pub const JSON_ARRAY_WRITER: &str = r#"exec awk '
BEGIN { printf "[" }
NR > 1 { printf "," }
{ printf "%s", $0 }
END { print "]" }'
"#;

/// Passes records through unchanged.
/// Protocol plugin streaming the bytes behind a `file://` URL.
pub const FILE_FETCHER: &str = r#"url=""
while [ $# -gt 0 ]; do
    case "$1" in
        --url) url="$2"; shift 2 ;;
        *) shift ;;
    esac
done
exec cat "${url#file://}"
"#;

pub const PASSTHROUGH: &str = "exec cat\n";

/// Emits records forever.
pub const ENDLESS: &str = "exec yes '{\"n\":1}'\n";

/// Emits numbered records, `COUNT` of them.
pub fn counter(count: usize) -> String {
    format!("i=1\nwhile [ $i -le {count} ]; do echo \"{{\\\"n\\\":$i}}\"; i=$((i + 1)); done\n")
}

/// Complains on stderr and exits with status 3.
pub const FAILING: &str = "echo 'cannot reach upstream' >&2\nexit 3\n";

/// Never produces anything.
pub const SLEEPER: &str = "exec sleep 30\n";

/// Keeps running after its output pipe closes.
pub const STUBBORN: &str = r#"trap '' PIPE
exec 2>/dev/null
while :; do
    echo '{"n":1}' || sleep 1
done
"#;

/// Fills stderr with numbered lines before emitting one record.
pub const NOISY: &str = r#"i=0
while [ $i -lt 2000 ]; do echo "line $i" >&2; i=$((i + 1)); done
echo '{"ok":true}'
"#;

/// A plugin directory plus the catalog describing it.
pub struct PluginKit {
    dir: TempDir,
    catalog: PluginCatalog,
}

impl PluginKit {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("plugin dir"),
            catalog: PluginCatalog::new(),
        }
    }

    /// Kit with the CSV reader, range filter, and JSON array writer.
    pub fn standard() -> Self {
        let mut kit = Self::new();
        kit.install("csv_", Some(PluginRole::Format), &[".csv"], CSV_READER);
        kit.install("json_", Some(PluginRole::Target), &[".json"], JSON_ARRAY_WRITER);
        kit.install("range_filter", Some(PluginRole::Filter), &[], RANGE_FILTER);
        kit.install("pass_", Some(PluginRole::Filter), &[], PASSTHROUGH);
        kit
    }

    /// Writes an executable script and registers it.
    pub fn install(
        &mut self,
        name: &str,
        role: Option<PluginRole>,
        matches: &[&str],
        body: &str,
    ) -> PathBuf {
        let path = self.dir.path().join(format!("{name}.sh"));
        fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write plugin");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod plugin");
        let metadata = PluginMetadata::new(name, &path)
            .with_role(role)
            .with_matches(matches.iter().map(|pattern| (*pattern).to_owned()).collect());
        self.catalog.register(metadata).expect("register plugin");
        path
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    pub fn registry(&self) -> Registry {
        Registry::with_defaults(&self.catalog)
    }

    /// Writes a data file next to the plugins.
    pub fn data(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, contents).expect("write data");
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

pub fn builder(registry: &Registry) -> PipelineBuilder<'_> {
    PipelineBuilder::new(
        registry,
        BuildOptions::default().with_filter_plugin("range_filter"),
    )
}

pub fn token(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Whether a process with `pid` still exists.
pub fn process_exists(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

pub const PEOPLE: &str = "name,age\nann,41\nbob,25\ncid,33\n";
