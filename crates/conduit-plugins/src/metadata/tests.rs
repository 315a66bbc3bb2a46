//! Unit tests for plugin metadata and script extraction.

use std::fs;
use std::path::{Path, PathBuf};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

#[fixture]
fn plugin_dir() -> TempDir {
    let dir = TempDir::new().expect("temp dir");
    fs::create_dir_all(dir.path().join("formats")).expect("category dir");
    dir
}

fn write_plugin(dir: &TempDir, relative: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(relative);
    fs::write(&path, contents).expect("write plugin");
    path
}

const CSV_PLUGIN: &str = r#"#!/usr/bin/env python3
# /// script
# requires-python = ">=3.11"
# dependencies = ["chardet>=5"]
# [tool.conduit]
# matches = [".csv", ".tsv"]
# role = "format"
# streaming = true
# ///
import sys
"#;

// ---------------------------------------------------------------------------
// Script block extraction
// ---------------------------------------------------------------------------

#[rstest]
fn well_formed_block_is_extracted(plugin_dir: TempDir) {
    let path = write_plugin(&plugin_dir, "formats/csv_.py", CSV_PLUGIN);

    let metadata = ScriptExtractor::new().extract(&path).expect("plugin metadata");

    assert_eq!(metadata.name(), "csv_");
    assert_eq!(metadata.category(), "formats");
    assert_eq!(metadata.role(), Some(PluginRole::Format));
    assert_eq!(metadata.matches(), [".csv", ".tsv"]);
    assert!(metadata.streaming());
    assert_eq!(metadata.dependencies(), ["chardet>=5"]);
    assert_eq!(metadata.requires_runtime(), Some(">=3.11"));
    assert_eq!(metadata.path(), path.as_path());
    assert!(metadata.modified().is_some());
}

#[rstest]
fn missing_block_yields_bare_metadata(plugin_dir: TempDir) {
    let path = write_plugin(&plugin_dir, "formats/plain.sh", "#!/bin/sh\ncat\n");

    let metadata = ScriptExtractor::new().extract(&path).expect("plugin metadata");

    assert_eq!(metadata.name(), "plain");
    assert_eq!(metadata.role(), None);
    assert!(metadata.matches().is_empty());
    assert!(!metadata.streaming());
}

#[rstest]
fn malformed_block_is_treated_as_absent(plugin_dir: TempDir) {
    let contents = "#!/bin/sh\n# /// script\n# [tool.conduit\n# role = \"source\"\n# ///\n";
    let path = write_plugin(&plugin_dir, "formats/broken.sh", contents);

    let metadata = ScriptExtractor::new().extract(&path).expect("plugin metadata");

    assert_eq!(metadata.role(), None);
    assert!(metadata.matches().is_empty());
}

#[rstest]
fn crlf_line_endings_are_accepted(plugin_dir: TempDir) {
    let contents = CSV_PLUGIN.replace('\n', "\r\n");
    let path = write_plugin(&plugin_dir, "formats/csv_.py", &contents);

    let metadata = ScriptExtractor::new().extract(&path).expect("plugin metadata");

    assert_eq!(metadata.role(), Some(PluginRole::Format));
}

#[rstest]
fn block_beyond_prefix_limit_is_ignored(plugin_dir: TempDir) {
    let mut contents = String::from("#!/bin/sh\n");
    contents.push_str(&"# padding\n".repeat(100));
    contents.push_str("# /// script\n# [tool.conduit]\n# role = \"source\"\n# ///\n");
    let path = write_plugin(&plugin_dir, "formats/late.sh", &contents);

    let metadata = ScriptExtractor::new()
        .with_prefix_limit(256)
        .extract(&path)
        .expect("plugin metadata");

    assert_eq!(metadata.role(), None);
}

// ---------------------------------------------------------------------------
// Legacy declaration line
// ---------------------------------------------------------------------------

#[rstest]
fn legacy_line_supplies_declaration(plugin_dir: TempDir) {
    let contents = concat!(
        "#!/usr/bin/env python3\n",
        "# META: type=source, handles=[\".csv\", \".tsv\"], streaming=true, command=\"ls\"\n",
    );
    let path = write_plugin(&plugin_dir, "formats/legacy.py", contents);

    let metadata = ScriptExtractor::new().extract(&path).expect("plugin metadata");

    assert_eq!(metadata.role(), Some(PluginRole::Source));
    assert_eq!(metadata.matches(), [".csv", ".tsv"]);
    assert!(metadata.streaming());
    assert_eq!(metadata.command(), Some("ls"));
}

#[rstest]
fn legacy_line_keeps_block_dependencies(plugin_dir: TempDir) {
    let contents = concat!(
        "#!/usr/bin/env python3\n",
        "# /// script\n",
        "# dependencies = [\"pyyaml\"]\n",
        "# ///\n",
        "# META: type=format, handles=['.yaml']\n",
    );
    let path = write_plugin(&plugin_dir, "formats/yaml_.py", contents);

    let metadata = ScriptExtractor::new().extract(&path).expect("plugin metadata");

    assert_eq!(metadata.role(), Some(PluginRole::Format));
    assert_eq!(metadata.matches(), [".yaml"]);
    assert_eq!(metadata.dependencies(), ["pyyaml"]);
}

// ---------------------------------------------------------------------------
// Recognition
// ---------------------------------------------------------------------------

#[rstest]
#[case::init_module("formats/__init__.py", "#!/usr/bin/env python3\n")]
#[case::test_module("formats/test_csv.py", "#!/usr/bin/env python3\n")]
#[case::data_file("formats/readme.txt", "just text\n")]
fn non_plugins_are_rejected(plugin_dir: TempDir, #[case] relative: &str, #[case] contents: &str) {
    let path = write_plugin(&plugin_dir, relative, contents);

    assert!(ScriptExtractor::new().extract(&path).is_none());
}

#[rstest]
fn shebang_without_extension_is_recognised(plugin_dir: TempDir) {
    let path = write_plugin(&plugin_dir, "formats/reader", "#!/bin/sh\n");

    let metadata = ScriptExtractor::new().extract(&path).expect("plugin metadata");

    assert_eq!(metadata.name(), "reader");
}

#[test]
fn missing_file_is_not_a_plugin() {
    assert!(ScriptExtractor::new()
        .extract(Path::new("/nonexistent/conduit/plugin.py"))
        .is_none());
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

#[rstest]
#[case::source("source", PluginRole::Source)]
#[case::reader_alias("reader", PluginRole::Source)]
#[case::writer_alias("Writer", PluginRole::Target)]
#[case::protocol("protocol", PluginRole::Protocol)]
fn roles_parse(#[case] text: &str, #[case] expected: PluginRole) {
    assert_eq!(text.parse::<PluginRole>(), Ok(expected));
}

#[test]
fn unknown_role_is_rejected() {
    assert_eq!(
        "sink".parse::<PluginRole>(),
        Err(UnknownRole(String::from("sink")))
    );
}

#[test]
fn roleless_plugins_read_but_do_not_write() {
    let metadata = PluginMetadata::new("generic", "/plugins/generic");
    assert!(metadata.reads());
    assert!(!metadata.writes());
}
