//! Unit tests for token decoration parsing and classification.

use std::fs;

use conduit_plugins::{EntrySource, Registry};
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

#[fixture]
fn registry() -> Registry {
    let mut registry = Registry::new();
    for (pattern, plugin) in [
        (".csv", "csv_"),
        ("write.csv", "csv_"),
        (".json", "json_"),
        ("write.json", "json_"),
        ("write.txt", "table_"),
        ("http://", "http_get"),
        ("cmd:ls", "ls_"),
    ] {
        registry
            .add_entry(pattern, plugin, 0, EntrySource::Default)
            .expect("add entry");
    }
    registry
}

fn context(registry: &Registry, has_source: bool, is_last: bool) -> ClassifyContext<'_> {
    ClassifyContext {
        registry,
        has_source,
        is_last,
        target_forced: false,
    }
}

fn class_of(token: &str, context: &ClassifyContext<'_>) -> TokenClass {
    classify(&Candidate::parse(token), context)
}

// ---------------------------------------------------------------------------
// Candidate parsing
// ---------------------------------------------------------------------------

#[rstest]
fn plain_token_has_no_decorations() {
    let candidate = Candidate::parse("people.csv");
    assert_eq!(candidate.base(), "people.csv");
    assert_eq!(candidate.plugin(), None);
    assert!(candidate.params().is_empty());
}

#[rstest]
fn query_values_are_typed() {
    let candidate = Candidate::parse("data.csv?limit=10&ratio=0.5&name=a%20b&header=true");
    assert_eq!(candidate.base(), "data.csv");
    assert_eq!(candidate.params()["limit"], ConfigValue::Integer(10));
    assert_eq!(candidate.params()["ratio"], ConfigValue::Float(0.5));
    assert_eq!(candidate.params()["name"], ConfigValue::Text("a b".into()));
    assert_eq!(candidate.params()["header"], ConfigValue::Bool(true));
}

#[rstest]
fn urls_keep_their_query() {
    let candidate = Candidate::parse("https://example.com/api?page=2~rest_");
    assert_eq!(candidate.base(), "https://example.com/api?page=2");
    assert_eq!(candidate.plugin(), Some("rest_"));
    assert!(candidate.params().is_empty());
}

#[rstest]
#[case::home_directory("~/data.csv", "~/data.csv", None)]
#[case::trailing_tilde("backup~", "backup~", None)]
#[case::path_in_suffix("a~b/c", "a~b/c", None)]
#[case::forced("out.dat~json_", "out.dat", Some("json_"))]
fn plugin_suffix_requires_a_plugin_name(
    #[case] raw: &str,
    #[case] base: &str,
    #[case] plugin: Option<&str>,
) {
    let candidate = Candidate::parse(raw);
    assert_eq!(candidate.base(), base);
    assert_eq!(candidate.plugin(), plugin);
}

// ---------------------------------------------------------------------------
// Classifier predicates
// ---------------------------------------------------------------------------

#[rstest]
#[case::field_access(".name")]
#[case::select("select(.age > 30)")]
#[case::map("map(.x)")]
#[case::pipe(".a | .b")]
#[case::to_entries("to_entries")]
fn filter_expressions_are_recognised(registry: Registry, #[case] token: &str) {
    let context = context(&registry, true, false);
    assert!(is_filter_expression(&Candidate::parse(token), &context));
}

#[rstest]
#[case::relative_path("./data.csv")]
#[case::parent_path("../data.csv")]
#[case::word("people.csv")]
fn paths_are_not_filter_expressions(registry: Registry, #[case] token: &str) {
    let context = context(&registry, false, false);
    assert!(!is_filter_expression(&Candidate::parse(token), &context));
}

#[rstest]
fn existing_dotfile_is_not_a_filter(registry: Registry) {
    let dir = TempDir::new().expect("tempdir");
    let hidden = dir.path().join(".hidden.csv");
    fs::write(&hidden, "a\n1\n").expect("write");
    let raw = hidden.to_string_lossy().into_owned();
    let context = context(&registry, false, false);
    assert!(!is_filter_expression(&Candidate::parse(&raw), &context));
    assert_eq!(class_of(&raw, &context), TokenClass::ExistingPath);
}

#[rstest]
#[case::bare_marker("-")]
#[case::typed_marker("-.json")]
fn stdout_markers_are_destinations(registry: Registry, #[case] token: &str) {
    assert!(is_stdout_marker(token));
    let context = context(&registry, true, true);
    assert_eq!(class_of(token, &context), TokenClass::Destination);
}

#[rstest]
#[case::bare_marker("-")]
#[case::typed_marker("-.csv")]
#[case::forced_reader("-~csv_")]
fn markers_before_a_source_read_stdin(registry: Registry, #[case] token: &str) {
    let context = context(&registry, false, false);
    assert_eq!(class_of(token, &context), TokenClass::Stdin);
    assert!(TokenClass::Stdin.is_source());
}

#[rstest]
#[case::dash_word("-x")]
#[case::bare_dot("-.")]
fn other_dashes_are_not_markers(#[case] token: &str) {
    assert!(!is_stdout_marker(token));
}

#[rstest]
fn new_file_with_writer_is_a_destination(registry: Registry) {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("out.json");
    let context = context(&registry, true, true);
    assert_eq!(
        class_of(&out.to_string_lossy(), &context),
        TokenClass::Destination
    );
}

#[rstest]
fn new_file_in_missing_directory_is_not_a_destination(registry: Registry) {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("missing").join("out.json");
    let context = context(&registry, true, true);
    assert_ne!(
        class_of(&out.to_string_lossy(), &context),
        TokenClass::Destination
    );
}

#[rstest]
fn new_file_without_writer_is_not_a_destination(registry: Registry) {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("out.parquet");
    let raw = out.to_string_lossy().into_owned();
    let context = context(&registry, true, true);
    assert_eq!(class_of(&raw, &context), TokenClass::Fallback);

    let forced = format!("{raw}~parquet_");
    assert_eq!(class_of(&forced, &context), TokenClass::Destination);

    let with_target = ClassifyContext {
        target_forced: true,
        ..context
    };
    assert_eq!(class_of(&raw, &with_target), TokenClass::Destination);
}

#[rstest]
fn existing_file_is_a_destination_only_in_last_position(registry: Registry) {
    let dir = TempDir::new().expect("tempdir");
    let existing = dir.path().join("report.csv");
    fs::write(&existing, "a\n").expect("write");
    let raw = existing.to_string_lossy().into_owned();

    assert_eq!(
        class_of(&raw, &context(&registry, false, true)),
        TokenClass::ExistingPath
    );
    assert_eq!(
        class_of(&raw, &context(&registry, true, false)),
        TokenClass::ExistingPath
    );
    assert_eq!(
        class_of(&raw, &context(&registry, true, true)),
        TokenClass::Destination
    );
}

#[rstest]
fn urls_and_commands_are_classified(registry: Registry) {
    let context = context(&registry, false, false);
    assert_eq!(
        class_of("http://example.com/data", &context),
        TokenClass::Url
    );
    assert_eq!(class_of("ls", &context), TokenClass::KnownCommand);
    assert_eq!(class_of("uptime", &context), TokenClass::Fallback);
}

#[rstest]
fn classifiers_run_in_documented_order() {
    let names: Vec<_> = CLASSIFIERS
        .iter()
        .map(|classifier| classifier.class().name())
        .collect();
    assert_eq!(
        names,
        [
            "filter-expression",
            "destination",
            "url",
            "existing-path",
            "known-command",
            "fallback"
        ]
    );
}

#[rstest]
fn fallback_accepts_anything(registry: Registry) {
    let context = context(&registry, false, false);
    assert!(is_fallback(&Candidate::parse(""), &context));
}
