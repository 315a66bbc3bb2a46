//! Unit tests for configuration defaults and layering.

use std::time::Duration;

use camino::Utf8PathBuf;
use rstest::rstest;

use super::*;

#[test]
fn defaults_derive_paths_from_home() {
    let config = Config::with_home("/srv/conduit");

    assert_eq!(config.plugin_dir(), Utf8PathBuf::from("/srv/conduit/plugins"));
    assert_eq!(
        config.registry_path(),
        Utf8PathBuf::from("/srv/conduit/registry.json")
    );
    assert_eq!(
        config.plugin_memo_path(),
        Utf8PathBuf::from("/srv/conduit/cache/plugins.json")
    );
    assert!(config.fallback_to_builtin());
    assert_eq!(config.stage_timeout(), None);
    assert_eq!(config.filter_plugin(), DEFAULT_FILTER_PLUGIN);
    assert_eq!(config.fallback_adapter(), DEFAULT_FALLBACK_ADAPTER);
}

#[test]
fn toml_document_overrides_defaults() {
    let document = r#"
        home = "/data/conduit"
        plugin_dir = "/opt/plugins"
        fallback_to_builtin = false
        stage_timeout_secs = 30
        log_format = "json"
    "#;

    let config = Config::from_toml_str(document, &ConfigOverrides::default())
        .expect("document should load");

    assert_eq!(config.home(), "/data/conduit");
    assert_eq!(config.plugin_dir(), Utf8PathBuf::from("/opt/plugins"));
    assert!(!config.fallback_to_builtin());
    assert_eq!(config.stage_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.log_format(), LogFormat::Json);
}

#[test]
fn overrides_beat_the_document() {
    let overrides = ConfigOverrides {
        log_filter: Some(String::from("debug")),
        stage_timeout_secs: Some(5),
        ..ConfigOverrides::default()
    };

    let config = Config::from_toml_str("log_filter = \"info\"\nstage_timeout_secs = 60\n", &overrides)
        .expect("document should load");

    assert_eq!(config.log_filter(), "debug");
    assert_eq!(config.stage_timeout(), Some(Duration::from_secs(5)));
}

#[rstest]
#[case::empty_filter_plugin("filter_plugin = \"\"", "filter_plugin")]
#[case::blank_fallback("fallback_adapter = \"  \"", "fallback_adapter")]
#[case::zero_stderr_limit("stderr_limit_bytes = 0", "stderr_limit_bytes")]
#[case::zero_timeout("stage_timeout_secs = 0", "stage_timeout_secs")]
fn invalid_values_are_rejected(#[case] document: &str, #[case] expected_key: &str) {
    let error = Config::from_toml_str(document, &ConfigOverrides::default())
        .expect_err("document should be rejected");

    match error {
        ConfigError::Invalid { key, .. } => assert_eq!(key, expected_key),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn malformed_document_reports_extract_error() {
    let error = Config::from_toml_str("stage_timeout_secs = \"soon\"", &ConfigOverrides::default())
        .expect_err("document should be rejected");

    assert!(matches!(error, ConfigError::Extract(_)));
}

#[rstest]
#[case::json("json", LogFormat::Json)]
#[case::compact("compact", LogFormat::Compact)]
#[case::mixed_case("JSON", LogFormat::Json)]
fn log_format_parses_case_insensitively(#[case] text: &str, #[case] expected: LogFormat) {
    let parsed: LogFormat = text.parse().expect("format should parse");
    assert_eq!(parsed, expected);
}
