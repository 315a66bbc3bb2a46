//! Unit tests for plugin error types.

use std::io;
use std::path::PathBuf;

use rstest::rstest;

use super::*;

#[test]
fn io_error_message_includes_path() {
    let error = PluginError::io("/tmp/registry.json", io::Error::other("disk full"));
    let message = error.to_string();
    assert!(
        message.contains("/tmp/registry.json"),
        "expected path in message: {message}"
    );
    assert!(
        message.contains("disk full"),
        "expected cause in message: {message}"
    );
}

#[rstest]
#[case::timeout(
    PluginError::Timeout {
        name: "slow".into(),
        timeout_ms: 4200,
    },
    "4200"
)]
#[case::non_zero_exit(
    PluginError::NonZeroExit {
        name: "buggy".into(),
        status: 127,
        stderr: String::new(),
    },
    "127"
)]
fn error_message_includes_numeric_field(#[case] error: PluginError, #[case] expected_value: &str) {
    let message = error.to_string();
    assert!(
        message.contains(expected_value),
        "expected '{expected_value}' in message: {message}"
    );
}

#[rstest]
#[case::invalid_entry(PluginError::invalid_entry("empty pattern"), true)]
#[case::duplicate(PluginError::DuplicatePlugin { name: "csv_".into() }, true)]
#[case::registry_format(
    PluginError::RegistryFormat {
        path: PathBuf::from("/tmp/registry.json"),
        source: Arc::new(
            serde_json::from_str::<serde_json::Value>("{").expect_err("malformed JSON"),
        ),
    },
    true
)]
#[case::io(PluginError::io("/tmp", io::Error::other("boom")), false)]
#[case::timeout(PluginError::Timeout { name: "slow".into(), timeout_ms: 1 }, false)]
fn configuration_errors_are_classified(#[case] error: PluginError, #[case] expected: bool) {
    assert_eq!(error.is_configuration(), expected);
}

#[test]
fn io_error_exposes_source() {
    use std::error::Error as _;

    let error = PluginError::io("/tmp/x", io::Error::new(io::ErrorKind::NotFound, "gone"));
    let source = error.source().expect("source should be present");
    assert!(source.to_string().contains("gone"));
}
