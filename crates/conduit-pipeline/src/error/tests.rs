//! Unit tests for pipeline error rendering and exit codes.

use std::io;
use std::time::Duration;

use rstest::rstest;

use super::*;

#[rstest]
#[case::empty(PipelineError::EmptyPipeline, 2)]
#[case::missing_source(PipelineError::MissingSource, 2)]
#[case::unresolved(
    PipelineError::Unresolved {
        reference: "nope://x".into(),
        classification: "url".into(),
    },
    3
)]
#[case::unknown_plugin(PipelineError::UnknownPlugin { name: "csv_".into() }, 3)]
#[case::stage_failed(
    PipelineError::StageFailed {
        plugin: "csv_".into(),
        kind: StageKind::Source,
        status: 7,
        stderr: String::new(),
    },
    7
)]
#[case::timeout(
    PipelineError::Timeout {
        plugin: "slow".into(),
        kind: StageKind::Filter,
        elapsed: Duration::from_millis(1500),
    },
    137
)]
#[case::output(PipelineError::Output { source: Arc::new(io::Error::other("closed")) }, 1)]
fn exit_codes_follow_error_kind(#[case] error: PipelineError, #[case] expected: i32) {
    assert_eq!(error.exit_code(), expected);
}

#[test]
fn stage_failure_message_includes_stderr_tail() {
    let error = PipelineError::StageFailed {
        plugin: "csv_".into(),
        kind: StageKind::Source,
        status: 2,
        stderr: "bad header\n".into(),
    };
    assert_eq!(
        error.to_string(),
        "source stage 'csv_' exited with status 2: bad header"
    );
}

#[test]
fn unresolved_message_names_classification() {
    let error = PipelineError::Unresolved {
        reference: "data.xyz".into(),
        classification: "existing-path".into(),
    };
    let message = error.to_string();
    assert!(message.contains("data.xyz"), "{message}");
    assert!(message.contains("existing-path"), "{message}");
}

#[test]
fn timeout_message_reports_elapsed_milliseconds() {
    let error = PipelineError::Timeout {
        plugin: "slow".into(),
        kind: StageKind::Filter,
        elapsed: Duration::from_millis(1500),
    };
    assert!(error.to_string().contains("1500ms"));
}
