//! Unit tests for the pipeline model.

use rstest::rstest;

use super::*;

fn source() -> PipelineStep {
    PipelineStep::new(StageKind::Source, "csv_").with_io(StepIo::ReadFile(PathBuf::from("people.csv")))
}

#[rstest]
#[case::boolean("false", ConfigValue::Bool(false))]
#[case::negative("-3", ConfigValue::Integer(-3))]
#[case::float("2.5", ConfigValue::Float(2.5))]
#[case::not_a_number("NaN", ConfigValue::Text(String::from("NaN")))]
#[case::text("hello world", ConfigValue::Text(String::from("hello world")))]
fn config_values_are_inferred(#[case] raw: &str, #[case] expected: ConfigValue) {
    assert_eq!(ConfigValue::infer(raw), expected);
}

#[test]
fn pipeline_orders_steps() {
    let pipeline = Pipeline::new(
        source(),
        vec![
            PipelineStep::new(StageKind::Filter, "jq_filter").with_config("query", ".a"),
            PipelineStep::new(StageKind::Filter, "jq_filter").with_config("query", ".b"),
        ],
        Some(PipelineStep::new(StageKind::Target, "json_")),
    )
    .expect("valid pipeline");

    let kinds: Vec<_> = pipeline.steps().iter().map(PipelineStep::kind).collect();
    assert_eq!(
        kinds,
        [
            StageKind::Source,
            StageKind::Filter,
            StageKind::Filter,
            StageKind::Target
        ]
    );
    assert_eq!(pipeline.filters().count(), 2);
    assert_eq!(pipeline.target().map(PipelineStep::plugin), Some("json_"));
}

#[test]
fn misplaced_steps_are_rejected() {
    let target_as_filter = Pipeline::new(
        source(),
        vec![PipelineStep::new(StageKind::Target, "json_")],
        None,
    )
    .expect_err("target in filter slot");
    assert!(matches!(target_as_filter, PipelineError::InvalidPipeline { .. }));

    let filter_as_source =
        Pipeline::new(PipelineStep::new(StageKind::Filter, "jq_filter"), Vec::new(), None)
            .expect_err("filter in source slot");
    assert!(matches!(filter_as_source, PipelineError::InvalidPipeline { .. }));
}

#[test]
fn describe_renders_every_stage() {
    let pipeline = Pipeline::new(
        source(),
        vec![PipelineStep::new(StageKind::Filter, "jq_filter").with_config("query", "select(.age > 30)")],
        Some(
            PipelineStep::new(StageKind::Target, "json_")
                .with_io(StepIo::WriteFile(PathBuf::from("out.json"))),
        ),
    )
    .expect("valid pipeline");

    assert_eq!(
        pipeline.describe(),
        "source csv_ < people.csv | filter jq_filter query=\"select(.age > 30)\" | target json_ > out.json"
    );
}

#[test]
fn describe_marks_stdout_when_untargeted() {
    let pipeline = Pipeline::new(
        PipelineStep::new(StageKind::Source, "generic_exec")
            .with_config("command", "ls")
            .with_arg("-la"),
        Vec::new(),
        None,
    )
    .expect("valid pipeline");

    assert_eq!(
        pipeline.describe(),
        "source generic_exec command=\"ls\" -la | stdout"
    );
}

#[test]
fn stage_modes_match_plugin_contract() {
    assert_eq!(StageKind::Fetch.mode(), "raw");
    assert_eq!(StageKind::Source.mode(), "read");
    assert_eq!(StageKind::Filter.mode(), "filter");
    assert_eq!(StageKind::Target.mode(), "write");
}

#[test]
fn fetch_precedes_the_source() {
    let pipeline = Pipeline::new(PipelineStep::new(StageKind::Source, "csv_"), Vec::new(), None)
        .and_then(|pipeline| {
            pipeline.with_fetch(
                PipelineStep::new(StageKind::Fetch, "http_get")
                    .with_config("url", "https://example.com/people.csv"),
            )
        })
        .expect("valid pipeline");

    assert_eq!(pipeline.fetch().map(PipelineStep::plugin), Some("http_get"));
    assert_eq!(pipeline.source().map(PipelineStep::plugin), Some("csv_"));
    assert_eq!(
        pipeline.describe(),
        "fetch http_get url=\"https://example.com/people.csv\" | source csv_ | stdout"
    );
}

#[rstest]
#[case::wrong_kind(PipelineStep::new(StageKind::Filter, "jq_filter"))]
#[case::source_reads_a_file(PipelineStep::new(StageKind::Fetch, "http_get"))]
fn fetch_needs_a_free_source(#[case] fetch: PipelineStep) {
    let pipeline = Pipeline::new(source(), Vec::new(), None).expect("valid pipeline");

    let error = pipeline.with_fetch(fetch).expect_err("fetch rejected");

    assert!(matches!(error, PipelineError::InvalidPipeline { .. }));
}

#[test]
fn stdin_sources_are_described() {
    let pipeline = Pipeline::new(
        PipelineStep::new(StageKind::Source, "csv_").with_io(StepIo::ReadStdin),
        Vec::new(),
        None,
    )
    .expect("valid pipeline");

    assert_eq!(pipeline.describe(), "source csv_ < stdin | stdout");
}
