//! Engine behaviour against real stage processes.
#![cfg(unix)]

mod support;

use std::time::{Duration, Instant};

use conduit_pipeline::{
    Consumption, Engine, ExecutionOptions, KillReason, Pipeline, PipelineError, PipelineStep,
    StageKind, StageOutcome, StageState,
};
use conduit_plugins::PluginRole;
use rstest::rstest;

use support::PluginKit;

fn source(plugin: &str) -> PipelineStep {
    PipelineStep::new(StageKind::Source, plugin)
}

fn filter(plugin: &str) -> PipelineStep {
    PipelineStep::new(StageKind::Filter, plugin)
}

fn fast_options() -> ExecutionOptions {
    ExecutionOptions::default()
        .with_shutdown_grace(Duration::from_millis(300))
        .with_poll_interval(Duration::from_millis(10))
}

fn lines(output: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::to_owned)
        .collect()
}

#[rstest]
fn head_stops_an_unbounded_source() {
    let mut kit = PluginKit::standard();
    kit.install("endless", Some(PluginRole::Source), &[], support::ENDLESS);
    let pipeline =
        Pipeline::new(source("endless"), vec![filter("pass_")], None).expect("pipeline");
    let engine = Engine::new(kit.catalog(), fast_options());

    let started = Instant::now();
    let mut output = Vec::new();
    let result = engine
        .execute_head(&pipeline, 5, &mut output)
        .expect("execute");

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(lines(&output), vec![String::from("{\"n\":1}"); 5]);
    assert!(result.is_success(), "induced shutdown is not a failure");
    assert!(result.induced_shutdown());
    assert_eq!(result.records(), 5);
    for stage in result.stages() {
        assert!(
            matches!(
                stage.outcome(),
                StageOutcome::InducedShutdown | StageOutcome::Succeeded
            ),
            "unexpected outcome for {}: {:?}",
            stage.plugin(),
            stage.outcome()
        );
        assert!(stage.state().is_terminal());
        assert!(!support::process_exists(stage.pid()), "{} still running", stage.plugin());
    }
}

#[rstest]
fn stages_ignoring_sigpipe_are_killed_after_grace() {
    let mut kit = PluginKit::new();
    kit.install("stubborn", Some(PluginRole::Source), &[], support::STUBBORN);
    let pipeline = Pipeline::new(source("stubborn"), Vec::new(), None).expect("pipeline");
    let engine = Engine::new(kit.catalog(), fast_options());

    let mut output = Vec::new();
    let result = engine
        .execute(&pipeline, Consumption::Head(1), &mut output)
        .expect("execute");

    assert!(result.is_success());
    let stage = result.stages().first().expect("source report");
    assert_eq!(stage.outcome(), StageOutcome::InducedShutdown);
    assert!(matches!(
        stage.state(),
        StageState::Killed {
            reason: KillReason::InducedShutdown,
            ..
        } | StageState::Exited { .. }
    ));
}

#[rstest]
fn tail_emits_the_last_records() {
    let mut kit = PluginKit::new();
    kit.install("counter", Some(PluginRole::Source), &[], &support::counter(10));
    let pipeline = Pipeline::new(source("counter"), Vec::new(), None).expect("pipeline");
    let engine = Engine::new(kit.catalog(), fast_options());

    let mut output = Vec::new();
    let result = engine
        .execute_tail(&pipeline, 3, &mut output)
        .expect("execute");

    assert!(result.is_success());
    assert!(!result.induced_shutdown());
    assert_eq!(lines(&output), ["{\"n\":8}", "{\"n\":9}", "{\"n\":10}"]);
}

#[rstest]
fn failing_source_reports_status_and_stderr() {
    let mut kit = PluginKit::standard();
    kit.install("broken", Some(PluginRole::Source), &[], support::FAILING);
    let pipeline =
        Pipeline::new(source("broken"), vec![filter("pass_")], None).expect("pipeline");
    let engine = Engine::new(kit.catalog(), fast_options());

    let result = engine
        .execute(&pipeline, Consumption::All, &mut Vec::new())
        .expect("execute");

    assert!(!result.is_success());
    assert_eq!(result.exit_code(), 3);
    let failure = result.first_failure().expect("failure");
    assert_eq!(failure.plugin(), "broken");
    assert_eq!(failure.state(), StageState::Exited { code: 3 });
    assert!(failure.stderr().contains("cannot reach upstream"));

    let error = result.into_result().expect_err("stage failure");
    assert!(matches!(error, PipelineError::StageFailed { status: 3, .. }));
}

#[rstest]
fn head_keeps_a_source_failure_at_the_limit() {
    let mut kit = PluginKit::new();
    kit.install(
        "exploding",
        Some(PluginRole::Source),
        &[],
        &format!(
            "{}sleep 0.2\necho 'upstream exploded' >&2\nexit 4\n",
            "echo '{\"n\":1}'\n".repeat(5)
        ),
    );
    let pipeline = Pipeline::new(source("exploding"), Vec::new(), None).expect("pipeline");
    let engine = Engine::new(kit.catalog(), fast_options());

    let mut output = Vec::new();
    let result = engine
        .execute_head(&pipeline, 5, &mut output)
        .expect("execute");

    assert_eq!(lines(&output).len(), 5);
    assert!(!result.induced_shutdown());
    assert!(!result.is_success());
    assert_eq!(result.exit_code(), 4);
    let failure = result.first_failure().expect("failure");
    assert_eq!(failure.outcome(), StageOutcome::Failed);
    assert!(failure.stderr().contains("upstream exploded"));
}

#[rstest]
fn timeouts_kill_the_stage() {
    let mut kit = PluginKit::standard();
    kit.install("sleeper", Some(PluginRole::Source), &[], support::SLEEPER);
    let pipeline =
        Pipeline::new(source("sleeper"), vec![filter("pass_")], None).expect("pipeline");
    let options = fast_options().with_stage_timeout(Some(Duration::from_millis(200)));
    let engine = Engine::new(kit.catalog(), options);

    let started = Instant::now();
    let result = engine
        .execute(&pipeline, Consumption::All, &mut Vec::new())
        .expect("execute");

    assert!(started.elapsed() < Duration::from_secs(10));
    let failure = result.first_failure().expect("timeout");
    assert_eq!(failure.outcome(), StageOutcome::TimedOut);
    assert!(failure.elapsed() >= Duration::from_millis(200));
    assert_eq!(result.exit_code(), 137);
    let error = result.into_result().expect_err("timeout error");
    assert!(matches!(error, PipelineError::Timeout { .. }));
}

#[rstest]
fn stderr_capture_is_bounded() {
    let mut kit = PluginKit::new();
    kit.install("noisy", Some(PluginRole::Source), &[], support::NOISY);
    let pipeline = Pipeline::new(source("noisy"), Vec::new(), None).expect("pipeline");
    let engine = Engine::new(kit.catalog(), fast_options().with_stderr_limit(64));

    let mut output = Vec::new();
    let result = engine
        .execute(&pipeline, Consumption::All, &mut output)
        .expect("execute");

    assert!(result.is_success());
    assert_eq!(lines(&output), ["{\"ok\":true}"]);
    let stderr = result.stages().first().expect("report").stderr();
    assert!(stderr.len() <= 64);
    assert!(stderr.ends_with("line 1999\n"));
}

#[rstest]
fn missing_input_file_fails_before_spawning() {
    let kit = PluginKit::standard();
    let pipeline = Pipeline::new(
        source("csv_").with_io(conduit_pipeline::StepIo::ReadFile(kit.path("absent.csv"))),
        Vec::new(),
        None,
    )
    .expect("pipeline");
    let engine = Engine::new(kit.catalog(), fast_options());

    let error = engine
        .execute(&pipeline, Consumption::All, &mut Vec::new())
        .expect_err("missing file");
    assert!(matches!(error, PipelineError::Io { .. }));
}

#[rstest]
fn broken_output_tears_the_pipeline_down() {
    struct Closed;

    impl std::io::Write for Closed {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let mut kit = PluginKit::new();
    kit.install("endless", Some(PluginRole::Source), &[], support::ENDLESS);
    let pipeline = Pipeline::new(source("endless"), Vec::new(), None).expect("pipeline");
    let engine = Engine::new(kit.catalog(), fast_options());

    let error = engine
        .execute(&pipeline, Consumption::All, &mut Closed)
        .expect_err("output failure");
    assert!(matches!(error, PipelineError::Output { .. }));
}
