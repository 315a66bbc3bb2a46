//! Supervision of running stages.
//!
//! The supervisor thread owns nothing but a handle to the shared [`Control`]
//! block. Each poll it reaps exited stages and kills the ones that exceeded
//! their time limit, outlived the shutdown grace period, or belong to an
//! aborted execution. It returns once every stage has finished.

use std::io;
use std::process::{Child, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::report::KillReason;
use super::ENGINE_TARGET;

/// How a supervised stage ended.
#[derive(Debug, Clone, Copy)]
pub(super) struct Finished {
    pub(super) status: Option<ExitStatus>,
    pub(super) killed: Option<KillReason>,
    pub(super) at: Instant,
}

#[derive(Debug)]
pub(super) struct Supervised {
    pub(super) plugin: String,
    pub(super) child: Child,
    pub(super) started: Instant,
    pub(super) finished: Option<Finished>,
}

impl Supervised {
    pub(super) fn new(plugin: String, child: Child, started: Instant) -> Self {
        Self {
            plugin,
            child,
            started,
            finished: None,
        }
    }

    fn exited(&mut self, status: ExitStatus, at: Instant) {
        debug!(
            target: ENGINE_TARGET,
            plugin = %self.plugin,
            pid = self.child.id(),
            ?status,
            "stage exited"
        );
        self.finished = Some(Finished {
            status: Some(status),
            killed: None,
            at,
        });
    }

    fn kill(&mut self, reason: KillReason, at: Instant) {
        debug!(
            target: ENGINE_TARGET,
            plugin = %self.plugin,
            pid = self.child.id(),
            %reason,
            "killing stage"
        );
        drop(self.child.kill());
        let status = self.child.wait().ok();
        self.finished = Some(Finished {
            status,
            killed: Some(reason),
            at,
        });
    }
}

#[derive(Debug, Default)]
struct State {
    stages: Vec<Supervised>,
    shutdown_at: Option<Instant>,
    aborted_at: Option<Instant>,
}

/// Shared view of the running stages.
#[derive(Debug, Clone, Default)]
pub(super) struct Control {
    state: Arc<Mutex<State>>,
}

/// Instants that decide how non-zero exits are attributed.
#[derive(Debug, Clone, Copy, Default)]
pub(super) struct Milestones {
    pub(super) shutdown_at: Option<Instant>,
    pub(super) aborted_at: Option<Instant>,
}

impl Control {
    pub(super) fn new(stages: Vec<Supervised>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                stages,
                ..State::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records that the engine stopped consuming on purpose.
    ///
    /// Stages that already exited are reaped first so that their exits are
    /// stamped before the shutdown and never attributed to it.
    pub(super) fn begin_shutdown(&self) {
        let mut state = self.lock();
        if state.shutdown_at.is_some() {
            return;
        }
        let now = Instant::now();
        for stage in state.stages.iter_mut().filter(|stage| stage.finished.is_none()) {
            if let Ok(Some(status)) = stage.child.try_wait() {
                stage.exited(status, now);
            }
        }
        state.shutdown_at = Some(now);
    }

    /// Requests that every running stage be killed.
    pub(super) fn abort(&self) {
        let mut state = self.lock();
        state.aborted_at.get_or_insert_with(Instant::now);
    }

    pub(super) fn milestones(&self) -> Milestones {
        let state = self.lock();
        Milestones {
            shutdown_at: state.shutdown_at,
            aborted_at: state.aborted_at,
        }
    }

    /// Takes the stages, killing any that are somehow still running.
    pub(super) fn into_stages(self) -> Vec<Supervised> {
        let mut state = self.lock();
        let now = Instant::now();
        for stage in state.stages.iter_mut().filter(|stage| stage.finished.is_none()) {
            stage.kill(KillReason::Aborted, now);
        }
        std::mem::take(&mut state.stages)
    }
}

/// Limits enforced by the supervisor.
#[derive(Debug, Clone, Copy)]
pub(super) struct Limits {
    pub(super) stage_timeout: Option<Duration>,
    pub(super) shutdown_grace: Duration,
    pub(super) poll_interval: Duration,
}

pub(super) fn spawn(control: Control, limits: Limits) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(String::from("pipeline-supervisor"))
        .spawn(move || supervise(&control, limits))
}

fn supervise(control: &Control, limits: Limits) {
    loop {
        if poll(control, limits) {
            return;
        }
        thread::sleep(limits.poll_interval);
    }
}

/// Runs one supervision pass. Returns `true` once every stage has finished.
fn poll(control: &Control, limits: Limits) -> bool {
    let mut state = control.lock();
    let now = Instant::now();
    let shutdown_expired = state
        .shutdown_at
        .is_some_and(|at| now.saturating_duration_since(at) >= limits.shutdown_grace);
    let mut aborted = state.aborted_at.is_some();
    let mut timed_out = false;

    for stage in state.stages.iter_mut().filter(|stage| stage.finished.is_none()) {
        match stage.child.try_wait() {
            Ok(Some(status)) => stage.exited(status, now),
            Ok(None) => {
                let overdue = limits
                    .stage_timeout
                    .is_some_and(|limit| now.saturating_duration_since(stage.started) >= limit);
                if aborted {
                    stage.kill(KillReason::Aborted, now);
                } else if overdue {
                    warn!(
                        target: ENGINE_TARGET,
                        plugin = %stage.plugin,
                        "stage exceeded its time limit"
                    );
                    stage.kill(KillReason::Timeout, now);
                    aborted = true;
                    timed_out = true;
                } else if shutdown_expired {
                    stage.kill(KillReason::InducedShutdown, now);
                }
            }
            Err(error) => {
                warn!(
                    target: ENGINE_TARGET,
                    plugin = %stage.plugin,
                    %error,
                    "cannot query stage status"
                );
                stage.kill(KillReason::Aborted, now);
            }
        }
    }

    if timed_out {
        state.aborted_at.get_or_insert(now);
        for stage in state.stages.iter_mut().filter(|stage| stage.finished.is_none()) {
            stage.kill(KillReason::Aborted, now);
        }
    }
    state.stages.iter().all(|stage| stage.finished.is_some())
}
