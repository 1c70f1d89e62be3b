//! Scheduler: run the pipeline now, then (in daemon mode) on a fixed cadence.
//!
//! ```text
//! Idle ─▶ Running ─┬─ one-shot ────────────────▶ Terminated
//!                  └─ daemon ─▶ Waiting ─┬─ due ─▶ Running …
//!                                        └─ shutdown ─▶ Terminated
//! ```
//!
//! Runs never overlap. The next fire time is measured from the start of the
//! previous run, so an overrunning run is followed immediately by the next.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::interval::ScheduleInterval;
use crate::pipeline::{PipelineResult, RunPipeline};
use crate::shutdown::ShutdownSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Waiting,
    Terminated,
}

/// How the scheduler ended.
#[derive(Debug, Clone)]
pub struct SchedulerExit {
    pub runs: u64,
    pub last: Option<PipelineResult>,
    /// Process exit status: the last run's in one-shot mode, 0 for a daemon
    /// that was asked to stop.
    pub exit_code: i32,
}

pub struct Scheduler {
    runner: Arc<dyn RunPipeline>,
    interval: ScheduleInterval,
    daemon: bool,
    shutdown: ShutdownSignal,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(
        runner: Arc<dyn RunPipeline>,
        interval: ScheduleInterval,
        daemon: bool,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            runner,
            interval,
            daemon,
            shutdown,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    fn transition(&mut self, next: SchedulerState) {
        debug!(from = ?self.state, to = ?next, "Scheduler transition");
        self.state = next;
    }

    /// Drive the state machine until it terminates.
    pub async fn run(&mut self) -> SchedulerExit {
        let period = self.interval.as_duration();
        if self.daemon {
            info!(interval = %self.interval, "Starting scheduler in daemon mode");
        } else {
            info!("Running once");
        }

        let mut runs = 0u64;

        let last = loop {
            self.transition(SchedulerState::Running);
            let started = Instant::now();
            let result = self.runner.run_once().await;
            runs += 1;

            if result.outcome.is_failure() {
                error!(
                    run_id = %result.run_id,
                    outcome = result.outcome.as_str(),
                    "Pipeline run failed"
                );
            }

            if !self.daemon {
                self.transition(SchedulerState::Terminated);
                return SchedulerExit {
                    runs,
                    exit_code: result.exit_code(),
                    last: Some(result),
                };
            }

            if self.shutdown.is_requested() {
                info!("Shutdown requested during run, stopping scheduler");
                break result;
            }

            self.transition(SchedulerState::Waiting);
            let due = match started.checked_add(period) {
                Some(next_fire) => {
                    info!(
                        next_run_in_secs =
                            next_fire.saturating_duration_since(Instant::now()).as_secs(),
                        "Waiting for next scheduled run"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep_until(next_fire) => true,
                        _ = self.shutdown.requested() => false,
                    }
                }
                None => {
                    warn!(interval = %self.interval, "Next run time is unrepresentable, waiting for shutdown");
                    self.shutdown.requested().await;
                    false
                }
            };
            if !due {
                info!("Shutdown requested, stopping scheduler");
                break result;
            }
        };

        self.transition(SchedulerState::Terminated);
        SchedulerExit {
            runs,
            last: Some(last),
            exit_code: 0,
        }
    }
}
