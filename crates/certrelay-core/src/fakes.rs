//! In-process fakes for the pipeline's capabilities (testing only)
//!
//! Provides `FixedClock`, `ScriptedRenewalTool`, `RecordingTransport`, and
//! `ScriptedRunner`, which satisfy the trait contracts without spawning
//! processes or touching the network.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::bundle::{DEFAULT_CHAIN_FILE, DEFAULT_KEY_FILE};
use crate::clock::Clock;
use crate::delivery::{DeliveryReceipt, MailTransport, OutgoingEmail};
use crate::error::{DeliveryError, RenewalError};
use crate::pipeline::{Outcome, PipelineResult, RunPipeline};
use crate::renewal::{RenewalTool, ToolOutput};
use crate::shutdown::ShutdownTrigger;

// ---------------------------------------------------------------------------
// FixedClock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ---------------------------------------------------------------------------
// ScriptedRenewalTool
// ---------------------------------------------------------------------------

/// What the scripted tool does on one invocation.
#[derive(Debug, Clone)]
pub enum ToolStep {
    /// Write the given PEM material into the certificate directory and exit 0.
    Install { chain: String, key: String },
    /// Exit 0 without touching the disk.
    SucceedWithoutChange,
    /// Exit non-zero with the given stderr.
    Fail { exit_code: i32, stderr: String },
    /// Behave as if the program is not installed.
    Missing,
}

/// Renewal tool that replays a script of steps.
///
/// Steps are consumed in order; the last one repeats once the script runs out.
/// An empty script behaves as [`ToolStep::SucceedWithoutChange`].
#[derive(Debug)]
pub struct ScriptedRenewalTool {
    cert_dir: PathBuf,
    steps: Mutex<VecDeque<ToolStep>>,
    calls: AtomicU32,
}

impl ScriptedRenewalTool {
    pub fn new(cert_dir: &Path, steps: Vec<ToolStep>) -> Self {
        Self {
            cert_dir: cert_dir.to_path_buf(),
            steps: Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> ToolStep {
        let mut steps = self.steps.lock().unwrap();
        match steps.len() {
            0 => ToolStep::SucceedWithoutChange,
            1 => steps[0].clone(),
            _ => steps.pop_front().unwrap_or(ToolStep::SucceedWithoutChange),
        }
    }
}

#[async_trait]
impl RenewalTool for ScriptedRenewalTool {
    async fn attempt_renewal(&self, domain: &str) -> Result<ToolOutput, RenewalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let output = |exit_code: i32, stderr: String| ToolOutput {
            exit_code,
            stdout: String::new(),
            stderr,
            duration_ms: 1,
        };

        match self.next_step() {
            ToolStep::Install { chain, key } => {
                let write = |name: &str, contents: &str| {
                    std::fs::create_dir_all(&self.cert_dir)
                        .and_then(|()| std::fs::write(self.cert_dir.join(name), contents))
                        .map_err(|e| RenewalError::Spawn {
                            domain: domain.to_string(),
                            reason: e.to_string(),
                        })
                };
                write(DEFAULT_KEY_FILE, &key)?;
                write(DEFAULT_CHAIN_FILE, &chain)?;
                Ok(output(0, String::new()))
            }
            ToolStep::SucceedWithoutChange => Ok(output(0, String::new())),
            ToolStep::Fail { exit_code, stderr } => Ok(output(exit_code, stderr)),
            ToolStep::Missing => Err(RenewalError::ToolMissing {
                program: "certbot".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// Mail transport that records successful sends and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingEmail>>,
    calls: AtomicU32,
    failures_remaining: AtomicU32,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` sends fail with a retryable provider error.
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Every send attempt, successful or not.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages accepted so far.
    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<DeliveryReceipt, DeliveryError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DeliveryError::Provider {
                status: 503,
                message: "service unavailable".to_string(),
            });
        }

        self.sent.lock().unwrap().push(email.clone());
        Ok(DeliveryReceipt {
            message_id: Some(format!("fake-{call}")),
            recipients: email.to.len(),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}

// ---------------------------------------------------------------------------
// ScriptedRunner
// ---------------------------------------------------------------------------

/// Pipeline stand-in for scheduler tests.
///
/// Returns scripted outcomes in order (then `Success`), optionally taking a
/// fixed amount of (tokio) time per run and firing a shutdown trigger while
/// a run is in flight.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    outcomes: Mutex<VecDeque<Outcome>>,
    run_duration: Duration,
    trigger: Option<ShutdownTrigger>,
    runs: AtomicU32,
    completed: AtomicU32,
}

impl ScriptedRunner {
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    pub fn with_run_duration(mut self, duration: Duration) -> Self {
        self.run_duration = duration;
        self
    }

    pub fn trigger_during_run(mut self, trigger: ShutdownTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Runs started.
    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Runs that returned.
    pub fn completed(&self) -> u32 {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RunPipeline for ScriptedRunner {
    async fn run_once(&self) -> PipelineResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(trigger) = &self.trigger {
            trigger.trigger();
        }
        if !self.run_duration.is_zero() {
            tokio::time::sleep(self.run_duration).await;
        }
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Outcome::Success);
        self.completed.fetch_add(1, Ordering::SeqCst);

        PipelineResult {
            run_id: Uuid::new_v4(),
            outcome,
            certificate: None,
            bundle: None,
            duration_ms: self.run_duration.as_millis() as u64,
        }
    }
}
