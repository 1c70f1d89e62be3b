//! Renewal invoker: run the tool once, then wait for new material on disk.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::tool::RenewalTool;
use crate::certificate::{CertificateInfo, CertificateInspector};
use crate::error::RenewalError;
use crate::shutdown::ShutdownSignal;

/// How long to wait for renewed material to show up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollConfig {
    /// Number of on-disk checks (at least 1).
    pub attempts: u32,
    /// Fixed wait between checks (milliseconds).
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 30,
            interval_ms: 2_000,
        }
    }
}

/// Triggers the renewal tool and confirms the certificate actually changed.
pub struct RenewalInvoker {
    tool: Arc<dyn RenewalTool>,
    inspector: CertificateInspector,
    chain_path: PathBuf,
    poll: PollConfig,
    shutdown: ShutdownSignal,
}

impl RenewalInvoker {
    pub fn new(
        tool: Arc<dyn RenewalTool>,
        inspector: CertificateInspector,
        chain_path: PathBuf,
        poll: PollConfig,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            tool,
            inspector,
            chain_path,
            poll,
            shutdown,
        }
    }

    /// One renewal attempt.
    ///
    /// The pre-renewal expiry is read fresh from disk, so a retry never reuses
    /// state from an earlier attempt.
    pub async fn renew(&self, domain: &str) -> Result<CertificateInfo, RenewalError> {
        let baseline = self
            .inspector
            .inspect(&self.chain_path)
            .ok()
            .map(|info| info.not_after);
        debug!(domain = %domain, baseline = ?baseline, "Starting renewal attempt");

        let output = self.tool.attempt_renewal(domain).await?;
        if !output.success() {
            return Err(RenewalError::ToolFailed {
                domain: domain.to_string(),
                status: output.exit_code,
                output: output.diagnostics().to_string(),
            });
        }
        info!(
            domain = %domain,
            duration_ms = output.duration_ms,
            "Renewal tool finished, waiting for new certificate"
        );

        self.wait_for_new_certificate(domain, baseline).await
    }

    async fn wait_for_new_certificate(
        &self,
        domain: &str,
        baseline: Option<DateTime<Utc>>,
    ) -> Result<CertificateInfo, RenewalError> {
        let attempts = self.poll.attempts.max(1);
        let interval = Duration::from_millis(self.poll.interval_ms);

        for poll in 1..=attempts {
            match self.inspector.inspect(&self.chain_path) {
                Ok(info) if advanced(baseline, info.not_after) => {
                    info!(
                        domain = %domain,
                        not_after = %info.not_after,
                        days_remaining = info.days_remaining,
                        polls = poll,
                        "Renewed certificate observed on disk"
                    );
                    return Ok(info);
                }
                Ok(info) => {
                    debug!(domain = %domain, poll = poll, not_after = %info.not_after, "Certificate not replaced yet");
                }
                Err(e) => {
                    debug!(domain = %domain, poll = poll, error = %e, "Certificate not readable yet");
                }
            }

            if poll < attempts && !self.shutdown.sleep(interval).await {
                return Err(RenewalError::Cancelled {
                    domain: domain.to_string(),
                });
            }
        }

        warn!(domain = %domain, polls = attempts, "Renewed certificate never appeared");
        Err(RenewalError::PollExhausted {
            domain: domain.to_string(),
            attempts,
        })
    }
}

fn advanced(baseline: Option<DateTime<Utc>>, not_after: DateTime<Utc>) -> bool {
    baseline.map_or(true, |previous| not_after > previous)
}
