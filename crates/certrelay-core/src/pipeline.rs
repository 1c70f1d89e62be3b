//! Pipeline orchestrator: ensure the certificate is valid, then deliver it.
//!
//! One call to [`Pipeline::run_once`] is one run:
//!
//! ```text
//! inspect ─┬─ fresh ──(on-renewal)──────────────────────────▶ SkippedNoRenewalNeeded
//!          │         └─(always)──────────────┐
//!          └─ stale/missing ─▶ renew ─▶ confirm ─┴─▶ bundle ─▶ deliver ─▶ cleanup
//! ```
//!
//! Every risky step runs under its own [`crate::retry::RetryPolicy`]; a step that exhausts
//! its budget ends the run as `Failed` and later steps are skipped.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::bundle::{Bundle, BundleBuilder};
use crate::certificate::{CertificateInfo, CertificateInspector};
use crate::clock::Clock;
use crate::config::{DeliveryMode, RunConfig};
use crate::delivery::{DeliveryAgent, MailTransport};
use crate::error::InspectError;
use crate::obs;
use crate::renewal::{RenewalInvoker, RenewalTool};
use crate::shutdown::ShutdownSignal;

/// Which step ended a failed run, and why.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("renewal failed: {0}")]
    Renewal(String),
    #[error("renewed certificate rejected: {0}")]
    Unconfirmed(String),
    #[error("bundle failed: {0}")]
    Build(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Terminal state of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Certificate was fresh and was delivered as-is.
    Success,
    RenewedAndSent,
    SkippedNoRenewalNeeded,
    Failed(FailureReason),
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::RenewedAndSent => "renewed_and_sent",
            Outcome::SkippedNoRenewalNeeded => "skipped_no_renewal_needed",
            Outcome::Failed(_) => "failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

/// Summary of one run, consumed by logging and the exit code.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub outcome: Outcome,
    /// Last certificate observed during the run.
    pub certificate: Option<CertificateInfo>,
    /// Bundle produced by the run, if any (it may have been cleaned up since).
    pub bundle: Option<PathBuf>,
    pub duration_ms: u64,
}

impl PipelineResult {
    pub fn exit_code(&self) -> i32 {
        if self.outcome.is_failure() {
            1
        } else {
            0
        }
    }
}

/// Anything the scheduler can drive.
#[async_trait]
pub trait RunPipeline: Send + Sync {
    async fn run_once(&self) -> PipelineResult;
}

/// Outcome of the renewal decision.
#[derive(Debug)]
enum Decision {
    Skip(CertificateInfo),
    Renew {
        current: Option<CertificateInfo>,
        reason: String,
    },
}

/// Partial state while a run is in flight.
#[derive(Default)]
struct RunState {
    certificate: Option<CertificateInfo>,
    bundle: Option<PathBuf>,
}

/// The production orchestrator.
pub struct Pipeline {
    config: Arc<RunConfig>,
    inspector: CertificateInspector,
    invoker: RenewalInvoker,
    builder: BundleBuilder,
    delivery: DeliveryAgent,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    pub fn new(
        config: Arc<RunConfig>,
        tool: Arc<dyn RenewalTool>,
        transport: Arc<dyn MailTransport>,
        clock: Arc<dyn Clock>,
        shutdown: ShutdownSignal,
    ) -> Self {
        let inspector = CertificateInspector::new(clock);
        let invoker = RenewalInvoker::new(
            tool,
            inspector.clone(),
            config.chain_path(),
            config.poll,
            shutdown.clone(),
        );
        let builder = BundleBuilder::new(config.key_file.clone(), config.chain_file.clone());
        let delivery = DeliveryAgent::new(transport, config.sender.clone());

        Self {
            config,
            inspector,
            invoker,
            builder,
            delivery,
            shutdown,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    fn decide(&self) -> Decision {
        let threshold = self.config.threshold_days;
        let current = match self.inspector.inspect(&self.config.chain_path()) {
            Ok(info) => info,
            Err(e) => {
                let reason = match e {
                    InspectError::NotFound { .. } => "certificate missing".to_string(),
                    other => format!("certificate unreadable: {other}"),
                };
                return Decision::Renew {
                    current: None,
                    reason,
                };
            }
        };

        if !self.config.key_path().is_file() {
            return Decision::Renew {
                current: Some(current),
                reason: "private key missing".to_string(),
            };
        }

        if current.days_remaining > threshold {
            Decision::Skip(current)
        } else {
            let reason = format!(
                "{} day(s) remaining, threshold is {}",
                current.days_remaining, threshold
            );
            Decision::Renew {
                current: Some(current),
                reason,
            }
        }
    }

    async fn execute(&self, state: &mut RunState) -> Outcome {
        let domain = self.config.domain.as_str();

        let renewed = match self.decide() {
            Decision::Skip(info) => {
                obs::emit_renewal_decision(domain, Some(info.days_remaining), false, "outside threshold");
                state.certificate = Some(info);
                if self.config.delivery_mode == DeliveryMode::OnRenewal {
                    info!(domain = %domain, "No renewal needed, nothing to deliver");
                    return Outcome::SkippedNoRenewalNeeded;
                }
                false
            }
            Decision::Renew { current, reason } => {
                obs::emit_renewal_decision(
                    domain,
                    current.as_ref().map(|c| c.days_remaining),
                    true,
                    &reason,
                );
                state.certificate = current;

                if let Err(reason) = self.renew(domain, state).await {
                    return Outcome::Failed(reason);
                }
                true
            }
        };

        let bundle = match self.build_bundle(domain).await {
            Ok(bundle) => bundle,
            Err(reason) => return Outcome::Failed(reason),
        };
        state.bundle = Some(bundle.path.clone());

        if let Err(reason) = self.deliver(domain, &bundle).await {
            return Outcome::Failed(reason);
        }

        if self.config.cleanup {
            remove_bundle(&bundle);
        }

        if renewed {
            Outcome::RenewedAndSent
        } else {
            Outcome::Success
        }
    }

    async fn renew(&self, domain: &str, state: &mut RunState) -> Result<(), FailureReason> {
        self.config
            .renewal_retry
            .run("renewal", &self.shutdown, |_| self.invoker.renew(domain))
            .await
            .map_err(|e| FailureReason::Renewal(e.to_string()))?;

        // Confirm from a fresh read rather than trusting the poll result.
        let confirmed = self
            .inspector
            .inspect(&self.config.chain_path())
            .map_err(|e| FailureReason::Unconfirmed(e.to_string()))?;
        if confirmed.not_after <= self.inspector.now() {
            state.certificate = Some(confirmed.clone());
            return Err(FailureReason::Unconfirmed(format!(
                "certificate for {domain} expired at {}",
                confirmed.not_after
            )));
        }

        info!(
            domain = %domain,
            not_after = %confirmed.not_after,
            days_remaining = confirmed.days_remaining,
            "Certificate renewed"
        );
        state.certificate = Some(confirmed);
        Ok(())
    }

    async fn build_bundle(&self, domain: &str) -> Result<Bundle, FailureReason> {
        let cert_dir = self.config.cert_dir.as_path();
        let output_dir = self.config.output_dir.as_path();

        self.config
            .bundle_retry
            .run("bundle", &self.shutdown, |_| {
                let timestamp = self.inspector.now();
                std::future::ready(self.builder.build(cert_dir, output_dir, domain, timestamp))
            })
            .await
            .map_err(|e| FailureReason::Build(e.to_string()))
    }

    async fn deliver(&self, domain: &str, bundle: &Bundle) -> Result<(), FailureReason> {
        let recipients = self.config.recipients.as_slice();
        let result = self
            .config
            .delivery_retry
            .run("delivery", &self.shutdown, |_| {
                self.delivery.deliver(bundle, domain, recipients)
            })
            .await;

        match result {
            Ok(receipt) => {
                obs::emit_delivery_result(
                    domain,
                    receipt.recipients,
                    true,
                    receipt.message_id.as_deref(),
                    None,
                );
                Ok(())
            }
            Err(e) => {
                obs::emit_delivery_result(domain, recipients.len(), false, None, Some(&e));
                warn!(path = %bundle.path.display(), "Keeping undelivered bundle on disk");
                Err(FailureReason::Delivery(e.to_string()))
            }
        }
    }
}

fn remove_bundle(bundle: &Bundle) {
    match std::fs::remove_file(&bundle.path) {
        Ok(()) => info!(path = %bundle.path.display(), "Removed delivered bundle"),
        Err(e) => warn!(path = %bundle.path.display(), error = %e, "Failed to remove bundle"),
    }
}

#[async_trait]
impl RunPipeline for Pipeline {
    async fn run_once(&self) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let run_id_str = run_id.to_string();
        let domain = self.config.domain.clone();
        let start = Instant::now();

        let mut state = RunState::default();
        let outcome = async {
            obs::emit_run_started(&run_id_str, &domain, self.config.threshold_days);
            let outcome = self.execute(&mut state).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            if let Outcome::Failed(reason) = &outcome {
                warn!(reason = %reason, "Run failed");
            }
            obs::emit_run_finished(&run_id_str, outcome.as_str(), duration_ms, !outcome.is_failure());
            outcome
        }
        .instrument(obs::run_span(&run_id_str, &domain))
        .await;

        PipelineResult {
            run_id,
            outcome,
            certificate: state.certificate,
            bundle: state.bundle,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }
}
