//! certrelay core library
//!
//! Keeps one TLS certificate valid and mails copies of it to operators:
//! inspect the certificate, renew it through an external tool when it is
//! close to expiry, package key and chain into a zip bundle, deliver the
//! bundle by email, and repeat on a schedule.

pub mod bundle;
pub mod certificate;
pub mod clock;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fakes;
pub mod interval;
pub mod obs;
pub mod pipeline;
pub mod renewal;
pub mod retry;
pub mod scheduler;
pub mod shutdown;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use bundle::{Bundle, BundleBuilder};
pub use certificate::{CertificateInfo, CertificateInspector};
pub use clock::{Clock, SystemClock};
pub use config::{DeliveryMode, RunConfig, Settings};
pub use delivery::{
    DeliveryAgent, DeliveryReceipt, DryRunTransport, MailTransport, OutgoingEmail,
    ResendTransport, SenderIdentity,
};
pub use error::{BuildError, ConfigError, DeliveryError, InspectError, RenewalError};
pub use interval::{IntervalUnit, ScheduleInterval, MAX_INTERVAL_SECS};
pub use pipeline::{FailureReason, Outcome, Pipeline, PipelineResult, RunPipeline};
pub use renewal::{CommandTool, PollConfig, RenewalInvoker, RenewalTool, ToolOutput};
pub use retry::{Backoff, RetryError, RetryPolicy, RetryStop, Retryable};
pub use scheduler::{Scheduler, SchedulerExit, SchedulerState};
pub use shutdown::{ShutdownSignal, ShutdownTrigger};
pub use telemetry::{init_logging, parse_level, LogFormat};

/// Crate version, reported at startup.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
