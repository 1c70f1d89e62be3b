//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via [`run_span`]
//! - Emission functions for the significant transitions of a run: start,
//!   renewal decision, retry attempt, delivery result, finish
//!
//! Events are emitted at `info!` level (failures at `warn!`/`error!`), so one
//! line per transition reaches both the console and the file sink.

use std::time::Duration;

use tracing::{error, info, warn};

/// Run-scoped span tagged with the run id and domain.
///
/// Attach it with `tracing::Instrument` so the span follows the run across
/// await points.
///
/// # Example
///
/// ```ignore
/// pipeline.run_inner().instrument(obs::run_span(&run_id, "example.com")).await
/// ```
pub fn run_span(run_id: &str, domain: &str) -> tracing::Span {
    tracing::info_span!("certrelay.run", run_id = %run_id, domain = %domain)
}

/// Emit event: pipeline run started.
pub fn emit_run_started(run_id: &str, domain: &str, threshold_days: i64) {
    info!(
        event = "run.started",
        run_id = %run_id,
        domain = %domain,
        threshold_days = threshold_days,
    );
}

/// Emit event: renewal decision taken, with the evidence behind it.
///
/// `days_remaining` is `None` when no readable certificate exists.
pub fn emit_renewal_decision(domain: &str, days_remaining: Option<i64>, renew: bool, reason: &str) {
    info!(
        event = "renewal.decision",
        domain = %domain,
        days_remaining = ?days_remaining,
        renew = renew,
        reason = %reason,
    );
}

/// Emit event: an attempt failed and another one is scheduled.
pub fn emit_retry_attempt(
    operation: &str,
    attempt: u32,
    max_attempts: u32,
    delay: Duration,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "retry.attempt",
        operation = %operation,
        attempt = attempt,
        max_attempts = max_attempts,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

/// Emit event: delivery finished (successfully or not).
pub fn emit_delivery_result(
    domain: &str,
    recipients: usize,
    success: bool,
    message_id: Option<&str>,
    error: Option<&dyn std::fmt::Display>,
) {
    match error {
        None => info!(
            event = "delivery.result",
            domain = %domain,
            recipients = recipients,
            success = success,
            message_id = message_id.unwrap_or("n/a"),
        ),
        Some(error) => error!(
            event = "delivery.result",
            domain = %domain,
            recipients = recipients,
            success = success,
            error = %error,
        ),
    }
}

/// Emit event: run finished with its outcome tag and duration.
pub fn emit_run_finished(run_id: &str, outcome: &str, duration_ms: u64, success: bool) {
    if success {
        info!(
            event = "run.finished",
            run_id = %run_id,
            outcome = %outcome,
            duration_ms = duration_ms,
            success = success,
        );
    } else {
        error!(
            event = "run.finished",
            run_id = %run_id,
            outcome = %outcome,
            duration_ms = duration_ms,
            success = success,
        );
    }
}
