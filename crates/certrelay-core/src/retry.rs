//! Bounded retry policy shared by every risky pipeline step.
//!
//! A [`RetryPolicy`] is a plain value (attempt budget + back-off shape) that
//! each call site owns. [`RetryPolicy::run`] drives an async operation until it
//! succeeds, fails with a non-retryable error, exhausts the budget, or a
//! shutdown request cuts a back-off wait short.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BuildError, DeliveryError, RenewalError};
use crate::obs;
use crate::shutdown::ShutdownSignal;

/// Errors that know whether another attempt could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for RenewalError {
    fn is_retryable(&self) -> bool {
        RenewalError::is_retryable(self)
    }
}

impl Retryable for BuildError {
    fn is_retryable(&self) -> bool {
        BuildError::is_retryable(self)
    }
}

impl Retryable for DeliveryError {
    fn is_retryable(&self) -> bool {
        DeliveryError::is_retryable(self)
    }
}

/// Delay shape between attempts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed { delay_ms: u64 },
    /// `attempt * step` before the retry that follows `attempt`.
    Linear { step_ms: u64 },
}

impl Backoff {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed { delay_ms } => Duration::from_millis(delay_ms),
            Backoff::Linear { step_ms } => {
                Duration::from_millis(step_ms.saturating_mul(u64::from(attempt)))
            }
        }
    }
}

/// Attempt budget and back-off for one call site.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (values below 1 are treated as 1).
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Renewal tool: 3 attempts, 5 s apart.
    pub const fn renewal() -> Self {
        Self::new(3, Backoff::Fixed { delay_ms: 5_000 })
    }

    /// Bundle packaging: 2 attempts, 1 s apart.
    pub const fn bundle() -> Self {
        Self::new(2, Backoff::Fixed { delay_ms: 1_000 })
    }

    /// Email delivery: 3 attempts, 2 s then 4 s apart.
    pub const fn delivery() -> Self {
        Self::new(3, Backoff::Linear { step_ms: 2_000 })
    }

    /// Run `op` under this policy.
    ///
    /// `op` receives the 1-based attempt number. The first attempt always
    /// runs; a pending shutdown only prevents further retries.
    pub async fn run<T, E, F, Fut>(
        &self,
        operation: &str,
        shutdown: &ShutdownSignal,
        mut op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: Retryable + fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let err = match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_retryable() {
                return Err(RetryError::new(attempt, err, RetryStop::NotRetryable));
            }
            if attempt >= max_attempts {
                return Err(RetryError::new(attempt, err, RetryStop::Exhausted));
            }

            let delay = self.backoff.delay_after(attempt);
            obs::emit_retry_attempt(operation, attempt, max_attempts, delay, &err);
            if !shutdown.sleep(delay).await {
                return Err(RetryError::new(attempt, err, RetryStop::Cancelled));
            }
            attempt += 1;
        }
    }
}

/// Why a retry loop stopped without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStop {
    Exhausted,
    NotRetryable,
    Cancelled,
}

/// The last error of a failed retry loop, with how far it got.
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last: E,
    pub stop: RetryStop,
}

impl<E> RetryError<E> {
    fn new(attempts: u32, last: E, stop: RetryStop) -> Self {
        Self {
            attempts,
            last,
            stop,
        }
    }

    pub fn into_inner(self) -> E {
        self.last
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stop {
            RetryStop::Exhausted => write!(
                f,
                "gave up after {} attempt(s): {}",
                self.attempts, self.last
            ),
            RetryStop::NotRetryable => write!(f, "{}", self.last),
            RetryStop::Cancelled => write!(
                f,
                "shutdown requested after {} attempt(s): {}",
                self.attempts, self.last
            ),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last)
    }
}
