//! Error taxonomy for the renewal-and-delivery pipeline.
//!
//! Every variant carries the domain, path, or operation it concerns so that a
//! single log line is enough to act on.

use std::path::PathBuf;

/// Fatal configuration problems. Raised before any pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("invalid schedule interval {input:?}: {reason}")]
    Interval { input: String, reason: String },
}

/// Errors produced while reading a certificate from disk.
#[derive(Debug, thiserror::Error)]
pub enum InspectError {
    #[error("certificate not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("failed to parse certificate {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("failed to read certificate {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors produced by the renewal invoker.
#[derive(Debug, thiserror::Error)]
pub enum RenewalError {
    #[error("renewal tool {program:?} is not installed or not in PATH")]
    ToolMissing { program: String },

    #[error("failed to spawn renewal tool for {domain}: {reason}")]
    Spawn { domain: String, reason: String },

    #[error("renewal tool failed for {domain} (exit status {status}): {output}")]
    ToolFailed {
        domain: String,
        status: i32,
        output: String,
    },

    #[error("renewal tool timed out for {domain} after {timeout_secs}s")]
    TimedOut { domain: String, timeout_secs: u64 },

    #[error("renewed certificate for {domain} did not appear after {attempts} poll(s)")]
    PollExhausted { domain: String, attempts: u32 },

    #[error("renewal for {domain} abandoned: shutdown requested")]
    Cancelled { domain: String },
}

impl RenewalError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RenewalError::ToolMissing { .. } | RenewalError::Cancelled { .. }
        )
    }
}

/// Errors produced while packaging the certificate bundle.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("required certificate file missing: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("bundle I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write archive {}: {reason}", path.display())]
    Archive { path: PathBuf, reason: String },

    #[error("archive {} failed verification: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
}

impl BuildError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, BuildError::MissingFile { .. })
    }
}

/// Errors produced by the delivery agent and its transports.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("no recipients configured")]
    NoRecipients,

    #[error("failed to read attachment {}: {source}", path.display())]
    Attachment {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("email provider rejected message (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("email transport error: {0}")]
    Transport(String),
}

impl DeliveryError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DeliveryError::NoRecipients)
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Transport(err.to_string())
    }
}
