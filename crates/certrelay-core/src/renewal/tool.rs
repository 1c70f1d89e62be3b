//! The external renewal tool, behind a capability trait.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::RenewalError;

/// Placeholder substituted with the domain in configured command lines.
pub const DOMAIN_PLACEHOLDER: &str = "{domain}";

/// Default per-invocation timeout (5 minutes).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(300);

/// Captured result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (-1 when the process was terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Most useful diagnostic text: stderr if present, else stdout.
    pub fn diagnostics(&self) -> &str {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim()
        } else {
            stderr
        }
    }
}

/// Something that can attempt to renew the certificate for a domain.
///
/// One call is one attempt; retries belong to the caller.
#[async_trait]
pub trait RenewalTool: Send + Sync {
    async fn attempt_renewal(&self, domain: &str) -> Result<ToolOutput, RenewalError>;
}

/// Runs a renewal command (certbot by default) as a subprocess.
#[derive(Debug, Clone)]
pub struct CommandTool {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl Default for CommandTool {
    fn default() -> Self {
        Self::certbot()
    }
}

impl CommandTool {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// `certbot renew --force-renewal --cert-name <domain> --non-interactive`
    pub fn certbot() -> Self {
        Self::certbot_with_timeout(DEFAULT_TOOL_TIMEOUT)
    }

    pub fn certbot_with_timeout(timeout: Duration) -> Self {
        Self::new(
            "certbot",
            ["renew", "--force-renewal", "--cert-name", DOMAIN_PLACEHOLDER, "--non-interactive"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout,
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Parse a whitespace-separated command line.
    ///
    /// If no `{domain}` placeholder is present the domain is appended as the
    /// last argument. Returns `None` for an empty command line.
    pub fn from_command_line(command_line: &str, timeout: Duration) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        let mut args: Vec<String> = parts.collect();
        if !args.iter().any(|a| a.contains(DOMAIN_PLACEHOLDER)) {
            args.push(DOMAIN_PLACEHOLDER.to_string());
        }
        Some(Self::new(program, args, timeout))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with the domain substituted.
    pub fn args_for(&self, domain: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(DOMAIN_PLACEHOLDER, domain))
            .collect()
    }
}

#[async_trait]
impl RenewalTool for CommandTool {
    async fn attempt_renewal(&self, domain: &str) -> Result<ToolOutput, RenewalError> {
        let start = Instant::now();
        let args = self.args_for(domain);
        debug!(program = %self.program, args = ?args, "Invoking renewal tool");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RenewalError::ToolMissing {
                        program: self.program.clone(),
                    }
                } else {
                    RenewalError::Spawn {
                        domain: domain.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| RenewalError::TimedOut {
                domain: domain.to_string(),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| RenewalError::Spawn {
                domain: domain.to_string(),
                reason: e.to_string(),
            })?;

        Ok(ToolOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
