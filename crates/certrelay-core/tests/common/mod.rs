//! Shared fixtures for certrelay-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use certrelay_core::fakes::{RecordingTransport, ScriptedRenewalTool, ToolStep};
use certrelay_core::{
    Backoff, DeliveryMode, MailTransport, Pipeline, RetryPolicy, RunConfig, Settings,
    ShutdownSignal, SystemClock,
};
use tempfile::TempDir;

#[path = "../../src/test_support.rs"]
mod test_support;

pub use test_support::{mint_pair, write_certificate};

pub fn renewal_to(domain: &str, valid_days: i64) -> ToolStep {
    let (chain, key) = mint_pair(domain, valid_days);
    ToolStep::Install { chain, key }
}

pub fn tool_failure(stderr: &str) -> ToolStep {
    ToolStep::Fail {
        exit_code: 1,
        stderr: stderr.to_string(),
    }
}

/// Scratch cert/output directories plus the fake collaborators.
pub struct Fixture {
    pub certs: TempDir,
    pub out: TempDir,
    pub tool: Arc<ScriptedRenewalTool>,
    pub transport: Arc<RecordingTransport>,
}

impl Fixture {
    pub fn new(steps: Vec<ToolStep>) -> Self {
        let certs = tempfile::tempdir().unwrap();
        Self {
            tool: Arc::new(ScriptedRenewalTool::new(certs.path(), steps)),
            certs,
            out: tempfile::tempdir().unwrap(),
            transport: Arc::new(RecordingTransport::new()),
        }
    }

    /// Validated config for `example.com` with two recipients and quick
    /// back-offs.
    pub fn config(&self, mode: DeliveryMode) -> RunConfig {
        let mut config = RunConfig::from_settings(Settings {
            domain: Some("example.com".to_string()),
            cert_path: Some(self.certs.path().to_path_buf()),
            to_email: Some("ops@example.com,security@example.com".to_string()),
            from_email: Some("certs@example.com".to_string()),
            sender_name: Some("Cert Relay".to_string()),
            tmp_path: self.out.path().to_path_buf(),
            test_mode: true,
            ..Settings::default()
        })
        .unwrap();
        config.delivery_mode = mode;
        config.renewal_retry = RetryPolicy::new(3, Backoff::Fixed { delay_ms: 5_000 });
        config.delivery_retry = RetryPolicy::new(3, Backoff::Fixed { delay_ms: 10 });
        config.poll.attempts = 3;
        config.poll.interval_ms = 100;
        config
    }

    pub fn pipeline(&self, config: RunConfig) -> Pipeline {
        self.pipeline_with(config, self.transport.clone(), ShutdownSignal::never())
    }

    pub fn pipeline_with(
        &self,
        config: RunConfig,
        transport: Arc<dyn MailTransport>,
        shutdown: ShutdownSignal,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(config),
            self.tool.clone(),
            transport,
            Arc::new(SystemClock),
            shutdown,
        )
    }

    pub fn bundles(&self) -> Vec<std::path::PathBuf> {
        std::fs::read_dir(self.out.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "zip"))
            .collect()
    }
}
