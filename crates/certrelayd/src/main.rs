//! certrelayd - keep a TLS certificate renewed and mail it to operators.
//!
//! Every setting can come from a flag, an environment variable, or a `.env`
//! file in the working directory (flags win over the environment).
//!
//! Exit status: 0 on success or clean shutdown, 1 when a one-shot run fails,
//! 2 on configuration errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use tracing::{error, info, warn};

use certrelay_core::{
    init_logging, parse_level, DryRunTransport, LogFormat, MailTransport, Pipeline,
    ResendTransport, RunConfig, Scheduler, Settings, ShutdownSignal, ShutdownTrigger, SystemClock,
    VERSION,
};

const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "certrelayd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Renew a TLS certificate when it nears expiry and email it to operators", long_about = None)]
struct Cli {
    /// Domain whose certificate is managed
    #[arg(long, env = "CERT_DOMAIN")]
    domain: Option<String>,

    /// Directory holding the key and full chain (default: /etc/letsencrypt/live/<domain>)
    #[arg(long, env = "CERT_PATH")]
    cert_path: Option<PathBuf>,

    /// Private key file name inside the certificate directory
    #[arg(long, env = "CERT_KEY_FILE", default_value = "privkey.pem")]
    key_file: String,

    /// Full chain file name inside the certificate directory
    #[arg(long, env = "CERT_CHAIN_FILE", default_value = "fullchain.pem")]
    chain_file: String,

    /// Renew when this many days or fewer remain
    #[arg(long, env = "CERT_AGE_THRESHOLD", default_value_t = 30)]
    threshold_days: i64,

    /// Comma-separated recipient addresses
    #[arg(long, env = "TO_EMAIL")]
    to_email: Option<String>,

    /// Sender address
    #[arg(long, env = "FROM_EMAIL")]
    from_email: Option<String>,

    /// Sender display name
    #[arg(long, env = "SENDER_NAME")]
    sender_name: Option<String>,

    /// Directory for generated bundles
    #[arg(long, env = "TMP_PATH", default_value = ".")]
    tmp_path: PathBuf,

    /// Log the email instead of sending it
    #[arg(long, env = "TEST_MODE", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    test_mode: bool,

    /// Delete the bundle after a successful delivery
    #[arg(long, env = "CLEANUP_ZIP", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    cleanup_zip: bool,

    /// Keep running and repeat on SCHEDULE_INTERVAL
    #[arg(long, env = "DAEMON_MODE", action = ArgAction::SetTrue, value_parser = BoolishValueParser::new())]
    daemon_mode: bool,

    /// Interval between runs in daemon mode: <n>s, <n>m, <n>h or <n>d
    #[arg(long, env = "SCHEDULE_INTERVAL", default_value = "1d")]
    schedule_interval: String,

    /// `always` delivers on every run, `on-renewal` only after a renewal
    #[arg(long, env = "DELIVERY_MODE", default_value = "always")]
    delivery_mode: String,

    /// Renewal command line; `{domain}` is substituted (appended when absent)
    #[arg(long, env = "RENEW_COMMAND")]
    renew_command: Option<String>,

    /// Timeout for one renewal command invocation, in seconds
    #[arg(long, env = "RENEW_TIMEOUT", default_value_t = 300)]
    renew_timeout: u64,

    /// Resend API key
    #[arg(long, env = "RESEND_API_KEY", hide_env_values = true)]
    resend_api_key: Option<String>,

    /// Resend API base URL
    #[arg(long, env = "RESEND_BASE_URL", default_value = "https://api.resend.com")]
    resend_base_url: String,

    /// Default log level when RUST_LOG is not set
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Directory for the daily rolling log file
    #[arg(long, env = "LOG_DIR", default_value = "logs")]
    log_dir: PathBuf,

    /// Log line format: text or json
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    log_format: String,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            domain: self.domain.clone(),
            cert_path: self.cert_path.clone(),
            key_file: self.key_file.clone(),
            chain_file: self.chain_file.clone(),
            threshold_days: self.threshold_days,
            to_email: self.to_email.clone(),
            from_email: self.from_email.clone(),
            sender_name: self.sender_name.clone(),
            tmp_path: self.tmp_path.clone(),
            test_mode: self.test_mode,
            cleanup_zip: self.cleanup_zip,
            daemon_mode: self.daemon_mode,
            schedule_interval: self.schedule_interval.clone(),
            delivery_mode: self.delivery_mode.clone(),
            renew_command: self.renew_command.clone(),
            renew_timeout_secs: self.renew_timeout,
            resend_api_key: self.resend_api_key.clone(),
            resend_base_url: self.resend_base_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    let format = match cli.log_format.parse::<LogFormat>() {
        Ok(format) => format,
        Err(e) => {
            eprintln!("certrelayd: {e}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let _log_guard = match init_logging(parse_level(&cli.log_level), &cli.log_dir, format) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("certrelayd: failed to initialise logging in {}: {e}", cli.log_dir.display());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    info!(version = VERSION, "certrelayd starting");
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment file");
    }

    match run(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{e:#}"), "Startup failed");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

/// Build the pipeline and drive the scheduler. Errors here are setup errors.
async fn run(cli: &Cli) -> Result<u8> {
    let config = RunConfig::from_settings(cli.settings()).context("invalid configuration")?;
    let config = Arc::new(config);
    info!(
        domain = %config.domain,
        cert_dir = %config.cert_dir.display(),
        threshold_days = config.threshold_days,
        recipients = config.recipients.len(),
        test_mode = config.test_mode,
        daemon = config.daemon,
        delivery_mode = config.delivery_mode.as_str(),
        "Configuration loaded"
    );

    let transport = build_transport(&config)?;
    let (trigger, shutdown) = ShutdownSignal::channel();
    spawn_signal_listener(trigger);

    let pipeline = Pipeline::new(
        config.clone(),
        Arc::new(config.renew_tool.clone()),
        transport,
        Arc::new(SystemClock),
        shutdown.clone(),
    );
    let mut scheduler = Scheduler::new(Arc::new(pipeline), config.interval, config.daemon, shutdown);

    let exit = scheduler.run().await;
    info!(runs = exit.runs, exit_code = exit.exit_code, "certrelayd stopped");
    Ok(u8::try_from(exit.exit_code).unwrap_or(1))
}

fn build_transport(config: &RunConfig) -> Result<Arc<dyn MailTransport>> {
    if config.test_mode {
        info!("Test mode: emails are logged, not sent");
        return Ok(Arc::new(DryRunTransport::new()));
    }
    let api_key = config
        .api_key
        .clone()
        .context("RESEND_API_KEY is required outside test mode")?;
    let transport = ResendTransport::new(api_key, &config.resend_base_url)
        .context("failed to build email client")?;
    Ok(Arc::new(transport))
}

fn spawn_signal_listener(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        wait_for_termination().await;
        info!("Termination requested, finishing current work");
        trigger.trigger();
    });
}

#[cfg(unix)]
async fn wait_for_termination() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "Cannot listen for SIGTERM, relying on Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::sync::Mutex;

    // parsing reads the process environment, which the env tests modify
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const REQUIRED: [&str; 7] = [
        "certrelayd",
        "--domain",
        "example.com",
        "--to-email",
        "ops@example.com",
        "--from-email",
        "certs@example.com",
    ];

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_map_onto_settings() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let cli = Cli::try_parse_from([
            "certrelayd",
            "--domain",
            "example.com",
            "--to-email",
            "ops@example.com,security@example.com",
            "--from-email",
            "certs@example.com",
            "--test-mode",
            "--daemon-mode",
            "--schedule-interval",
            "12h",
            "--delivery-mode",
            "on-renewal",
        ])
        .unwrap();

        let config = RunConfig::from_settings(cli.settings()).unwrap();
        assert_eq!(config.domain, "example.com");
        assert_eq!(config.recipients.len(), 2);
        assert!(config.test_mode);
        assert!(config.daemon);
        assert_eq!(config.interval.as_duration().as_secs(), 43_200);
        assert!(build_transport(&config).is_ok());
    }

    #[test]
    fn test_malformed_interval_is_rejected_before_any_run() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let cli = Cli::try_parse_from([
            "certrelayd",
            "--domain",
            "example.com",
            "--to-email",
            "ops@example.com",
            "--from-email",
            "certs@example.com",
            "--test-mode",
            "--schedule-interval",
            "1w",
        ])
        .unwrap();

        assert!(RunConfig::from_settings(cli.settings()).is_err());
    }

    #[test]
    fn test_boolean_env_values_are_case_insensitive() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let vars = ["TEST_MODE", "CLEANUP_ZIP", "DAEMON_MODE"];

        for (value, expected) in [("True", true), ("TRUE", true), ("yes", true), ("1", true), ("False", false), ("0", false)] {
            for var in vars {
                std::env::set_var(var, value);
            }
            let parsed = Cli::try_parse_from(REQUIRED);
            for var in vars {
                std::env::remove_var(var);
            }

            let cli = parsed.unwrap_or_else(|e| panic!("{value:?} rejected: {e}"));
            assert_eq!(cli.test_mode, expected, "TEST_MODE={value}");
            assert_eq!(cli.cleanup_zip, expected, "CLEANUP_ZIP={value}");
            assert_eq!(cli.daemon_mode, expected, "DAEMON_MODE={value}");
        }

        let cli = Cli::try_parse_from(REQUIRED).unwrap();
        assert!(!cli.cleanup_zip);
        assert!(!cli.daemon_mode);
    }
}
