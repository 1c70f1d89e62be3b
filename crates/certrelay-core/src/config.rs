//! Run configuration.
//!
//! [`Settings`] is the raw, loosely typed view filled in by the binary from
//! flags and environment variables. [`RunConfig::from_settings`] validates it
//! once at startup; the result is shared read-only for the life of the process.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bundle::{DEFAULT_CHAIN_FILE, DEFAULT_KEY_FILE};
use crate::delivery::{SenderIdentity, DEFAULT_RESEND_BASE_URL};
use crate::error::ConfigError;
use crate::interval::ScheduleInterval;
use crate::renewal::{CommandTool, PollConfig, DEFAULT_TOOL_TIMEOUT};
use crate::retry::RetryPolicy;

pub const DEFAULT_THRESHOLD_DAYS: i64 = 30;
pub const DEFAULT_SCHEDULE_INTERVAL: &str = "1d";
const LETSENCRYPT_LIVE_DIR: &str = "/etc/letsencrypt/live";

/// Whether a run that skips renewal still delivers the current certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    /// Every run ends with a delivery.
    #[default]
    Always,
    /// Deliver only after a renewal.
    OnRenewal,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Always => "always",
            DeliveryMode::OnRenewal => "on-renewal",
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(DeliveryMode::Always),
            "on-renewal" | "on_renewal" => Ok(DeliveryMode::OnRenewal),
            other => Err(ConfigError::Invalid {
                key: "DELIVERY_MODE",
                reason: format!("expected `always` or `on-renewal`, got {other:?}"),
            }),
        }
    }
}

/// Unvalidated settings as collected from flags and the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub domain: Option<String>,
    pub cert_path: Option<PathBuf>,
    pub key_file: String,
    pub chain_file: String,
    pub threshold_days: i64,
    /// Comma-separated recipient list.
    pub to_email: Option<String>,
    pub from_email: Option<String>,
    pub sender_name: Option<String>,
    pub tmp_path: PathBuf,
    pub test_mode: bool,
    pub cleanup_zip: bool,
    pub daemon_mode: bool,
    pub schedule_interval: String,
    pub delivery_mode: String,
    pub renew_command: Option<String>,
    pub renew_timeout_secs: u64,
    pub resend_api_key: Option<String>,
    pub resend_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            domain: None,
            cert_path: None,
            key_file: DEFAULT_KEY_FILE.to_string(),
            chain_file: DEFAULT_CHAIN_FILE.to_string(),
            threshold_days: DEFAULT_THRESHOLD_DAYS,
            to_email: None,
            from_email: None,
            sender_name: None,
            tmp_path: PathBuf::from("."),
            test_mode: false,
            cleanup_zip: false,
            daemon_mode: false,
            schedule_interval: DEFAULT_SCHEDULE_INTERVAL.to_string(),
            delivery_mode: DeliveryMode::Always.as_str().to_string(),
            renew_command: None,
            renew_timeout_secs: DEFAULT_TOOL_TIMEOUT.as_secs(),
            resend_api_key: None,
            resend_base_url: DEFAULT_RESEND_BASE_URL.to_string(),
        }
    }
}

/// Validated, immutable configuration for every run of this process.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub domain: String,
    /// Directory holding the key and full chain (certbot `live/<domain>`).
    pub cert_dir: PathBuf,
    pub key_file: String,
    pub chain_file: String,
    pub threshold_days: i64,
    /// Ordered as configured; duplicates are kept.
    pub recipients: Vec<String>,
    pub sender: SenderIdentity,
    pub output_dir: PathBuf,
    pub test_mode: bool,
    pub cleanup: bool,
    pub daemon: bool,
    pub interval: ScheduleInterval,
    pub delivery_mode: DeliveryMode,
    pub renew_tool: CommandTool,
    pub api_key: Option<String>,
    pub resend_base_url: String,
    pub renewal_retry: RetryPolicy,
    pub bundle_retry: RetryPolicy,
    pub delivery_retry: RetryPolicy,
    pub poll: PollConfig,
}

impl RunConfig {
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        let domain = required(settings.domain, "CERT_DOMAIN")?;
        let from_email = required(settings.from_email, "FROM_EMAIL")?;

        let recipients = parse_recipients(settings.to_email.as_deref().unwrap_or_default());
        if recipients.is_empty() {
            return Err(ConfigError::Missing("TO_EMAIL"));
        }

        let api_key = settings.resend_api_key.filter(|key| !key.trim().is_empty());
        if api_key.is_none() && !settings.test_mode {
            return Err(ConfigError::Missing("RESEND_API_KEY"));
        }

        if settings.threshold_days < 0 {
            return Err(ConfigError::Invalid {
                key: "CERT_AGE_THRESHOLD",
                reason: format!("must be zero or positive, got {}", settings.threshold_days),
            });
        }
        if settings.renew_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "RENEW_TIMEOUT",
                reason: "must be positive".to_string(),
            });
        }

        let interval: ScheduleInterval = settings.schedule_interval.parse()?;
        let delivery_mode: DeliveryMode = settings.delivery_mode.parse()?;

        let timeout = Duration::from_secs(settings.renew_timeout_secs);
        let renew_tool = match settings.renew_command.as_deref() {
            None => CommandTool::certbot_with_timeout(timeout),
            Some(line) => CommandTool::from_command_line(line, timeout).ok_or(ConfigError::Invalid {
                key: "RENEW_COMMAND",
                reason: "command line is empty".to_string(),
            })?,
        };

        let cert_dir = settings
            .cert_path
            .unwrap_or_else(|| PathBuf::from(LETSENCRYPT_LIVE_DIR).join(&domain));

        Ok(Self {
            domain,
            cert_dir,
            key_file: settings.key_file,
            chain_file: settings.chain_file,
            threshold_days: settings.threshold_days,
            recipients,
            sender: SenderIdentity::new(from_email, settings.sender_name),
            output_dir: settings.tmp_path,
            test_mode: settings.test_mode,
            cleanup: settings.cleanup_zip,
            daemon: settings.daemon_mode,
            interval,
            delivery_mode,
            renew_tool,
            api_key,
            resend_base_url: settings.resend_base_url,
            renewal_retry: RetryPolicy::renewal(),
            bundle_retry: RetryPolicy::bundle(),
            delivery_retry: RetryPolicy::delivery(),
            poll: PollConfig::default(),
        })
    }

    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join(&self.key_file)
    }

    pub fn chain_path(&self) -> PathBuf {
        self.cert_dir.join(&self.chain_file)
    }
}

fn required(value: Option<String>, key: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        Settings {
            domain: Some("example.com".to_string()),
            to_email: Some("ops@example.com, security@example.com".to_string()),
            from_email: Some("certs@example.com".to_string()),
            resend_api_key: Some("re_123".to_string()),
            ..Settings::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = RunConfig::from_settings(valid()).unwrap();
        assert_eq!(config.threshold_days, 30);
        assert_eq!(config.interval.as_duration(), Duration::from_secs(86_400));
        assert_eq!(config.delivery_mode, DeliveryMode::Always);
        assert_eq!(config.cert_dir, PathBuf::from("/etc/letsencrypt/live/example.com"));
        assert_eq!(config.chain_path(), PathBuf::from("/etc/letsencrypt/live/example.com/fullchain.pem"));
        assert_eq!(config.renew_tool.program(), "certbot");
        assert_eq!(config.recipients, vec!["ops@example.com", "security@example.com"]);
        assert!(!config.daemon);
    }

    #[test]
    fn test_recipients_keep_order_and_duplicates() {
        assert_eq!(
            parse_recipients(" b@x.io,a@x.io ,, b@x.io "),
            vec!["b@x.io", "a@x.io", "b@x.io"]
        );
        assert!(parse_recipients(" , ").is_empty());
    }

    #[test]
    fn test_missing_required_values() {
        let err = RunConfig::from_settings(Settings {
            domain: None,
            ..valid()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CERT_DOMAIN")));

        let err = RunConfig::from_settings(Settings {
            to_email: Some(" , ".to_string()),
            ..valid()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TO_EMAIL")));
    }

    #[test]
    fn test_api_key_optional_in_test_mode() {
        let err = RunConfig::from_settings(Settings {
            resend_api_key: None,
            ..valid()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("RESEND_API_KEY")));

        let config = RunConfig::from_settings(Settings {
            resend_api_key: None,
            test_mode: true,
            ..valid()
        })
        .unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_malformed_interval_is_config_error() {
        let err = RunConfig::from_settings(Settings {
            schedule_interval: "1w".to_string(),
            ..valid()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Interval { .. }));
    }

    #[test]
    fn test_delivery_mode_parsing() {
        assert_eq!("on-renewal".parse::<DeliveryMode>().unwrap(), DeliveryMode::OnRenewal);
        assert_eq!(" ALWAYS ".parse::<DeliveryMode>().unwrap(), DeliveryMode::Always);
        assert!("sometimes".parse::<DeliveryMode>().is_err());
    }

    #[test]
    fn test_custom_renew_command() {
        let config = RunConfig::from_settings(Settings {
            renew_command: Some("/opt/renew.sh --force".to_string()),
            renew_timeout_secs: 60,
            ..valid()
        })
        .unwrap();
        assert_eq!(config.renew_tool.program(), "/opt/renew.sh");
        assert_eq!(config.renew_tool.args_for("example.com"), vec!["--force", "example.com"]);

        let err = RunConfig::from_settings(Settings {
            renew_command: Some("  ".to_string()),
            ..valid()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "RENEW_COMMAND", .. }));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let err = RunConfig::from_settings(Settings {
            threshold_days: -1,
            ..valid()
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "CERT_AGE_THRESHOLD", .. }));
    }
}
