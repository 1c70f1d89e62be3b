//! Certificate inspection: read a PEM certificate and report its validity window.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;
use x509_parser::prelude::X509Certificate;

use crate::clock::{Clock, SystemClock};
use crate::error::InspectError;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Snapshot of a certificate's validity, taken once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub domain: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// Whole days until `not_after`, rounded down. Negative once expired.
    pub days_remaining: i64,
}

impl CertificateInfo {
    pub fn is_expired(&self) -> bool {
        self.days_remaining < 0
    }
}

/// Floor of `(not_after - now)` in whole days.
pub fn days_until(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Reads certificates from disk. Read-only; holds no state between calls.
#[derive(Clone)]
pub struct CertificateInspector {
    clock: Arc<dyn Clock>,
}

impl Default for CertificateInspector {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl std::fmt::Debug for CertificateInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateInspector").finish_non_exhaustive()
    }
}

impl CertificateInspector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Inspect the first certificate in the PEM file at `path`.
    ///
    /// For a full chain file the first block is the leaf certificate.
    pub fn inspect(&self, path: &Path) -> Result<CertificateInfo, InspectError> {
        let pem_bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(InspectError::NotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => {
                return Err(InspectError::Io {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let parse_err = |reason: String| InspectError::Parse {
            path: path.to_path_buf(),
            reason,
        };

        let (_, pem) = parse_x509_pem(&pem_bytes).map_err(|e| parse_err(format!("invalid PEM: {e}")))?;
        if pem.label != "CERTIFICATE" {
            return Err(parse_err(format!("expected a CERTIFICATE block, found {}", pem.label)));
        }
        let cert = pem
            .parse_x509()
            .map_err(|e| parse_err(format!("invalid X.509 certificate: {e}")))?;

        let validity = cert.validity();
        let not_before = to_utc(validity.not_before.timestamp())
            .ok_or_else(|| parse_err("notBefore out of range".to_string()))?;
        let not_after = to_utc(validity.not_after.timestamp())
            .ok_or_else(|| parse_err("notAfter out of range".to_string()))?;

        let domain = certificate_domain(&cert).unwrap_or_else(|| directory_name(path));

        Ok(CertificateInfo {
            domain,
            not_before,
            not_after,
            days_remaining: days_until(not_after, self.clock.now()),
        })
    }
}

fn to_utc(timestamp: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
}

/// First DNS subjectAltName, falling back to the subject common name.
fn certificate_domain(cert: &X509Certificate<'_>) -> Option<String> {
    if let Ok(Some(san)) = cert.subject_alternative_name() {
        let dns = san.value.general_names.iter().find_map(|name| match name {
            GeneralName::DNSName(dns) => Some(dns.to_string()),
            _ => None,
        });
        if dns.is_some() {
            return dns;
        }
    }

    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
}

/// certbot keeps each lineage in `live/<domain>/`.
fn directory_name(path: &Path) -> String {
    path.parent()
        .and_then(|dir| dir.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::FixedClock;
    use chrono::{Duration, TimeZone};
    use rcgen::{CertificateParams, KeyPair};
    use std::time::SystemTime;
    use tempfile::tempdir;

    fn mint(names: &[&str], valid_days: i64) -> String {
        let mut params =
            CertificateParams::new(names.iter().map(|n| n.to_string()).collect::<Vec<_>>())
                .unwrap();
        let now = SystemTime::now();
        params.not_before = (now - std::time::Duration::from_secs(86_400)).into();
        params.not_after = if valid_days >= 0 {
            (now + std::time::Duration::from_secs(valid_days as u64 * 86_400 + 3_600)).into()
        } else {
            (now - std::time::Duration::from_secs(valid_days.unsigned_abs() * 86_400)).into()
        };
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn test_days_until_floors() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(days_until(now + Duration::hours(36), now), 1);
        assert_eq!(days_until(now + Duration::days(90), now), 90);
        assert_eq!(days_until(now - Duration::hours(1), now), -1);
        assert_eq!(days_until(now - Duration::hours(25), now), -2);
    }

    #[test]
    fn test_inspect_reads_validity_and_domain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fullchain.pem");
        std::fs::write(&path, mint(&["example.com", "www.example.com"], 90)).unwrap();

        let info = CertificateInspector::default().inspect(&path).unwrap();
        assert_eq!(info.domain, "example.com");
        assert_eq!(info.days_remaining, 90);
        assert!(info.not_before < info.not_after);
        assert!(!info.is_expired());
    }

    #[test]
    fn test_inspect_uses_injected_clock() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fullchain.pem");
        std::fs::write(&path, mint(&["example.com"], 90)).unwrap();

        let inspector = CertificateInspector::default();
        let info = inspector.inspect(&path).unwrap();

        let later = CertificateInspector::new(Arc::new(FixedClock::new(
            info.not_after + Duration::days(3),
        )));
        let expired = later.inspect(&path).unwrap();
        assert_eq!(expired.days_remaining, -3);
        assert!(expired.is_expired());
    }

    #[test]
    fn test_inspect_missing_file() {
        let dir = tempdir().unwrap();
        let err = CertificateInspector::default()
            .inspect(&dir.path().join("fullchain.pem"))
            .unwrap_err();
        assert!(matches!(err, InspectError::NotFound { .. }));
    }

    #[test]
    fn test_inspect_garbage_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fullchain.pem");
        std::fs::write(&path, "not a certificate").unwrap();

        let err = CertificateInspector::default().inspect(&path).unwrap_err();
        assert!(matches!(err, InspectError::Parse { .. }));
        assert!(err.to_string().contains("fullchain.pem"));
    }

    #[test]
    fn test_inspect_rejects_key_pem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fullchain.pem");
        std::fs::write(&path, KeyPair::generate().unwrap().serialize_pem()).unwrap();

        let err = CertificateInspector::default().inspect(&path).unwrap_err();
        assert!(matches!(err, InspectError::Parse { .. }));
    }
}
