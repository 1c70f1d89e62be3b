//! Certificate fixtures shared by unit and integration tests.

use std::path::Path;
use std::time::{Duration, SystemTime};

use rcgen::{CertificateParams, KeyPair};

const DAY: u64 = 86_400;

/// Self-signed certificate for `domain` expiring `valid_days` from now
/// (negative for already expired). Returns `(chain_pem, key_pem)`.
///
/// An extra hour keeps `days_remaining` at exactly `valid_days`.
pub fn mint_pair(domain: &str, valid_days: i64) -> (String, String) {
    let mut params = CertificateParams::new(vec![domain.to_string()]).unwrap();
    let now = SystemTime::now();
    params.not_before = (now - Duration::from_secs(400 * DAY)).into();
    params.not_after = if valid_days >= 0 {
        (now + Duration::from_secs(valid_days as u64 * DAY + 3_600)).into()
    } else {
        (now - Duration::from_secs(valid_days.unsigned_abs() * DAY)).into()
    };
    let key = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// Write `privkey.pem` and `fullchain.pem` for `domain` into `dir`.
pub fn write_certificate(dir: &Path, domain: &str, valid_days: i64) {
    let (chain, key) = mint_pair(domain, valid_days);
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("privkey.pem"), key).unwrap();
    std::fs::write(dir.join("fullchain.pem"), chain).unwrap();
}
