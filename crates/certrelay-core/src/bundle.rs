//! Bundle builder: package the key and full chain into one verified zip archive.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::BuildError;

pub const DEFAULT_KEY_FILE: &str = "privkey.pem";
pub const DEFAULT_CHAIN_FILE: &str = "fullchain.pem";

/// A packaged certificate archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the archive bytes.
    pub sha256: String,
    /// Entry names in archive order.
    pub entries: Vec<String>,
}

/// `ssl_cert_<domain>_<YYYYmmdd_HHMMSS>.zip`
pub fn bundle_file_name(domain: &str, timestamp: DateTime<Utc>) -> String {
    format!("ssl_cert_{}_{}.zip", domain, timestamp.format("%Y%m%d_%H%M%S"))
}

/// Packages certificate material. Stateless apart from the file names.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    key_file: String,
    chain_file: String,
}

impl Default for BundleBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_FILE, DEFAULT_CHAIN_FILE)
    }
}

impl BundleBuilder {
    pub fn new(key_file: impl Into<String>, chain_file: impl Into<String>) -> Self {
        Self {
            key_file: key_file.into(),
            chain_file: chain_file.into(),
        }
    }

    /// Files that must exist in `cert_dir` before packaging.
    pub fn required_files(&self, cert_dir: &Path) -> [PathBuf; 2] {
        [cert_dir.join(&self.key_file), cert_dir.join(&self.chain_file)]
    }

    /// Build and verify the archive for `domain` in `output_dir`.
    ///
    /// An archive with the same name (same domain, same second) is replaced.
    pub fn build(
        &self,
        cert_dir: &Path,
        output_dir: &Path,
        domain: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Bundle, BuildError> {
        let sources = self.required_files(cert_dir);
        for source in &sources {
            if !source.is_file() {
                return Err(BuildError::MissingFile {
                    path: source.clone(),
                });
            }
        }

        std::fs::create_dir_all(output_dir).map_err(|e| BuildError::Io {
            path: output_dir.to_path_buf(),
            source: e,
        })?;

        let file_name = bundle_file_name(domain, timestamp);
        let path = output_dir.join(&file_name);
        let expected = [self.key_file.as_str(), self.chain_file.as_str()];

        let entries = package(&path, &sources, &expected)?;

        let (size_bytes, sha256) = digest_file(&path)?;
        if size_bytes == 0 {
            remove_partial(&path);
            return Err(BuildError::Corrupt {
                path,
                reason: "archive is empty".to_string(),
            });
        }

        info!(
            domain = %domain,
            path = %path.display(),
            size_bytes = size_bytes,
            sha256 = %sha256,
            "Certificate bundle created"
        );

        Ok(Bundle {
            path,
            file_name,
            size_bytes,
            sha256,
            entries,
        })
    }
}

/// Write then verify the archive at `path`, removing it if either step fails.
fn package(path: &Path, sources: &[PathBuf], names: &[&str]) -> Result<Vec<String>, BuildError> {
    let result = write_archive(path, sources, names).and_then(|()| verify_archive(path, names));
    if result.is_err() {
        remove_partial(path);
    }
    result
}

fn write_archive(path: &Path, sources: &[PathBuf], names: &[&str]) -> Result<(), BuildError> {
    let archive_err = |reason: String| BuildError::Archive {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::create(path).map_err(|e| BuildError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (source, name) in sources.iter().zip(names) {
        let data = std::fs::read(source).map_err(|e| BuildError::Io {
            path: source.clone(),
            source: e,
        })?;
        zip.start_file(*name, options)
            .map_err(|e| archive_err(format!("failed to start entry {name}: {e}")))?;
        zip.write_all(&data)
            .map_err(|e| archive_err(format!("failed to write entry {name}: {e}")))?;
        debug!(entry = %name, bytes = data.len(), "Added archive entry");
    }

    let mut file = zip
        .finish()
        .map_err(|e| archive_err(format!("failed to finish archive: {e}")))?;
    file.flush().map_err(|e| BuildError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Reopen the archive and read every entry to the end, which checks its CRC.
fn verify_archive(path: &Path, expected: &[&str]) -> Result<Vec<String>, BuildError> {
    let corrupt = |reason: String| BuildError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let file = File::open(path).map_err(|e| BuildError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| corrupt(format!("unreadable: {e}")))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| corrupt(format!("entry {i}: {e}")))?;
        let name = entry.name().to_string();
        io::copy(&mut entry, &mut io::sink())
            .map_err(|e| corrupt(format!("entry {name} failed integrity check: {e}")))?;
        entries.push(name);
    }

    for name in expected {
        if !entries.iter().any(|entry| entry == name) {
            return Err(corrupt(format!("missing entry {name}")));
        }
    }
    Ok(entries)
}

fn digest_file(path: &Path) -> Result<(u64, String), BuildError> {
    let io_err = |e: io::Error| BuildError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = File::open(path).map_err(io_err)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).map_err(io_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((size, hex::encode(hasher.finalize())))
}

fn remove_partial(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed partial archive"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove partial archive"),
    }
}
