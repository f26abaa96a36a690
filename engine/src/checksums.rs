//! Checksum and verification functionality.
//!
//! This module provides:
//! - Multiple checksum algorithms (MD5, SHA-256, BLAKE3)
//! - Streaming file checksum computation in 64 KiB blocks
//! - `digest`, which never fails: an unreadable file yields a sentinel that
//!   compares unequal to everything, so verification treats it as a mismatch

use crate::error::TransferError;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Read block size for hashing.
pub const DIGEST_BLOCK_SIZE: usize = 64 * 1024;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumAlgorithm {
    /// MD5 (fast, adequate for accidental corruption)
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    #[default]
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl FromStr for ChecksumAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Self::Md5),
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(format!(
                "Invalid hash algorithm '{}'. Must be 'md5', 'sha256', or 'blake3'",
                s
            )),
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Lowercase hex representation
    pub fn hex(&self) -> &str {
        &self.hex
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Outcome of hashing a file for verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileDigest {
    Computed(ChecksumValue),
    /// The file could not be opened or read to completion
    Unreadable,
}

impl FileDigest {
    /// True only when both sides were computed with the same algorithm and agree.
    pub fn matches(&self, other: &FileDigest) -> bool {
        match (self, other) {
            (FileDigest::Computed(a), FileDigest::Computed(b)) => {
                a.algorithm() == b.algorithm() && a.hex() == b.hex()
            }
            _ => false,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, FileDigest::Computed(_))
    }

    /// Hex string, or `None` for the unreadable sentinel.
    pub fn hex(&self) -> Option<&str> {
        match self {
            FileDigest::Computed(v) => Some(v.hex()),
            FileDigest::Unreadable => None,
        }
    }
}

/// Streaming hash accumulator.
enum Hasher {
    Md5(md5::Context),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Hasher::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => {
                use sha2::Digest;
                Hasher::Sha256(sha2::Sha256::new())
            }
            ChecksumAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(ctx) => ctx.consume(data),
            Hasher::Sha256(h) => {
                use sha2::Digest;
                h.update(data);
            }
            Hasher::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> ChecksumValue {
        match self {
            Hasher::Md5(ctx) => {
                ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", ctx.compute()))
            }
            Hasher::Sha256(h) => {
                use sha2::Digest;
                ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", h.finalize()))
            }
            Hasher::Blake3(h) => {
                ChecksumValue::new(ChecksumAlgorithm::Blake3, h.finalize().to_hex().to_string())
            }
        }
    }
}

/// Compute checksum of an in-memory buffer.
pub fn checksum_bytes(data: &[u8], algorithm: ChecksumAlgorithm) -> ChecksumValue {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Compute checksum for a file
///
/// # Errors
/// Returns `TransferError::ReadError` if the file cannot be opened or read.
pub fn compute_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, TransferError> {
    let read_err = |e| TransferError::ReadError {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; DIGEST_BLOCK_SIZE];

    loop {
        match file.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(read_err(e)),
        }
    }

    Ok(hasher.finalize())
}

/// Digest a file for verification. Never fails; see [`FileDigest::Unreadable`].
pub fn digest(path: &Path, algorithm: ChecksumAlgorithm) -> FileDigest {
    match compute_file_checksum(path, algorithm) {
        Ok(value) => FileDigest::Computed(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e.status_message(), "digest unavailable");
            FileDigest::Unreadable
        }
    }
}
