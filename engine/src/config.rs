//! Session configuration.

use crate::checksums::ChecksumAlgorithm;
use crate::throttle::{self, CHUNK_SIZE};

/// What the session does after a task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the queue; remaining tasks stay Pending
    #[default]
    Halt,
    /// Run the remaining tasks and report all failures at the end
    Continue,
}

/// Settings shared by every task in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Ceiling in bytes/sec; 0 selects `throttle::FALLBACK_CEILING_BPS`
    pub throughput_ceiling_bps: u64,

    /// Bytes per read/write cycle
    pub chunk_size: usize,

    /// Digest used to verify each copied file
    pub checksum_algorithm: ChecksumAlgorithm,

    pub failure_policy: FailurePolicy,
}

impl EngineConfig {
    /// Set the ceiling in MiB/s.
    pub fn with_ceiling_mbps(mut self, mbps: u64) -> Self {
        self.throughput_ceiling_bps = throttle::mbps_to_bps(mbps);
        self
    }

    pub fn with_checksum_algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.checksum_algorithm = algorithm;
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Set the chunk size. Zero is replaced by the default.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 { CHUNK_SIZE } else { chunk_size };
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            throughput_ceiling_bps: 0,
            chunk_size: CHUNK_SIZE,
            checksum_algorithm: ChecksumAlgorithm::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}
