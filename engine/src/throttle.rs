//! Per-chunk pacing toward a bytes/sec ceiling.
//!
//! After each chunk the limiter compares the time the chunk actually took
//! with the time it should have taken at the ceiling, and sleeps the
//! difference. Pacing is approximate: it never speeds a slow transfer up and
//! only bounds the average rate from above.

use std::thread;
use std::time::{Duration, Instant};

/// Bytes moved per read/write cycle.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Highest ceiling a front end is expected to offer (500 MiB/s).
pub const MAX_CEILING_BPS: u64 = 500 * 1024 * 1024;

/// Ceiling used when the configured ceiling is 0.
///
/// A ceiling of 0 does not disable pacing; it substitutes this constant, so
/// "unlimited" transfers are still bounded at 1000 MiB/s.
pub const FALLBACK_CEILING_BPS: u64 = MAX_CEILING_BPS * 2;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Resolve a configured ceiling to the rate actually enforced.
pub fn effective_ceiling(limit_bps: u64) -> u64 {
    if limit_bps == 0 {
        FALLBACK_CEILING_BPS
    } else {
        limit_bps
    }
}

/// How long to sleep after a chunk of `chunk_bytes` that took `elapsed`.
///
/// `limit_bps` must already be effective (non-zero).
pub fn pacing_delay(chunk_bytes: usize, limit_bps: u64, elapsed: Duration) -> Duration {
    let target = Duration::from_secs_f64(chunk_bytes as f64 / limit_bps as f64);
    target.saturating_sub(elapsed)
}

/// Convert a bytes/sec figure to MiB/s.
pub fn bps_to_mbps(bps: f64) -> f64 {
    bps / BYTES_PER_MIB
}

/// Convert MiB/s to bytes/sec.
pub fn mbps_to_bps(mbps: u64) -> u64 {
    mbps.saturating_mul(1024 * 1024)
}

/// Paces one task's byte stream.
///
/// Create one per task: the throughput sample is cumulative since creation.
#[derive(Debug)]
pub struct RateLimiter {
    limit_bps: u64,
    started: Instant,
    bytes_total: u64,
}

impl RateLimiter {
    pub fn new(limit_bps: u64) -> Self {
        RateLimiter {
            limit_bps: effective_ceiling(limit_bps),
            started: Instant::now(),
            bytes_total: 0,
        }
    }

    /// Enforced ceiling in bytes/sec (never 0).
    pub fn limit_bps(&self) -> u64 {
        self.limit_bps
    }

    /// Bytes accounted so far.
    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }

    /// Account for one chunk whose read+write began at `chunk_started`,
    /// sleeping if it went faster than the ceiling allows.
    ///
    /// Returns the throughput sample in MiB/s: cumulative bytes over time
    /// since the limiter was created.
    pub fn pace(&mut self, chunk_bytes: usize, chunk_started: Instant) -> f64 {
        let delay = pacing_delay(chunk_bytes, self.limit_bps, chunk_started.elapsed());
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        self.bytes_total += chunk_bytes as u64;
        self.throughput_mbps()
    }

    /// Average throughput since creation, in MiB/s.
    pub fn throughput_mbps(&self) -> f64 {
        let secs = self.started.elapsed().as_secs_f64();
        if secs > 0.0 {
            bps_to_mbps(self.bytes_total as f64 / secs)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ceiling_uses_fallback() {
        assert_eq!(effective_ceiling(0), FALLBACK_CEILING_BPS);
        assert_eq!(effective_ceiling(1234), 1234);
        assert_eq!(RateLimiter::new(0).limit_bps(), 1000 * 1024 * 1024);
    }

    #[test]
    fn test_pacing_delay_sleeps_difference() {
        // 1 MiB at 1 MiB/s should take one second.
        let delay = pacing_delay(CHUNK_SIZE, 1024 * 1024, Duration::from_millis(250));
        assert_eq!(delay, Duration::from_millis(750));
    }

    #[test]
    fn test_pacing_delay_zero_when_slower_than_ceiling() {
        let delay = pacing_delay(CHUNK_SIZE, 1024 * 1024, Duration::from_secs(2));
        assert!(delay.is_zero());
    }

    #[test]
    fn test_fallback_still_paces_fast_chunks() {
        // Even "unlimited" mode asks for ~1ms per MiB.
        let delay = pacing_delay(CHUNK_SIZE, FALLBACK_CEILING_BPS, Duration::ZERO);
        assert!(delay >= Duration::from_micros(900));
        assert!(delay <= Duration::from_micros(1100));
    }

    #[test]
    fn test_rate_limiter_bounds_throughput() {
        // 4 chunks of 64 KiB at 1 MiB/s: at least 250ms in total.
        let chunk = 64 * 1024;
        let mut limiter = RateLimiter::new(1024 * 1024);
        let start = Instant::now();
        let mut sample = 0.0;
        for _ in 0..4 {
            sample = limiter.pace(chunk, Instant::now());
        }
        assert!(start.elapsed() >= Duration::from_millis(245));
        assert_eq!(limiter.bytes_total(), 4 * chunk as u64);
        // Sample is cumulative and cannot exceed the ceiling by much.
        assert!(sample > 0.0);
        assert!(sample <= 1.1, "throughput sample {} MiB/s above ceiling", sample);
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(mbps_to_bps(5), 5 * 1024 * 1024);
        assert!((bps_to_mbps(2.0 * 1024.0 * 1024.0) - 2.0).abs() < f64::EPSILON);
    }
}
