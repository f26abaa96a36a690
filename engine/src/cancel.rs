//! Cooperative cancellation.
//!
//! The worker polls [`CancellationToken::is_running`] before each file and
//! each chunk. A stop request is noticed at the next poll; blocking reads,
//! writes and pacing sleeps are never interrupted.

use std::sync::{Arc, Mutex, MutexGuard};

/// Shared stop flag. Clones observe and control the same flag.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    running: Arc<Mutex<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            running: Arc::new(Mutex::new(true)),
        }
    }

    /// Ask the current run to stop at its next suspension point.
    pub fn request_stop(&self) {
        *self.lock() = false;
    }

    /// False once a stop has been requested.
    pub fn is_running(&self) -> bool {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A bool cannot be left half-written; recover from poisoning.
        self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_token_starts_running() {
        assert!(CancellationToken::new().is_running());
    }

    #[test]
    fn test_stop_is_visible_to_clones() {
        let token = CancellationToken::new();
        let worker_view = token.clone();
        token.request_stop();
        assert!(!worker_view.is_running());
    }

    #[test]
    fn test_stop_from_other_thread() {
        let token = CancellationToken::new();
        let requester = token.clone();
        thread::spawn(move || requester.request_stop())
            .join()
            .expect("requester thread panicked");
        assert!(!token.is_running());
    }

    #[test]
    fn test_fresh_token_is_independent() {
        let old = CancellationToken::new();
        old.request_stop();
        let fresh = CancellationToken::new();
        assert!(fresh.is_running());
    }
}
