//! Explicit randomness source
//!
//! Passed through the harness at construction so tests can run with a fixed
//! seed instead of ambient process-wide randomness.

use parking_lot::Mutex;
use std::sync::Arc;

/// Shareable, optionally seeded randomness source
#[derive(Debug, Clone)]
pub struct RandomSource {
    inner: Arc<Mutex<fastrand::Rng>>,
}

impl RandomSource {
    /// Source seeded from entropy
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(fastrand::Rng::new())),
        }
    }

    /// Deterministic source for reproducible runs
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(fastrand::Rng::with_seed(seed))),
        }
    }

    /// Uniform index into a collection of `len` elements; 0 when empty
    pub fn pick(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.inner.lock().usize(0..len)
    }

    /// Uniform value in `low..=high`
    pub fn in_range(&self, low: u64, high: u64) -> u64 {
        self.inner.lock().u64(low..=high)
    }

    /// Random ASCII-alphabetic string of the given length
    pub fn alpha_string(&self, len: usize) -> String {
        let mut rng = self.inner.lock();
        (0..len).map(|_| rng.alphabetic()).collect()
    }
}

impl Default for RandomSource {
    fn default() -> Self {
        Self::new()
    }
}
