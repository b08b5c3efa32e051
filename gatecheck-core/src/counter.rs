//! Fire-and-forget counters
//!
//! The core emits counter keys and never reads them back; the driver decides
//! what to do with the totals.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Fire-and-forget counter sink
pub trait Counters: Send + Sync {
    fn increment(&self, key: &str);
}

/// In-memory counter store with a snapshot accessor for run summaries
#[derive(Debug, Default)]
pub struct MemoryCounters {
    counts: Mutex<HashMap<String, u64>>,
}

impl MemoryCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value for one key
    pub fn get(&self, key: &str) -> u64 {
        self.counts.lock().get(key).copied().unwrap_or(0)
    }

    /// All counters, sorted by key
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .counts
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort();
        entries
    }
}

impl Counters for MemoryCounters {
    fn increment(&self, key: &str) {
        let mut counts = self.counts.lock();
        *counts.entry(key.to_string()).or_insert(0) += 1;
    }
}

/// Counter sink that drops everything
#[derive(Debug, Default)]
pub struct NoopCounters;

impl Counters for NoopCounters {
    fn increment(&self, _key: &str) {}
}
