//! Per-IP verdict cache
//!
//! Bounded memoization of admission verdicts so repeat visitors skip the
//! database. Entries live for the process lifetime; there is no eviction and
//! no TTL. Once the capacity is reached new keys are silently dropped and
//! those clients are recomputed on every request — efficacy degrades
//! gracefully instead of thrashing an eviction policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::geo::Verdict;

/// Default hard cap on distinct cached IPs
pub const DEFAULT_CAPACITY: usize = 1000;

/// Bounded concurrent map from client IP to last-known verdict
pub struct DecisionCache {
    entries: RwLock<HashMap<String, Verdict>>,
    capacity: usize,
    lookups: AtomicU64,
    hits: AtomicU64,
}

impl DecisionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            lookups: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Look up a cached verdict; shared lock
    pub fn get(&self, ip: &str) -> Option<Verdict> {
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let entries = self.entries.read();
        let verdict = entries.get(ip).cloned();
        if verdict.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        verdict
    }

    /// Store a verdict; exclusive lock.
    ///
    /// At capacity, new keys are dropped rather than evicting existing
    /// entries. Updating a key that is already present does not grow the map
    /// and is always accepted.
    pub fn put(&self, ip: &str, verdict: Verdict) {
        let mut entries = self.entries.write();

        if entries.len() >= self.capacity && !entries.contains_key(ip) {
            debug!(ip = %ip, capacity = self.capacity, "verdict cache full, entry dropped");
            return;
        }

        entries.insert(ip.to_string(), verdict);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fraction of lookups answered from the cache
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.lookups.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64
        }
    }
}
