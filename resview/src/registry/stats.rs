//! Registry counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the registry.
#[derive(Debug, Default)]
pub struct RegistryStats {
    hits: AtomicU64,
    misses: AtomicU64,
    constructions: AtomicU64,
    restored: AtomicU64,
    evictions: AtomicU64,
    consistency_failures: AtomicU64,
}

impl RegistryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_construction(&self) {
        self.constructions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_restored(&self) {
        self.restored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_consistency_failure(&self) {
        self.consistency_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> RegistryStatsSnapshot {
        RegistryStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            constructions: self.constructions.load(Ordering::Relaxed),
            restored: self.restored.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            consistency_failures: self.consistency_failures.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`RegistryStats`] at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// Repositories built by a full scan.
    pub constructions: u64,
    /// Repositories restored from the snapshot store.
    pub restored: u64,
    pub evictions: u64,
    pub consistency_failures: u64,
}

impl RegistryStatsSnapshot {
    /// Fraction of `get` calls served from the cache.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = RegistryStats::new();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert!((stats.snapshot().hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
