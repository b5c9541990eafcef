//! Fetch statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Outcome of an install, as returned by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Generation that was populated.
    pub generation: String,
    /// Number of manifest entries stored.
    pub entries: usize,
    /// Total body bytes stored.
    pub total_bytes: u64,
    /// Time taken to fetch and store the manifest.
    pub elapsed: Duration,
}

/// Outcome of an activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Generations that were deleted.
    pub deleted: Vec<String>,
    /// Generations whose deletion failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl ActivationReport {
    /// Returns true if every stale generation was removed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Requests answered from the cache.
    pub hits: u64,
    /// Requests forwarded to the network.
    pub misses: u64,
    /// Forwarded requests that failed at the network layer.
    pub network_errors: u64,
}

impl StatsSnapshot {
    /// Share of requests answered from the cache, between 0 and 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters updated by concurrent fetch handlers.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    network_errors: AtomicU64,
}

impl CacheStats {
    /// Creates zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            network_errors: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_network_error(&self) {
        self.network_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            network_errors: self.network_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_network_error();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.network_errors, 1);
    }

    #[test]
    fn hit_ratio_handles_no_traffic() {
        assert!(StatsSnapshot::default().hit_ratio().abs() < f64::EPSILON);
    }

    #[test]
    fn hit_ratio_fraction() {
        let snapshot = StatsSnapshot {
            hits: 3,
            misses: 1,
            network_errors: 0,
        };
        assert!((snapshot.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn counters_are_shared_across_threads() {
        let stats = std::sync::Arc::new(CacheStats::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = std::sync::Arc::clone(&stats);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        stats.record_miss();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stats.snapshot().misses, 400);
    }

    #[test]
    fn activation_report_cleanliness() {
        let mut report = ActivationReport::default();
        assert!(report.is_clean());
        report.failed.push(("v0".into(), "busy".into()));
        assert!(!report.is_clean());
    }
}
