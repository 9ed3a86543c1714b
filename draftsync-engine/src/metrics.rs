//! Save metrics.
//!
//! Lock-free counters updated inline by the queue and the pipeline.
//! When disabled in config, recording is a no-op and snapshots read as
//! zeros.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters observed across the life of one autosave instance.
#[derive(Debug, Default)]
pub struct SaveMetrics {
    enabled: bool,
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    duration_micros: AtomicU64,
}

impl SaveMetrics {
    /// Creates a metrics sink; a disabled sink records nothing.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Default::default()
        }
    }

    pub(crate) fn record_attempt(&self, retry: bool) {
        if !self.enabled {
            return;
        }
        self.total.fetch_add(1, Ordering::Relaxed);
        if retry {
            self.retries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_success(&self, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        self.duration_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self, elapsed: Duration) {
        if !self.enabled {
            return;
        }
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.duration_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        if self.enabled {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_cache_miss(&self) {
        if self.enabled {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Reads a consistent-enough copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let settled = succeeded + failed;
        let total_micros = self.duration_micros.load(Ordering::Relaxed);
        let avg_save_duration = if settled == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(total_micros / settled)
        };

        MetricsSnapshot {
            total_saves: self.total.load(Ordering::Relaxed),
            succeeded,
            failed,
            retries: self.retries.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            avg_save_duration,
        }
    }
}

/// A point-in-time copy of the save metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Transport attempts started.
    pub total_saves: u64,
    /// Attempts confirmed by the transport.
    pub succeeded: u64,
    /// Attempts that failed (including validation skips).
    pub failed: u64,
    /// Attempts whose context carried a non-zero retry count.
    pub retries: u64,
    /// Validation verdicts served from cache.
    pub cache_hits: u64,
    /// Validation verdicts that had to run.
    pub cache_misses: u64,
    /// Running mean duration of settled attempts.
    pub avg_save_duration: Duration,
}
