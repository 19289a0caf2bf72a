//! Metrics emitted by the cache engine
//!
//! Everything carries a `cache` label holding the key prefix of the emitting instance.
//!
//! - `cache_reads_total{source}` - one per read, labelled with the [`CacheSource`]
//! - `cache_loader_invoked_total` - reads that called the loader inline
//! - `cache_errors_total{reason}` - store failures, corrupted entries, full rebuild pool
//! - `cache_rebuilds_total{outcome}` - background rebuild results
//! - `cache_rebuild_duration_ms{outcome}` - histogram of background rebuild wall time
//! - `cache_rebuild_slots_available` - gauge of free rebuild slots, sampled when an expired
//!   envelope is found

use crate::{CacheResult, CacheSource};
use common_metrics::{gauge, histogram, inc};
use std::time::Duration;

pub const CACHE_READS_COUNTER: &str = "cache_reads_total";
pub const CACHE_LOADER_INVOKED_COUNTER: &str = "cache_loader_invoked_total";
pub const CACHE_ERRORS_COUNTER: &str = "cache_errors_total";
pub const CACHE_REBUILDS_COUNTER: &str = "cache_rebuilds_total";
pub const CACHE_REBUILD_DURATION: &str = "cache_rebuild_duration_ms";
pub const CACHE_REBUILD_SLOTS_GAUGE: &str = "cache_rebuild_slots_available";

/// How a background rebuild ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// A fresh envelope was written
    Refreshed,
    /// The loader reported the record gone; the envelope was deleted
    Removed,
    /// Loader or store failure; the stale envelope was left in place
    Failed,
    Panicked,
}

impl RebuildOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebuildOutcome::Refreshed => "refreshed",
            RebuildOutcome::Removed => "removed",
            RebuildOutcome::Failed => "failed",
            RebuildOutcome::Panicked => "panicked",
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CacheMetrics {
    cache: String,
}

impl CacheMetrics {
    pub(crate) fn new(cache: &str) -> Self {
        Self {
            cache: cache.to_string(),
        }
    }

    fn labels(&self) -> Vec<(String, String)> {
        vec![("cache".to_string(), self.cache.clone())]
    }

    pub(crate) fn observe<V>(&self, result: &CacheResult<V>) {
        self.read(result.source);
        if result.invoked_loader() {
            inc(CACHE_LOADER_INVOKED_COUNTER, &self.labels(), 1);
        }
    }

    pub(crate) fn read(&self, source: CacheSource) {
        let mut labels = self.labels();
        labels.push(("source".to_string(), source.to_string()));
        inc(CACHE_READS_COUNTER, &labels, 1);
    }

    pub(crate) fn error(&self, reason: &str) {
        let mut labels = self.labels();
        labels.push(("reason".to_string(), reason.to_string()));
        inc(CACHE_ERRORS_COUNTER, &labels, 1);
    }

    pub(crate) fn rebuild(&self, outcome: RebuildOutcome, elapsed: Duration) {
        let mut labels = self.labels();
        labels.push(("outcome".to_string(), outcome.as_str().to_string()));
        inc(CACHE_REBUILDS_COUNTER, &labels, 1);
        histogram(
            CACHE_REBUILD_DURATION,
            &labels,
            elapsed.as_secs_f64() * 1000.0,
        );
    }

    pub(crate) fn rebuild_slots(&self, available: usize) {
        gauge(CACHE_REBUILD_SLOTS_GAUGE, &self.labels(), available as f64);
    }
}
