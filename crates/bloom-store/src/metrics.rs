//! Metrics hooks for Bloom filter operations
//!
//! Counters for filter lifecycle, insert/lookup latency and flush volume.
//! Recording never affects filter semantics.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use bloom_store::{BloomFilter, Metrics};
//!
//! let metrics = Arc::new(Metrics::new());
//! let filter = BloomFilter::new(1_000, 0.01)
//!     .unwrap()
//!     .with_metrics(metrics.clone());
//!
//! filter.add("alice").unwrap();
//! assert!(filter.contains("alice").unwrap());
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.elements_inserted, 1);
//! assert_eq!(snapshot.lookups_positive, 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Metrics collector for Bloom filter operations
///
/// Thread-safe counters for monitoring filter performance.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Filters created with fresh, zeroed bits
    pub filters_created: AtomicU64,
    /// Filters opened from a persisted image
    pub filters_loaded: AtomicU64,
    /// Total elements inserted across all filters
    pub elements_inserted: AtomicU64,
    /// Total lookups performed
    pub lookups_performed: AtomicU64,
    /// Total positive lookups (matches, including false positives)
    pub lookups_positive: AtomicU64,
    /// Total filter merges
    pub filters_merged: AtomicU64,
    /// Total flushes and saves
    pub flushes: AtomicU64,
    /// Total image bytes written by flushes
    pub bytes_flushed: AtomicU64,
    /// Cumulative lookup time in nanoseconds
    pub lookup_time_ns: AtomicU64,
    /// Cumulative insert time in nanoseconds
    pub insert_time_ns: AtomicU64,
    /// Cumulative flush time in nanoseconds
    pub flush_time_ns: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            filters_created: self.filters_created.load(Ordering::Relaxed),
            filters_loaded: self.filters_loaded.load(Ordering::Relaxed),
            elements_inserted: self.elements_inserted.load(Ordering::Relaxed),
            lookups_performed: self.lookups_performed.load(Ordering::Relaxed),
            lookups_positive: self.lookups_positive.load(Ordering::Relaxed),
            filters_merged: self.filters_merged.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            bytes_flushed: self.bytes_flushed.load(Ordering::Relaxed),
            avg_lookup_ns: average(&self.lookup_time_ns, &self.lookups_performed),
            avg_insert_ns: average(&self.insert_time_ns, &self.elements_inserted),
            avg_flush_ns: average(&self.flush_time_ns, &self.flushes),
        }
    }

    /// Ratio of positive lookups to total lookups
    ///
    /// Includes true positives, so this is an upper bound on the observed
    /// false positive rate.
    pub fn observed_positive_rate(&self) -> f64 {
        let total = self.lookups_performed.load(Ordering::Relaxed);
        let positive = self.lookups_positive.load(Ordering::Relaxed);
        if total > 0 {
            positive as f64 / total as f64
        } else {
            0.0
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.filters_created,
            &self.filters_loaded,
            &self.elements_inserted,
            &self.lookups_performed,
            &self.lookups_positive,
            &self.filters_merged,
            &self.flushes,
            &self.bytes_flushed,
            &self.lookup_time_ns,
            &self.insert_time_ns,
            &self.flush_time_ns,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

fn average(total_ns: &AtomicU64, count: &AtomicU64) -> u64 {
    let count = count.load(Ordering::Relaxed);
    if count > 0 {
        total_ns.load(Ordering::Relaxed) / count
    } else {
        0
    }
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Point-in-time metrics snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub filters_created: u64,
    pub filters_loaded: u64,
    pub elements_inserted: u64,
    pub lookups_performed: u64,
    pub lookups_positive: u64,
    pub filters_merged: u64,
    pub flushes: u64,
    pub bytes_flushed: u64,
    pub avg_lookup_ns: u64,
    pub avg_insert_ns: u64,
    pub avg_flush_ns: u64,
}

/// Trait for custom metrics recording implementations
///
/// Implement this trait to forward filter activity to an external metrics
/// system.
pub trait MetricsRecorder: Send + Sync {
    /// A filter was created with fresh bits
    fn record_filter_created(&self, bit_count: u64, hash_count: u32);

    /// A filter was opened from a persisted image
    fn record_filter_loaded(&self, bit_count: u64, items_added: u64);

    fn record_insert(&self, duration: Duration);

    /// `found` includes false positives
    fn record_lookup(&self, duration: Duration, found: bool);

    fn record_merge(&self);

    /// An image of `bytes` bytes was written
    fn record_flush(&self, duration: Duration, bytes: u64);
}

/// No-op metrics recorder for when metrics are disabled
#[derive(Debug, Default)]
pub struct NoOpMetrics;

impl MetricsRecorder for NoOpMetrics {
    fn record_filter_created(&self, _: u64, _: u32) {}
    fn record_filter_loaded(&self, _: u64, _: u64) {}
    fn record_insert(&self, _: Duration) {}
    fn record_lookup(&self, _: Duration, _: bool) {}
    fn record_merge(&self) {}
    fn record_flush(&self, _: Duration, _: u64) {}
}

impl MetricsRecorder for Metrics {
    fn record_filter_created(&self, _bit_count: u64, _hash_count: u32) {
        self.filters_created.fetch_add(1, Ordering::Relaxed);
    }

    fn record_filter_loaded(&self, _bit_count: u64, _items_added: u64) {
        self.filters_loaded.fetch_add(1, Ordering::Relaxed);
    }

    fn record_insert(&self, duration: Duration) {
        self.elements_inserted.fetch_add(1, Ordering::Relaxed);
        self.insert_time_ns
            .fetch_add(nanos(duration), Ordering::Relaxed);
    }

    fn record_lookup(&self, duration: Duration, found: bool) {
        self.lookups_performed.fetch_add(1, Ordering::Relaxed);
        self.lookup_time_ns
            .fetch_add(nanos(duration), Ordering::Relaxed);
        if found {
            self.lookups_positive.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_merge(&self) {
        self.filters_merged.fetch_add(1, Ordering::Relaxed);
    }

    fn record_flush(&self, duration: Duration, bytes: u64) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.bytes_flushed.fetch_add(bytes, Ordering::Relaxed);
        self.flush_time_ns
            .fetch_add(nanos(duration), Ordering::Relaxed);
    }
}
