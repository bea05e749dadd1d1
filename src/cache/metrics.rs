//! Cache Metrics
//!
//! Event names reported by the cache and an in-process sink that keeps
//! them as atomic counters.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::domain::ports::MetricsSink;

/// Observation: bytes served from the disk tier
pub const CACHE_READ_FILE: &str = "CACHE_READ_FILE";

/// Observation: bytes served from the memory tier
pub const CACHE_READ_MEMORY: &str = "CACHE_READ_MEMORY";

/// Counter: entry expired, refresh triggered
pub const CACHE_TOO_OLD: &str = "CACHE_TOO_OLD";

/// Counter: entry within its TTL
pub const CACHE_OK: &str = "CACHE_OK";

/// Atomic counters for the cache's own events
#[derive(Debug, Default)]
pub struct CacheMetrics {
    file_reads: AtomicU64,
    file_read_bytes: AtomicU64,
    memory_reads: AtomicU64,
    memory_read_bytes: AtomicU64,
    too_old: AtomicU64,
    ok: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_reads(&self) -> u64 {
        self.file_reads.load(Ordering::Relaxed)
    }

    pub fn memory_reads(&self) -> u64 {
        self.memory_reads.load(Ordering::Relaxed)
    }

    pub fn too_old(&self) -> u64 {
        self.too_old.load(Ordering::Relaxed)
    }

    pub fn ok(&self) -> u64 {
        self.ok.load(Ordering::Relaxed)
    }

    /// Fraction of reads served from memory
    pub fn memory_hit_ratio(&self) -> f64 {
        let memory = self.memory_reads() as f64;
        let total = memory + self.file_reads() as f64;
        if total == 0.0 {
            0.0
        } else {
            memory / total
        }
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            file_reads: self.file_reads(),
            file_read_bytes: self.file_read_bytes.load(Ordering::Relaxed),
            memory_reads: self.memory_reads(),
            memory_read_bytes: self.memory_read_bytes.load(Ordering::Relaxed),
            too_old: self.too_old(),
            ok: self.ok(),
            memory_hit_ratio: self.memory_hit_ratio(),
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.file_reads.store(0, Ordering::Relaxed);
        self.file_read_bytes.store(0, Ordering::Relaxed);
        self.memory_reads.store(0, Ordering::Relaxed);
        self.memory_read_bytes.store(0, Ordering::Relaxed);
        self.too_old.store(0, Ordering::Relaxed);
        self.ok.store(0, Ordering::Relaxed);
    }
}

impl MetricsSink for CacheMetrics {
    fn observe(&self, name: &str, value: f64) {
        let bytes = value.max(0.0) as u64;
        match name {
            CACHE_READ_FILE => {
                self.file_reads.fetch_add(1, Ordering::Relaxed);
                self.file_read_bytes.fetch_add(bytes, Ordering::Relaxed);
            }
            CACHE_READ_MEMORY => {
                self.memory_reads.fetch_add(1, Ordering::Relaxed);
                self.memory_read_bytes.fetch_add(bytes, Ordering::Relaxed);
            }
            other => trace!(event = other, "Ignoring unknown observation"),
        }
    }

    fn increment(&self, name: &str) {
        match name {
            CACHE_TOO_OLD => self.too_old.fetch_add(1, Ordering::Relaxed),
            CACHE_OK => self.ok.fetch_add(1, Ordering::Relaxed),
            other => {
                trace!(event = other, "Ignoring unknown counter");
                return;
            }
        };
    }
}

/// Snapshot of all cache metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub file_reads: u64,
    pub file_read_bytes: u64,
    pub memory_reads: u64,
    pub memory_read_bytes: u64,
    pub too_old: u64,
    pub ok: u64,
    pub memory_hit_ratio: f64,
}

// =============================================================================
// Tests
// =============================================================================
