//! Two-Tier Cache
//!
//! Memory + disk content store keyed by the SHA-256 of the normalized request
//! key, with single-flight fills and TTL-driven refresh.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                               Cache                                  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  CacheKey ──▶ Coordinator ──────────────┐                            │
//! │  (sha256)     known-set + busy markers  │                            │
//! │               (one mutex)               ▼                            │
//! │                                ┌─────────────────┐  ┌─────────────┐  │
//! │                                │ Memory tier     │  │ Disk tier   │  │
//! │                                │ Bytes <= limit  │  │ DiskStore   │  │
//! │                                └─────────────────┘  └─────────────┘  │
//! │                                         │                 │          │
//! │                       FreshnessChecker (file mtime + TtlPolicy)      │
//! │                                         │                            │
//! │                                   RemoteFetcher                      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! - An identifier is either busy or known, never both.
//! - A known identifier has a backing file; in-memory bytes, when present,
//!   equal that file's content as of the last write.
//! - There is no eviction: the folder only grows.

mod coordinator;
mod entry;
mod freshness;
mod key;
mod manager;
mod policy;
mod reader;
mod store;
pub mod metrics;

#[cfg(test)]
mod proptest;

pub use coordinator::{Coordinator, FillPermit, Lookup};
pub use entry::{CacheTier, EntryInfo, KnownEntry};
pub use freshness::{Freshness, FreshnessChecker};
pub use key::{hash_key, is_identifier, normalize_key, CacheKey, IDENTIFIER_LEN};
pub use manager::Cache;
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use policy::{ResolvedTtl, TtlPolicy, TtlRule};
pub use reader::CacheReader;
pub use store::{DiskStore, TMP_DIR_NAME, TMP_GRACE};
