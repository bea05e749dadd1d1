//! tiercache - Caching layer of a transparent caching proxy
//!
//! Decides whether a request is served from a stored copy, fetched anew, or
//! made to wait on a single in-flight fetch.
//!
//! # Architecture
//!
//! ```text
//! client ─▶ transport ─▶ Cache::has / get / put ─▶ RemoteFetcher ─▶ origin
//!                              │
//!                     memory tier + disk tier
//! ```
//!
//! # Features
//!
//! - Two tiers: small items in memory and on disk, large items on disk only
//! - Content-addressed files (`sha256(normalized key)`), inspectable with
//!   ordinary file tools
//! - Single-flight fills: one filler per key, unrelated keys in parallel
//! - Per-pattern TTL rules, first match wins, freshness from file mtime
//!
//! # Modules
//!
//! - [`adapters`] - HTTP fetcher and Prometheus metrics sink
//! - [`cache`] - The cache core
//! - [`config`] - Configuration and duration parsing
//! - [`domain`] - Ports for external collaborators
//! - [`error`] - Error types

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;

// Re-export commonly used types
pub use cache::{Cache, CacheReader, CacheTier, FillPermit, Lookup};
pub use config::{CacheConfig, TtlRuleConfig};
pub use domain::ports::{MetricsSink, NoopMetricsSink, RemoteFetcher};
pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
