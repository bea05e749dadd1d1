//! Infrastructure Adapters
//!
//! Adapter implementations for the domain ports.
//!
//! ```text
//!   RemoteFetcher ◀── HttpFetcher            (reqwest)
//!   MetricsSink   ◀── PrometheusMetricsSink  (prometheus registry)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use tiercache::adapters::{HttpFetcher, PrometheusMetricsSink};
//! use tiercache::{Cache, CacheConfig};
//!
//! let config = CacheConfig::new("/var/cache/tiercache");
//! let fetcher = Arc::new(HttpFetcher::new(&config.cache_folder)?);
//! let metrics = Arc::new(PrometheusMetricsSink::new()?);
//! let cache = Cache::create(&config, fetcher, metrics.clone())?;
//! ```

mod http;
mod prometheus;

pub use self::http::HttpFetcher;
pub use self::prometheus::PrometheusMetricsSink;
