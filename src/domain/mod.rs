//! Domain layer
//!
//! Ports describing the collaborators of the cache core.

pub mod ports;

pub use ports::{MetricsSink, NoopMetricsSink, RemoteFetcher};
