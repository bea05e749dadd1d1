//! Domain Ports (Port/Adapter Pattern)
//!
//! Collaborators the cache core calls but does not own. Infrastructure
//! adapters implement these traits.
//!
//! ```text
//!   Cache ──▶ RemoteFetcher   (refresh an expired entry)
//!         ──▶ MetricsSink     (named counters and observations)
//! ```

use async_trait::async_trait;

use crate::error::Result;

// =============================================================================
// Remote Fetch Port
// =============================================================================

/// Re-fetches a resource from its origin.
///
/// Called by the freshness checker when an entry's TTL has expired. The
/// implementation is expected to overwrite the entry's backing file; the cache
/// observes the new content and mtime on its next read. Retries, backoff and
/// connection handling belong to the implementation.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Refresh the resource requested as `original_key` (scheme included)
    async fn fetch_remote(&self, original_key: &str) -> Result<()>;
}

// =============================================================================
// Metrics Port
// =============================================================================

/// Fire-and-forget sink for cache events
pub trait MetricsSink: Send + Sync {
    /// Record a value (byte sizes) under `name`
    fn observe(&self, name: &str, value: f64);

    /// Increment the counter `name`
    fn increment(&self, name: &str);
}

/// Sink that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn observe(&self, _name: &str, _value: f64) {}

    fn increment(&self, _name: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct AlwaysFails;

    #[async_trait]
    impl RemoteFetcher for AlwaysFails {
        async fn fetch_remote(&self, original_key: &str) -> Result<()> {
            Err(crate::error::Error::InvalidKey(original_key.to_string()))
        }
    }

    #[tokio::test]
    async fn test_ports_are_object_safe() {
        let fetcher: Arc<dyn RemoteFetcher> = Arc::new(AlwaysFails);
        assert!(fetcher.fetch_remote("http://a/b").await.is_err());

        let sink: Arc<dyn MetricsSink> = Arc::new(NoopMetricsSink);
        sink.increment("CACHE_OK");
        sink.observe("CACHE_READ_FILE", 10.0);
    }
}
