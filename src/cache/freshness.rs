//! Freshness Checker / Refresh Trigger
//!
//! Decides on every read whether an entry is still within its TTL, and asks
//! the remote fetcher to refresh it when it is not.
//!
//! Freshness is derived from the backing file's mtime, never from an
//! in-memory timestamp, so both tiers share one clock and out-of-band writes
//! to the folder are honoured.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::metrics::{CACHE_OK, CACHE_TOO_OLD};
use super::policy::TtlPolicy;
use crate::domain::ports::{MetricsSink, RemoteFetcher};
use crate::error::{Error, Result};

/// Outcome of a freshness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Within TTL. Carries the backing file's state as seen by the check and
    /// the instant it stays valid until (`None` if it never expires).
    Fresh {
        size: u64,
        modified: SystemTime,
        valid_until: Option<SystemTime>,
    },
    /// Expired and successfully re-fetched
    Refreshed,
}

impl Freshness {
    pub fn is_refreshed(&self) -> bool {
        matches!(self, Freshness::Refreshed)
    }
}

/// TTL evaluation plus refresh trigger
pub struct FreshnessChecker {
    policy: TtlPolicy,
    fetcher: Arc<dyn RemoteFetcher>,
    metrics: Arc<dyn MetricsSink>,
}

impl FreshnessChecker {
    pub fn new(
        policy: TtlPolicy,
        fetcher: Arc<dyn RemoteFetcher>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            policy,
            fetcher,
            metrics,
        }
    }

    pub fn policy(&self) -> &TtlPolicy {
        &self.policy
    }

    /// Validate `file_path` against the TTL for `normalized_key`, refreshing
    /// through the fetcher with `original_key` when expired
    pub async fn ensure_fresh(
        &self,
        file_path: &Path,
        normalized_key: &str,
        original_key: &str,
    ) -> Result<Freshness> {
        self.ensure_fresh_at(file_path, normalized_key, original_key, SystemTime::now())
            .await
    }

    /// [`ensure_fresh`](Self::ensure_fresh) with an explicit "now"
    pub async fn ensure_fresh_at(
        &self,
        file_path: &Path,
        normalized_key: &str,
        original_key: &str,
        now: SystemTime,
    ) -> Result<Freshness> {
        let metadata = tokio::fs::metadata(file_path).await?;
        let modified = metadata.modified()?;

        let resolved = self.policy.resolve(normalized_key);
        match resolved.rule {
            Some(rule) => debug!(
                rule,
                ttl = ?resolved.ttl,
                key = normalized_key,
                "Found matching TTL rule"
            ),
            None => debug!(ttl = ?resolved.ttl, key = normalized_key, "Using default TTL"),
        }

        let valid_until = modified.checked_add(resolved.ttl);
        let expired = matches!(valid_until, Some(until) if now > until);

        if !expired {
            let remaining = valid_until
                .and_then(|until| until.duration_since(now).ok())
                .unwrap_or(Duration::ZERO);
            debug!(
                key = normalized_key,
                valid_until = %format_valid_until(valid_until),
                ?remaining,
                "CACHE_OK"
            );
            self.metrics.increment(CACHE_OK);
            return Ok(Freshness::Fresh {
                size: metadata.len(),
                modified,
                valid_until,
            });
        }

        info!(key = normalized_key, "CACHE_TOO_OLD, refreshing from remote");
        self.metrics.increment(CACHE_TOO_OLD);

        match self.fetcher.fetch_remote(original_key).await {
            Ok(()) => Ok(Freshness::Refreshed),
            Err(e) => {
                warn!(key = original_key, error = %e, "Refresh failed, keeping stale copy");
                Err(match e {
                    fetch @ Error::Fetch { .. } => fetch,
                    other => Error::Fetch {
                        key: original_key.to_string(),
                        source: Box::new(other),
                    },
                })
            }
        }
    }
}

fn format_valid_until(valid_until: Option<SystemTime>) -> String {
    match valid_until {
        Some(until) => DateTime::<Utc>::from(until)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => "never".to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::metrics::CacheMetrics;
    use crate::cache::policy::TtlRule;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl RemoteFetcher for CountingFetcher {
        async fn fetch_remote(&self, _original_key: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(std::io::Error::other("origin unreachable").into())
            } else {
                Ok(())
            }
        }
    }

    fn make_checker(
        ttl: Duration,
        fail: bool,
    ) -> (FreshnessChecker, Arc<CountingFetcher>, Arc<CacheMetrics>) {
        let fetcher = Arc::new(CountingFetcher {
            fail,
            ..Default::default()
        });
        let metrics = Arc::new(CacheMetrics::new());
        let policy = TtlPolicy::new(
            vec![TtlRule::new("short", "^/short/", ttl).unwrap()],
            Duration::from_secs(3600),
        );
        (
            FreshnessChecker::new(policy, fetcher.clone(), metrics.clone()),
            fetcher,
            metrics,
        )
    }

    fn written_file() -> (tempfile::TempDir, std::path::PathBuf, SystemTime) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry");
        std::fs::write(&path, b"payload").unwrap();
        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
        (dir, path, mtime)
    }

    #[tokio::test]
    async fn test_fresh_before_ttl() {
        let (checker, fetcher, metrics) = make_checker(Duration::from_secs(5), false);
        let (_dir, path, written) = written_file();

        let outcome = checker
            .ensure_fresh_at(&path, "/short/a", "http:///short/a", written + Duration::from_secs(4))
            .await
            .unwrap();

        assert_matches!(
            outcome,
            Freshness::Fresh { size: 7, modified, valid_until: Some(_) } if modified == written
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.ok(), 1);
        assert_eq!(metrics.too_old(), 0);
    }

    #[tokio::test]
    async fn test_expired_triggers_one_fetch() {
        let (checker, fetcher, metrics) = make_checker(Duration::from_secs(5), false);
        let (_dir, path, written) = written_file();

        let outcome = checker
            .ensure_fresh_at(&path, "/short/a", "/short/a", written + Duration::from_secs(6))
            .await
            .unwrap();

        assert_eq!(outcome, Freshness::Refreshed);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.too_old(), 1);
        assert_eq!(metrics.ok(), 0);
    }

    #[tokio::test]
    async fn test_default_ttl_applies_without_match() {
        let (checker, fetcher, _) = make_checker(Duration::from_secs(5), false);
        let (_dir, path, written) = written_file();

        let outcome = checker
            .ensure_fresh_at(&path, "/long/a", "/long/a", written + Duration::from_secs(60))
            .await
            .unwrap();

        assert!(!outcome.is_refreshed());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_file() {
        let (checker, fetcher, _) = make_checker(Duration::from_secs(5), true);
        let (_dir, path, written) = written_file();

        let err = checker
            .ensure_fresh_at(&path, "/short/a", "https:///short/a", written + Duration::from_secs(10))
            .await
            .unwrap_err();

        assert_matches!(err, Error::Fetch { ref key, .. } if key == "https:///short/a");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let (checker, fetcher, _) = make_checker(Duration::from_secs(5), false);
        let dir = tempfile::tempdir().unwrap();

        let err = checker
            .ensure_fresh(&dir.path().join("absent"), "/short/a", "/short/a")
            .await
            .unwrap_err();

        assert_matches!(err, Error::Io(_));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
