//! Cache - Two-Tier Store with Single-Flight Fills
//!
//! Ties the pieces together: keys are normalized and hashed, the coordinator
//! decides who fills, the disk store persists, and the freshness checker
//! validates every read.
//!
//! # Read path
//!
//! ```text
//! get(key) ─▶ known? ──no──▶ Error::NotFound
//!               │yes
//!               ▼
//!        ensure_fresh (mtime + TTL, may refresh)
//!               │
//!        memory tier? ──no──▶ stream over backing file            (CACHE_READ_FILE)
//!               │yes
//!               ▼
//!        bytes mirror the file (size + mtime)?
//!               │yes ──▶ stream over Bytes                        (CACHE_READ_MEMORY)
//!               │no
//!               ▼
//!        reload from file, or demote to disk if it outgrew the threshold
//! ```
//!
//! # Fill path
//!
//! ```text
//! has(key) ─▶ Lookup::Fill(permit) ─▶ put(key, permit, reader, len)
//!    len <= threshold: buffer (at most threshold + 1 bytes), write file,
//!                      complete(permit, Some(bytes))
//!    len >  threshold: stream to file,     complete(permit, None)
//!    any error:        permit dropped, waiters wake and may retry
//! ```

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, error, info, warn};

use super::coordinator::{Coordinator, FillPermit, Lookup};
use super::entry::{CacheTier, EntryInfo, KnownEntry};
use super::freshness::{Freshness, FreshnessChecker};
use super::key::CacheKey;
use super::metrics::{CACHE_READ_FILE, CACHE_READ_MEMORY};
use super::policy::TtlPolicy;
use super::reader::CacheReader;
use super::store::DiskStore;
use crate::config::CacheConfig;
use crate::domain::ports::{MetricsSink, RemoteFetcher};
use crate::error::{Error, Result};

/// Two-tier cache
pub struct Cache {
    store: DiskStore,
    coordinator: Coordinator,
    freshness: FreshnessChecker,
    max_in_memory_item_size: u64,
    metrics: Arc<dyn MetricsSink>,
}

impl Cache {
    /// Open the cache folder and build the known-set from the files in it.
    ///
    /// File contents are not read; entries start in the disk tier.
    pub fn create(
        config: &CacheConfig,
        fetcher: Arc<dyn RemoteFetcher>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self> {
        let policy = TtlPolicy::from_config(config)?;
        let store = DiskStore::new(&config.cache_folder)?;
        let coordinator = Coordinator::with_known(store.scan()?);

        debug!(
            folder = %config.cache_folder.display(),
            known = coordinator.known_len(),
            rules = policy.rules().len(),
            max_in_memory_item_size = config.max_in_memory_item_size,
            "Cache created"
        );

        Ok(Self {
            store,
            coordinator,
            freshness: FreshnessChecker::new(policy, fetcher, Arc::clone(&metrics)),
            max_in_memory_item_size: config.max_in_memory_item_size,
            metrics,
        })
    }

    /// Whether `key` is cached.
    ///
    /// Blocks while another caller fills the same key. Returns
    /// [`Lookup::Fill`] when this caller must fill it; the permit must then
    /// be passed to [`put`](Self::put) (or dropped, if the fill is given up).
    pub async fn has(&self, key: &str) -> Result<Lookup> {
        let key = CacheKey::parse(key)?;
        Ok(self.coordinator.acquire_or_wait(key.identifier()).await)
    }

    /// Stream the cached content of `key`, refreshing it first if its TTL expired
    pub async fn get(&self, key: &str) -> Result<CacheReader> {
        let key = CacheKey::parse(key)?;
        let identifier = key.identifier();
        debug!(requested = key.original(), identifier, "Cache lookup");

        self.known_entry(identifier)?;

        let path = self.store.path_for(identifier);
        let freshness = self
            .freshness
            .ensure_fresh(&path, key.normalized(), key.original())
            .await?;

        // Look again: a concurrent refresh may have replaced the file or the entry
        let entry = self.known_entry(identifier)?;
        let Some(content) = entry.content() else {
            debug!(identifier, "Cache item known but not in memory, reading from file");
            return self.read_file(identifier).await;
        };

        match freshness {
            Freshness::Fresh { size, modified, .. } if entry.mirrors(size, modified) => {
                self.metrics.observe(CACHE_READ_MEMORY, content.len() as f64);
                Ok(CacheReader::memory(content.clone()))
            }
            _ => self.resync(identifier).await,
        }
    }

    fn known_entry(&self, identifier: &str) -> Result<KnownEntry> {
        self.coordinator.known(identifier).ok_or_else(|| {
            debug!(identifier, "Cache doesn't know key");
            Error::NotFound {
                identifier: identifier.to_string(),
            }
        })
    }

    async fn read_file(&self, identifier: &str) -> Result<CacheReader> {
        let (file, size, _) = self.store.open(identifier).await.map_err(|e| {
            error!(identifier, error = %e, "Error reading cached file");
            e
        })?;
        self.metrics.observe(CACHE_READ_FILE, size as f64);
        Ok(CacheReader::file(file, size))
    }

    /// Bring a memory-tier entry back in line with its backing file after the
    /// file changed (refresh or out-of-band write).
    ///
    /// The file is served from the opened handle, so size, mtime and bytes all
    /// describe the same file even if it is replaced again meanwhile.
    async fn resync(&self, identifier: &str) -> Result<CacheReader> {
        let (mut file, size, modified) = self.store.open(identifier).await.map_err(|e| {
            error!(identifier, error = %e, "Error reading cached file");
            e
        })?;

        if size > self.max_in_memory_item_size {
            self.coordinator.demote(identifier);
            info!(identifier, size, "Backing file outgrew memory tier, demoted to disk");
            self.metrics.observe(CACHE_READ_FILE, size as f64);
            return Ok(CacheReader::file(file, size));
        }

        let mut buffer = Vec::with_capacity(size as usize);
        file.read_to_end(&mut buffer).await?;
        let content = Bytes::from(buffer);
        self.coordinator
            .reload(identifier, content.clone(), SystemTime::now(), modified);
        debug!(identifier, size = content.len(), "Reloaded changed entry into memory");

        self.metrics.observe(CACHE_READ_MEMORY, content.len() as f64);
        Ok(CacheReader::memory(content))
    }

    /// Fill `key` with `content`, consuming the permit obtained from [`has`](Self::has).
    ///
    /// Items of at most `max_in_memory_item_size` bytes are buffered and kept
    /// in memory as well as on disk; larger items are streamed to disk only.
    /// Buffering stops at the threshold even if `content_length` understates
    /// the stream. On any error the permit is released without recording an
    /// entry.
    pub async fn put<R>(
        &self,
        key: &str,
        permit: FillPermit,
        mut content: R,
        content_length: u64,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let key = CacheKey::parse(key)?;
        let identifier = key.identifier();
        if permit.identifier() != identifier {
            return Err(Error::PermitMismatch {
                expected: identifier.to_string(),
                actual: permit.identifier().to_string(),
            });
        }

        if content_length > self.max_in_memory_item_size {
            return self.fill_disk(identifier, permit, &mut content).await;
        }

        let limit = self.max_in_memory_item_size.saturating_add(1);
        let mut buffer = Vec::with_capacity(content_length as usize);
        (&mut content).take(limit).read_to_end(&mut buffer).await?;

        if buffer.len() as u64 > self.max_in_memory_item_size {
            warn!(
                identifier,
                declared = content_length,
                "Content longer than declared, streaming to disk"
            );
            let mut rest = Cursor::new(buffer).chain(content);
            return self.fill_disk(identifier, permit, &mut rest).await;
        }

        let buffer = Bytes::from(buffer);
        self.store.write_bytes(identifier, &buffer).await?;

        let now = SystemTime::now();
        let entry = match self.store.stat(identifier).await {
            Ok((_, modified)) => KnownEntry::filled(Some(buffer.clone()), now).with_synced_mtime(modified),
            Err(e) => {
                warn!(identifier, error = %e, "Cannot stat written file, keeping entry on disk only");
                KnownEntry::filled(None, now)
            }
        };
        debug!(identifier, size = buffer.len(), tier = %entry.tier(), "Added entry to cache");
        permit.complete(entry);

        Ok(())
    }

    async fn fill_disk<R>(&self, identifier: &str, permit: FillPermit, content: &mut R) -> Result<()>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let written = self.store.write_stream(identifier, content).await?;
        debug!(identifier, size = written, "Added disk-only entry to cache");
        permit.complete(KnownEntry::filled(None, SystemTime::now()));
        Ok(())
    }

    /// Backing file of `key`, for fetchers that overwrite it on refresh
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let key = CacheKey::parse(key)?;
        Ok(self.store.path_for(key.identifier()))
    }

    /// Known entries with their on-disk size and mtime
    pub async fn entries(&self) -> Vec<EntryInfo> {
        let known = self.coordinator.known_entries();
        let stats = join_all(known.iter().map(|(identifier, _)| self.store.stat(identifier))).await;

        known
            .into_iter()
            .zip(stats)
            .map(|((identifier, entry), stat)| {
                let (size, modified) = match stat {
                    Ok((size, modified)) => (Some(size), Some(DateTime::<Utc>::from(modified))),
                    Err(e) => {
                        warn!(identifier = %identifier, error = %e, "Known entry has no backing file");
                        (None, None)
                    }
                };
                EntryInfo {
                    tier: entry.tier(),
                    identifier,
                    size,
                    modified,
                }
            })
            .collect()
    }

    /// Tier currently holding `key`, if known
    pub fn tier_of(&self, key: &str) -> Result<Option<CacheTier>> {
        let key = CacheKey::parse(key)?;
        Ok(self.coordinator.known(key.identifier()).map(|e| e.tier()))
    }

    /// Number of known entries
    pub fn len(&self) -> usize {
        self.coordinator.known_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn store(&self) -> &DiskStore {
        &self.store
    }

    pub fn policy(&self) -> &TtlPolicy {
        self.freshness.policy()
    }
}

// =============================================================================
// Tests
// =============================================================================
