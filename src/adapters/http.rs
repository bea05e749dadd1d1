//! HTTP Remote Fetch Adapter
//!
//! Implements the `RemoteFetcher` port with reqwest. The response body is
//! written through the disk store, so the backing file is replaced
//! atomically and readers of the previous file are not disturbed.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::cache::{CacheKey, DiskStore};
use crate::domain::ports::RemoteFetcher;
use crate::error::{Error, Result};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches resources over HTTP(S) and stores them in the cache folder
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    store: DiskStore,
}

impl HttpFetcher {
    /// Create a fetcher writing into `cache_folder`
    pub fn new(cache_folder: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client creation failed: {}", e)))?;
        Self::with_client(client, cache_folder)
    }

    /// Create a fetcher with a preconfigured client
    pub fn with_client(client: reqwest::Client, cache_folder: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            client,
            store: DiskStore::new(cache_folder)?,
        })
    }

    /// GET `url` and return the body
    pub async fn download(&self, url: &str) -> Result<Bytes> {
        let fetch_error = |e: reqwest::Error| Error::Fetch {
            key: url.to_string(),
            source: Box::new(e),
        };

        debug!(url, "Fetching from remote");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(fetch_error)?;
        let body = response.bytes().await.map_err(fetch_error)?;
        debug!(url, size = body.len(), "Fetched from remote");
        Ok(body)
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch_remote(&self, original_key: &str) -> Result<()> {
        let key = CacheKey::parse(original_key)?;
        let body = self.download(original_key).await?;
        self.store.write_bytes(key.identifier(), &body).await?;
        info!(key = %key, size = body.len(), "Refreshed entry from remote");
        Ok(())
    }
}
