//! Disk Tier
//!
//! One file per identifier directly under the cache folder, holding the raw
//! payload with no header. The file's mtime is the freshness clock.
//!
//! # Layout
//!
//! ```text
//! <cache_folder>/
//!   <identifier>            raw payload
//!   .tmp/
//!     <identifier>.<pid>.<n>  in-progress write, renamed into place when complete
//! ```
//!
//! Writes land in `.tmp` and are renamed over the final path, so a failed
//! write never leaves a partial file under an identifier and readers holding
//! the previous file keep reading the previous bytes.
//!
//! The folder may be shared by several processes. The startup scan only
//! removes temp files untouched for [`TMP_GRACE`]; a write stalled for longer
//! than that loses its temp file and fails at rename, leaving the previous
//! file in place.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use super::key::is_identifier;
use crate::error::Result;

/// Name of the temporary write directory inside the cache folder
pub const TMP_DIR_NAME: &str = ".tmp";

/// Age after which a temp file is considered orphaned
pub const TMP_GRACE: Duration = Duration::from_secs(3600);

/// Shared across all store handles in the process so temp names never collide
static NEXT_TMP_ID: AtomicU64 = AtomicU64::new(0);

/// Filesystem side of the cache
#[derive(Debug, Clone)]
pub struct DiskStore {
    folder: PathBuf,
    tmp_dir: PathBuf,
}

impl DiskStore {
    /// Open a cache folder, creating it (and its temp directory) if missing
    pub fn new(folder: impl Into<PathBuf>) -> Result<Self> {
        let folder = folder.into();
        if !folder.is_dir() {
            info!(folder = %folder.display(), "Creating cache folder");
        }
        let tmp_dir = folder.join(TMP_DIR_NAME);
        std::fs::create_dir_all(&tmp_dir)?;
        Ok(Self { folder, tmp_dir })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Backing file of an identifier
    pub fn path_for(&self, identifier: &str) -> PathBuf {
        self.folder.join(identifier)
    }

    /// List identifiers present on disk without reading their content.
    ///
    /// Sub-directories and files that are not identifiers are skipped.
    /// Leftovers of interrupted writes are removed.
    pub fn scan(&self) -> Result<Vec<String>> {
        self.clean_tmp();

        let mut identifiers = Vec::new();
        for dir_entry in std::fs::read_dir(&self.folder)? {
            let dir_entry = dir_entry?;
            if dir_entry.file_type()?.is_dir() {
                continue;
            }
            match dir_entry.file_name().to_str() {
                Some(name) if is_identifier(name) => identifiers.push(name.to_string()),
                _ => debug!(path = %dir_entry.path().display(), "Skipping foreign file"),
            }
        }

        info!(
            folder = %self.folder.display(),
            entries = identifiers.len(),
            "Scanned cache folder"
        );
        Ok(identifiers)
    }

    fn clean_tmp(&self) {
        let entries = match std::fs::read_dir(&self.tmp_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.tmp_dir.display(), error = %e, "Cannot list temp dir");
                return;
            }
        };
        let now = SystemTime::now();
        for entry in entries.flatten() {
            let path = entry.path();
            let idle = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(|modified| now.duration_since(modified).unwrap_or(Duration::ZERO));
            match idle {
                // Possibly another process's write in progress
                Ok(idle) if idle < TMP_GRACE => {
                    debug!(path = %path.display(), ?idle, "Keeping recent temp file");
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Cannot stat temp file");
                    continue;
                }
            }
            if let Err(e) = std::fs::remove_file(&path) {
                warn!(path = %path.display(), error = %e, "Failed to remove orphaned temp file");
            } else {
                debug!(path = %path.display(), "Removed orphaned temp file");
            }
        }
    }

    fn tmp_path(&self, identifier: &str) -> PathBuf {
        let n = NEXT_TMP_ID.fetch_add(1, Ordering::Relaxed);
        self.tmp_dir
            .join(format!("{}.{}.{}", identifier, std::process::id(), n))
    }

    /// Atomically replace the backing file with `content`
    pub async fn write_bytes(&self, identifier: &str, content: &[u8]) -> Result<()> {
        let tmp = self.tmp_path(identifier);
        let result = async {
            tokio::fs::write(&tmp, content).await?;
            tokio::fs::rename(&tmp, self.path_for(identifier)).await
        }
        .await;
        self.finish_write(identifier, &tmp, result).await
    }

    /// Atomically replace the backing file with everything `reader` yields,
    /// without buffering the whole payload. Returns the number of bytes written.
    pub async fn write_stream<R>(&self, identifier: &str, reader: &mut R) -> Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let tmp = self.tmp_path(identifier);
        let result = async {
            let mut writer = BufWriter::new(File::create(&tmp).await?);
            let written = tokio::io::copy(reader, &mut writer).await?;
            writer.flush().await?;
            drop(writer);
            tokio::fs::rename(&tmp, self.path_for(identifier)).await?;
            Ok::<_, io::Error>(written)
        }
        .await;
        self.finish_write(identifier, &tmp, result).await
    }

    async fn finish_write<T>(
        &self,
        identifier: &str,
        tmp: &Path,
        result: io::Result<T>,
    ) -> Result<T> {
        match result {
            Ok(value) => {
                debug!(identifier, "Wrote content of entry into file");
                Ok(value)
            }
            Err(e) => {
                warn!(identifier, error = %e, "Writing cache file failed");
                if let Err(cleanup) = tokio::fs::remove_file(tmp).await {
                    if cleanup.kind() != io::ErrorKind::NotFound {
                        warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temp file");
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Open the backing file for reading. Returns the file with its size and
    /// mtime, both taken from the opened handle.
    pub async fn open(&self, identifier: &str) -> Result<(File, u64, SystemTime)> {
        let file = File::open(self.path_for(identifier)).await?;
        let metadata = file.metadata().await?;
        Ok((file, metadata.len(), metadata.modified()?))
    }

    /// Read the whole backing file
    pub async fn read(&self, identifier: &str) -> Result<Bytes> {
        Ok(Bytes::from(tokio::fs::read(self.path_for(identifier)).await?))
    }

    /// Size and mtime of the backing file
    pub async fn stat(&self, identifier: &str) -> Result<(u64, SystemTime)> {
        let metadata = tokio::fs::metadata(self.path_for(identifier)).await?;
        Ok((metadata.len(), metadata.modified()?))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::hash_key;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;

    struct FailingReader;

    impl AsyncRead for FailingReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        }
    }

    #[test]
    fn test_new_creates_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("nested").join("cache");
        let store = DiskStore::new(&folder).unwrap();
        assert!(folder.is_dir());
        assert!(folder.join(TMP_DIR_NAME).is_dir());
        assert!(store.scan().unwrap().is_empty());
    }

    #[test]
    fn test_scan_lists_identifiers_only() {
        let dir = tempfile::tempdir().unwrap();
        let id = hash_key("example.com/a");
        std::fs::write(dir.path().join(&id), b"payload").unwrap();
        std::fs::write(dir.path().join("README"), b"not cached").unwrap();
        std::fs::create_dir(dir.path().join(hash_key("a-directory"))).unwrap();

        let store = DiskStore::new(dir.path()).unwrap();
        assert_eq!(store.scan().unwrap(), vec![id]);
    }

    #[test]
    fn test_scan_removes_orphaned_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        let orphan = dir.path().join(TMP_DIR_NAME).join("abc.1.0");
        std::fs::write(&orphan, b"partial").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&orphan)
            .unwrap()
            .set_modified(SystemTime::now() - TMP_GRACE - Duration::from_secs(60))
            .unwrap();

        store.scan().unwrap();
        assert!(!orphan.exists());
    }

    #[test]
    fn test_scan_keeps_recent_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        // Another process sharing the folder is mid-write
        let in_progress = dir.path().join(TMP_DIR_NAME).join("abc.4242.0");
        std::fs::write(&in_progress, b"partial").unwrap();

        store.scan().unwrap();
        assert!(in_progress.exists());
    }

    #[tokio::test]
    async fn test_failed_stream_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        let id = hash_key("broken");

        let mut failing = FailingReader;
        assert_matches!(store.write_stream(&id, &mut failing).await, Err(Error::Io(_)));

        assert!(!store.path_for(&id).exists());
        assert_eq!(std::fs::read_dir(dir.path().join(TMP_DIR_NAME)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_bytes_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        let id = hash_key("k");

        store.write_bytes(&id, b"first").await.unwrap();
        store.write_bytes(&id, b"second").await.unwrap();

        assert_eq!(store.read(&id).await.unwrap().as_ref(), b"second");
        let (size, _) = store.stat(&id).await.unwrap();
        assert_eq!(size, 6);
        // Nothing left behind in the temp dir
        assert_eq!(std::fs::read_dir(dir.path().join(TMP_DIR_NAME)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_write_stream() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        let id = hash_key("large");
        let payload = vec![7u8; 256 * 1024];

        let mut reader = payload.as_slice();
        let written = store.write_stream(&id, &mut reader).await.unwrap();
        assert_eq!(written, payload.len() as u64);

        let (_, size, modified) = store.open(&id).await.unwrap();
        assert_eq!(size, payload.len() as u64);
        assert_eq!(store.stat(&id).await.unwrap(), (size, modified));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path()).unwrap();
        assert_matches!(store.stat("nope").await, Err(Error::Io(_)));
        assert_matches!(store.open("nope").await, Err(Error::Io(_)));
    }
}
