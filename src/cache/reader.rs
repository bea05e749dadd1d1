//! Cache Read Stream
//!
//! `get` hands out a stream rather than a buffer so disk-tier items are not
//! pulled into memory just to be read once.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use super::entry::CacheTier;

enum Source {
    Memory(Cursor<Bytes>),
    File(File),
}

/// Readable stream over a cached payload
pub struct CacheReader {
    source: Source,
    size: u64,
}

impl CacheReader {
    /// Stream over an in-memory buffer
    pub fn memory(content: Bytes) -> Self {
        let size = content.len() as u64;
        Self {
            source: Source::Memory(Cursor::new(content)),
            size,
        }
    }

    /// Stream over an open backing file of `size` bytes
    pub fn file(file: File, size: u64) -> Self {
        Self {
            source: Source::File(file),
            size,
        }
    }

    /// Tier the bytes are served from
    pub fn tier(&self) -> CacheTier {
        match self.source {
            Source::Memory(_) => CacheTier::Memory,
            Source::File(_) => CacheTier::Disk,
        }
    }

    /// Payload size in bytes
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Collect the remaining payload. Free for the memory tier.
    pub async fn into_bytes(self) -> io::Result<Bytes> {
        match self.source {
            Source::Memory(cursor) if cursor.position() == 0 => Ok(cursor.into_inner()),
            Source::Memory(mut cursor) => {
                let mut buf = Vec::new();
                cursor.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
            Source::File(mut file) => {
                let mut buf = Vec::with_capacity(self.size as usize);
                file.read_to_end(&mut buf).await?;
                Ok(Bytes::from(buf))
            }
        }
    }
}

impl AsyncRead for CacheReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().source {
            Source::Memory(cursor) => Pin::new(cursor).poll_read(cx, buf),
            Source::File(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

impl std::fmt::Debug for CacheReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheReader")
            .field("tier", &self.tier())
            .field("size", &self.size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_reader() {
        let mut reader = CacheReader::memory(Bytes::from_static(b"hello world"));
        assert_eq!(reader.tier(), CacheTier::Memory);
        assert_eq!(reader.size(), 11);

        let mut head = [0u8; 5];
        reader.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"hello");
        assert_eq!(reader.into_bytes().await.unwrap().as_ref(), b" world");
    }

    #[tokio::test]
    async fn test_file_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload");
        std::fs::write(&path, b"from disk").unwrap();

        let file = File::open(&path).await.unwrap();
        let reader = CacheReader::file(file, 9);
        assert_eq!(reader.tier(), CacheTier::Disk);
        assert_eq!(reader.into_bytes().await.unwrap().as_ref(), b"from disk");
    }
}
