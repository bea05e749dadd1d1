//! Cache Entry Types

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Storage tier holding an entry's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    /// Bytes held in memory, mirrored on disk
    Memory,
    /// Bytes on disk only
    Disk,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::Memory => write!(f, "memory"),
            CacheTier::Disk => write!(f, "disk"),
        }
    }
}

/// Known-set value for one identifier.
///
/// `loaded_at` records when this process last wrote the entry. Freshness is
/// never decided from it: the backing file's mtime is the only clock. A
/// memory-tier entry also remembers the size and mtime of the file its bytes
/// were taken from, so a file replaced behind its back is detected.
#[derive(Debug, Clone)]
pub struct KnownEntry {
    content: Option<Bytes>,
    loaded_at: Option<SystemTime>,
    synced_mtime: Option<SystemTime>,
}

impl KnownEntry {
    /// Entry found by the startup scan; nothing loaded yet
    pub fn on_disk() -> Self {
        Self {
            content: None,
            loaded_at: None,
            synced_mtime: None,
        }
    }

    /// Entry produced by a fill
    pub fn filled(content: Option<Bytes>, loaded_at: SystemTime) -> Self {
        Self {
            content,
            loaded_at: Some(loaded_at),
            synced_mtime: None,
        }
    }

    /// Record the mtime of the file the in-memory bytes mirror
    pub fn with_synced_mtime(mut self, modified: SystemTime) -> Self {
        self.synced_mtime = Some(modified);
        self
    }

    /// In-memory bytes, if the entry lives in the memory tier
    pub fn content(&self) -> Option<&Bytes> {
        self.content.as_ref()
    }

    pub fn loaded_at(&self) -> Option<SystemTime> {
        self.loaded_at
    }

    pub fn synced_mtime(&self) -> Option<SystemTime> {
        self.synced_mtime
    }

    pub fn tier(&self) -> CacheTier {
        if self.content.is_some() {
            CacheTier::Memory
        } else {
            CacheTier::Disk
        }
    }

    /// Whether the in-memory bytes still mirror a backing file of `size`
    /// bytes last modified at `modified`. Disk-only entries always do.
    pub fn mirrors(&self, size: u64, modified: SystemTime) -> bool {
        match &self.content {
            Some(content) => {
                content.len() as u64 == size && self.synced_mtime == Some(modified)
            }
            None => true,
        }
    }

    /// Swap the in-memory bytes after the backing file changed
    pub(crate) fn reload(&mut self, content: Bytes, loaded_at: SystemTime, modified: SystemTime) {
        self.content = Some(content);
        self.loaded_at = Some(loaded_at);
        self.synced_mtime = Some(modified);
    }

    /// Drop the in-memory bytes; the entry is served from disk from now on
    pub(crate) fn demote(&mut self) {
        self.content = None;
        self.synced_mtime = None;
    }
}

/// Inspection view of a known entry
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub identifier: String,
    pub tier: CacheTier,
    /// Size of the backing file, `None` if it could not be stat'ed
    pub size: Option<u64>,
    /// Backing file mtime, the freshness clock
    pub modified: Option<DateTime<Utc>>,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_tier_follows_content() {
        assert_eq!(KnownEntry::on_disk().tier(), CacheTier::Disk);
        assert_eq!(
            KnownEntry::filled(Some(Bytes::from_static(b"x")), SystemTime::now()).tier(),
            CacheTier::Memory
        );
        // An empty buffer is still the memory tier, not "absent"
        assert_eq!(
            KnownEntry::filled(Some(Bytes::new()), SystemTime::now()).tier(),
            CacheTier::Memory
        );
        assert_eq!(KnownEntry::filled(None, SystemTime::now()).tier(), CacheTier::Disk);
    }

    #[test]
    fn test_reload() {
        let mut entry = KnownEntry::filled(Some(Bytes::from_static(b"old")), SystemTime::UNIX_EPOCH);
        let now = SystemTime::now();
        entry.reload(Bytes::from_static(b"new"), now, now);
        assert_eq!(entry.content().unwrap().as_ref(), b"new");
        assert_eq!(entry.loaded_at(), Some(now));
        assert_eq!(entry.synced_mtime(), Some(now));
    }

    #[test]
    fn test_mirrors_tracks_file_state() {
        let written = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let entry = KnownEntry::filled(Some(Bytes::from_static(b"abc")), written)
            .with_synced_mtime(written);

        assert!(entry.mirrors(3, written));
        assert!(!entry.mirrors(3, written + Duration::from_secs(1)));
        assert!(!entry.mirrors(4, written));

        // Without a recorded mtime the bytes cannot be trusted
        let unsynced = KnownEntry::filled(Some(Bytes::from_static(b"abc")), written);
        assert!(!unsynced.mirrors(3, written));

        assert!(KnownEntry::on_disk().mirrors(0, written));
    }

    #[test]
    fn test_demote() {
        let now = SystemTime::now();
        let mut entry = KnownEntry::filled(Some(Bytes::from_static(b"x")), now).with_synced_mtime(now);
        entry.demote();
        assert_eq!(entry.tier(), CacheTier::Disk);
        assert_eq!(entry.synced_mtime(), None);
    }

    #[test]
    fn test_tier_display() {
        assert_eq!(CacheTier::Memory.to_string(), "memory");
        assert_eq!(CacheTier::Disk.to_string(), "disk");
    }
}
