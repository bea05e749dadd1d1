//! Single-Flight Coordinator
//!
//! Guarantees at most one concurrent fill per identifier while unrelated
//! identifiers proceed in parallel.
//!
//! # Design
//!
//! ```text
//!             ┌──────────── Mutex<Directory> ────────────┐
//!             │  known: identifier -> KnownEntry          │
//!             │  busy:  identifier -> BusyMarker          │
//!             └───────────────────────────────────────────┘
//!   acquire_or_wait(id)
//!     busy?   -> subscribe to marker, unlock, wait, retry
//!     known?  -> Lookup::Known
//!     neither -> insert marker, Lookup::Fill(FillPermit)
//!
//!   FillPermit::complete(entry)   remove marker + insert known (one critical section)
//!   drop(FillPermit)              remove marker only (fill failed)
//! ```
//!
//! - One lock guards both maps, held only for map operations, never across I/O
//!   or an await point.
//! - A busy marker is a one-shot `watch` signal. Waiters subscribe while the
//!   lock is held, so the handle looked up and the handle waited on are the
//!   same object and a completion between unlock and wait is never missed.
//! - Waking up is not a verdict: waiters re-check, and if the previous fill
//!   failed one of them becomes the next filler.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::entry::KnownEntry;

/// Per-identifier busy marker
struct BusyMarker {
    generation: u64,
    done: watch::Sender<bool>,
}

/// Known-set and busy directory, guarded together
#[derive(Default)]
pub(crate) struct Directory {
    known: HashMap<String, KnownEntry>,
    busy: HashMap<String, BusyMarker>,
}

/// Result of [`Coordinator::acquire_or_wait`]
#[derive(Debug)]
pub enum Lookup {
    /// The identifier is cached; do not fill
    Known,
    /// The caller is the only filler for the identifier
    Fill(FillPermit),
}

impl Lookup {
    pub fn is_known(&self) -> bool {
        matches!(self, Lookup::Known)
    }

    /// The permit, if this caller must fill
    pub fn into_permit(self) -> Option<FillPermit> {
        match self {
            Lookup::Known => None,
            Lookup::Fill(permit) => Some(permit),
        }
    }
}

/// Exclusive right to fill one identifier.
///
/// Completing the permit publishes the entry; dropping it without completing
/// releases the identifier as "not known" so a waiter can retry. Either way
/// every waiter is woken exactly once.
#[must_use = "dropping a FillPermit abandons the fill"]
pub struct FillPermit {
    identifier: String,
    generation: u64,
    directory: Arc<Mutex<Directory>>,
    released: bool,
}

impl FillPermit {
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Atomically clear the busy marker and record the entry as known
    pub(crate) fn complete(mut self, entry: KnownEntry) {
        self.release(Some(entry));
    }

    /// Release without producing an entry
    pub fn abandon(mut self) {
        self.release(None);
    }

    fn release(&mut self, entry: Option<KnownEntry>) {
        if self.released {
            return;
        }
        self.released = true;

        let published = entry.is_some();
        let marker = {
            let mut dir = self.directory.lock();
            let current = dir
                .busy
                .get(&self.identifier)
                .is_some_and(|marker| marker.generation == self.generation);
            let marker = if current {
                dir.busy.remove(&self.identifier)
            } else {
                None
            };
            if let Some(entry) = entry {
                dir.known.insert(self.identifier.clone(), entry);
            }
            marker
        };

        match marker {
            Some(marker) => {
                marker.done.send_replace(true);
                debug!(
                    identifier = %self.identifier,
                    generation = self.generation,
                    published,
                    "Released fill permit"
                );
            }
            None => warn!(
                identifier = %self.identifier,
                generation = self.generation,
                "Busy marker missing or replaced on release"
            ),
        }
    }
}

impl Drop for FillPermit {
    fn drop(&mut self) {
        if !self.released {
            debug!(identifier = %self.identifier, "Fill permit dropped without completing");
            self.release(None);
        }
    }
}

impl fmt::Debug for FillPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FillPermit")
            .field("identifier", &self.identifier)
            .field("generation", &self.generation)
            .field("released", &self.released)
            .finish()
    }
}

/// Single-flight coordinator over the shared directory
pub struct Coordinator {
    directory: Arc<Mutex<Directory>>,
    next_generation: AtomicU64,
}

impl Coordinator {
    /// Coordinator with an empty known-set
    pub fn new() -> Self {
        Self::with_known(std::iter::empty())
    }

    /// Coordinator seeded with identifiers found on disk
    pub fn with_known(identifiers: impl IntoIterator<Item = String>) -> Self {
        let known = identifiers
            .into_iter()
            .map(|id| (id, KnownEntry::on_disk()))
            .collect();
        Self {
            directory: Arc::new(Mutex::new(Directory {
                known,
                busy: HashMap::new(),
            })),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Return `Known`, or a fill permit, blocking while another caller fills
    pub async fn acquire_or_wait(&self, identifier: &str) -> Lookup {
        loop {
            let mut waiter = {
                let mut dir = self.directory.lock();

                if let Some(marker) = dir.busy.get(identifier) {
                    debug!(
                        identifier,
                        generation = marker.generation,
                        "Identifier busy, waiting for fill"
                    );
                    marker.done.subscribe()
                } else if dir.known.contains_key(identifier) {
                    return Lookup::Known;
                } else {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let (done, _) = watch::channel(false);
                    dir.busy
                        .insert(identifier.to_string(), BusyMarker { generation, done });
                    debug!(identifier, generation, "Issued fill permit");
                    return Lookup::Fill(FillPermit {
                        identifier: identifier.to_string(),
                        generation,
                        directory: Arc::clone(&self.directory),
                        released: false,
                    });
                }
            };

            // Err means the sender is gone, which also means the fill ended
            let _ = waiter.wait_for(|done| *done).await;
        }
    }

    /// Snapshot of the known entry, cheap (`Bytes` is reference counted)
    pub fn known(&self, identifier: &str) -> Option<KnownEntry> {
        self.directory.lock().known.get(identifier).cloned()
    }

    pub fn is_known(&self, identifier: &str) -> bool {
        self.directory.lock().known.contains_key(identifier)
    }

    pub fn is_busy(&self, identifier: &str) -> bool {
        self.directory.lock().busy.contains_key(identifier)
    }

    /// Replace the in-memory bytes of a known memory-tier entry with the
    /// content of a backing file last modified at `modified`.
    ///
    /// Disk-only entries are left alone. Returns false if the identifier is
    /// not known.
    pub fn reload(
        &self,
        identifier: &str,
        content: Bytes,
        loaded_at: SystemTime,
        modified: SystemTime,
    ) -> bool {
        let mut dir = self.directory.lock();
        match dir.known.get_mut(identifier) {
            Some(entry) => {
                if entry.content().is_some() {
                    entry.reload(content, loaded_at, modified);
                }
                true
            }
            None => false,
        }
    }

    /// Move a known entry to the disk tier. Returns false if it is not known.
    pub fn demote(&self, identifier: &str) -> bool {
        let mut dir = self.directory.lock();
        match dir.known.get_mut(identifier) {
            Some(entry) => {
                entry.demote();
                true
            }
            None => false,
        }
    }

    /// Known identifiers with their entries
    pub fn known_entries(&self) -> Vec<(String, KnownEntry)> {
        let dir = self.directory.lock();
        let mut entries: Vec<_> = dir
            .known
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn known_len(&self) -> usize {
        self.directory.lock().known.len()
    }

    pub fn busy_len(&self) -> usize {
        self.directory.lock().busy.len()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
