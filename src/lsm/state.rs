use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tokio::task::JoinHandle;

use crate::memtable::Memtable;
use crate::sstable::SSTable;

/// One level of the tree: tables in insertion order plus a flag recording
/// whether they are disjoint and sorted by key range. The flag being true is
/// what allows the read path to binary-search the level instead of scanning
/// it newest-first.
pub struct Level {
    pub tables: Vec<Arc<SSTable>>,
    pub non_overlap: bool,
}

impl Level {
    pub fn new() -> Self {
        Self {
            tables: Vec::new(),
            non_overlap: true,
        }
    }

    /// Appends a table, clearing the overlap flag if the new table's range
    /// intersects the previous last table's. A single table is trivially
    /// non-overlapping.
    pub fn push(&mut self, table: Arc<SSTable>) {
        match self.tables.last() {
            None => self.non_overlap = true,
            Some(previous) => {
                if self.non_overlap
                    && previous.key_count() > 0
                    && table.key_count() > 0
                    && previous.max_key() >= table.min_key()
                {
                    self.non_overlap = false;
                }
            }
        }
        self.tables.push(table);
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

impl Default for Level {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the single reader-writer lock protects.
pub(crate) struct Inner {
    /// Live writable memtable.
    pub memtable: Arc<Memtable>,
    /// Snapshot currently being flushed; stays readable until its table is
    /// installed.
    pub frozen: Option<Arc<Memtable>>,
    pub levels: Vec<Level>,
    /// Monotonic write counter; not persisted.
    pub sequence: u32,
    /// Monotonic file-naming counter.
    pub next_file_id: u64,
}

impl Inner {
    pub fn new() -> Self {
        Self {
            memtable: Arc::new(Memtable::new()),
            frozen: None,
            levels: Vec::new(),
            sequence: 0,
            next_file_id: 0,
        }
    }

    pub fn ensure_level(&mut self, level: usize) {
        while self.levels.len() <= level {
            self.levels.push(Level::new());
        }
    }

    pub fn next_file_path(&mut self, dir: &Path, level: usize) -> PathBuf {
        let id = self.next_file_id;
        self.next_file_id += 1;
        dir.join(format!("L{level}-{id:06}.sst"))
    }
}

/// Shared engine state: the locked interior plus the compaction
/// coordination pieces that live outside the lock.
pub struct LsmState {
    pub(crate) inner: RwLock<Inner>,
    compacting: AtomicBool,
    /// Latest spawned compaction task, kept so callers can await
    /// settlement.
    pub(crate) compaction_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LsmState {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
            compacting: AtomicBool::new(false),
            compaction_handle: Mutex::new(None),
        }
    }

    /// Claims the single compaction slot. Returns a guard that releases the
    /// slot on drop, or None when a compaction is already in flight.
    pub(crate) fn try_start_compaction(state: &Arc<Self>) -> Option<CompactionGuard> {
        if state.compacting.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(CompactionGuard {
            state: Arc::clone(state),
        })
    }
}

/// RAII guard for the compaction slot; dropping it clears the flag on every
/// exit path, error or not.
pub struct CompactionGuard {
    state: Arc<LsmState>,
}

impl Drop for CompactionGuard {
    fn drop(&mut self) {
        self.state.compacting.store(false, Ordering::SeqCst);
    }
}
