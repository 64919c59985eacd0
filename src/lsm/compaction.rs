//! Flush and cascade: turning the live memtable into a level-0 table, then
//! merging any overflowing level into the next one.
//!
//! Lock discipline: the exclusive lock is held only to swap state and to
//! install results. The flush and merge I/O itself runs with the lock
//! released, so readers keep flowing; the frozen memtable remains visible to
//! them until its table is in place, and consumed tables are unlinked under
//! the exclusive lock only after their replacement is installed.

use std::fs;
use std::sync::Arc;

use super::state::{Inner, LsmState};
use crate::config::LsmConfig;
use crate::error::Result;
use crate::memtable::Memtable;
use crate::sstable::writer;

/// One full compaction pass: flush the memtable (if non-empty), then cascade
/// level merges. The caller holds the compaction slot for the duration.
pub(crate) async fn run(state: &LsmState, config: &LsmConfig) -> Result<()> {
    if !flush_memtable(state, config)? {
        return Ok(());
    }
    cascade(state, config)
}

/// Freezes the live memtable and flushes it to a new level-0 table. Returns
/// false when there was nothing to flush.
fn flush_memtable(state: &LsmState, config: &LsmConfig) -> Result<bool> {
    let (frozen, path) = {
        let mut inner = state.inner.write().unwrap();
        if inner.memtable.is_empty() {
            return Ok(false);
        }
        let frozen = Arc::clone(&inner.memtable);
        inner.frozen = Some(Arc::clone(&frozen));
        inner.memtable = Arc::new(Memtable::new());
        let path = inner.next_file_path(&config.dir, 0);
        (frozen, path)
    };

    // Flush I/O, no locks held.
    let table = match writer::create_from_memtable(&path, &frozen) {
        Ok(table) => table,
        Err(err) => {
            let mut inner = state.inner.write().unwrap();
            restore_frozen(&mut inner, &frozen);
            inner.frozen = None;
            return Err(err);
        }
    };

    let mut inner = state.inner.write().unwrap();
    inner.frozen = None;
    inner.ensure_level(0);
    inner.levels[0].push(Arc::new(table));

    tracing::info!(
        path = %path.display(),
        entries = frozen.len(),
        "flushed memtable to level 0"
    );
    Ok(true)
}

/// Folds a frozen memtable back into the live one after a failed flush,
/// without clobbering keys that have since been rewritten.
fn restore_frozen(inner: &mut Inner, frozen: &Memtable) {
    for (key, entry) in frozen.sorted_entries() {
        let superseded = inner
            .memtable
            .get(&key)
            .is_some_and(|current| current.sequence >= entry.sequence);
        if !superseded {
            inner.memtable.put(key, entry.value, entry.sequence);
        }
    }
}

/// Walks the levels in order; any level holding more tables than the
/// configured threshold has all of them merged into a single table on the
/// next level.
fn cascade(state: &LsmState, config: &LsmConfig) -> Result<()> {
    let mut level = 0;
    loop {
        let job = {
            let mut inner = state.inner.write().unwrap();
            if level >= inner.levels.len() {
                break;
            }
            if inner.levels[level].table_count() <= config.max_tables_per_level {
                None
            } else {
                inner.ensure_level(level + 1);
                let tables = inner.levels[level].tables.clone();
                let path = inner.next_file_path(&config.dir, level + 1);
                Some((tables, path))
            }
        };

        if let Some((tables, path)) = job {
            // Merge I/O, no locks held; readers still see the source
            // tables.
            let merged = writer::create_from_merge(&path, &tables)?;
            tracing::info!(
                source_level = level,
                target_level = level + 1,
                inputs = tables.len(),
                entries = merged.key_count(),
                "merged level into next"
            );

            let mut inner = state.inner.write().unwrap();
            inner.levels[level].tables.clear();
            inner.levels[level].non_overlap = true;
            inner.levels[level + 1].push(Arc::new(merged));
            for table in &tables {
                if let Err(err) = fs::remove_file(table.path()) {
                    tracing::warn!(
                        path = %table.path().display(),
                        error = %err,
                        "failed to remove merged sstable"
                    );
                }
            }
        }
        level += 1;
    }
    Ok(())
}
