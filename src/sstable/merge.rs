//! K-way merge across sorted tables.
//!
//! A min-heap of table cursors yields keys in ascending order. When the same
//! key is present in several inputs, every occurrence is drained from the
//! heap before emitting, and the occurrence with the greatest sequence
//! number wins. Each drained cursor advances to its next key and re-enters
//! the heap until its table is exhausted.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use super::SSTable;
use crate::error::Result;
use crate::memtable::VersionedValue;

/// Heap entry for one table cursor. Ordering is reversed on the key so the
/// std max-heap behaves as a min-heap; ties fall back to the source index to
/// keep the ordering total.
struct HeapEntry {
    key: Vec<u8>,
    source: usize,
    index: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.key.cmp(&other.key) {
            Ordering::Equal => self.source.cmp(&other.source),
            ordering => ordering.reverse(),
        }
    }
}

/// Streams the merged view of `tables` into `emit`: one call per distinct
/// key, in ascending key order, carrying the winning version.
pub(crate) fn merge_tables<F>(tables: &[Arc<SSTable>], mut emit: F) -> Result<()>
where
    F: FnMut(&[u8], VersionedValue) -> Result<()>,
{
    let mut heap = BinaryHeap::new();
    for (source, table) in tables.iter().enumerate() {
        if table.key_count() == 0 {
            continue;
        }
        heap.push(HeapEntry {
            key: table.key_at(0)?,
            source,
            index: 0,
        });
    }

    while let Some(entry) = heap.pop() {
        let key = entry.key;
        let mut best = tables[entry.source].record_at_index(entry.index)?;
        advance(&mut heap, tables, entry.source, entry.index)?;

        while heap.peek().is_some_and(|top| top.key == key) {
            let Some(duplicate) = heap.pop() else { break };
            let candidate = tables[duplicate.source].record_at_index(duplicate.index)?;
            if candidate.sequence > best.sequence {
                best = candidate;
            }
            advance(&mut heap, tables, duplicate.source, duplicate.index)?;
        }

        emit(&key, best)?;
    }
    Ok(())
}

fn advance(
    heap: &mut BinaryHeap<HeapEntry>,
    tables: &[Arc<SSTable>],
    source: usize,
    index: usize,
) -> Result<()> {
    let next = index + 1;
    if next < tables[source].key_count() {
        heap.push(HeapEntry {
            key: tables[source].key_at(next)?,
            source,
            index: next,
        });
    }
    Ok(())
}
