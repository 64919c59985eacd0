use crossbeam_skiplist::SkipMap;

/// A value plus the sequence number of the write that produced it. The
/// payload is optional so a tombstone stays representable in the record
/// format, though the write path never produces one today.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedValue {
    pub value: Option<Vec<u8>>,
    pub sequence: u32,
}

/// In-memory write buffer. Last write wins per key; the skip list keeps the
/// entries ordered so the flush path gets its key-ascending view for free.
#[derive(Debug)]
pub struct Memtable {
    entries: SkipMap<Vec<u8>, VersionedValue>,
}

impl Default for Memtable {
    fn default() -> Self {
        Self::new()
    }
}

impl Memtable {
    pub fn new() -> Self {
        Self {
            entries: SkipMap::new(),
        }
    }

    /// Inserts or overwrites the entry for `key`.
    pub fn put(&self, key: Vec<u8>, value: Option<Vec<u8>>, sequence: u32) {
        self.entries.insert(key, VersionedValue { value, sequence });
    }

    pub fn get(&self, key: &[u8]) -> Option<VersionedValue> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in ascending key order.
    pub fn sorted_entries(&self) -> Vec<(Vec<u8>, VersionedValue)> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }
}
