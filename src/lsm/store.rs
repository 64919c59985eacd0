use std::path::PathBuf;
use std::sync::Arc;

use super::compaction;
use super::state::LsmState;
use crate::config::LsmConfig;
use crate::error::Result;

/// LSM-tree key-value store.
///
/// Writes land in an in-memory table under the exclusive lock; crossing the
/// configured entry threshold spawns a background compaction task on the
/// ambient Tokio runtime, which flushes the frozen memtable to a level-0
/// table and cascades overflowing levels into the next one. Reads take the
/// shared lock and probe newest data first: live memtable, frozen memtable,
/// then each level.
///
/// A directory may be reused, but state is never recovered from it: the
/// engine starts empty regardless of directory contents, and writes that
/// have not been compacted are lost on drop.
pub struct LsmTree {
    config: LsmConfig,
    state: Arc<LsmState>,
}

impl LsmTree {
    /// Creates an engine with the given configuration. No I/O happens until
    /// the first flush.
    pub fn new(config: LsmConfig) -> Self {
        Self {
            config,
            state: Arc::new(LsmState::new()),
        }
    }

    /// Creates an engine with default configuration in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self::new(LsmConfig::new(dir))
    }

    /// Writes a key. The value is optional so a tombstone stays
    /// representable; callers store `Some` today. Must be called within a
    /// Tokio runtime, which hosts the background compaction it may spawn.
    pub fn put(&self, key: Vec<u8>, value: Option<Vec<u8>>) {
        let threshold_crossed = {
            let mut inner = self.state.inner.write().unwrap();
            let sequence = inner.sequence;
            inner.sequence = inner.sequence.wrapping_add(1);
            inner.memtable.put(key, value, sequence);
            inner.memtable.len() > self.config.max_memtable_entries
        };

        if threshold_crossed {
            self.spawn_compaction();
        }
    }

    /// Reads a key, newest data first. Unreadable tables are skipped so one
    /// corrupt file cannot take down the read path.
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let inner = self.state.inner.read().unwrap();

        if let Some(entry) = inner.memtable.get(key) {
            return entry.value;
        }
        if let Some(frozen) = &inner.frozen {
            if let Some(entry) = frozen.get(key) {
                return entry.value;
            }
        }

        for level in &inner.levels {
            if level.non_overlap && !level.tables.is_empty() {
                // Disjoint, sorted tables: binary-search the one candidate
                // whose range can hold the key.
                let candidate = level.tables.partition_point(|table| table.max_key() < key);
                if candidate < level.tables.len() {
                    let table = &level.tables[candidate];
                    if table.min_key() <= key {
                        match table.get(key) {
                            Ok(Some(entry)) => return entry.value,
                            Ok(None) => {}
                            Err(err) => tracing::warn!(
                                path = %table.path().display(),
                                error = %err,
                                "skipping unreadable sstable"
                            ),
                        }
                    }
                }
                continue;
            }

            for table in level.tables.iter().rev() {
                if table.key_count() > 0 && (key < table.min_key() || key > table.max_key()) {
                    continue;
                }
                match table.get(key) {
                    Ok(Some(entry)) => return entry.value,
                    Ok(None) => {}
                    Err(err) => tracing::warn!(
                        path = %table.path().display(),
                        error = %err,
                        "skipping unreadable sstable"
                    ),
                }
            }
        }

        None
    }

    /// Forces a flush plus cascade. Waits out any in-flight background
    /// compaction first, so the engine is quiesced when this returns.
    pub async fn compact(&self) -> Result<()> {
        loop {
            if let Some(guard) = LsmState::try_start_compaction(&self.state) {
                let result = compaction::run(&self.state, &self.config).await;
                drop(guard);
                return result;
            }
            self.wait_for_compaction().await;
        }
    }

    /// Awaits the most recently spawned background compaction, if any. Used
    /// to observe settlement; the engine remains fully usable while a
    /// compaction runs.
    pub async fn wait_for_compaction(&self) {
        let handle = self.state.compaction_handle.lock().unwrap().take();
        match handle {
            Some(handle) => {
                let _ = handle.await;
            }
            None => tokio::task::yield_now().await,
        }
    }

    fn spawn_compaction(&self) {
        let Some(guard) = LsmState::try_start_compaction(&self.state) else {
            return;
        };
        let state = Arc::clone(&self.state);
        let config = self.config.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            if let Err(err) = compaction::run(&state, &config).await {
                tracing::error!(error = %err, "background compaction failed");
            }
        });
        *self.state.compaction_handle.lock().unwrap() = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sst_files_with_prefix(dir: &TempDir, prefix: &str) -> Vec<String> {
        fs::read_dir(dir.path())
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().into_string().unwrap())
                    .filter(|name| name.starts_with(prefix))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_read_your_writes() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::open(dir.path());

        store.put(b"key1".to_vec(), Some(b"value1".to_vec()));
        store.put(b"key2".to_vec(), Some(b"value2".to_vec()));

        assert_eq!(store.get(b"key1"), Some(b"value1".to_vec()));
        assert_eq!(store.get(b"key2"), Some(b"value2".to_vec()));
        assert_eq!(store.get(b"absent"), None);

        store.put(b"key1".to_vec(), Some(b"updated".to_vec()));
        assert_eq!(store.get(b"key1"), Some(b"updated".to_vec()));
    }

    #[tokio::test]
    async fn test_sequences_are_monotonic() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::open(dir.path());

        for i in 0..5u8 {
            store.put(vec![i], Some(vec![i]));
        }
        let inner = store.state.inner.read().unwrap();
        assert_eq!(inner.sequence, 5);
        assert_eq!(inner.memtable.get(&[4u8]).unwrap().sequence, 4);
    }

    #[tokio::test]
    async fn test_compaction_preserves_state() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::new(LsmConfig::new(dir.path()).max_memtable_entries(100));

        for i in 0..20 {
            let key = format!("key_{i:03}").into_bytes();
            store.put(key, Some(format!("value_{i}").into_bytes()));
        }
        store.compact().await.unwrap();

        for i in 0..20 {
            let key = format!("key_{i:03}").into_bytes();
            assert_eq!(store.get(&key), Some(format!("value_{i}").into_bytes()));
        }
        assert_eq!(store.get(b"key_999"), None);

        // A second compaction with an empty memtable is a no-op.
        store.compact().await.unwrap();
        assert_eq!(store.get(b"key_000"), Some(b"value_0".to_vec()));
    }

    #[tokio::test]
    async fn test_last_write_wins_across_flush_cycles() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::new(LsmConfig::new(dir.path()).max_memtable_entries(100));

        store.put(b"key".to_vec(), Some(b"first".to_vec()));
        store.compact().await.unwrap();

        store.put(b"key".to_vec(), Some(b"second".to_vec()));
        store.compact().await.unwrap();

        store.put(b"key".to_vec(), Some(b"third".to_vec()));
        store.compact().await.unwrap();

        assert_eq!(store.get(b"key"), Some(b"third".to_vec()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_background_compaction_writes_level0_files() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::new(LsmConfig::new(dir.path()).max_memtable_entries(2));

        for i in 0..10 {
            let key = format!("key_{i:02}").into_bytes();
            store.put(key, Some(format!("value_{i}").into_bytes()));
        }

        // Settle: drain the in-flight background run, then force a final
        // flush of whatever is left in the memtable.
        store.wait_for_compaction().await;
        store.compact().await.unwrap();

        assert!(
            !sst_files_with_prefix(&dir, "L0-").is_empty(),
            "expected at least one level-0 sstable on disk"
        );
        for i in 0..10 {
            let key = format!("key_{i:02}").into_bytes();
            assert_eq!(store.get(&key), Some(format!("value_{i}").into_bytes()));
        }
    }

    #[tokio::test]
    async fn test_cascade_merges_overflowing_level() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::new(
            LsmConfig::new(dir.path())
                .max_memtable_entries(100)
                .max_tables_per_level(2),
        );

        // Three flushes overflow level 0 (threshold 2), so the third
        // compaction merges everything into one level-1 table.
        for batch in 0..3 {
            for i in 0..4 {
                let key = format!("batch{batch}_key{i}").into_bytes();
                store.put(key, Some(format!("value_{batch}_{i}").into_bytes()));
            }
            store.put(b"shared".to_vec(), Some(format!("round_{batch}").into_bytes()));
            store.compact().await.unwrap();
        }

        assert!(sst_files_with_prefix(&dir, "L0-").is_empty());
        assert_eq!(sst_files_with_prefix(&dir, "L1-").len(), 1);

        for batch in 0..3 {
            for i in 0..4 {
                let key = format!("batch{batch}_key{i}").into_bytes();
                assert_eq!(
                    store.get(&key),
                    Some(format!("value_{batch}_{i}").into_bytes())
                );
            }
        }
        // The duplicate key resolves to its newest version.
        assert_eq!(store.get(b"shared"), Some(b"round_2".to_vec()));

        {
            let inner = store.state.inner.read().unwrap();
            assert_eq!(inner.levels[0].table_count(), 0);
            assert!(inner.levels[0].non_overlap);
            assert_eq!(inner.levels[1].table_count(), 1);
            assert!(inner.levels[1].non_overlap);
        }
    }

    #[tokio::test]
    async fn test_disjoint_flushes_keep_level_searchable() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::new(LsmConfig::new(dir.path()).max_memtable_entries(100));

        for (batch, prefix) in ["a", "b", "c"].iter().enumerate() {
            for i in 0..3 {
                let key = format!("{prefix}_{i}").into_bytes();
                store.put(key, Some(format!("value_{batch}_{i}").into_bytes()));
            }
            store.compact().await.unwrap();
        }

        {
            let inner = store.state.inner.read().unwrap();
            assert_eq!(inner.levels[0].table_count(), 3);
            assert!(inner.levels[0].non_overlap, "disjoint ranges must keep the flag");
        }
        assert_eq!(store.get(b"a_0"), Some(b"value_0_0".to_vec()));
        assert_eq!(store.get(b"b_1"), Some(b"value_1_1".to_vec()));
        assert_eq!(store.get(b"c_2"), Some(b"value_2_2".to_vec()));
        assert_eq!(store.get(b"d_0"), None);
    }

    #[tokio::test]
    async fn test_overlapping_flushes_fall_back_to_scan() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::new(LsmConfig::new(dir.path()).max_memtable_entries(100));

        for round in 0..3 {
            for i in 0..4 {
                let key = format!("key_{i}").into_bytes();
                store.put(key, Some(format!("round_{round}_{i}").into_bytes()));
            }
            store.compact().await.unwrap();
        }

        {
            let inner = store.state.inner.read().unwrap();
            assert_eq!(inner.levels[0].table_count(), 3);
            assert!(!inner.levels[0].non_overlap);
        }
        // Newest table wins on the reverse scan.
        for i in 0..4 {
            let key = format!("key_{i}").into_bytes();
            assert_eq!(store.get(&key), Some(format!("round_2_{i}").into_bytes()));
        }
    }

    #[tokio::test]
    async fn test_tombstone_value_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::new(LsmConfig::new(dir.path()).max_memtable_entries(100));

        store.put(b"absent_value".to_vec(), None);
        assert_eq!(store.get(b"absent_value"), None);

        store.compact().await.unwrap();
        assert_eq!(store.get(b"absent_value"), None);
    }

    #[tokio::test]
    async fn test_empty_compact_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = LsmTree::open(dir.path());

        store.compact().await.unwrap();
        assert!(sst_files_with_prefix(&dir, "L").is_empty());
    }
}
