use std::path::PathBuf;

/// Configuration for the LSM store
#[derive(Debug, Clone)]
pub struct LsmConfig {
    /// Directory holding the SSTable files
    pub dir: PathBuf,

    /// Number of distinct keys the memtable may hold before a background
    /// compaction is triggered (default: 1024)
    pub max_memtable_entries: usize,

    /// Number of tables a level may hold before it is merged into the next
    /// one (default: 6)
    pub max_tables_per_level: usize,
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./siltdb"),
            max_memtable_entries: 1024,
            max_tables_per_level: 6,
        }
    }
}

impl LsmConfig {
    /// Create a new config with the given directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the memtable entry threshold
    pub fn max_memtable_entries(mut self, entries: usize) -> Self {
        self.max_memtable_entries = entries;
        self
    }

    /// Set the per-level table count threshold
    pub fn max_tables_per_level(mut self, tables: usize) -> Self {
        self.max_tables_per_level = tables;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LsmConfig::default();
        assert_eq!(config.dir, PathBuf::from("./siltdb"));
        assert_eq!(config.max_memtable_entries, 1024);
        assert_eq!(config.max_tables_per_level, 6);
    }

    #[test]
    fn test_config_builder() {
        let config = LsmConfig::new("/tmp/test")
            .max_memtable_entries(2)
            .max_tables_per_level(3);

        assert_eq!(config.dir, PathBuf::from("/tmp/test"));
        assert_eq!(config.max_memtable_entries, 2);
        assert_eq!(config.max_tables_per_level, 3);
    }
}
