//! # siltdb
//!
//! A persistent key-value store organized as a log-structured merge tree,
//! with an inverted-index boolean search engine layered on top.
//!
//! The storage engine buffers writes in a memtable, flushes frozen
//! memtables to immutable sorted tables on disk, and merges overflowing
//! levels in the background. Point reads are served newest-first, pruned by
//! per-table bloom filters and per-level key-range metadata.
//!
//! ```no_run
//! use siltdb::{LsmConfig, LsmTree};
//!
//! # async fn example() {
//! let store = LsmTree::new(LsmConfig::new("./data").max_memtable_entries(1024));
//! store.put(b"term".to_vec(), Some(b"posting".to_vec()));
//! assert_eq!(store.get(b"term"), Some(b"posting".to_vec()));
//! store.compact().await.unwrap();
//! # }
//! ```

pub mod bloom;
pub mod config;
pub mod error;
pub mod index;
pub mod lsm;
pub mod memtable;
pub mod sstable;

pub use config::LsmConfig;
pub use error::{Error, Result};
pub use index::InvertedIndex;
pub use lsm::LsmTree;
