//! LSM-tree storage engine.
//!
//! The engine organizes data as an in-memory write buffer on top of levels
//! of immutable sorted tables:
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐
//! │ Live Memtable   │───►│ Frozen Memtable  │
//! │   (SkipMap)     │    │ (being flushed)  │
//! └─────────────────┘    └──────────────────┘
//!                                 │
//!                                 ▼
//!                          ┌─────────────┐
//!                          │  Level 0    │
//!                          │ (SSTables)  │
//!                          └─────────────┘
//!                                 │
//!                                 ▼
//!                          ┌─────────────┐
//!                          │  Level 1    │
//!                          │ (SSTables)  │
//!                          └─────────────┘
//!                                 │
//!                                 ▼
//!                                ...
//! ```
//!
//! # Write path
//!
//! 1. The writer takes the exclusive lock, assigns the next sequence number,
//!    and inserts into the live memtable.
//! 2. Crossing the entry threshold spawns one background compaction task,
//!    guarded so only a single compaction ever runs.
//! 3. The compaction freezes the memtable, flushes it to a level-0 table,
//!    and merges any level that now holds too many tables into the next one.
//!
//! # Read path
//!
//! Under the shared lock: live memtable, then the frozen memtable, then each
//! level in ascending order. A level whose tables are known to be disjoint
//! and sorted is binary-searched by key range; otherwise its tables are
//! probed newest-first, skipping any whose min/max range excludes the key.
//!
//! # Durability
//!
//! There is none by design: persistence covers exactly what compaction has
//! flushed. No write-ahead log, no manifest, no recovery on open.

pub mod compaction;
pub mod state;
pub mod store;

pub use state::{CompactionGuard, Level, LsmState};
pub use store::LsmTree;
