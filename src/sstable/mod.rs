//! Immutable sorted tables and their on-disk format.
//!
//! ## SSTable File Layout
//!
//! ```text
//! +----------------------+
//! | Header               |  key count + serialized bloom filter
//! +----------------------+
//! | Records              |  one per key, ascending key order
//! +----------------------+
//! | Index                |  key section, record offsets, key offsets
//! +----------------------+
//! | Footer (12 bytes)    |  index start + index length
//! +----------------------+
//! ```
//!
//! The index carries three parallel sub-sections sized by the key count:
//! length-prefixed keys, absolute record offsets (u64), and the byte offset
//! of each key within the key section (u32, relative to the index start).
//! Point lookups binary-search the key section through the key-offset
//! array, then jump to the record through the offset array.
//!
//! A table is immutable once loaded; its metadata and bloom filter need no
//! further synchronization, and readers share the file handle through
//! positional reads.

pub mod format;
pub mod merge;
pub mod writer;

use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::bloom::BloomFilter;
use crate::errdata;
use crate::error::Result;
use crate::memtable::VersionedValue;

/// An open, immutable sorted table.
#[derive(Debug)]
pub struct SSTable {
    path: PathBuf,
    file: File,
    key_count: usize,
    index_start: u64,
    offsets_start: u64,
    key_offsets_start: u64,
    min_key: Vec<u8>,
    max_key: Vec<u8>,
    bloom: BloomFilter,
}

impl SSTable {
    /// Opens an existing table file and loads its metadata.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        Self::load(path, file)
    }

    /// Loads table metadata from an already-open file: footer first, then
    /// the header, then the derived index sub-section offsets and the key
    /// range.
    pub(crate) fn load(path: PathBuf, file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        if size < format::FOOTER_SIZE {
            return errdata!("sstable {}: file shorter than footer", path.display());
        }

        let mut footer = [0u8; format::FOOTER_SIZE as usize];
        file.read_exact_at(&mut footer, size - format::FOOTER_SIZE)?;
        let (index_start, index_len) = format::read_footer(&footer)?;

        let mut header = vec![0u8; format::HEADER_FIXED_SIZE as usize];
        file.read_exact_at(&mut header, 0)?;
        let word_count = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        header.resize((format::HEADER_FIXED_SIZE + 8 * word_count as u64) as usize, 0);
        file.read_exact_at(&mut header, 0)?;
        let (key_count, bloom) = format::read_header(&mut header.as_slice())?;

        let meta_size = u64::from(key_count) * 8 + u64::from(key_count) * 4;
        if u64::from(index_len) < meta_size {
            return errdata!(
                "sstable {}: index length {index_len} below metadata size {meta_size}",
                path.display()
            );
        }
        let key_section_len = u64::from(index_len) - meta_size;
        let offsets_start = index_start + key_section_len;
        let key_offsets_start = offsets_start + u64::from(key_count) * 8;

        let mut table = Self {
            path,
            file,
            key_count: key_count as usize,
            index_start,
            offsets_start,
            key_offsets_start,
            min_key: Vec::new(),
            max_key: Vec::new(),
            bloom,
        };
        if table.key_count > 0 {
            table.min_key = table.key_at(0)?;
            table.max_key = table.key_at(table.key_count - 1)?;
        }
        Ok(table)
    }

    /// Point lookup. The bloom filter screens out most absent keys before
    /// any index read happens.
    pub fn get(&self, key: &[u8]) -> Result<Option<VersionedValue>> {
        if !self.bloom.might_contain(key) {
            return Ok(None);
        }
        let Some(index) = self.find_key_index(key)? else {
            return Ok(None);
        };
        let offset = self.offset_at(index)?;
        Ok(Some(self.read_record_at(offset)?))
    }

    pub fn key_count(&self) -> usize {
        self.key_count
    }

    pub fn min_key(&self) -> &[u8] {
        &self.min_key
    }

    pub fn max_key(&self) -> &[u8] {
        &self.max_key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lower-bound binary search over the key section. Returns the position
    /// of `key` only on an exact match.
    fn find_key_index(&self, key: &[u8]) -> Result<Option<usize>> {
        let mut low = 0;
        let mut high = self.key_count;
        while low < high {
            let mid = (low + high) / 2;
            if self.key_at(mid)?.as_slice() < key {
                low = mid + 1;
            } else {
                high = mid;
            }
        }
        if low >= self.key_count {
            return Ok(None);
        }
        Ok((self.key_at(low)? == key).then_some(low))
    }

    pub(crate) fn key_at(&self, index: usize) -> Result<Vec<u8>> {
        let relative = self.key_offset_at(index)?;
        let offset = self.index_start + u64::from(relative);

        let mut len_buf = [0u8; 4];
        self.file.read_exact_at(&mut len_buf, offset)?;
        let key_len = u32::from_le_bytes(len_buf) as usize;

        let mut key = vec![0u8; key_len];
        self.file.read_exact_at(&mut key, offset + 4)?;
        Ok(key)
    }

    pub(crate) fn record_at_index(&self, index: usize) -> Result<VersionedValue> {
        let offset = self.offset_at(index)?;
        self.read_record_at(offset)
    }

    fn key_offset_at(&self, index: usize) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.file
            .read_exact_at(&mut buf, self.key_offsets_start + 4 * index as u64)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn offset_at(&self, index: usize) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.file
            .read_exact_at(&mut buf, self.offsets_start + 8 * index as u64)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn read_record_at(&self, offset: u64) -> Result<VersionedValue> {
        let mut flag = [0u8; 1];
        self.file.read_exact_at(&mut flag, offset)?;
        let mut position = offset + 1;

        let value = if flag[0] == 1 {
            let mut len_buf = [0u8; 4];
            self.file.read_exact_at(&mut len_buf, position)?;
            position += 4;

            let mut value = vec![0u8; u32::from_le_bytes(len_buf) as usize];
            self.file.read_exact_at(&mut value, position)?;
            position += value.len() as u64;
            Some(value)
        } else {
            None
        };

        let mut sequence = [0u8; 4];
        self.file.read_exact_at(&mut sequence, position)?;
        Ok(VersionedValue {
            value,
            sequence: u32::from_le_bytes(sequence),
        })
    }
}
