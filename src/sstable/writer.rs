//! SSTable write paths: flushing a memtable and merging existing tables.
//!
//! A flush knows its entry count up front, so the whole file streams out in
//! one pass. A merge does not: the header is reserved with a bloom filter
//! sized from the summed input key counts (an upper bound, which fixes the
//! header length), records stream into the output while the three index
//! sub-sections buffer into scratch files, and once the merge finishes the
//! scratches are concatenated after the records, the footer is written, and
//! the header is rewritten in place with the true key count.

use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Arc;

use super::format::{self, CountingWriter};
use super::merge::merge_tables;
use super::SSTable;
use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::memtable::Memtable;

/// Flushes a memtable into a new table file at `path`. The partial file is
/// removed if anything fails.
pub(crate) fn create_from_memtable(path: &Path, memtable: &Memtable) -> Result<SSTable> {
    build_from_memtable(path, memtable).map_err(|err| {
        let _ = fs::remove_file(path);
        err
    })
}

/// Merges `tables` into a single new table file at `path`. The partial file
/// is removed if anything fails.
pub(crate) fn create_from_merge(path: &Path, tables: &[Arc<SSTable>]) -> Result<SSTable> {
    build_from_merge(path, tables).map_err(|err| {
        let _ = fs::remove_file(path);
        err
    })
}

fn build_from_memtable(path: &Path, memtable: &Memtable) -> Result<SSTable> {
    let entries = memtable.sorted_entries();
    let file = create_output(path)?;

    let mut bloom = BloomFilter::new(entries.len());
    for (key, _) in &entries {
        bloom.add(key);
    }

    let mut writer = CountingWriter::new(BufWriter::new(&file));
    format::write_header(&mut writer, entries.len() as u32, &bloom)?;

    let mut offsets = Vec::with_capacity(entries.len());
    for (_, value) in &entries {
        offsets.push(writer.bytes_written());
        format::write_record(&mut writer, value)?;
    }

    let index_start = writer.bytes_written();
    let mut key_offsets = Vec::with_capacity(entries.len());
    let mut key_bytes = 0u32;
    for (key, _) in &entries {
        key_offsets.push(key_bytes);
        writer.write_u32::<LittleEndian>(key.len() as u32)?;
        writer.write_all(key)?;
        key_bytes += 4 + key.len() as u32;
    }
    for offset in &offsets {
        writer.write_u64::<LittleEndian>(*offset)?;
    }
    for key_offset in &key_offsets {
        writer.write_u32::<LittleEndian>(*key_offset)?;
    }

    let index_len = (writer.bytes_written() - index_start) as u32;
    format::write_footer(&mut writer, index_start, index_len)?;
    writer.flush()?;
    drop(writer);

    SSTable::load(path.to_path_buf(), file)
}

fn build_from_merge(path: &Path, tables: &[Arc<SSTable>]) -> Result<SSTable> {
    let file = create_output(path)?;
    let scratch_dir = path.parent().unwrap_or_else(|| Path::new("."));

    // Upper bound on the output key count; the header length derived from
    // it must not change once records start streaming.
    let expected: usize = tables.iter().map(|table| table.key_count()).sum();
    let mut bloom = BloomFilter::new(expected);
    let header_len = format::header_size(&bloom);

    let mut keys_scratch = BufWriter::new(tempfile::tempfile_in(scratch_dir)?);
    let mut offsets_scratch = BufWriter::new(tempfile::tempfile_in(scratch_dir)?);
    let mut key_offsets_scratch = BufWriter::new(tempfile::tempfile_in(scratch_dir)?);

    let mut writer = CountingWriter::new(BufWriter::new(&file));
    writer.write_all(&vec![0u8; header_len as usize])?;

    let mut out_count = 0u32;
    let mut key_bytes = 0u64;
    merge_tables(tables, |key, best| {
        bloom.add(key);
        out_count += 1;

        let record_offset = writer.bytes_written();
        format::write_record(&mut writer, &best)?;

        key_offsets_scratch.write_u32::<LittleEndian>(key_bytes as u32)?;
        keys_scratch.write_u32::<LittleEndian>(key.len() as u32)?;
        keys_scratch.write_all(key)?;
        key_bytes += 4 + key.len() as u64;

        offsets_scratch.write_u64::<LittleEndian>(record_offset)?;
        Ok(())
    })?;

    let index_start = writer.bytes_written();
    let index_len = key_bytes + u64::from(out_count) * 8 + u64::from(out_count) * 4;
    writer.flush()?;
    drop(writer);

    let mut output = &file;
    for scratch in [keys_scratch, offsets_scratch, key_offsets_scratch] {
        let mut scratch = scratch
            .into_inner()
            .map_err(|err| Error::from(err.into_error()))?;
        scratch.seek(SeekFrom::Start(0))?;
        io::copy(&mut scratch, &mut output)?;
    }
    format::write_footer(&mut output, index_start, index_len as u32)?;

    // Patch the reserved header now that the true key count and the fully
    // populated filter are known.
    let mut header = Vec::with_capacity(header_len as usize);
    format::write_header(&mut header, out_count, &bloom)?;
    file.write_all_at(&header, 0)?;

    SSTable::load(path.to_path_buf(), file)
}

fn create_output(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?)
}
