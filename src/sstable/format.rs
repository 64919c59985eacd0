//! On-disk codecs for the SSTable file regions.
//!
//! All integers are little-endian. The header is the only region that is
//! ever rewritten: a merge reserves it up front and patches it in place once
//! the output key count is known, which is why its length must be fixed
//! before any record is written.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::bloom::BloomFilter;
use crate::error::Result;
use crate::memtable::VersionedValue;

/// Footer length: u64 index_start + u32 index_len.
pub const FOOTER_SIZE: u64 = 12;

/// Header length before the bloom words: key_count, m_bits, word_count,
/// reserved, each u32.
pub const HEADER_FIXED_SIZE: u64 = 16;

/// Total header length for a table carrying this filter.
pub fn header_size(bloom: &BloomFilter) -> u64 {
    HEADER_FIXED_SIZE + 8 * bloom.words().len() as u64
}

pub fn write_header<W: Write>(writer: &mut W, key_count: u32, bloom: &BloomFilter) -> Result<()> {
    writer.write_u32::<LittleEndian>(key_count)?;
    writer.write_u32::<LittleEndian>(bloom.m_bits() as u32)?;
    writer.write_u32::<LittleEndian>(bloom.words().len() as u32)?;
    writer.write_u32::<LittleEndian>(0)?;
    for &word in bloom.words() {
        writer.write_u64::<LittleEndian>(word)?;
    }
    Ok(())
}

pub fn read_header<R: Read>(reader: &mut R) -> Result<(u32, BloomFilter)> {
    let key_count = reader.read_u32::<LittleEndian>()?;
    let m_bits = reader.read_u32::<LittleEndian>()?;
    let word_count = reader.read_u32::<LittleEndian>()?;
    let _reserved = reader.read_u32::<LittleEndian>()?;

    let mut words = vec![0u64; word_count as usize];
    for word in words.iter_mut() {
        *word = reader.read_u64::<LittleEndian>()?;
    }
    Ok((key_count, BloomFilter::from_parts(m_bits as u64, words)))
}

/// Record layout: u8 presence flag, the value bytes behind a u32 length when
/// present, then the u32 sequence number. Returns the encoded length.
pub fn write_record<W: Write>(writer: &mut W, entry: &VersionedValue) -> Result<u64> {
    let mut written = 1u64;
    match &entry.value {
        Some(value) => {
            writer.write_u8(1)?;
            writer.write_u32::<LittleEndian>(value.len() as u32)?;
            writer.write_all(value)?;
            written += 4 + value.len() as u64;
        }
        None => writer.write_u8(0)?,
    }
    writer.write_u32::<LittleEndian>(entry.sequence)?;
    Ok(written + 4)
}

pub fn write_footer<W: Write>(writer: &mut W, index_start: u64, index_len: u32) -> Result<()> {
    writer.write_u64::<LittleEndian>(index_start)?;
    writer.write_u32::<LittleEndian>(index_len)?;
    Ok(())
}

pub fn read_footer(mut footer: &[u8]) -> Result<(u64, u32)> {
    let index_start = footer.read_u64::<LittleEndian>()?;
    let index_len = footer.read_u32::<LittleEndian>()?;
    Ok((index_start, index_len))
}

/// Counts the bytes pushed through an inner writer, so record and index
/// offsets can be captured while streaming.
pub struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut bloom = BloomFilter::new(100);
        bloom.add(b"alpha");
        bloom.add(b"beta");

        let mut buf = Vec::new();
        write_header(&mut buf, 42, &bloom).unwrap();
        assert_eq!(buf.len() as u64, header_size(&bloom));

        let (key_count, decoded) = read_header(&mut buf.as_slice()).unwrap();
        assert_eq!(key_count, 42);
        assert_eq!(decoded, bloom);
    }

    #[test]
    fn test_record_round_trip_with_value() {
        let entry = VersionedValue {
            value: Some(b"payload".to_vec()),
            sequence: 9,
        };
        let mut buf = Vec::new();
        let written = write_record(&mut buf, &entry).unwrap();
        assert_eq!(written, buf.len() as u64);
        assert_eq!(buf[0], 1);

        // 1 flag + 4 len + 7 value + 4 sequence
        assert_eq!(buf.len(), 16);
    }

    #[test]
    fn test_record_tombstone_encoding() {
        let entry = VersionedValue {
            value: None,
            sequence: 3,
        };
        let mut buf = Vec::new();
        let written = write_record(&mut buf, &entry).unwrap();
        assert_eq!(written, 5);
        assert_eq!(buf[0], 0);
    }

    #[test]
    fn test_footer_round_trip() {
        let mut buf = Vec::new();
        write_footer(&mut buf, 4096, 512).unwrap();
        assert_eq!(buf.len() as u64, FOOTER_SIZE);

        let (index_start, index_len) = read_footer(&buf).unwrap();
        assert_eq!(index_start, 4096);
        assert_eq!(index_len, 512);
    }

    #[test]
    fn test_counting_writer_tracks_offsets() {
        let mut writer = CountingWriter::new(Vec::new());
        writer.write_all(b"abcd").unwrap();
        assert_eq!(writer.bytes_written(), 4);
        writer.write_all(b"ef").unwrap();
        assert_eq!(writer.bytes_written(), 6);
    }
}
