//! Membership sketch used to skip SSTables on point reads.
//!
//! The filter never reports a false negative: every key added will probe as
//! present. False positives only cost a wasted binary search over the table
//! index. Two probe positions per key are derived from a single 64-bit
//! FNV-1a pass, which keeps the sketch cheap to compute and to serialize
//! into the SSTable header.

use fnv::FnvHasher;
use std::hash::Hasher;

const MIX_CONST: u64 = 1_791_791_791;
const MIX_SHIFT: u32 = 33;

/// Minimum bit-array size, regardless of how few keys are expected.
const MIN_BITS: u64 = 64;

/// Bits reserved per expected key. Ten bits with two probes lands near a 1%
/// false-positive rate.
const BITS_PER_KEY: u64 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct BloomFilter {
    m_bits: u64,
    words: Vec<u64>,
}

impl BloomFilter {
    /// Create a filter sized for the expected number of keys. Counts below
    /// one are clamped up so the bit array is never empty.
    pub fn new(expected_items: usize) -> Self {
        let expected = expected_items.max(1) as u64;
        let m_bits = (expected * BITS_PER_KEY).max(MIN_BITS);
        let word_count = (m_bits + 63) / 64;
        Self {
            m_bits,
            words: vec![0; word_count as usize],
        }
    }

    /// Reassemble a filter from its serialized header fields.
    pub fn from_parts(m_bits: u64, words: Vec<u64>) -> Self {
        Self { m_bits, words }
    }

    pub fn add(&mut self, key: &[u8]) {
        let (h1, h2) = probe_hashes(key);
        self.set_bit(h1 % self.m_bits);
        self.set_bit(h2 % self.m_bits);
    }

    pub fn might_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = probe_hashes(key);
        self.bit(h1 % self.m_bits) && self.bit(h2 % self.m_bits)
    }

    pub fn m_bits(&self) -> u64 {
        self.m_bits
    }

    pub fn words(&self) -> &[u64] {
        &self.words
    }

    fn set_bit(&mut self, bit: u64) {
        let word = (bit / 64) as usize;
        let shift = bit % 64;
        self.words[word] |= 1 << shift;
    }

    fn bit(&self, bit: u64) -> bool {
        let word = (bit / 64) as usize;
        let shift = bit % 64;
        self.words[word] & (1 << shift) != 0
    }
}

/// Derive both probe positions from one 64-bit FNV-1a pass. The second hash
/// is a mix of the first; zero is remapped so the two probes never collapse
/// onto the same stride.
fn probe_hashes(key: &[u8]) -> (u64, u64) {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    let h1 = hasher.finish();
    let mut h2 = (h1 >> MIX_SHIFT) ^ h1.wrapping_mul(MIX_CONST);
    if h2 == 0 {
        h2 = MIX_CONST;
    }
    (h1, h2)
}
