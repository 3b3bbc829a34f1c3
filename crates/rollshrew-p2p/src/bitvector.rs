//! Fixed-length presence bitmap

use anyhow::{anyhow, Result};
use rollshrew_support::utils::{consume_exact, consume_u32, remaining_slice};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Bit `i` lives in byte `i / 8`, most significant bit first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BitVector {
    len: usize,
    bits: Vec<u8>,
}

impl BitVector {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            bits: vec![0u8; len.div_ceil(8)],
        }
    }

    /// Bitmap of `len` bits with `indices` set; out-of-range indices are ignored.
    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut bitvector = Self::new(len);
        for index in indices {
            bitvector.set(index);
        }
        bitvector
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn set(&mut self, index: usize) {
        if index < self.len {
            self.bits[index / 8] |= 0x80 >> (index % 8);
        }
    }

    pub fn get(&self, index: usize) -> bool {
        index < self.len && self.bits[index / 8] & (0x80 >> (index % 8)) != 0
    }

    pub fn count_ones(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    pub fn indices(&self) -> Vec<usize> {
        (0..self.len).filter(|i| self.get(*i)).collect()
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.len as u32).to_be_bytes());
        out.extend_from_slice(&self.bits);
    }

    pub fn decode(cursor: &mut Cursor<Vec<u8>>) -> Result<Self> {
        let len = consume_u32(cursor)? as usize;
        let byte_len = len.div_ceil(8);
        if byte_len > remaining_slice(cursor).len() {
            return Err(anyhow!("bitvector of {} bits exceeds remaining input", len));
        }
        let bits = consume_exact(cursor, byte_len)?;
        let bitvector = Self { len, bits };
        // Padding bits past `len` must be clear.
        if bitvector.count_ones() != bitvector.indices().len() {
            return Err(anyhow!("bitvector has bits set past its length {}", len));
        }
        Ok(bitvector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_and_layout() {
        let bitvector = BitVector::from_indices(10, [0, 3, 9, 42]);
        assert_eq!(bitvector.len(), 10);
        assert!(bitvector.get(0) && bitvector.get(3) && bitvector.get(9));
        assert!(!bitvector.get(1) && !bitvector.get(42));
        assert_eq!(bitvector.indices(), vec![0, 3, 9]);

        let mut out = Vec::new();
        bitvector.encode(&mut out);
        assert_eq!(out, vec![0, 0, 0, 10, 0b1001_0000, 0b0100_0000]);
        assert_eq!(BitVector::decode(&mut Cursor::new(out)).unwrap(), bitvector);
    }

    #[test]
    fn test_decode_rejects_padding_bits() {
        let bytes = vec![0, 0, 0, 2, 0b1110_0000];
        assert!(BitVector::decode(&mut Cursor::new(bytes)).is_err());
    }

    #[test]
    fn test_decode_rejects_length_past_input() {
        let err = BitVector::decode(&mut Cursor::new(vec![0xff, 0xff, 0xff, 0xff])).unwrap_err();
        assert!(err.to_string().contains("exceeds remaining input"));

        // 17 bits need 3 bytes; only 2 follow.
        let mut cursor = Cursor::new(vec![0, 0, 0, 17, 0xff, 0xff]);
        assert!(BitVector::decode(&mut cursor).is_err());
        assert_eq!(cursor.position(), 4);
    }
}
