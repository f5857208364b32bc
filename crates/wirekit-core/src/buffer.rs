//! Cursor-based reader over an immutable byte buffer.

use crate::error::{Error, Result};
use bytes::Bytes;
use prost::encoding::decode_varint;
use std::ops::Range;

/// Varints are at most 10 bytes for a 64-bit value
const MAX_VARINT_LEN: usize = 10;

/// Reads varints at absolute positions of a shared byte buffer.
///
/// The cursor is per-decoder state. A decoder belongs to a single parse
/// pass; clone the underlying [`Bytes`] instead of sharing a decoder.
#[derive(Debug, Clone)]
pub struct BufferDecoder {
    bytes: Bytes,
    cursor: usize,
}

impl BufferDecoder {
    /// Creates a decoder with the cursor at the start of `bytes`
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            cursor: 0,
        }
    }

    /// Current cursor position
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Moves the cursor to `position`
    pub fn set_cursor(&mut self, position: usize) {
        self.cursor = position;
    }

    /// First readable index
    pub fn start_index(&self) -> usize {
        0
    }

    /// One past the last readable index
    pub fn end_index(&self) -> usize {
        self.bytes.len()
    }

    /// Advances the cursor past one varint.
    pub fn skip_varint(&mut self) -> Result<()> {
        let start = self.cursor;
        let remaining = self.bytes.get(start..).unwrap_or(&[]);

        for (i, &byte) in remaining.iter().take(MAX_VARINT_LEN).enumerate() {
            if byte & 0x80 == 0 {
                self.cursor = start + i + 1;
                return Ok(());
            }
        }

        Err(Error::varint_decode(start))
    }

    /// Reads an unsigned varint at `position` and moves the cursor past it.
    ///
    /// Bits above the low 32 are discarded.
    pub fn get_unsigned_varint32_at(&mut self, position: usize) -> Result<u32> {
        self.get_varint64_at(position).map(|value| value as u32)
    }

    /// Reads a full 64-bit varint at `position` and moves the cursor past it
    pub fn get_varint64_at(&mut self, position: usize) -> Result<u64> {
        let mut remaining = self
            .bytes
            .get(position..)
            .ok_or_else(|| Error::varint_decode(position))?;
        let available = remaining.len();

        let value = decode_varint(&mut remaining).map_err(|_| Error::varint_decode(position))?;

        self.cursor = position + (available - remaining.len());
        Ok(value)
    }

    /// Returns a zero-copy view of `range`, or `None` if it is out of bounds
    pub fn slice(&self, range: Range<usize>) -> Option<Bytes> {
        if range.start > range.end || range.end > self.bytes.len() {
            return None;
        }
        Some(self.bytes.slice(range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_varint_single_byte() {
        let mut decoder = BufferDecoder::new(vec![0x08]);
        assert_eq!(decoder.get_unsigned_varint32_at(0).unwrap(), 8);
        assert_eq!(decoder.cursor(), 1);
    }

    #[test]
    fn test_get_varint_multi_byte() {
        // 300 at offset 1
        let mut decoder = BufferDecoder::new(vec![0x00, 0xAC, 0x02, 0x01]);
        assert_eq!(decoder.get_unsigned_varint32_at(1).unwrap(), 300);
        assert_eq!(decoder.cursor(), 3);
    }

    #[test]
    fn test_get_varint_max() {
        let data = vec![0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut decoder = BufferDecoder::new(data);
        assert_eq!(decoder.get_varint64_at(0).unwrap(), u64::MAX);
        assert_eq!(decoder.cursor(), 10);
        assert_eq!(decoder.get_unsigned_varint32_at(0).unwrap(), u32::MAX);
    }

    #[test]
    fn test_get_varint_truncated() {
        let mut decoder = BufferDecoder::new(vec![0x80, 0x80]);
        assert_eq!(decoder.get_varint64_at(0), Err(Error::varint_decode(0)));
        assert_eq!(decoder.get_varint64_at(5), Err(Error::varint_decode(5)));
    }

    #[test]
    fn test_skip_varint() {
        let mut decoder = BufferDecoder::new(vec![0x96, 0x01, 0x05]);
        decoder.skip_varint().unwrap();
        assert_eq!(decoder.cursor(), 2);
        decoder.skip_varint().unwrap();
        assert_eq!(decoder.cursor(), 3);
        assert!(decoder.skip_varint().is_err());
    }

    #[test]
    fn test_skip_varint_too_long() {
        let mut decoder = BufferDecoder::new(vec![0xFF; 12]);
        assert_eq!(decoder.skip_varint(), Err(Error::varint_decode(0)));
        assert_eq!(decoder.cursor(), 0);
    }

    #[test]
    fn test_slice_bounds() {
        let decoder = BufferDecoder::new(vec![1, 2, 3, 4]);
        assert_eq!(decoder.slice(1..3).unwrap().as_ref(), &[2, 3]);
        assert!(decoder.slice(2..5).is_none());
        assert_eq!(decoder.end_index(), 4);
    }
}
