//! Low-level byte helpers shared by the block encodings and the postings format.
//!
//! Reading never panics on malformed input: every out-of-bounds access is
//! reported as a `CorruptPostings` error carrying the absolute byte offset.
//! The term name is left empty and filled in by the caller (see
//! [`arbor_common::error::Error::with_postings_context`]).

use arbor_common::{Result, error::Error};
use byteorder::{ByteOrder, LittleEndian};

/// Maximum number of bytes a LEB128-encoded `u32` can occupy.
pub const MAX_VARINT_LEN: usize = 5;

/// Appends `value` as a little-endian `u16`.
pub fn write_u16(target: &mut Vec<u8>, value: u16) {
    let mut buf = [0u8; 2];
    LittleEndian::write_u16(&mut buf, value);
    target.extend_from_slice(&buf);
}

/// Appends `value` using 7-bit groups, least significant group first.
/// The high bit of every byte except the last one is set.
pub fn write_varint(target: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        target.push((value as u8) | 0x80);
        value >>= 7;
    }
    target.push(value as u8);
}

/// Returns the number of bytes `write_varint` emits for `value`.
pub fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

/// Forward-only reader over an encoded byte slice.
///
/// `base` is the absolute offset of `data[0]` inside the enclosing postings
/// buffer, so that reported offsets always point into the original bytes.
#[derive(Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        ByteReader { data, pos: 0, base }
    }

    /// Absolute offset of the next byte to be read.
    #[inline]
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let Some(&b) = self.data.get(self.pos) else {
            return Err(self.truncated("u8"));
        };
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(LittleEndian::read_u16(bytes))
    }

    pub fn read_varint(&mut self) -> Result<u32> {
        let start = self.offset();
        let mut value = 0u32;
        for i in 0..MAX_VARINT_LEN {
            let b = self.read_u8()?;
            let group = (b & 0x7f) as u32;
            if i == MAX_VARINT_LEN - 1 && group > 0x0f {
                return Err(Error::corrupt_postings("", None, start, "varint overflows u32"));
            }
            value |= group << (7 * i);
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(Error::corrupt_postings(
            "",
            None,
            start,
            "varint is longer than 5 bytes",
        ))
    }

    /// Reads a varint that is used as a length or count and converts it to `usize`.
    pub fn read_len(&mut self) -> Result<usize> {
        self.read_varint().map(|v| v as usize)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(self.truncated("byte range"));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Splits off the next `len` bytes as an independent reader, keeping absolute offsets.
    pub fn sub_reader(&mut self, len: usize) -> Result<ByteReader<'a>> {
        let base = self.offset();
        let bytes = self.read_bytes(len)?;
        Ok(ByteReader::with_base(bytes, base))
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Builds a `CorruptPostings` error at the current offset.
    pub fn corrupt(&self, message: impl Into<String>) -> Error {
        Error::corrupt_postings("", None, self.offset(), message)
    }

    fn truncated(&self, what: &str) -> Error {
        self.corrupt(format!("unexpected end of data while reading {what}"))
    }
}
