use arbor_common::Result;

use crate::{
    block::{BlockEncoding, BlockEncodingKind},
    bytes::{ByteReader, varint_len, write_varint},
};

/// Variable-byte encoding: every value is written independently as a sequence
/// of 7-bit groups. Used for irregular distributions and undersized blocks
/// where a bit-packed chunk would be mostly padding.
pub struct VariableByteEncoding;

impl BlockEncoding for VariableByteEncoding {
    fn kind(&self) -> BlockEncodingKind {
        BlockEncodingKind::VariableByte
    }

    fn encoded_size(&self, values: &[u32]) -> usize {
        values.iter().map(|&v| varint_len(v)).sum()
    }

    fn encode(&self, values: &[u32], target: &mut Vec<u8>) {
        for &value in values {
            write_varint(target, value);
        }
    }

    fn decode(
        &self,
        reader: &mut ByteReader<'_>,
        value_count: usize,
        target: &mut Vec<u32>,
    ) -> Result<()> {
        target.reserve(value_count);
        for _ in 0..value_count {
            target.push(reader.read_varint()?);
        }
        Ok(())
    }
}
