use arbor_common::Result;
use bitpacking::{BitPacker, BitPacker1x};

use crate::{
    block::{BlockEncoding, BlockEncodingKind},
    bytes::{ByteReader, varint_len, write_varint},
};

const CHUNK_LEN: usize = BitPacker1x::BLOCK_LEN;

/// Frame-of-reference encoding that stores the minimal value of the block as a
/// reference, followed by the bit-packed differences to that reference.
///
/// Layout: `varint reference | u8 width | packed chunks`. The differences are
/// packed in chunks of 32 values, the last chunk being padded with zeros.
/// A width of zero (all values equal, including single-value blocks) stores
/// no packed data at all.
pub struct FrameOfReferenceEncoding;

impl FrameOfReferenceEncoding {
    fn reference_and_width(values: &[u32]) -> (u32, u8) {
        let (min, max) = values
            .iter()
            .fold((u32::MAX, u32::MIN), |(min, max), &v| (min.min(v), max.max(v)));
        let width = (32 - (max - min).leading_zeros()) as u8;
        (min, width)
    }

    fn packed_size(value_count: usize, width: u8) -> usize {
        let chunks = value_count.div_ceil(CHUNK_LEN);
        chunks * CHUNK_LEN * width as usize / 8
    }
}

impl BlockEncoding for FrameOfReferenceEncoding {
    fn kind(&self) -> BlockEncodingKind {
        BlockEncodingKind::FrameOfReference
    }

    fn encoded_size(&self, values: &[u32]) -> usize {
        let (reference, width) = Self::reference_and_width(values);
        varint_len(reference) + 1 + Self::packed_size(values.len(), width)
    }

    fn encode(&self, values: &[u32], target: &mut Vec<u8>) {
        let (reference, width) = Self::reference_and_width(values);
        write_varint(target, reference);
        target.push(width);
        if width == 0 {
            return;
        }

        let packer = BitPacker1x::new();
        let chunk_size = CHUNK_LEN * width as usize / 8;
        let mut chunk = [0u32; CHUNK_LEN];
        for values in values.chunks(CHUNK_LEN) {
            chunk.fill(0);
            for (slot, &value) in chunk.iter_mut().zip(values) {
                *slot = value - reference;
            }
            let start = target.len();
            target.resize(start + chunk_size, 0);
            let written = packer.compress(&chunk, &mut target[start..], width);
            debug_assert_eq!(written, chunk_size);
        }
    }

    fn decode(
        &self,
        reader: &mut ByteReader<'_>,
        value_count: usize,
        target: &mut Vec<u32>,
    ) -> Result<()> {
        let reference = reader.read_varint()?;
        let width_offset = reader.offset();
        let width = reader.read_u8()?;
        if width > 32 {
            return Err(reader.corrupt(format!(
                "frame-of-reference width {width} at offset {width_offset} exceeds 32 bits"
            )));
        }
        if width == 0 {
            target.extend(std::iter::repeat_n(reference, value_count));
            return Ok(());
        }

        let packer = BitPacker1x::new();
        let chunk_size = CHUNK_LEN * width as usize / 8;
        let mut chunk = [0u32; CHUNK_LEN];
        let mut remaining = value_count;
        while remaining > 0 {
            let packed = reader.read_bytes(chunk_size)?;
            packer.decompress(packed, &mut chunk, width);
            let take = remaining.min(CHUNK_LEN);
            for &delta in &chunk[..take] {
                let value = reference
                    .checked_add(delta)
                    .ok_or_else(|| reader.corrupt("frame-of-reference value overflows u32"))?;
                target.push(value);
            }
            remaining -= take;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(values: &[u32]) -> Vec<u32> {
        let encoding = FrameOfReferenceEncoding;
        let mut encoded = Vec::new();
        encoding.encode(values, &mut encoded);
        assert_eq!(encoded.len(), encoding.encoded_size(values));
        let mut reader = ByteReader::new(&encoded);
        let mut decoded = Vec::new();
        encoding.decode(&mut reader, values.len(), &mut decoded).unwrap();
        assert!(reader.is_empty());
        decoded
    }

    #[test]
    fn test_single_value_stores_raw_reference() {
        let mut encoded = Vec::new();
        FrameOfReferenceEncoding.encode(&[123_456], &mut encoded);
        let mut expected = Vec::new();
        write_varint(&mut expected, 123_456);
        expected.push(0);
        assert_eq!(encoded, expected);
        assert_eq!(round_trip(&[123_456]), vec![123_456]);
    }

    #[test]
    fn test_round_trip_various_lengths() {
        fastrand::seed(7);
        for len in [1, 2, 31, 32, 33, 64, 100, 1024] {
            let values: Vec<u32> = (0..len).map(|_| 5_000 + fastrand::u32(0..700)).collect();
            assert_eq!(round_trip(&values), values, "len {len}");
        }
    }

    #[test]
    fn test_full_width_values() {
        let values = [0, u32::MAX, 17, u32::MAX - 1];
        assert_eq!(round_trip(&values), values);
    }

    #[test]
    fn test_truncated_chunk_is_corrupt() {
        let values: Vec<u32> = (0..40).collect();
        let mut encoded = Vec::new();
        FrameOfReferenceEncoding.encode(&values, &mut encoded);
        encoded.truncate(encoded.len() - 1);
        let mut decoded = Vec::new();
        let err = FrameOfReferenceEncoding
            .decode(&mut ByteReader::new(&encoded), values.len(), &mut decoded)
            .unwrap_err();
        assert!(err.is_corrupt_postings());
    }
}
