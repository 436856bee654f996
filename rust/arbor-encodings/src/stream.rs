//! Streams of integers cut into fixed-capacity blocks.
//!
//! A stream of `n` values is written as `ceil(n / block_size)` tagged blocks.
//! The value count itself is not stored: the enclosing format always knows how
//! many values a stream holds, and each block holds `min(block_size, remaining)`.

use arbor_common::Result;

use crate::{
    block::{BlockCodec, BlockEncodingKind, CompressionStrategy},
    block_size::BlockSize,
    bytes::ByteReader,
};

/// Number of blocks written per encoding, accumulated by a [`BlockStreamWriter`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EncodingStats {
    pub frame_of_reference_blocks: usize,
    pub variable_byte_blocks: usize,
    pub values: usize,
}

impl EncodingStats {
    pub fn blocks(&self) -> usize {
        self.frame_of_reference_blocks + self.variable_byte_blocks
    }

    pub fn merge(&mut self, other: &EncodingStats) {
        self.frame_of_reference_blocks += other.frame_of_reference_blocks;
        self.variable_byte_blocks += other.variable_byte_blocks;
        self.values += other.values;
    }
}

pub struct BlockStreamWriter {
    codec: BlockCodec,
    block_size: BlockSize,
    stats: EncodingStats,
}

impl BlockStreamWriter {
    pub fn new(block_size: BlockSize, strategy: CompressionStrategy) -> Self {
        BlockStreamWriter {
            codec: BlockCodec::new(strategy),
            block_size,
            stats: EncodingStats::default(),
        }
    }

    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    /// Writes `values` as a sequence of blocks. An empty stream writes nothing.
    pub fn write(&mut self, values: &[u32], target: &mut Vec<u8>) {
        for block in values.chunks(self.block_size.get()) {
            match self.codec.encode_block(block, target) {
                BlockEncodingKind::FrameOfReference => self.stats.frame_of_reference_blocks += 1,
                BlockEncodingKind::VariableByte => self.stats.variable_byte_blocks += 1,
            }
        }
        self.stats.values += values.len();
    }

    pub fn stats(&self) -> EncodingStats {
        self.stats
    }
}

pub struct BlockStreamReader {
    codec: BlockCodec,
    block_size: usize,
}

impl BlockStreamReader {
    pub fn new(block_size: BlockSize) -> Self {
        BlockStreamReader {
            codec: BlockCodec::default(),
            block_size: block_size.get(),
        }
    }

    /// Reads a stream of `value_count` values and appends them to `target`.
    pub fn read(
        &self,
        reader: &mut ByteReader<'_>,
        value_count: usize,
        target: &mut Vec<u32>,
    ) -> Result<()> {
        let mut remaining = value_count;
        while remaining > 0 {
            let count = remaining.min(self.block_size);
            self.codec.decode_block(reader, count, target)?;
            remaining -= count;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_round_trip_all_block_sizes() {
        fastrand::seed(42);
        let values: Vec<u32> = (0..3000)
            .map(|i| if i % 97 == 0 { fastrand::u32(..) } else { fastrand::u32(0..64) })
            .collect();
        for block_size in BlockSize::all() {
            for strategy in [
                CompressionStrategy::Adaptive,
                CompressionStrategy::FrameOfReference,
                CompressionStrategy::VariableByte,
            ] {
                let mut writer = BlockStreamWriter::new(block_size, strategy);
                let mut encoded = Vec::new();
                writer.write(&values, &mut encoded);
                assert_eq!(writer.stats().blocks(), values.len().div_ceil(block_size.get()));

                let mut decoded = Vec::new();
                let mut reader = ByteReader::new(&encoded);
                BlockStreamReader::new(block_size)
                    .read(&mut reader, values.len(), &mut decoded)
                    .unwrap();
                assert!(reader.is_empty());
                assert_eq!(decoded, values, "block size {block_size}, {strategy:?}");
            }
        }
    }

    #[test]
    fn test_adaptive_mixes_encodings() {
        let mut values: Vec<u32> = (0..128).map(|i| 10_000 + i % 2).collect();
        values.extend([5, 3_000_000]);
        let mut writer = BlockStreamWriter::new(BlockSize::new(128).unwrap(), Default::default());
        let mut encoded = Vec::new();
        writer.write(&values, &mut encoded);
        let stats = writer.stats();
        assert_eq!(stats.frame_of_reference_blocks, 1);
        assert_eq!(stats.variable_byte_blocks, 1);
        assert_eq!(stats.values, 130);
    }

    #[test]
    fn test_empty_stream_writes_nothing() {
        let mut writer = BlockStreamWriter::new(BlockSize::DEFAULT, Default::default());
        let mut encoded = Vec::new();
        writer.write(&[], &mut encoded);
        assert!(encoded.is_empty());
        let mut decoded = Vec::new();
        BlockStreamReader::new(BlockSize::DEFAULT)
            .read(&mut ByteReader::new(&encoded), 0, &mut decoded)
            .unwrap();
        assert!(decoded.is_empty());
    }
}
