use arbor_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

use crate::{
    bytes::ByteReader, frame_of_reference::FrameOfReferenceEncoding,
    variable_byte::VariableByteEncoding,
};

/// Tag written in front of every encoded block.
///
/// The numeric values are part of the storage format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockEncodingKind {
    /// Per-block reference value followed by bit-packed offsets.
    FrameOfReference = 1,
    /// Self-delimiting 7-bit groups per value.
    VariableByte = 2,
}

impl TryFrom<u8> for BlockEncodingKind {
    type Error = ();

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(BlockEncodingKind::FrameOfReference),
            2 => Ok(BlockEncodingKind::VariableByte),
            _ => Err(()),
        }
    }
}

/// Which block encodings a field may use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    /// Picks, per block, whichever of the two encodings is smaller.
    #[default]
    Adaptive,
    /// Always frame-of-reference.
    FrameOfReference,
    /// Always variable-byte.
    VariableByte,
}

pub trait BlockEncoding: Send + Sync {
    fn kind(&self) -> BlockEncodingKind;

    /// Size in bytes of the encoded payload for `values`, excluding the kind tag.
    fn encoded_size(&self, values: &[u32]) -> usize;

    /// Appends the encoded payload for `values` to `target`, excluding the kind tag.
    ///
    /// `values` is never empty.
    fn encode(&self, values: &[u32], target: &mut Vec<u8>);

    /// Decodes `value_count` values from `reader` and appends them to `target`.
    fn decode(
        &self,
        reader: &mut ByteReader<'_>,
        value_count: usize,
        target: &mut Vec<u32>,
    ) -> Result<()>;
}

/// Encodes and decodes single blocks, selecting the encoding per block
/// according to the configured [`CompressionStrategy`].
pub struct BlockCodec {
    strategy: CompressionStrategy,
    frame_of_reference: FrameOfReferenceEncoding,
    variable_byte: VariableByteEncoding,
}

impl BlockCodec {
    pub fn new(strategy: CompressionStrategy) -> Self {
        BlockCodec {
            strategy,
            frame_of_reference: FrameOfReferenceEncoding,
            variable_byte: VariableByteEncoding,
        }
    }

    pub fn strategy(&self) -> CompressionStrategy {
        self.strategy
    }

    fn encoding(&self, kind: BlockEncodingKind) -> &dyn BlockEncoding {
        match kind {
            BlockEncodingKind::FrameOfReference => &self.frame_of_reference,
            BlockEncodingKind::VariableByte => &self.variable_byte,
        }
    }

    /// Chooses the encoding for one block of values.
    ///
    /// Ties go to variable-byte since it decodes without unpacking a padded chunk.
    pub fn select(&self, values: &[u32]) -> BlockEncodingKind {
        match self.strategy {
            CompressionStrategy::FrameOfReference => BlockEncodingKind::FrameOfReference,
            CompressionStrategy::VariableByte => BlockEncodingKind::VariableByte,
            CompressionStrategy::Adaptive => {
                let for_size = self.frame_of_reference.encoded_size(values);
                let vbyte_size = self.variable_byte.encoded_size(values);
                if for_size < vbyte_size {
                    BlockEncodingKind::FrameOfReference
                } else {
                    BlockEncodingKind::VariableByte
                }
            }
        }
    }

    /// Writes the kind tag followed by the encoded block. Returns the chosen kind.
    pub fn encode_block(&self, values: &[u32], target: &mut Vec<u8>) -> BlockEncodingKind {
        debug_assert!(!values.is_empty());
        let kind = self.select(values);
        let encoding = self.encoding(kind);
        debug_assert_eq!(encoding.kind(), kind);
        target.push(kind as u8);
        encoding.encode(values, target);
        log::trace!(
            "encoded block of {} values with {:?} ({} bytes)",
            values.len(),
            kind,
            encoding.encoded_size(values) + 1
        );
        kind
    }

    /// Reads one tagged block holding `value_count` values.
    ///
    /// Decoding honours whatever kind the block was written with, independent of
    /// this codec's own strategy.
    pub fn decode_block(
        &self,
        reader: &mut ByteReader<'_>,
        value_count: usize,
        target: &mut Vec<u32>,
    ) -> Result<BlockEncodingKind> {
        let tag_offset = reader.offset();
        let tag = reader.read_u8()?;
        let kind = BlockEncodingKind::try_from(tag).map_err(|_| {
            Error::corrupt_postings("", None, tag_offset, format!("unknown block kind {tag}"))
        })?;
        self.encoding(kind).decode(reader, value_count, target)?;
        Ok(kind)
    }
}

impl Default for BlockCodec {
    fn default() -> Self {
        BlockCodec::new(CompressionStrategy::default())
    }
}
