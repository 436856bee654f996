//! Per-term postings format.
//!
//! The postings of one term are the sorted [`NodeAddress`] sequence of all its
//! occurrences in a segment. They are grouped by document, documents are
//! grouped into doc blocks of `block_size` documents, and every integer
//! sequence inside is written as a block stream (see `arbor_encodings::stream`).
//!
//! ```text
//! u8      version (1)
//! u16     block size, little-endian
//! varint  document count
//! varint  doc block count
//! skip table, per doc block:
//!     varint  last doc of the block - last doc of the previous block
//!     varint  byte length of the block
//! doc blocks:
//!     stream  doc gaps (first doc absolute, then doc - prev - 1)
//!     stream  payload byte length per document
//!     payloads, per document:
//!         varint  address count
//!         stream  shared path prefix length (with the previous address)
//!         stream  path suffix length
//!         stream  suffix node ids
//!         stream  positions
//! ```
//!
//! The first suffix node id is stored as `id - prev_id - 1` when the previous
//! path continues at that level, and absolute otherwise. A position is stored
//! as `pos - prev_pos - 1` when the address is in the same node as the previous
//! one, and absolute otherwise. Both follow from the strict address order.

mod cursor;
mod encoder;

pub use cursor::{PostingsCursor, TermPostings};
pub use encoder::{EncodedPostings, PostingsEncoder};

use arbor_common::Result;

use crate::{address::NodeAddress, config::FieldConfig, iterator::Addresses};

pub(crate) const FORMAT_VERSION: u8 = 1;

/// Encodes a sorted, non-empty address sequence with the given field options.
pub fn encode(addresses: &[NodeAddress], config: FieldConfig) -> Result<Vec<u8>> {
    PostingsEncoder::new(config)
        .encode(addresses)
        .map(|encoded| encoded.bytes)
}

/// Opens encoded postings and returns a lazy sequence of their addresses.
///
/// Each call yields an independent cursor over the same bytes.
pub fn decode(bytes: &[u8]) -> Result<Addresses<PostingsCursor>> {
    Ok(TermPostings::open("", bytes.to_vec())?.addresses())
}

#[cfg(test)]
mod tests {
    use arbor_encodings::{BlockSize, CompressionStrategy};

    use super::*;

    fn addr(doc: u32, path: &[u32], pos: u32) -> NodeAddress {
        NodeAddress::new(doc, path, pos)
    }

    #[test]
    fn test_encode_decode() {
        let addresses = vec![
            addr(0, &[0], 0),
            addr(0, &[0], 1),
            addr(0, &[0, 0], 1),
            addr(0, &[0, 1], 0),
            addr(0, &[1], 0),
            addr(3, &[], 0),
            addr(3, &[2, 2, 2], 9),
        ];
        for block_size in [1, 2, 1024] {
            let config = FieldConfig::new(
                BlockSize::new(block_size).unwrap(),
                CompressionStrategy::Adaptive,
            );
            let bytes = encode(&addresses, config).unwrap();
            let decoded: Vec<NodeAddress> =
                decode(&bytes).unwrap().collect::<Result<_>>().unwrap();
            assert_eq!(decoded, addresses);
        }
    }
}
