use arbor_common::{Result, error::Error};
use arbor_encodings::{BlockSize, BlockStreamWriter, EncodingStats, write_u16, write_varint};

use crate::{
    address::{DocId, NodeAddress},
    config::FieldConfig,
};

use super::FORMAT_VERSION;

/// Encoded postings of one term, with the figures gathered while encoding.
#[derive(Debug, Clone)]
pub struct EncodedPostings {
    pub bytes: Vec<u8>,
    pub doc_count: usize,
    pub address_count: usize,
    pub stats: EncodingStats,
}

/// Writes address sequences in the postings format with fixed field options.
pub struct PostingsEncoder {
    config: FieldConfig,
}

impl PostingsEncoder {
    pub fn new(config: FieldConfig) -> Self {
        PostingsEncoder { config }
    }

    pub fn block_size(&self) -> BlockSize {
        self.config.block_size
    }

    /// Encodes `addresses`, which must be non-empty and strictly increasing.
    ///
    /// Violations are reported as `InvariantViolation`: they indicate a bug in
    /// whatever produced the sequence, and the input is never reordered.
    pub fn encode(&self, addresses: &[NodeAddress]) -> Result<EncodedPostings> {
        if addresses.is_empty() {
            return Err(Error::invariant_violation(
                "empty postings are never materialized",
            ));
        }
        if let Some(i) = addresses.windows(2).position(|pair| pair[0] >= pair[1]) {
            return Err(Error::invariant_violation(format!(
                "postings are not strictly increasing at index {}: {} is followed by {}",
                i + 1,
                addresses[i],
                addresses[i + 1]
            )));
        }

        let block_size = self.config.block_size;
        let mut streams = BlockStreamWriter::new(block_size, self.config.compression);
        let documents: Vec<&[NodeAddress]> = addresses
            .chunk_by(|a, b| a.doc_id == b.doc_id)
            .collect();

        let mut skip_table = Vec::new();
        let mut blocks = Vec::new();
        let mut prev_doc: Option<DocId> = None;
        let mut scratch = DocumentScratch::default();

        for block in documents.chunks(block_size.get()) {
            let mut doc_gaps = Vec::with_capacity(block.len());
            let mut payload_lens = Vec::with_capacity(block.len());
            let mut payloads = Vec::new();
            let block_prev_doc = prev_doc;

            for document in block {
                let doc_id = document[0].doc_id;
                doc_gaps.push(match prev_doc {
                    None => doc_id,
                    Some(prev) => doc_id - prev - 1,
                });
                prev_doc = Some(doc_id);

                let start = payloads.len();
                scratch.encode(document, &mut streams, &mut payloads)?;
                payload_lens.push(len_u32(payloads.len() - start)?);
            }

            let block_start = blocks.len();
            streams.write(&doc_gaps, &mut blocks);
            streams.write(&payload_lens, &mut blocks);
            blocks.extend_from_slice(&payloads);

            let last_doc = block[block.len() - 1][0].doc_id;
            let last_doc_gap = match block_prev_doc {
                None => last_doc,
                Some(prev) => last_doc - prev,
            };
            skip_table.push((last_doc_gap, len_u32(blocks.len() - block_start)?));
        }

        let mut bytes = Vec::with_capacity(blocks.len() + 4 + skip_table.len() * 4);
        bytes.push(FORMAT_VERSION);
        write_u16(&mut bytes, block_size.get() as u16);
        write_varint(&mut bytes, len_u32(documents.len())?);
        write_varint(&mut bytes, len_u32(skip_table.len())?);
        for &(last_doc_gap, len) in &skip_table {
            write_varint(&mut bytes, last_doc_gap);
            write_varint(&mut bytes, len);
        }
        bytes.extend_from_slice(&blocks);

        Ok(EncodedPostings {
            bytes,
            doc_count: documents.len(),
            address_count: addresses.len(),
            stats: streams.stats(),
        })
    }
}

/// Reusable buffers for the four per-document streams.
#[derive(Default)]
struct DocumentScratch {
    prefix_lens: Vec<u32>,
    suffix_lens: Vec<u32>,
    node_ids: Vec<u32>,
    positions: Vec<u32>,
}

impl DocumentScratch {
    fn encode(
        &mut self,
        document: &[NodeAddress],
        streams: &mut BlockStreamWriter,
        target: &mut Vec<u8>,
    ) -> Result<()> {
        self.prefix_lens.clear();
        self.suffix_lens.clear();
        self.node_ids.clear();
        self.positions.clear();

        let mut prev: Option<&NodeAddress> = None;
        for address in document {
            let path = address.path.as_slice();
            let Some(prev) = prev.replace(address) else {
                self.prefix_lens.push(0);
                self.suffix_lens.push(len_u32(path.len())?);
                self.node_ids.extend_from_slice(path);
                self.positions.push(address.position);
                continue;
            };

            let prev_path = prev.path.as_slice();
            let shared = common_prefix_len(prev_path, path);
            self.prefix_lens.push(len_u32(shared)?);
            self.suffix_lens.push(len_u32(path.len() - shared)?);

            if shared == path.len() {
                // Same node: strict order guarantees a larger position.
                self.positions.push(address.position - prev.position - 1);
                continue;
            }
            if shared < prev_path.len() {
                self.node_ids.push(path[shared] - prev_path[shared] - 1);
                self.node_ids.extend_from_slice(&path[shared + 1..]);
            } else {
                self.node_ids.extend_from_slice(&path[shared..]);
            }
            self.positions.push(address.position);
        }

        write_varint(target, len_u32(document.len())?);
        streams.write(&self.prefix_lens, target);
        streams.write(&self.suffix_lens, target);
        streams.write(&self.node_ids, target);
        streams.write(&self.positions, target);
        Ok(())
    }
}

fn common_prefix_len(a: &[u32], b: &[u32]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn len_u32(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        Error::invariant_violation(format!("length {len} does not fit the postings format"))
    })
}
