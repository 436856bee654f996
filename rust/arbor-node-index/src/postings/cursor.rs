use std::sync::Arc;

use arbor_common::{Result, error::Error};
use arbor_encodings::{BlockSize, BlockStreamReader, ByteReader};

use crate::{
    address::{DocId, NodeAddress, NodePath},
    iterator::{Addresses, CursorState, NodeIterator},
};

use super::FORMAT_VERSION;

#[derive(Debug, Clone, Copy)]
struct SkipEntry {
    last_doc: DocId,
    offset: usize,
    len: usize,
}

struct TermPostingsInner {
    name: String,
    bytes: Arc<[u8]>,
    block_size: BlockSize,
    doc_count: usize,
    skip_table: Vec<SkipEntry>,
}

/// Sealed, immutable postings of one term.
///
/// Cheap to clone and safe to share between threads; every reader opens its
/// own [`PostingsCursor`].
#[derive(Clone)]
pub struct TermPostings(Arc<TermPostingsInner>);

impl TermPostings {
    /// Validates the header and skip table of encoded postings.
    ///
    /// `name` identifies the term in error reports. Document payloads are only
    /// checked when a cursor decodes them.
    pub fn open(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Result<TermPostings> {
        let name = name.into();
        let bytes = bytes.into();
        Self::parse(name.clone(), bytes).map_err(|e| e.with_postings_context(&name, None))
    }

    fn parse(name: String, bytes: Arc<[u8]>) -> Result<TermPostings> {
        let mut reader = ByteReader::new(&bytes);
        let version = reader.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::corrupt_postings(
                "",
                None,
                0,
                format!("unsupported postings version {version}"),
            ));
        }
        let block_size_offset = reader.offset();
        let block_size = BlockSize::new(reader.read_u16()? as u32).map_err(|e| {
            Error::corrupt_postings("", None, block_size_offset, e.to_string())
        })?;

        let doc_count = reader.read_len()?;
        if doc_count == 0 {
            return Err(reader.corrupt("postings without documents"));
        }
        let block_count_offset = reader.offset();
        let block_count = reader.read_len()?;
        if block_count != doc_count.div_ceil(block_size.get()) {
            return Err(Error::corrupt_postings(
                "",
                None,
                block_count_offset,
                format!(
                    "{block_count} doc blocks cannot hold {doc_count} documents \
                     of block size {block_size}"
                ),
            ));
        }

        let mut entries = Vec::new();
        let mut prev_last: Option<DocId> = None;
        for _ in 0..block_count {
            let gap = reader.read_varint()?;
            let last_doc = match prev_last {
                None => gap,
                Some(_) if gap == 0 => {
                    return Err(reader.corrupt("doc blocks are not increasing"));
                }
                Some(prev) => prev
                    .checked_add(gap)
                    .ok_or_else(|| reader.corrupt("document id overflows u32"))?,
            };
            let len = reader.read_len()?;
            entries.push((last_doc, len));
            prev_last = Some(last_doc);
        }

        let mut offset = reader.offset();
        let mut skip_table = Vec::with_capacity(entries.len());
        for (last_doc, len) in entries {
            skip_table.push(SkipEntry {
                last_doc,
                offset,
                len,
            });
            offset = offset.saturating_add(len);
        }
        if offset != bytes.len() {
            return Err(Error::corrupt_postings(
                "",
                None,
                reader.offset(),
                format!(
                    "doc blocks end at {offset}, postings are {} bytes long",
                    bytes.len()
                ),
            ));
        }

        Ok(TermPostings(Arc::new(TermPostingsInner {
            name,
            bytes,
            block_size,
            doc_count,
            skip_table,
        })))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0.bytes
    }

    pub fn block_size(&self) -> BlockSize {
        self.0.block_size
    }

    /// Number of documents containing the term.
    pub fn doc_count(&self) -> usize {
        self.0.doc_count
    }

    pub fn doc_block_count(&self) -> usize {
        self.0.skip_table.len()
    }

    pub fn cursor(&self) -> PostingsCursor {
        PostingsCursor::new(self.clone())
    }

    pub fn addresses(&self) -> Addresses<PostingsCursor> {
        Addresses::new(self.cursor())
    }

    /// Decodes every address. Fails on the first corrupt document.
    pub fn decode_all(&self) -> Result<Vec<NodeAddress>> {
        self.addresses().collect()
    }
}

impl std::fmt::Debug for TermPostings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermPostings")
            .field("name", &self.0.name)
            .field("bytes", &self.0.bytes.len())
            .field("block_size", &self.0.block_size)
            .field("doc_count", &self.0.doc_count)
            .finish()
    }
}

/// Skipping cursor over [`TermPostings`].
///
/// Decodes one doc block of document ids at a time and one document's
/// addresses at a time. [`NodeIterator::advance_to_document`] binary-searches
/// the skip table, so jumping over blocks costs no decoding.
///
/// A decoding error exhausts the cursor: the addresses of a corrupt document
/// are never partially returned.
pub struct PostingsCursor {
    postings: TermPostings,
    streams: BlockStreamReader,
    state: CursorState,
    block: Option<usize>,
    block_docs: Vec<DocId>,
    // (absolute offset, length) of each document payload in the block
    payloads: Vec<(usize, usize)>,
    doc_in_block: usize,
    addresses: Vec<NodeAddress>,
    address_index: usize,
    scratch: [Vec<u32>; 4],
}

impl PostingsCursor {
    fn new(postings: TermPostings) -> Self {
        let streams = BlockStreamReader::new(postings.block_size());
        PostingsCursor {
            postings,
            streams,
            state: CursorState::Unstarted,
            block: None,
            block_docs: Vec::new(),
            payloads: Vec::new(),
            doc_in_block: 0,
            addresses: Vec::new(),
            address_index: 0,
            scratch: Default::default(),
        }
    }

    pub fn postings(&self) -> &TermPostings {
        &self.postings
    }

    /// Enters document `doc_index` of block `block`, loading whatever is not
    /// loaded yet.
    fn enter(&mut self, block: usize, doc_index: usize) -> Result<bool> {
        if self.block != Some(block) {
            if let Err(e) = self.load_block(block) {
                return Err(self.fail(e, None));
            }
        }
        self.doc_in_block = doc_index;
        if let Err(e) = self.load_document(doc_index) {
            let doc_id = self.block_docs.get(doc_index).copied();
            return Err(self.fail(e, doc_id));
        }
        self.state = CursorState::Positioned;
        Ok(true)
    }

    fn next_document(&mut self) -> Result<bool> {
        let block = self.block.unwrap_or(0);
        if self.doc_in_block + 1 < self.block_docs.len() {
            self.enter(block, self.doc_in_block + 1)
        } else if block + 1 < self.postings.0.skip_table.len() {
            self.enter(block + 1, 0)
        } else {
            Ok(self.exhaust())
        }
    }

    fn exhaust(&mut self) -> bool {
        self.state = CursorState::Exhausted;
        self.addresses.clear();
        self.address_index = 0;
        false
    }

    fn fail(&mut self, error: Error, doc_id: Option<DocId>) -> Error {
        self.exhaust();
        error.with_postings_context(self.postings.name(), doc_id)
    }

    fn load_block(&mut self, block: usize) -> Result<()> {
        let postings = self.postings.0.clone();
        let entry = postings.skip_table[block];
        let bytes = &postings.bytes[entry.offset..entry.offset + entry.len];
        let mut reader = ByteReader::with_base(bytes, entry.offset);

        let block_size = postings.block_size.get();
        let doc_count = block_size.min(postings.doc_count - block * block_size);
        let [gaps, lens, ..] = &mut self.scratch;
        gaps.clear();
        lens.clear();
        self.streams.read(&mut reader, doc_count, gaps)?;
        self.streams.read(&mut reader, doc_count, lens)?;

        self.block = None;
        self.block_docs.clear();
        let mut prev = match block {
            0 => None,
            _ => Some(postings.skip_table[block - 1].last_doc),
        };
        for &gap in gaps.iter() {
            let doc_id = match prev {
                None => gap,
                Some(prev) => prev
                    .checked_add(gap)
                    .and_then(|d| d.checked_add(1))
                    .ok_or_else(|| reader.corrupt("document id overflows u32"))?,
            };
            self.block_docs.push(doc_id);
            prev = Some(doc_id);
        }
        if prev != Some(entry.last_doc) {
            return Err(reader.corrupt(format!(
                "doc block ends with document {prev:?}, skip table says {}",
                entry.last_doc
            )));
        }

        self.payloads.clear();
        let mut offset = reader.offset();
        for &len in lens.iter() {
            self.payloads.push((offset, len as usize));
            offset += len as usize;
        }
        if offset != entry.offset + entry.len {
            return Err(reader.corrupt(format!(
                "document payloads end at {offset}, doc block ends at {}",
                entry.offset + entry.len
            )));
        }

        self.block = Some(block);
        Ok(())
    }

    fn load_document(&mut self, doc_index: usize) -> Result<()> {
        let postings = self.postings.0.clone();
        let doc_id = self.block_docs[doc_index];
        let (offset, len) = self.payloads[doc_index];
        let mut reader = ByteReader::with_base(&postings.bytes[offset..offset + len], offset);

        let count = reader.read_len()?;
        if count == 0 {
            return Err(reader.corrupt("document without addresses"));
        }
        let [prefix_lens, suffix_lens, node_ids, positions] = &mut self.scratch;
        prefix_lens.clear();
        suffix_lens.clear();
        node_ids.clear();
        positions.clear();
        self.streams.read(&mut reader, count, prefix_lens)?;
        self.streams.read(&mut reader, count, suffix_lens)?;
        let id_count: usize = suffix_lens.iter().map(|&len| len as usize).sum();
        self.streams.read(&mut reader, id_count, node_ids)?;
        self.streams.read(&mut reader, count, positions)?;
        if !reader.is_empty() {
            return Err(reader.corrupt("trailing bytes after document payload"));
        }

        self.addresses.clear();
        self.address_index = 0;
        let mut path = NodePath::default();
        let mut position = 0u32;
        let mut ids = node_ids.as_slice();
        for i in 0..count {
            let prefix = prefix_lens[i] as usize;
            let suffix = suffix_lens[i] as usize;
            let (suffix_ids, rest) = ids.split_at(suffix);
            ids = rest;

            if i == 0 {
                if prefix != 0 {
                    return Err(reader.corrupt("first address of a document shares a path prefix"));
                }
                path.extend(suffix_ids.iter().copied());
                position = positions[i];
            } else if prefix > path.len() {
                return Err(reader.corrupt(format!(
                    "shared prefix {prefix} exceeds previous path depth {}",
                    path.len()
                )));
            } else if suffix == 0 {
                if prefix < path.len() {
                    return Err(
                        reader.corrupt("non-monotonic node path: moved back to an ancestor")
                    );
                }
                position = position
                    .checked_add(positions[i])
                    .and_then(|p| p.checked_add(1))
                    .ok_or_else(|| reader.corrupt("position overflows u32"))?;
            } else {
                let first = if prefix < path.len() {
                    path[prefix]
                        .checked_add(suffix_ids[0])
                        .and_then(|id| id.checked_add(1))
                        .ok_or_else(|| reader.corrupt("node id overflows u32"))?
                } else {
                    suffix_ids[0]
                };
                path.truncate(prefix);
                path.push(first);
                path.extend(suffix_ids[1..].iter().copied());
                position = positions[i];
            }

            self.addresses.push(NodeAddress {
                doc_id,
                path: path.clone(),
                position,
            });
        }
        Ok(())
    }
}

impl NodeIterator for PostingsCursor {
    fn current(&self) -> Option<&NodeAddress> {
        match self.state {
            CursorState::Positioned => self.addresses.get(self.address_index),
            _ => None,
        }
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn advance(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Exhausted => Ok(false),
            CursorState::Unstarted => self.enter(0, 0),
            CursorState::Positioned => {
                if self.address_index + 1 < self.addresses.len() {
                    self.address_index += 1;
                    Ok(true)
                } else {
                    self.next_document()
                }
            }
        }
    }

    fn advance_to_document(&mut self, target: DocId) -> Result<bool> {
        match self.state {
            CursorState::Exhausted => return Ok(false),
            CursorState::Positioned if self.current_doc().is_some_and(|doc| doc >= target) => {
                return Ok(true);
            }
            _ => {}
        }

        let first_block = self.block.unwrap_or(0);
        let skip_table = &self.postings.0.skip_table;
        let block = first_block
            + skip_table[first_block..].partition_point(|entry| entry.last_doc < target);
        if block == skip_table.len() {
            return Ok(self.exhaust());
        }

        let from = match self.block {
            Some(current) if current == block => self.doc_in_block,
            _ => 0,
        };
        if self.block != Some(block) {
            if let Err(e) = self.load_block(block) {
                return Err(self.fail(e, None));
            }
        }
        let doc_index = from + self.block_docs[from..].partition_point(|&doc| doc < target);
        self.enter(block, doc_index)
    }

    fn advance_to_address(&mut self, target: &NodeAddress) -> Result<bool> {
        if !self.advance_to_document(target.doc_id)? {
            return Ok(false);
        }
        if self.current().is_some_and(|current| current >= target) {
            return Ok(true);
        }
        let from = self.address_index;
        let index = from + self.addresses[from..].partition_point(|address| address < target);
        if index < self.addresses.len() {
            self.address_index = index;
            Ok(true)
        } else {
            self.next_document()
        }
    }
}
