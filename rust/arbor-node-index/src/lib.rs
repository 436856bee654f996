//! Node-address inverted index over tree-shaped documents.
//!
//! Every term occurrence is recorded as a [`NodeAddress`]: the document id, the
//! path of sibling ordinals leading from the document root to the node that
//! holds the term, and the position of the term inside that node's token
//! stream. Postings of a term are the sorted sequence of its addresses,
//! compressed per term with the block codecs from `arbor-encodings`.
//!
//! The crate provides:
//!
//! - [`address`]: the address value type and its ancestry predicates.
//! - [`term`]: typed term keys with order-preserving numeric encodings.
//! - [`postings`]: the per-term postings format, its encoder and a skipping
//!   cursor over the encoded bytes.
//! - [`iterator`]: the [`NodeIterator`] cursor contract shared with the query
//!   evaluator.
//! - [`segment`]: sealed segments, the segment writer and the corpus handle.
//! - [`analysis`]: the JSON tree analyzer and the token stage pipeline.

pub mod address;
pub mod analysis;
pub mod config;
pub mod iterator;
pub mod postings;
pub mod segment;
pub mod term;

pub use address::{DocId, NodeAddress, NodePath, compare, is_ancestor, is_parent};
pub use config::{FieldConfig, IndexConfig};
pub use iterator::{CursorState, NodeIterator};
pub use postings::{PostingsCursor, PostingsEncoder, TermPostings};
pub use segment::{Corpus, PostingsSource, Segment, SegmentWriter};
pub use term::{Datatype, TermKey};
