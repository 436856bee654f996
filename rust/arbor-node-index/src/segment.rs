//! Sealed segments and their writer.
//!
//! A [`SegmentWriter`] buffers analyzed documents in memory and is the only
//! owner of the segment under construction. [`SegmentWriter::seal`] encodes
//! all postings and produces an immutable [`Segment`] that can be shared by
//! any number of concurrent readers. Segments are never modified afterwards:
//! new documents go to new segments, and [`Segment::merge`] writes new
//! postings from existing ones.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::sync::Arc;

use ahash::AHashMap;
use arbor_common::{Result, error::Error};
use arbor_encodings::EncodingStats;
use itertools::Itertools;
use serde_json::Value;

use crate::{
    address::{DocId, NodeAddress},
    analysis::{AnalysisPipeline, AnalyzedToken},
    config::IndexConfig,
    postings::{PostingsEncoder, TermPostings},
    term::TermKey,
};

/// Read access to the postings of one index unit, keyed by `(field, term)`.
pub trait PostingsSource: Send + Sync {
    /// Postings of `term` in `field`, `None` when the term does not occur.
    fn term_postings(&self, field: &str, term: &TermKey) -> Option<TermPostings>;

    /// Terms of `field` within the given bounds, in dictionary order.
    fn terms_in_range(
        &self,
        field: &str,
        lower: Bound<&TermKey>,
        upper: Bound<&TermKey>,
    ) -> Vec<TermKey>;

    /// All documents with at least one indexed token, in increasing order.
    fn documents(&self) -> &[DocId];
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SegmentStats {
    pub doc_count: usize,
    pub term_count: usize,
    pub address_count: usize,
    pub postings_bytes: usize,
    pub encoding: EncodingStats,
}

type TermDictionary = BTreeMap<TermKey, TermPostings>;

#[derive(Debug)]
pub struct Segment {
    fields: BTreeMap<String, TermDictionary>,
    documents: Vec<DocId>,
    stats: SegmentStats,
}

impl Segment {
    pub fn stats(&self) -> &SegmentStats {
        &self.stats
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn terms(&self, field: &str) -> impl Iterator<Item = (&TermKey, &TermPostings)> {
        self.fields.get(field).into_iter().flatten()
    }

    /// Merges sealed segments into a new one, re-encoding every term with the
    /// options of `config`. The inputs must not share documents.
    pub fn merge(config: &IndexConfig, segments: &[&Segment]) -> Result<Segment> {
        let documents: Vec<DocId> = segments
            .iter()
            .map(|segment| segment.documents.iter().copied())
            .kmerge()
            .collect();
        if let Some(pair) = documents.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(Error::invariant_violation(format!(
                "segments to merge share document {}",
                pair[0]
            )));
        }

        let mut inputs: BTreeMap<&str, BTreeMap<&TermKey, Vec<&TermPostings>>> = BTreeMap::new();
        for segment in segments {
            for (field, terms) in &segment.fields {
                let field_inputs = inputs.entry(field.as_str()).or_default();
                for (term, postings) in terms {
                    field_inputs.entry(term).or_default().push(postings);
                }
            }
        }

        let mut builder = SegmentBuilder::new(documents);
        for (field, terms) in inputs {
            let encoder = PostingsEncoder::new(config.field_config(field));
            for (term, postings) in terms {
                let decoded = postings
                    .iter()
                    .map(|p| p.decode_all())
                    .collect::<Result<Vec<_>>>()?;
                let addresses: Vec<NodeAddress> = decoded.into_iter().kmerge().collect();
                builder.add(field, term.clone(), &encoder, &addresses)?;
            }
        }
        let segment = builder.finish();
        log::debug!(
            "merged {} segments into {} documents, {} terms, {} bytes",
            segments.len(),
            segment.stats.doc_count,
            segment.stats.term_count,
            segment.stats.postings_bytes
        );
        Ok(segment)
    }
}

impl PostingsSource for Segment {
    fn term_postings(&self, field: &str, term: &TermKey) -> Option<TermPostings> {
        self.fields.get(field)?.get(term).cloned()
    }

    fn terms_in_range(
        &self,
        field: &str,
        lower: Bound<&TermKey>,
        upper: Bound<&TermKey>,
    ) -> Vec<TermKey> {
        let Some(terms) = self.fields.get(field) else {
            return Vec::new();
        };
        if is_empty_range(lower, upper) {
            return Vec::new();
        }
        terms.range((lower, upper)).map(|(term, _)| term.clone()).collect()
    }

    fn documents(&self) -> &[DocId] {
        &self.documents
    }
}

/// `BTreeMap::range` rejects inverted bounds; such ranges are simply empty.
fn is_empty_range(lower: Bound<&TermKey>, upper: Bound<&TermKey>) -> bool {
    match (lower, upper) {
        (Bound::Included(l), Bound::Included(u)) => l > u,
        (Bound::Included(l) | Bound::Excluded(l), Bound::Excluded(u))
        | (Bound::Excluded(l), Bound::Included(u)) => l >= u,
        _ => false,
    }
}

struct SegmentBuilder {
    fields: BTreeMap<String, TermDictionary>,
    stats: SegmentStats,
    documents: Vec<DocId>,
}

impl SegmentBuilder {
    fn new(documents: Vec<DocId>) -> Self {
        SegmentBuilder {
            fields: BTreeMap::new(),
            stats: SegmentStats {
                doc_count: documents.len(),
                ..Default::default()
            },
            documents,
        }
    }

    fn add(
        &mut self,
        field: &str,
        term: TermKey,
        encoder: &PostingsEncoder,
        addresses: &[NodeAddress],
    ) -> Result<()> {
        let name = format!("{field}:{term}");
        let encoded = encoder.encode(addresses)?;
        self.stats.term_count += 1;
        self.stats.address_count += encoded.address_count;
        self.stats.postings_bytes += encoded.bytes.len();
        self.stats.encoding.merge(&encoded.stats);
        let postings = TermPostings::open(name, encoded.bytes)?;
        self.fields
            .entry(field.to_string())
            .or_default()
            .insert(term, postings);
        Ok(())
    }

    fn finish(self) -> Segment {
        Segment {
            fields: self.fields,
            documents: self.documents,
            stats: self.stats,
        }
    }
}

#[derive(Default)]
struct FieldBuffer {
    last_doc: Option<DocId>,
    terms: AHashMap<TermKey, Vec<NodeAddress>>,
}

/// Accumulates analyzed documents for one segment.
pub struct SegmentWriter {
    config: IndexConfig,
    fields: BTreeMap<String, FieldBuffer>,
    documents: BTreeSet<DocId>,
}

impl SegmentWriter {
    pub fn new(config: IndexConfig) -> Self {
        SegmentWriter {
            config,
            fields: BTreeMap::new(),
            documents: BTreeSet::new(),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Adds the tokens of one document to `field`.
    ///
    /// Document ids must be strictly increasing per field, every token must
    /// carry `doc_id`, and the tokens of each term must arrive in increasing
    /// address order. The document is rejected as a whole if any check fails.
    pub fn add_document<I>(&mut self, field: &str, doc_id: DocId, tokens: I) -> Result<()>
    where
        I: IntoIterator<Item = AnalyzedToken>,
    {
        let buffer = self.fields.entry(field.to_string()).or_default();
        if let Some(last) = buffer.last_doc.filter(|&last| last >= doc_id) {
            return Err(Error::invalid_arg(
                "doc_id",
                format!("document {doc_id} added to '{field}' after document {last}"),
            ));
        }

        let mut document: AHashMap<TermKey, Vec<NodeAddress>> = AHashMap::new();
        for token in tokens {
            if token.address.doc_id != doc_id {
                return Err(Error::invalid_arg(
                    "tokens",
                    format!("token at {} does not belong to document {doc_id}", token.address),
                ));
            }
            let addresses = document.entry(token.term).or_default();
            if let Some(last) = addresses.last().filter(|&last| *last >= token.address) {
                return Err(Error::invariant_violation(format!(
                    "tokens of a term are out of order in document {doc_id}: {} after {last}",
                    token.address
                )));
            }
            addresses.push(token.address);
        }

        buffer.last_doc = Some(doc_id);
        if document.is_empty() {
            return Ok(());
        }
        for (term, addresses) in document {
            buffer.terms.entry(term).or_default().extend(addresses);
        }
        self.documents.insert(doc_id);
        Ok(())
    }

    /// Analyzes `document` with `pipeline` and adds it to `field`.
    pub fn index_document(
        &mut self,
        field: &str,
        doc_id: DocId,
        document: &Value,
        pipeline: &AnalysisPipeline,
    ) -> Result<()> {
        self.add_document(field, doc_id, pipeline.analyze(doc_id, document))
    }

    /// Encodes all buffered postings with the per-field options.
    pub fn seal(self) -> Result<Segment> {
        let mut builder = SegmentBuilder::new(self.documents.into_iter().collect());
        for (field, buffer) in self.fields {
            let encoder = PostingsEncoder::new(self.config.field_config(&field));
            let terms: BTreeMap<TermKey, Vec<NodeAddress>> = buffer.terms.into_iter().collect();
            for (term, addresses) in terms {
                builder.add(&field, term, &encoder, &addresses)?;
            }
        }
        let segment = builder.finish();
        log::debug!(
            "sealed segment: {} documents, {} terms, {} addresses, {} bytes \
             ({} FOR / {} VByte blocks)",
            segment.stats.doc_count,
            segment.stats.term_count,
            segment.stats.address_count,
            segment.stats.postings_bytes,
            segment.stats.encoding.frame_of_reference_blocks,
            segment.stats.encoding.variable_byte_blocks
        );
        Ok(segment)
    }
}

/// The ordered set of sealed segments a query runs against.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    segments: Vec<Arc<Segment>>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_segment(&mut self, segment: Segment) {
        self.segments.push(Arc::new(segment));
    }

    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.add_segment(segment);
        self
    }

    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    pub fn doc_count(&self) -> usize {
        self.segments.iter().map(|segment| segment.stats.doc_count).sum()
    }

    /// Replaces all segments with a single merged one.
    pub fn merge_all(&mut self, config: &IndexConfig) -> Result<()> {
        if self.segments.len() < 2 {
            return Ok(());
        }
        let inputs: Vec<&Segment> = self.segments.iter().map(Arc::as_ref).collect();
        let merged = Segment::merge(config, &inputs)?;
        self.segments = vec![Arc::new(merged)];
        Ok(())
    }
}
