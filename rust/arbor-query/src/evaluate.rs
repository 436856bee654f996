//! Query evaluation over a corpus.
//!
//! [`evaluate`] returns a lazy [`Evaluation`] that walks the corpus segments in
//! order, opens one cursor tree per segment and yields a [`DocumentMatch`] for
//! every matching document. Evaluation is synchronous and single-threaded; the
//! only suspension point is the iterator itself.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use arbor_common::{Result, try_or_ret_some_err};
use arbor_node_index::{Corpus, DocId, NodeAddress, NodeIterator, Segment};

use crate::iterators::{ExecContext, build_iterator};
use crate::query::Query;
use crate::stats::{EvaluationStats, StatsCounters};

/// Cooperative cancellation flag shared between a running evaluation and the
/// caller.
///
/// Every search loop of the evaluation checks the flag once per candidate
/// document and when a segment is opened, never in the middle of decoding a
/// block.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EvaluationOptions {
    pub cancellation: Option<CancellationToken>,
}

impl EvaluationOptions {
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// A matching document.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMatch {
    pub doc_id: DocId,
    /// Always `None`: matches are not ranked.
    pub score: Option<f32>,
    /// Addresses that satisfied the query inside the document, in the order
    /// the cursors produced them. For twigs each match contributes its root
    /// followed by the chosen child witnesses.
    pub witnesses: Vec<NodeAddress>,
}

/// Terminal result of running an evaluation to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Matches(Vec<DocumentMatch>),
    NoMatch,
    Cancelled,
}

impl QueryOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryOutcome::Cancelled)
    }

    /// Matched document ids; empty for `NoMatch` and `Cancelled`.
    pub fn doc_ids(&self) -> Vec<DocId> {
        match self {
            QueryOutcome::Matches(matches) => matches.iter().map(|m| m.doc_id).collect(),
            QueryOutcome::NoMatch | QueryOutcome::Cancelled => Vec::new(),
        }
    }
}

/// Starts a lazy evaluation of `query` against every segment of `corpus`.
pub fn evaluate<'a>(
    query: &'a Query,
    corpus: &'a Corpus,
    options: EvaluationOptions,
) -> Evaluation<'a> {
    Evaluation {
        query,
        segments: corpus.segments().iter(),
        cursor: None,
        stats: Arc::new(StatsCounters::default()),
        cancellation: options.cancellation,
        cancelled: false,
        finished: false,
    }
}

/// Lazy sequence of matching documents.
///
/// Yields `Err` and stops at the first error: a corrupt postings list aborts
/// the evaluation instead of returning partial documents. When cancellation
/// is observed the sequence ends early and [`Evaluation::is_cancelled`]
/// reports it.
pub struct Evaluation<'a> {
    query: &'a Query,
    segments: std::slice::Iter<'a, Arc<Segment>>,
    cursor: Option<Box<dyn NodeIterator + 'a>>,
    stats: Arc<StatsCounters>,
    cancellation: Option<CancellationToken>,
    cancelled: bool,
    finished: bool,
}

impl<'a> Evaluation<'a> {
    pub fn stats(&self) -> EvaluationStats {
        self.stats.snapshot()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Drains the evaluation.
    pub fn run(mut self) -> Result<QueryOutcome> {
        let mut matches = Vec::new();
        for document in self.by_ref() {
            matches.push(document?);
        }
        let stats = self.stats();
        log::debug!(
            "{} query: {} matches, {} segments, {} candidate documents, {} child evaluations{}",
            self.query.kind(),
            matches.len(),
            stats.segments,
            stats.candidate_documents,
            stats.child_evaluations,
            if self.cancelled { " (cancelled)" } else { "" }
        );
        Ok(if self.cancelled {
            QueryOutcome::Cancelled
        } else if matches.is_empty() {
            QueryOutcome::NoMatch
        } else {
            QueryOutcome::Matches(matches)
        })
    }

    fn check_cancelled(&mut self) -> bool {
        if self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
        {
            self.cancelled = true;
            self.finished = true;
        }
        self.cancelled
    }

    /// Returns a cursor positioned on a candidate, opening the following
    /// segments as the current one runs out.
    fn positioned_cursor(&mut self) -> Result<Option<&mut Box<dyn NodeIterator + 'a>>> {
        loop {
            if self.cursor.is_none() {
                if self.check_cancelled() {
                    return Ok(None);
                }
                let Some(segment) = self.segments.next() else {
                    return Ok(None);
                };
                let ctx = ExecContext::new(&**segment, self.stats.clone())
                    .with_cancellation(self.cancellation.clone());
                let mut cursor = build_iterator(self.query, &ctx)?;
                self.stats.record_segment();
                if cursor.advance()? {
                    self.cursor = Some(cursor);
                }
                continue;
            }
            if self.cursor.as_ref().is_some_and(|cursor| cursor.is_exhausted()) {
                self.cursor = None;
                continue;
            }
            return Ok(self.cursor.as_mut());
        }
    }

    fn next_match(&mut self) -> Result<Option<DocumentMatch>> {
        let Some(cursor) = self.positioned_cursor()? else {
            return Ok(None);
        };
        let Some(doc_id) = cursor.current_doc() else {
            return Ok(None);
        };
        let mut witnesses = Vec::new();
        while cursor.current_doc() == Some(doc_id) {
            cursor.collect_witnesses(&mut witnesses);
            if !cursor.advance()? {
                break;
            }
        }
        Ok(Some(DocumentMatch {
            doc_id,
            score: None,
            witnesses,
        }))
    }
}

impl Iterator for Evaluation<'_> {
    type Item = Result<DocumentMatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished || self.check_cancelled() {
            return None;
        }
        let next = self.next_match();
        // Cursors that observed the token stopped early, so their result may
        // be incomplete.
        if self.check_cancelled() {
            return None;
        }
        if !matches!(next, Ok(Some(_))) {
            self.finished = true;
        }
        try_or_ret_some_err!(next).map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use arbor_node_index::{IndexConfig, SegmentWriter, analysis::AnalysisPipeline};
    use serde_json::{Value, json};

    use super::*;
    use crate::query::{BooleanQuery, BooleanScope, build_node_query};

    fn segment(first_doc: u32, documents: &[Value]) -> Segment {
        let pipeline = AnalysisPipeline::default();
        let mut writer = SegmentWriter::new(IndexConfig::default());
        for (offset, document) in documents.iter().enumerate() {
            writer
                .index_document("content", first_doc + offset as u32, document, &pipeline)
                .unwrap();
        }
        writer.seal().unwrap()
    }

    fn corpus() -> Corpus {
        Corpus::new()
            .with_segment(segment(0, &[json!({ "a": "red" }), json!({ "a": "blue" })]))
            .with_segment(segment(2, &[json!({ "b": ["red", "red"] })]))
            .with_segment(segment(3, &[json!({ "c": "green" })]))
    }

    fn red() -> Query {
        build_node_query("content", "red", None, None).unwrap().into()
    }

    #[test]
    fn test_matches_across_segments() {
        let corpus = corpus();
        let query = red();
        let evaluation = evaluate(&query, &corpus, EvaluationOptions::default());
        let matches: Vec<DocumentMatch> = evaluation.map(|m| m.unwrap()).collect();
        assert_eq!(matches.iter().map(|m| m.doc_id).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(matches[0].score, None);
        assert_eq!(
            matches[1].witnesses,
            vec![NodeAddress::new(2, &[0], 1), NodeAddress::new(2, &[0], 3)]
        );
    }

    #[test]
    fn test_stats_and_outcome() {
        let corpus = corpus();
        let query = red();
        let mut evaluation = evaluate(&query, &corpus, EvaluationOptions::default());
        assert!(evaluation.next().is_some());
        let stats = evaluation.stats();
        assert_eq!(stats.segments, 1);
        assert_eq!(stats.candidate_documents, 1);

        let outcome = evaluate(&query, &corpus, EvaluationOptions::default())
            .run()
            .unwrap();
        assert_eq!(outcome.doc_ids(), vec![0, 2]);

        let missing: Query = build_node_query("content", "purple", None, None)
            .unwrap()
            .into();
        let outcome = evaluate(&missing, &corpus, EvaluationOptions::default())
            .run()
            .unwrap();
        assert_eq!(outcome, QueryOutcome::NoMatch);
    }

    #[test]
    fn test_candidates_include_rejected_documents() {
        let corpus = corpus();
        let query: Query = BooleanQuery::new(BooleanScope::Document)
            .must(build_node_query("content", "red", None, None).unwrap())
            .must_not(build_node_query("content", "red", Some("b"), None).unwrap())
            .into();
        let mut evaluation = evaluate(&query, &corpus, EvaluationOptions::default());
        let matches: Vec<DocId> = evaluation.by_ref().map(|m| m.unwrap().doc_id).collect();
        assert_eq!(matches, vec![0]);
        let stats = evaluation.stats();
        assert_eq!(stats.segments, 3);
        assert_eq!(stats.candidate_documents, 2);
    }

    #[test]
    fn test_cancellation() {
        let corpus = corpus();
        let query = red();
        let token = CancellationToken::new();
        let options = EvaluationOptions::default().with_cancellation(token.clone());
        let mut evaluation = evaluate(&query, &corpus, options);
        assert_eq!(evaluation.next().unwrap().unwrap().doc_id, 0);
        token.cancel();
        assert!(evaluation.next().is_none());
        assert!(evaluation.is_cancelled());
        assert!(evaluation.run().unwrap().is_cancelled());
    }
}
