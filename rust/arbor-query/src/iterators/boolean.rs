use arbor_common::{Result, verify_arg};
use arbor_node_index::{
    CursorState, DocId, NodeAddress, NodeIterator, iterator::VecNodeIterator,
};

use super::{DocumentGate, ExecContext, align, build_iterator};
use crate::query::{BooleanQuery, BooleanScope, Occur};

/// Boolean composition of clause cursors at node or document granularity.
///
/// Candidates come from the MUST clauses when there are any (leapfrogged to a
/// common key), otherwise from the smallest key among the SHOULD clauses. A
/// candidate survives when enough SHOULD clauses share its key and no MUST_NOT
/// clause does. A purely negative query at document scope enumerates the
/// segment's documents; at node scope it matches nothing.
pub struct BooleanIterator<'a> {
    scope: BooleanScope,
    must: Vec<Box<dyn NodeIterator + 'a>>,
    should: Vec<Box<dyn NodeIterator + 'a>>,
    must_not: Vec<Box<dyn NodeIterator + 'a>>,
    all_documents: Option<VecNodeIterator>,
    minimum_should_match: usize,
    current: Option<NodeAddress>,
    state: CursorState,
    gate: DocumentGate,
}

impl<'a> BooleanIterator<'a> {
    pub(crate) fn build(query: &'a BooleanQuery, ctx: &ExecContext<'a>) -> Result<Self> {
        verify_arg!(clauses, !query.clauses.is_empty());
        let mut must = Vec::new();
        let mut should = Vec::new();
        let mut must_not = Vec::new();
        let nested = ctx.nested();
        for clause in &query.clauses {
            let iter = build_iterator(&clause.query, &nested)?;
            match clause.occur {
                Occur::Must => must.push(iter),
                Occur::Should => should.push(iter),
                Occur::MustNot => must_not.push(iter),
            }
        }
        let all_documents = (must.is_empty()
            && should.is_empty()
            && query.scope == BooleanScope::Document)
            .then(|| {
                VecNodeIterator::new(
                    ctx.source
                        .documents()
                        .iter()
                        .map(|&doc_id| NodeAddress::document_root(doc_id))
                        .collect(),
                )
            });
        Ok(BooleanIterator {
            scope: query.scope,
            must,
            should,
            must_not,
            all_documents,
            minimum_should_match: query.effective_minimum_should_match(),
            current: None,
            state: CursorState::Unstarted,
            gate: ctx.gate(),
        })
    }

    fn exhaust(&mut self) -> bool {
        self.current = None;
        self.state = CursorState::Exhausted;
        false
    }

    /// Positions on the first accepted key `>= lower`.
    fn find(&mut self, lower: NodeAddress) -> Result<bool> {
        let mut lower = Some(lower);
        while let Some(bound) = lower.take() {
            let Some(key) = self.next_candidate(bound)? else {
                return Ok(self.exhaust());
            };
            if !self.gate.enter(key.doc_id) {
                return Ok(self.exhaust());
            }
            if self.accepts(&key)? {
                self.current = Some(key);
                self.state = CursorState::Positioned;
                return Ok(true);
            }
            lower = self.scope.successor(&key);
        }
        Ok(self.exhaust())
    }

    fn next_candidate(&mut self, bound: NodeAddress) -> Result<Option<NodeAddress>> {
        if !self.must.is_empty() {
            return align(&mut self.must, self.scope, bound);
        }
        if !self.should.is_empty() {
            let mut smallest: Option<NodeAddress> = None;
            for iter in &mut self.should {
                if !iter.advance_to_address(&bound)? {
                    continue;
                }
                if let Some(current) = iter.current() {
                    let key = self.scope.key(current);
                    if smallest.as_ref().is_none_or(|s| key < *s) {
                        smallest = Some(key);
                    }
                }
            }
            return Ok(smallest);
        }
        match self.all_documents.as_mut() {
            Some(documents) => {
                documents.advance_to_address(&bound)?;
                Ok(documents.current().cloned())
            }
            None => Ok(None),
        }
    }

    fn accepts(&mut self, key: &NodeAddress) -> Result<bool> {
        if self.minimum_should_match > 0 {
            let mut matched = 0;
            for iter in &mut self.should {
                if has_key(iter, self.scope, key)? {
                    matched += 1;
                }
            }
            if matched < self.minimum_should_match {
                return Ok(false);
            }
        }
        for iter in &mut self.must_not {
            if has_key(iter, self.scope, key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Moves `iter` up to `key` and reports whether it has an address under it.
fn has_key(
    iter: &mut Box<dyn NodeIterator + '_>,
    scope: BooleanScope,
    key: &NodeAddress,
) -> Result<bool> {
    Ok(iter.advance_to_address(key)? && iter.current().is_some_and(|c| scope.key(c) == *key))
}

impl NodeIterator for BooleanIterator<'_> {
    fn current(&self) -> Option<&NodeAddress> {
        self.current.as_ref()
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn advance(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Exhausted => Ok(false),
            CursorState::Unstarted => self.find(NodeAddress::document_root(0)),
            CursorState::Positioned => {
                match self.current.as_ref().and_then(|c| self.scope.successor(c)) {
                    Some(lower) => self.find(lower),
                    None => Ok(self.exhaust()),
                }
            }
        }
    }

    fn advance_to_document(&mut self, target: DocId) -> Result<bool> {
        self.advance_to_address(&NodeAddress::document_root(target))
    }

    fn advance_to_address(&mut self, target: &NodeAddress) -> Result<bool> {
        match self.state {
            CursorState::Exhausted => return Ok(false),
            CursorState::Positioned
                if self.current.as_ref().is_some_and(|current| current >= target) =>
            {
                return Ok(true);
            }
            _ => {}
        }
        match self.scope.lower_bound(target) {
            Some(lower) => self.find(lower),
            None => Ok(self.exhaust()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arbor_node_index::{IndexConfig, Segment, SegmentWriter, analysis::AnalysisPipeline};
    use serde_json::json;

    use super::*;
    use crate::query::{Query, build_node_query};
    use crate::stats::StatsCounters;

    fn segment() -> Segment {
        let pipeline = AnalysisPipeline::default();
        let mut writer = SegmentWriter::new(IndexConfig::default());
        let documents = [
            json!({ "a": "red apple", "b": "green pear" }),
            json!({ "a": "red pear" }),
            json!({ "a": "green apple", "b": "red" }),
            json!({ "c": "plum" }),
        ];
        for (doc_id, document) in documents.iter().enumerate() {
            writer
                .index_document("content", doc_id as u32, document, &pipeline)
                .unwrap();
        }
        writer.seal().unwrap()
    }

    fn term(text: &str) -> Query {
        build_node_query("content", text, None, None).unwrap().into()
    }

    fn run(query: &BooleanQuery, segment: &Segment) -> Vec<NodeAddress> {
        let ctx = ExecContext::new(segment, Arc::new(StatsCounters::default()));
        let mut iter = BooleanIterator::build(query, &ctx).unwrap();
        let mut out = Vec::new();
        while iter.advance().unwrap() {
            out.push(iter.current().unwrap().clone());
        }
        out
    }

    fn docs(addresses: &[NodeAddress]) -> Vec<u32> {
        addresses.iter().map(|a| a.doc_id).collect()
    }

    #[test]
    fn test_document_scope() {
        let segment = segment();
        let query = BooleanQuery::new(BooleanScope::Document)
            .must(term("red"))
            .must(term("pear"));
        let found = run(&query, &segment);
        assert_eq!(docs(&found), vec![0, 1]);
        assert!(found.iter().all(NodeAddress::is_document_root));

        let query = BooleanQuery::new(BooleanScope::Document)
            .must(term("red"))
            .must_not(term("green"));
        assert_eq!(docs(&run(&query, &segment)), vec![1]);

        let query = BooleanQuery::new(BooleanScope::Document).must_not(term("red"));
        assert_eq!(docs(&run(&query, &segment)), vec![3]);
    }

    #[test]
    fn test_node_scope() {
        let segment = segment();
        let query = BooleanQuery::new(BooleanScope::Node)
            .must(term("red"))
            .must(term("pear"));
        assert_eq!(run(&query, &segment), vec![NodeAddress::new(1, &[0], 0)]);

        let query = BooleanQuery::new(BooleanScope::Node).must_not(term("red"));
        assert!(run(&query, &segment).is_empty());
    }

    #[test]
    fn test_should_clauses() {
        let segment = segment();
        let query = BooleanQuery::new(BooleanScope::Node)
            .should(term("apple"))
            .should(term("pear"));
        assert_eq!(docs(&run(&query, &segment)), vec![0, 0, 1, 2]);

        let query = BooleanQuery::new(BooleanScope::Document)
            .should(term("apple"))
            .should(term("pear"))
            .should(term("green"))
            .with_minimum_should_match(3);
        assert_eq!(docs(&run(&query, &segment)), vec![0]);
    }

    #[test]
    fn test_targeted_advance() {
        let segment = segment();
        let query = BooleanQuery::new(BooleanScope::Node).should(term("red"));
        let ctx = ExecContext::new(&segment, Arc::new(StatsCounters::default()));
        let mut iter = BooleanIterator::build(&query, &ctx).unwrap();
        assert!(iter.advance_to_address(&NodeAddress::new(0, &[0], 3)).unwrap());
        assert_eq!(iter.current(), Some(&NodeAddress::new(1, &[0], 0)));
        assert!(iter.advance_to_document(2).unwrap());
        assert_eq!(iter.current(), Some(&NodeAddress::new(2, &[1], 0)));
        assert!(!iter.advance().unwrap());
    }

    #[test]
    fn test_empty_clauses_rejected() {
        let segment = segment();
        let ctx = ExecContext::new(&segment, Arc::new(StatsCounters::default()));
        let query = BooleanQuery::new(BooleanScope::Node);
        assert!(BooleanIterator::build(&query, &ctx).is_err());
    }
}
