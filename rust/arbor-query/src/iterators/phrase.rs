use arbor_common::{Result, verify_arg};
use arbor_node_index::{CursorState, DocId, NodeAddress, NodeIterator};

use super::{DocumentGate, ExecContext, NodeQueryIterator, align};
use crate::query::{BooleanScope, NodeQuery, PhraseQuery, TermMatch, TermValue};

/// Nodes containing all phrase terms in order, within the slop.
///
/// The term cursors are leapfrogged onto a common node, then the positions of
/// each term inside that node are checked. Yields the node's first address.
pub struct PhraseIterator<'a> {
    terms: Vec<Box<dyn NodeIterator + 'a>>,
    slop: u32,
    // per term: positions in the node minus the term's index in the phrase
    offsets: Vec<Vec<i64>>,
    current: Option<NodeAddress>,
    state: CursorState,
    gate: DocumentGate,
}

impl<'a> PhraseIterator<'a> {
    pub(crate) fn build(query: &PhraseQuery, ctx: &ExecContext<'a>) -> Result<Self> {
        verify_arg!(terms, !query.terms.is_empty());
        let nested = ctx.nested();
        let terms = query
            .terms
            .iter()
            .map(|term| {
                let mut leaf = NodeQuery::new(
                    query.field.clone(),
                    TermMatch::Exact(TermValue::String(term.clone())),
                );
                leaf.attribute = query.attribute.clone();
                NodeQueryIterator::build(&leaf, &nested)
                    .map(|iter| Box::new(iter) as Box<dyn NodeIterator + 'a>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PhraseIterator {
            offsets: vec![Vec::new(); terms.len()],
            terms,
            slop: query.slop,
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

    fn find(&mut self, lower: NodeAddress) -> Result<bool> {
        let mut lower = lower;
        loop {
            let Some(node) = align(&mut self.terms, BooleanScope::Node, lower)? else {
                return Ok(self.exhaust());
            };
            if !self.gate.enter(node.doc_id) {
                return Ok(self.exhaust());
            }
            for (index, (term, offsets)) in
                self.terms.iter_mut().zip(self.offsets.iter_mut()).enumerate()
            {
                offsets.clear();
                while let Some(current) = term.current().filter(|c| c.is_same_node(&node)) {
                    offsets.push(i64::from(current.position) - index as i64);
                    if !term.advance()? {
                        break;
                    }
                }
            }
            if within_slop(&self.offsets, self.slop) {
                self.current = Some(node);
                self.state = CursorState::Positioned;
                return Ok(true);
            }
            match BooleanScope::Node.successor(&node) {
                Some(next) => lower = next,
                None => return Ok(self.exhaust()),
            }
        }
    }
}

/// Returns `true` if one offset can be picked from every list with
/// `max - min <= slop` and no two picks landing on the same position.
fn within_slop(offsets: &[Vec<i64>], slop: u32) -> bool {
    let mut lows: Vec<i64> = offsets.iter().flatten().copied().collect();
    lows.sort_unstable();
    lows.dedup();
    let mut positions = Vec::with_capacity(offsets.len());
    lows.into_iter()
        .any(|low| pick_in_window(offsets, low, low + i64::from(slop), &mut positions))
}

/// Picks offsets in `low..=high` for the lists from `positions.len()` on.
/// A repeated phrase term has identical lists, so picks are backtracked until
/// every term sits on its own position.
fn pick_in_window(offsets: &[Vec<i64>], low: i64, high: i64, positions: &mut Vec<i64>) -> bool {
    let index = positions.len();
    let Some(list) = offsets.get(index) else {
        return true;
    };
    for &offset in list.iter().filter(|&&offset| (low..=high).contains(&offset)) {
        let position = offset + index as i64;
        if positions.contains(&position) {
            continue;
        }
        positions.push(position);
        if pick_in_window(offsets, low, high, positions) {
            return true;
        }
        positions.pop();
    }
    false
}

impl NodeIterator for PhraseIterator<'_> {
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
                match self.current.as_ref().and_then(|c| BooleanScope::Node.successor(c)) {
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
        match BooleanScope::Node.lower_bound(target) {
            Some(lower) => self.find(lower),
            None => Ok(self.exhaust()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arbor_node_index::{IndexConfig, Segment, SegmentWriter, analysis::AnalysisPipeline};
    use serde_json::{Value, json};

    use super::*;
    use crate::query::AttributePath;
    use crate::stats::StatsCounters;

    fn segment_of(documents: &[Value]) -> Segment {
        let pipeline = AnalysisPipeline::default();
        let mut writer = SegmentWriter::new(IndexConfig::default());
        for (doc_id, document) in documents.iter().enumerate() {
            writer
                .index_document("content", doc_id as u32, document, &pipeline)
                .unwrap();
        }
        writer.seal().unwrap()
    }

    fn segment() -> Segment {
        segment_of(&[
            json!({ "title": "the quick brown fox" }),
            json!({ "title": "the quick red fox", "note": "quick fox" }),
            json!({ "title": "fox quick" }),
            json!({ "title": ["quick", "fox"] }),
        ])
    }

    fn nodes(query: &PhraseQuery, segment: &Segment) -> Vec<NodeAddress> {
        let ctx = ExecContext::new(segment, Arc::new(StatsCounters::default()));
        let mut iter = PhraseIterator::build(query, &ctx).unwrap();
        let mut out = Vec::new();
        while iter.advance().unwrap() {
            out.push(iter.current().unwrap().clone());
        }
        out
    }

    #[test]
    fn test_exact_phrase() {
        let segment = segment();
        let query = PhraseQuery::new("content", ["quick", "fox"]).unwrap();
        assert_eq!(nodes(&query, &segment), vec![NodeAddress::new(1, &[1], 0)]);

        let scoped = query.clone().with_attribute(AttributePath::parse("title").unwrap());
        assert!(nodes(&scoped, &segment).is_empty());
    }

    #[test]
    fn test_sloppy_phrase() {
        let segment = segment();
        let query = PhraseQuery::new("content", ["quick", "fox"])
            .unwrap()
            .with_attribute(AttributePath::parse("title").unwrap())
            .with_slop(1);
        let docs: Vec<u32> = nodes(&query, &segment).iter().map(|a| a.doc_id).collect();
        // Reversed terms are two moves apart.
        assert_eq!(docs, vec![0, 1, 3]);

        let query = query.with_slop(2);
        let docs: Vec<u32> = nodes(&query, &segment).iter().map(|a| a.doc_id).collect();
        assert_eq!(docs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_repeated_term_needs_two_occurrences() {
        let segment = segment_of(&[
            json!({ "title": "fox" }),
            json!({ "title": "fox and fox" }),
        ]);
        let query = PhraseQuery::new("content", ["fox", "fox"]).unwrap().with_slop(2);
        let docs: Vec<u32> = nodes(&query, &segment).iter().map(|a| a.doc_id).collect();
        assert_eq!(docs, vec![1]);
    }

    #[test]
    fn test_slop_window() {
        assert!(within_slop(&[vec![1, 5], vec![5]], 1));
        assert!(!within_slop(&[vec![1], vec![4]], 2));
        assert!(within_slop(&[vec![3]], 0));
        assert!(!within_slop(&[vec![], vec![1]], 5));
        // Both picks would sit on position 3.
        assert!(!within_slop(&[vec![3], vec![2]], 1));
        assert!(within_slop(&[vec![3, 5], vec![2, 4]], 1));
    }
}
