//! Per-segment cursors for every query variant.
//!
//! Each [`Query`] variant opens a [`NodeIterator`] over one segment. All
//! cursors yield addresses in the canonical address order, so combinators
//! compose them by merge-advancing whichever input is behind.

mod boolean;
mod disjunction;
mod node;
mod phrase;
mod twig;

use std::sync::Arc;

use arbor_common::Result;
use arbor_node_index::{DocId, NodeAddress, NodeIterator, PostingsSource};

use crate::evaluate::CancellationToken;
use crate::query::{BooleanScope, Query};
use crate::stats::StatsCounters;

pub use boolean::BooleanIterator;
pub use disjunction::DisjunctionIterator;
pub use node::NodeQueryIterator;
pub use phrase::PhraseIterator;
pub use twig::TwigIterator;

/// What a cursor needs from the evaluation that opened it.
#[derive(Clone)]
pub(crate) struct ExecContext<'a> {
    pub source: &'a dyn PostingsSource,
    pub stats: Arc<StatsCounters>,
    pub cancellation: Option<CancellationToken>,
    outermost: bool,
}

impl<'a> ExecContext<'a> {
    pub fn new(source: &'a dyn PostingsSource, stats: Arc<StatsCounters>) -> Self {
        ExecContext {
            source,
            stats,
            cancellation: None,
            outermost: true,
        }
    }

    pub fn with_cancellation(mut self, cancellation: Option<CancellationToken>) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Context for the cursors an iterator opens beneath itself.
    pub fn nested(&self) -> Self {
        ExecContext {
            outermost: false,
            ..self.clone()
        }
    }

    pub fn gate(&self) -> DocumentGate {
        DocumentGate {
            cancellation: self.cancellation.clone(),
            candidates: self.outermost.then(|| self.stats.clone()),
            doc_id: None,
        }
    }
}

/// Cancellation check of one cursor's search loop.
///
/// The token is read once per document the loop moves onto. The outermost
/// cursor of an evaluation also counts those documents as candidates.
pub(crate) struct DocumentGate {
    cancellation: Option<CancellationToken>,
    candidates: Option<Arc<StatsCounters>>,
    doc_id: Option<DocId>,
}

impl DocumentGate {
    /// Returns `false` once the evaluation has been cancelled.
    pub fn enter(&mut self, doc_id: DocId) -> bool {
        if self.doc_id == Some(doc_id) {
            return true;
        }
        self.doc_id = Some(doc_id);
        if let Some(stats) = &self.candidates {
            stats.record_candidate_document();
        }
        !self
            .cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

pub(crate) fn build_iterator<'a>(
    query: &'a Query,
    ctx: &ExecContext<'a>,
) -> Result<Box<dyn NodeIterator + 'a>> {
    Ok(match query {
        Query::Node(query) => Box::new(NodeQueryIterator::build(query, ctx)?),
        Query::Boolean(query) => Box::new(BooleanIterator::build(query, ctx)?),
        Query::Phrase(query) => Box::new(PhraseIterator::build(query, ctx)?),
        Query::Twig(query) => Box::new(TwigIterator::build(query, ctx)?),
    })
}

impl BooleanScope {
    /// The address a match at `address` is reported under: the node's first
    /// address, or the document root.
    pub(crate) fn key(self, address: &NodeAddress) -> NodeAddress {
        match self {
            BooleanScope::Node => address.node_start(),
            BooleanScope::Document => NodeAddress::document_root(address.doc_id),
        }
    }

    /// The smallest address that belongs to a later key than `key`.
    pub(crate) fn successor(self, key: &NodeAddress) -> Option<NodeAddress> {
        match self {
            BooleanScope::Node => Some(key.first_descendant()),
            BooleanScope::Document => key.doc_id.checked_add(1).map(NodeAddress::document_root),
        }
    }

    /// The smallest key `>= target`.
    pub(crate) fn lower_bound(self, target: &NodeAddress) -> Option<NodeAddress> {
        let key = self.key(target);
        if key == *target {
            Some(key)
        } else {
            self.successor(&key)
        }
    }
}

/// Leapfrogs `iters` to the smallest key `>= lower` on which all of them are
/// positioned. Returns `None` once any of them is exhausted.
pub(crate) fn align(
    iters: &mut [Box<dyn NodeIterator + '_>],
    scope: BooleanScope,
    lower: NodeAddress,
) -> Result<Option<NodeAddress>> {
    let mut key = lower;
    loop {
        let mut furthest: Option<NodeAddress> = None;
        for iter in iters.iter_mut() {
            if !iter.advance_to_address(&key)? {
                return Ok(None);
            }
            let Some(current) = iter.current() else {
                return Ok(None);
            };
            let current_key = scope.key(current);
            if current_key != key && furthest.as_ref().is_none_or(|f| current_key > *f) {
                furthest = Some(current_key);
            }
        }
        match furthest {
            None => return Ok(Some(key)),
            Some(next) => key = next,
        }
    }
}

#[cfg(test)]
mod tests {
    use arbor_node_index::iterator::VecNodeIterator;

    use super::*;

    fn addr(doc: u32, path: &[u32], pos: u32) -> NodeAddress {
        NodeAddress::new(doc, path, pos)
    }

    #[test]
    fn test_scope_bounds() {
        let a = addr(3, &[1, 2], 4);
        assert_eq!(BooleanScope::Node.key(&a), addr(3, &[1, 2], 0));
        assert_eq!(BooleanScope::Document.key(&a), addr(3, &[], 0));
        assert_eq!(BooleanScope::Node.lower_bound(&a), Some(addr(3, &[1, 2, 0], 0)));
        assert_eq!(
            BooleanScope::Node.lower_bound(&addr(3, &[1, 2], 0)),
            Some(addr(3, &[1, 2], 0))
        );
        assert_eq!(BooleanScope::Document.lower_bound(&a), Some(addr(4, &[], 0)));
        assert_eq!(
            BooleanScope::Document.successor(&NodeAddress::document_root(u32::MAX)),
            None
        );
    }

    #[test]
    fn test_align_on_nodes() {
        let mut iters: Vec<Box<dyn NodeIterator>> = vec![
            Box::new(VecNodeIterator::new(vec![
                addr(0, &[0], 1),
                addr(0, &[2], 1),
                addr(1, &[0], 1),
            ])),
            Box::new(VecNodeIterator::new(vec![
                addr(0, &[1], 2),
                addr(1, &[0], 2),
            ])),
        ];
        let key = align(&mut iters, BooleanScope::Node, NodeAddress::document_root(0)).unwrap();
        assert_eq!(key, Some(addr(1, &[0], 0)));

        let mut iters: Vec<Box<dyn NodeIterator>> = vec![
            Box::new(VecNodeIterator::new(vec![addr(0, &[0], 1), addr(2, &[0], 1)])),
            Box::new(VecNodeIterator::new(vec![addr(0, &[3], 2)])),
        ];
        let key = align(&mut iters, BooleanScope::Document, NodeAddress::document_root(0)).unwrap();
        assert_eq!(key, Some(NodeAddress::document_root(0)));
        let key = align(&mut iters, BooleanScope::Document, NodeAddress::document_root(1)).unwrap();
        assert_eq!(key, None);
    }
}
