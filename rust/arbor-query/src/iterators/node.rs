use std::ops::Bound;

use ahash::AHashSet;
use arbor_common::Result;
use arbor_node_index::{
    CursorState, DocId, NodeAddress, NodeIterator, PostingsCursor, PostingsSource, TermKey,
    iterator::EmptyNodeIterator,
};

use super::{DisjunctionIterator, DocumentGate, ExecContext};
use crate::query::{NodeConstraints, NodeQuery, TermMatch};

/// Occurrences of the terms a [`NodeQuery`] selects, filtered by its
/// attribute path and structural constraints.
pub struct NodeQueryIterator<'a> {
    inner: Box<dyn NodeIterator + 'a>,
    constraints: NodeConstraints,
    labels: Option<LabelFilter>,
    gate: DocumentGate,
    cancelled: bool,
}

impl<'a> NodeQueryIterator<'a> {
    pub(crate) fn build(query: &NodeQuery, ctx: &ExecContext<'a>) -> Result<Self> {
        let source = ctx.source;
        let mut cursors: Vec<Box<dyn NodeIterator + 'a>> = resolve_terms(query, source)
            .iter()
            .filter_map(|term| source.term_postings(&query.field, term))
            .map(|postings| Box::new(postings.cursor()) as Box<dyn NodeIterator + 'a>)
            .collect();
        let inner: Box<dyn NodeIterator + 'a> = match cursors.len() {
            0 => Box::new(EmptyNodeIterator::new()),
            1 => cursors.swap_remove(0),
            _ => Box::new(DisjunctionIterator::new(cursors)),
        };

        let ancestor_labels = query.ancestor_labels();
        let labels = (!ancestor_labels.is_empty())
            .then(|| LabelFilter::new(&query.field, &ancestor_labels, source));
        Ok(NodeQueryIterator {
            inner,
            constraints: query.constraints,
            labels,
            gate: ctx.gate(),
            cancelled: false,
        })
    }

    /// Moves forward from the inner cursor's position to the first accepted
    /// address.
    fn settle(&mut self, mut positioned: bool) -> Result<bool> {
        while positioned {
            let Some(current) = self.inner.current() else {
                return Ok(false);
            };
            if !self.gate.enter(current.doc_id) {
                self.cancelled = true;
                return Ok(false);
            }
            let accepted = self.constraints.matches(current)
                && match self.labels.as_mut() {
                    Some(labels) => labels.accepts(current)?,
                    None => true,
                };
            if accepted {
                return Ok(true);
            }
            positioned = self.inner.advance()?;
        }
        Ok(false)
    }
}

impl NodeIterator for NodeQueryIterator<'_> {
    fn current(&self) -> Option<&NodeAddress> {
        if self.cancelled {
            return None;
        }
        self.inner.current()
    }

    fn state(&self) -> CursorState {
        if self.cancelled {
            return CursorState::Exhausted;
        }
        self.inner.state()
    }

    fn advance(&mut self) -> Result<bool> {
        if self.cancelled {
            return Ok(false);
        }
        let positioned = self.inner.advance()?;
        self.settle(positioned)
    }

    fn advance_to_document(&mut self, target: DocId) -> Result<bool> {
        if self.cancelled {
            return Ok(false);
        }
        let positioned = self.inner.advance_to_document(target)?;
        self.settle(positioned)
    }

    fn advance_to_address(&mut self, target: &NodeAddress) -> Result<bool> {
        if self.cancelled {
            return Ok(false);
        }
        let positioned = self.inner.advance_to_address(target)?;
        self.settle(positioned)
    }
}

/// Dictionary terms selected by the query's [`TermMatch`].
fn resolve_terms(query: &NodeQuery, source: &dyn PostingsSource) -> Vec<TermKey> {
    let scope = query.term_scope();
    match &query.term {
        TermMatch::Exact(value) => vec![value.to_term(scope)],
        TermMatch::Prefix(prefix) => {
            let lower = TermKey::new(
                query.term.datatype(),
                scope.map(str::to_string),
                prefix.as_bytes().to_vec(),
            );
            source
                .terms_in_range(&query.field, Bound::Included(&lower), Bound::Unbounded)
                .into_iter()
                .take_while(|term| {
                    term.datatype == lower.datatype
                        && term.attribute == lower.attribute
                        && term.value.starts_with(&lower.value)
                })
                .collect()
        }
        TermMatch::Range {
            datatype,
            lower,
            upper,
        } => {
            let lowest = TermKey::lowest(*datatype, scope.map(str::to_string));
            let lower = match lower {
                Bound::Included(value) => Bound::Included(value.to_term(scope)),
                Bound::Excluded(value) => Bound::Excluded(value.to_term(scope)),
                Bound::Unbounded => Bound::Included(lowest.clone()),
            };
            let upper = match upper {
                Bound::Included(value) => Bound::Included(value.to_term(scope)),
                Bound::Excluded(value) => Bound::Excluded(value.to_term(scope)),
                Bound::Unbounded => Bound::Unbounded,
            };
            source
                .terms_in_range(&query.field, lower.as_ref(), upper.as_ref())
                .into_iter()
                .take_while(|term| {
                    term.datatype == lowest.datatype && term.attribute == lowest.attribute
                })
                .collect()
        }
    }
}

/// Checks that the ancestors of an address carry the expected labels.
///
/// Candidates arrive in address order, but the ancestors of consecutive
/// candidates do not, so the label postings of the current document are
/// loaded into sets once per document.
struct LabelFilter {
    checks: Vec<LabelCheck>,
    doc_id: Option<DocId>,
}

struct LabelCheck {
    /// 1 for the parent, 2 for the grandparent, and so on.
    distance: usize,
    cursor: Option<PostingsCursor>,
    paths: AHashSet<Vec<u32>>,
}

impl LabelFilter {
    fn new(field: &str, labels: &[(usize, &str)], source: &dyn PostingsSource) -> Self {
        let checks = labels
            .iter()
            .map(|&(distance, label)| LabelCheck {
                distance,
                cursor: source
                    .term_postings(field, &TermKey::attribute_label(label))
                    .map(|postings| postings.cursor()),
                paths: AHashSet::new(),
            })
            .collect();
        LabelFilter {
            checks,
            doc_id: None,
        }
    }

    fn accepts(&mut self, address: &NodeAddress) -> Result<bool> {
        if self.doc_id != Some(address.doc_id) {
            self.load(address.doc_id)?;
        }
        let depth = address.depth();
        Ok(self.checks.iter().all(|check| {
            depth > check.distance && check.paths.contains(&address.path[..depth - check.distance])
        }))
    }

    fn load(&mut self, doc_id: DocId) -> Result<()> {
        self.doc_id = Some(doc_id);
        for check in &mut self.checks {
            check.paths.clear();
            let Some(cursor) = check.cursor.as_mut() else {
                continue;
            };
            if !cursor.advance_to_document(doc_id)? {
                continue;
            }
            while let Some(current) = cursor.current().filter(|c| c.doc_id == doc_id) {
                check.paths.insert(current.path.to_vec());
                if !cursor.advance()? {
                    break;
                }
            }
        }
        Ok(())
    }
}
