use std::collections::VecDeque;

use arbor_common::Result;
use arbor_node_index::{
    CursorState, DocId, NodeAddress, NodeIterator, iterator::skip_node,
};

use super::{DocumentGate, ExecContext, build_iterator};
use crate::query::{Axis, BooleanScope, Occur, TwigChild, TwigQuery};

/// Structural matching of a [`TwigQuery`].
///
/// The root cursor drives the walk: every root node it stops on is checked
/// against the children, and matching nodes are yielded by their first
/// address. Child cursors are opened on the first root candidate, so a root
/// that matches nothing never evaluates its children. Each child cursor only
/// moves forward: since root nodes arrive in address order, so do the lower
/// ends of their subtrees, and each child keeps a small window of addresses
/// inside the subtree currently being inspected.
pub struct TwigIterator<'a> {
    query: &'a TwigQuery,
    ctx: ExecContext<'a>,
    root: Box<dyn NodeIterator + 'a>,
    children: Option<Vec<ChildCursor<'a>>>,
    current: Option<NodeAddress>,
    witnesses: Vec<NodeAddress>,
    state: CursorState,
    gate: DocumentGate,
}

impl<'a> TwigIterator<'a> {
    pub(crate) fn build(query: &'a TwigQuery, ctx: &ExecContext<'a>) -> Result<Self> {
        let nested = ctx.nested();
        Ok(TwigIterator {
            query,
            root: build_iterator(&query.root, &nested)?,
            ctx: nested,
            children: None,
            current: None,
            witnesses: Vec::new(),
            state: CursorState::Unstarted,
            gate: ctx.gate(),
        })
    }

    /// Root and child witnesses of the current match, in declaration order.
    pub fn witnesses(&self) -> &[NodeAddress] {
        &self.witnesses
    }

    fn exhaust(&mut self) -> bool {
        if self.children.is_none() && !self.query.children.is_empty() {
            log::debug!(
                "twig root produced no candidates, {} children not evaluated",
                self.query.children.len()
            );
        }
        self.current = None;
        self.witnesses.clear();
        self.state = CursorState::Exhausted;
        false
    }

    /// Walks root nodes from the root cursor's position until one matches.
    fn find_match(&mut self, mut positioned: bool) -> Result<bool> {
        while positioned {
            let Some(candidate) = self.root.current().map(NodeAddress::node_start) else {
                break;
            };
            if !self.gate.enter(candidate.doc_id) {
                break;
            }
            self.ctx.stats.record_root_candidate();
            if self.matches(&candidate)? {
                self.current = Some(candidate);
                self.state = CursorState::Positioned;
                return Ok(true);
            }
            positioned = skip_node(self.root.as_mut())?;
        }
        Ok(self.exhaust())
    }

    fn open_children(&mut self) -> Result<()> {
        if self.children.is_some() {
            return Ok(());
        }
        let query = self.query;
        let children = query
            .children
            .iter()
            .map(|child| build_iterator(&child.query, &self.ctx).map(ChildCursor::new))
            .collect::<Result<Vec<_>>>()?;
        self.ctx.stats.add_child_evaluations(children.len());
        self.children = Some(children);
        Ok(())
    }

    fn matches(&mut self, root: &NodeAddress) -> Result<bool> {
        self.open_children()?;
        let query = self.query;
        let declared = &query.children;
        let Some(cursors) = self.children.as_mut() else {
            return Ok(false);
        };
        let mut chosen: Vec<Option<NodeAddress>> = vec![None; declared.len()];
        let mut lists: Vec<Vec<NodeAddress>> = vec![Vec::new(); declared.len()];

        for (i, (child, cursor)) in declared.iter().zip(cursors.iter_mut()).enumerate() {
            if child.occur != Occur::Must {
                continue;
            }
            if child.is_positional() {
                lists[i] = cursor.witnesses(root, child.axis)?;
                if lists[i].is_empty() {
                    return Ok(false);
                }
            } else {
                match cursor.first_witness(root, child.axis)? {
                    Some(witness) => chosen[i] = Some(witness),
                    None => return Ok(false),
                }
            }
        }

        for (child, cursor) in declared.iter().zip(cursors.iter_mut()) {
            if child.occur == Occur::MustNot && cursor.first_witness(root, child.axis)?.is_some() {
                return Ok(false);
            }
        }

        let mut should_total = 0;
        let mut should_matched = 0;
        for (i, (child, cursor)) in declared.iter().zip(cursors.iter_mut()).enumerate() {
            if child.occur != Occur::Should {
                continue;
            }
            should_total += 1;
            if child.is_positional() {
                lists[i] = cursor.witnesses(root, child.axis)?;
                if !lists[i].is_empty() {
                    should_matched += 1;
                }
            } else if let Some(witness) = cursor.first_witness(root, child.axis)? {
                chosen[i] = Some(witness);
                should_matched += 1;
            }
        }
        if should_total > 0 && should_matched < query.minimum_should_match.unwrap_or(1) {
            return Ok(false);
        }

        if !resolve_positional_chain(declared, &lists, root.depth(), &mut chosen) {
            return Ok(false);
        }
        self.witnesses.clear();
        self.witnesses.push(root.clone());
        self.witnesses.extend(chosen.into_iter().flatten());
        Ok(true)
    }
}

impl NodeIterator for TwigIterator<'_> {
    fn current(&self) -> Option<&NodeAddress> {
        self.current.as_ref()
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn advance(&mut self) -> Result<bool> {
        let positioned = match self.state {
            CursorState::Exhausted => return Ok(false),
            CursorState::Unstarted => self.root.advance()?,
            CursorState::Positioned => skip_node(self.root.as_mut())?,
        };
        self.find_match(positioned)
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
        let Some(lower) = BooleanScope::Node.lower_bound(target) else {
            return Ok(self.exhaust());
        };
        let positioned = self.root.advance_to_address(&lower)?;
        self.find_match(positioned)
    }

    fn collect_witnesses(&self, target: &mut Vec<NodeAddress>) {
        target.extend(self.witnesses.iter().cloned());
    }
}

/// A child cursor plus the addresses it already produced below the root node
/// being inspected.
struct ChildCursor<'a> {
    iter: Box<dyn NodeIterator + 'a>,
    window: VecDeque<NodeAddress>,
}

impl<'a> ChildCursor<'a> {
    fn new(iter: Box<dyn NodeIterator + 'a>) -> Self {
        ChildCursor {
            iter,
            window: VecDeque::new(),
        }
    }

    /// Drops addresses before `root`'s descendants and moves the cursor up to
    /// them.
    fn seek(&mut self, root: &NodeAddress) -> Result<()> {
        let lower = root.first_descendant();
        while self.window.front().is_some_and(|address| *address < lower) {
            self.window.pop_front();
        }
        let behind = match self.iter.state() {
            CursorState::Unstarted => true,
            CursorState::Positioned => self.iter.current().is_some_and(|c| *c < lower),
            CursorState::Exhausted => false,
        };
        if behind {
            self.iter.advance_to_address(&lower)?;
        }
        Ok(())
    }

    /// Moves the cursor's current address into the window while it is inside
    /// `root`'s subtree.
    fn pull(&mut self, root: &NodeAddress) -> Result<bool> {
        match self.iter.current() {
            Some(current) if current.precedes_subtree_end(root) => {
                self.window.push_back(current.clone());
                self.iter.advance()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// The first address below `root` on `axis`, reading no further than
    /// needed to find it.
    fn first_witness(&mut self, root: &NodeAddress, axis: Axis) -> Result<Option<NodeAddress>> {
        self.seek(root)?;
        if let Some(found) = self
            .window
            .iter()
            .take_while(|address| address.is_within(root))
            .find(|address| axis.accepts(root, address))
        {
            return Ok(Some(found.clone()));
        }
        while self.pull(root)? {
            if let Some(last) = self.window.back().filter(|address| axis.accepts(root, address)) {
                return Ok(Some(last.clone()));
            }
        }
        Ok(None)
    }

    /// All addresses below `root` on `axis`, in address order.
    fn witnesses(&mut self, root: &NodeAddress, axis: Axis) -> Result<Vec<NodeAddress>> {
        self.seek(root)?;
        while self.pull(root)? {}
        Ok(self
            .window
            .iter()
            .take_while(|address| address.is_within(root))
            .filter(|address| axis.accepts(root, address))
            .cloned()
            .collect())
    }
}

/// Checks ordering and slop between consecutive positional children that have
/// witnesses, and records for each of them the witness of the first
/// satisfying chain in iterator order.
fn resolve_positional_chain(
    declared: &[TwigChild],
    lists: &[Vec<NodeAddress>],
    root_depth: usize,
    chosen: &mut [Option<NodeAddress>],
) -> bool {
    let members: Vec<usize> = (0..declared.len())
        .filter(|&i| declared[i].is_positional() && !lists[i].is_empty())
        .collect();
    let Some(&first) = members.first() else {
        return true;
    };

    // links[k][j]: index of the first witness of member k - 1 that witness j of
    // member k can follow, `None` when it can follow none.
    let mut links: Vec<Vec<Option<usize>>> = Vec::with_capacity(members.len());
    links.push(vec![Some(0); lists[first].len()]);
    for k in 1..members.len() {
        let (prev, cur) = (members[k - 1], members[k]);
        let prev_links = &links[k - 1];
        let row: Vec<Option<usize>> = lists[cur]
            .iter()
            .map(|witness| {
                (0..lists[prev].len()).find(|&i| {
                    prev_links[i].is_some()
                        && may_follow(&lists[prev][i], witness, &declared[cur], root_depth)
                })
            })
            .collect();
        if row.iter().all(Option::is_none) {
            return false;
        }
        links.push(row);
    }

    let last = members.len() - 1;
    let Some(mut j) = links[last].iter().position(Option::is_some) else {
        return false;
    };
    for k in (0..members.len()).rev() {
        chosen[members[k]] = Some(lists[members[k]][j].clone());
        if k > 0 {
            match links[k][j] {
                Some(i) => j = i,
                None => return false,
            }
        }
    }
    true
}

fn may_follow(
    prev: &NodeAddress,
    next: &NodeAddress,
    child: &TwigChild,
    root_depth: usize,
) -> bool {
    if child.in_order && prev > next {
        return false;
    }
    child
        .slop
        .is_none_or(|slop| branch_distance(prev, next, root_depth) <= slop)
}

/// Number of root branches strictly between the branches holding `a` and `b`.
fn branch_distance(a: &NodeAddress, b: &NodeAddress, root_depth: usize) -> u32 {
    let branch = |address: &NodeAddress| address.path.get(root_depth).copied().unwrap_or(0);
    branch(a).abs_diff(branch(b)).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arbor_node_index::{
        Datatype, IndexConfig, Segment, SegmentWriter, analysis::AnalysisPipeline,
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::evaluate::CancellationToken;
    use crate::query::{NodeQuery, Query, TwigChild, build_node_query};
    use crate::stats::StatsCounters;

    fn segment(documents: &[Value]) -> Segment {
        let pipeline = AnalysisPipeline::default();
        let mut writer = SegmentWriter::new(IndexConfig::default());
        for (doc_id, document) in documents.iter().enumerate() {
            writer
                .index_document("content", doc_id as u32, document, &pipeline)
                .unwrap();
        }
        writer.seal().unwrap()
    }

    fn label(name: &str) -> NodeQuery {
        build_node_query("content", name, None, Some(Datatype::Attribute)).unwrap()
    }

    fn value(text: &str, attribute: &str) -> Query {
        build_node_query("content", text, Some(attribute), None)
            .unwrap()
            .into()
    }

    fn run(query: &TwigQuery, segment: &Segment) -> (Vec<Vec<NodeAddress>>, Arc<StatsCounters>) {
        let stats = Arc::new(StatsCounters::default());
        let ctx = ExecContext::new(segment, stats.clone());
        let mut iter = TwigIterator::build(query, &ctx).unwrap();
        let mut matches = Vec::new();
        while iter.advance().unwrap() {
            matches.push(iter.witnesses().to_vec());
        }
        (matches, stats)
    }

    #[test]
    fn test_child_and_descendant_axes() {
        let segment = segment(&[json!({ "a": { "b": { "c": "x" } } })]);
        let child = TwigQuery::new(label("a"))
            .unwrap()
            .with_child(TwigChild::new(value("x", "c"), Occur::Must));
        assert!(run(&child, &segment).0.is_empty());

        let descendant = TwigQuery::new(label("a")).unwrap().with_child(
            TwigChild::new(value("x", "c"), Occur::Must).with_axis(Axis::Descendant),
        );
        let (matches, _) = run(&descendant, &segment);
        assert_eq!(
            matches,
            vec![vec![NodeAddress::new(0, &[0], 0), NodeAddress::new(0, &[0, 0, 0], 1)]]
        );
    }

    #[test]
    fn test_nested_roots_share_child_cursors() {
        // Both `a` nodes are roots; the inner one sorts after the outer one.
        let segment = segment(&[json!({ "a": { "a": { "k": "v" }, "k": "w" } })]);
        let twig = TwigQuery::new(label("a"))
            .unwrap()
            .with_child(TwigChild::new(label("k"), Occur::Must));
        let (matches, stats) = run(&twig, &segment);
        let roots: Vec<NodeAddress> = matches.iter().map(|m| m[0].clone()).collect();
        assert_eq!(
            roots,
            vec![NodeAddress::new(0, &[0], 0), NodeAddress::new(0, &[0, 0], 0)]
        );
        assert_eq!(stats.snapshot().child_evaluations, 1);
        assert_eq!(stats.snapshot().root_candidates, 2);
    }

    #[test]
    fn test_should_and_must_not() {
        let segment = segment(&[
            json!({ "a": { "p": "x", "q": "y" } }),
            json!({ "a": { "p": "x" } }),
            json!({ "a": { "r": "z" } }),
        ]);
        let twig = TwigQuery::new(label("a"))
            .unwrap()
            .with_child(TwigChild::new(value("x", "p"), Occur::Should))
            .with_child(TwigChild::new(value("z", "r"), Occur::Should))
            .with_child(TwigChild::new(value("y", "q"), Occur::MustNot));
        let docs: Vec<u32> = run(&twig, &segment).0.iter().map(|m| m[0].doc_id).collect();
        assert_eq!(docs, vec![1, 2]);

        let twig = twig.with_minimum_should_match(2);
        assert!(run(&twig, &segment).0.is_empty());
    }

    #[test]
    fn test_slop_counts_root_branches() {
        let segment = segment(&[
            json!({ "a": { "p": "x", "q": "gap", "r": "y" } }),
            json!({ "a": { "p": "x", "r": "y" } }),
        ]);
        let twig = TwigQuery::new(label("a"))
            .unwrap()
            .with_child(TwigChild::new(value("x", "p"), Occur::Must).with_slop(0))
            .with_child(TwigChild::new(value("y", "r"), Occur::Must).with_slop(0));
        let docs: Vec<u32> = run(&twig, &segment).0.iter().map(|m| m[0].doc_id).collect();
        assert_eq!(docs, vec![1]);
    }

    #[test]
    fn test_first_chain_in_iterator_order() {
        let segment = segment(&[json!({ "a": { "p": ["x", "x"], "q": "y", "s": "x" } })]);
        let any_x: Query = build_node_query("content", "x", None, None).unwrap().into();
        let twig = TwigQuery::new(label("a"))
            .unwrap()
            .with_child(TwigChild::new(any_x.clone(), Occur::Must).with_in_order(true))
            .with_child(TwigChild::new(value("y", "q"), Occur::Must).with_in_order(true));
        let (matches, _) = run(&twig, &segment);
        assert_eq!(
            matches,
            vec![vec![
                NodeAddress::new(0, &[0], 0),
                NodeAddress::new(0, &[0, 0], 1),
                NodeAddress::new(0, &[0, 1], 1),
            ]]
        );

        // Only the `x` after `y` can follow it.
        let twig = TwigQuery::new(label("a"))
            .unwrap()
            .with_child(TwigChild::new(value("y", "q"), Occur::Must).with_in_order(true))
            .with_child(TwigChild::new(any_x, Occur::Must).with_in_order(true));
        let (matches, _) = run(&twig, &segment);
        assert_eq!(matches[0][2], NodeAddress::new(0, &[0, 2], 1));
    }

    #[test]
    fn test_cancellation_stops_root_walk() {
        let mut documents = vec![json!({ "a": { "k": "v" } })];
        documents.extend((0..50).map(|_| json!({ "a": { "k": "w" } })));
        let segment = segment(&documents);
        let twig = TwigQuery::new(label("a"))
            .unwrap()
            .with_child(TwigChild::new(value("w", "k"), Occur::MustNot));

        let stats = Arc::new(StatsCounters::default());
        let token = CancellationToken::new();
        let ctx = ExecContext::new(&segment, stats.clone()).with_cancellation(Some(token.clone()));
        let mut iter = TwigIterator::build(&twig, &ctx).unwrap();
        assert!(iter.advance().unwrap());
        assert_eq!(iter.current(), Some(&NodeAddress::new(0, &[0], 0)));

        token.cancel();
        assert!(!iter.advance().unwrap());
        assert!(iter.is_exhausted());
        let stats = stats.snapshot();
        assert_eq!(stats.root_candidates, 1);
        assert_eq!(stats.candidate_documents, 1);
    }

    #[test]
    fn test_branch_distance() {
        let a = NodeAddress::new(0, &[4, 1, 7], 0);
        let b = NodeAddress::new(0, &[4, 3], 2);
        assert_eq!(branch_distance(&a, &b, 1), 1);
        assert_eq!(branch_distance(&a, &b, 0), 0);
    }
}
