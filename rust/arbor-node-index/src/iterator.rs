//! Forward-only cursors over sorted node addresses.

use arbor_common::Result;

use crate::address::{DocId, NodeAddress};

/// Lifecycle of a [`NodeIterator`]. Transitions are monotonic:
/// `Unstarted -> Positioned -> Exhausted`. A cursor never rewinds; a fresh one
/// is opened instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unstarted,
    Positioned,
    Exhausted,
}

/// Cursor over a sorted sequence of node addresses.
///
/// All `advance*` methods return `Ok(true)` when the cursor is positioned on an
/// address after the call and `Ok(false)` once it is exhausted. The targeted
/// advances never move backwards: if the current address already satisfies the
/// target, the cursor stays where it is.
pub trait NodeIterator {
    /// The current address, `None` before the first advance and after exhaustion.
    fn current(&self) -> Option<&NodeAddress>;

    fn state(&self) -> CursorState;

    /// Moves to the next address.
    fn advance(&mut self) -> Result<bool>;

    /// Moves to the first address with `doc_id >= target`.
    fn advance_to_document(&mut self, target: DocId) -> Result<bool> {
        loop {
            match self.state() {
                CursorState::Exhausted => return Ok(false),
                CursorState::Positioned => {
                    if self.current().is_some_and(|current| current.doc_id >= target) {
                        return Ok(true);
                    }
                }
                CursorState::Unstarted => {}
            }
            if !self.advance()? {
                return Ok(false);
            }
        }
    }

    /// Moves to the first address `>= target`.
    fn advance_to_address(&mut self, target: &NodeAddress) -> Result<bool> {
        if !self.advance_to_document(target.doc_id)? {
            return Ok(false);
        }
        while self.current().is_some_and(|current| current < target) {
            if !self.advance()? {
                return Ok(false);
            }
        }
        Ok(self.current().is_some())
    }

    /// Appends the addresses that justify the current position, starting with
    /// the current address itself. Structural combinators add the addresses
    /// of the nodes that satisfied their constraints.
    fn collect_witnesses(&self, target: &mut Vec<NodeAddress>) {
        if let Some(current) = self.current() {
            target.push(current.clone());
        }
    }

    fn current_doc(&self) -> Option<DocId> {
        self.current().map(|current| current.doc_id)
    }

    fn is_exhausted(&self) -> bool {
        self.state() == CursorState::Exhausted
    }
}

impl<T: NodeIterator + ?Sized> NodeIterator for Box<T> {
    fn current(&self) -> Option<&NodeAddress> {
        (**self).current()
    }

    fn state(&self) -> CursorState {
        (**self).state()
    }

    fn advance(&mut self) -> Result<bool> {
        (**self).advance()
    }

    fn advance_to_document(&mut self, target: DocId) -> Result<bool> {
        (**self).advance_to_document(target)
    }

    fn advance_to_address(&mut self, target: &NodeAddress) -> Result<bool> {
        (**self).advance_to_address(target)
    }

    fn collect_witnesses(&self, target: &mut Vec<NodeAddress>) {
        (**self).collect_witnesses(target)
    }
}

/// Moves `iter` to the first address past the node it is currently on.
///
/// Used by combinators that consume one match per node.
pub fn skip_node<I: NodeIterator + ?Sized>(iter: &mut I) -> Result<bool> {
    let Some(end) = iter.current().map(NodeAddress::node_end) else {
        return iter.advance();
    };
    if !iter.advance_to_address(&end)? {
        return Ok(false);
    }
    if iter.current().is_some_and(|current| current.is_same_node(&end)) {
        return iter.advance();
    }
    Ok(true)
}

/// Moves `iter` to the first address of a later document.
pub fn skip_document<I: NodeIterator + ?Sized>(iter: &mut I) -> Result<bool> {
    match iter.current_doc() {
        Some(doc_id) if doc_id < DocId::MAX => iter.advance_to_document(doc_id + 1),
        Some(_) => {
            while iter.advance()? {}
            Ok(false)
        }
        None => iter.advance(),
    }
}

/// A cursor that never yields anything.
#[derive(Debug, Default)]
pub struct EmptyNodeIterator {
    started: bool,
}

impl EmptyNodeIterator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NodeIterator for EmptyNodeIterator {
    fn current(&self) -> Option<&NodeAddress> {
        None
    }

    fn state(&self) -> CursorState {
        if self.started {
            CursorState::Exhausted
        } else {
            CursorState::Unstarted
        }
    }

    fn advance(&mut self) -> Result<bool> {
        self.started = true;
        Ok(false)
    }
}

/// A cursor over an in-memory sorted vector of addresses.
#[derive(Debug, Clone)]
pub struct VecNodeIterator {
    addresses: Vec<NodeAddress>,
    // index of the next address to yield
    next: usize,
    state: CursorState,
}

impl VecNodeIterator {
    /// `addresses` must be sorted.
    pub fn new(addresses: Vec<NodeAddress>) -> Self {
        debug_assert!(addresses.is_sorted());
        VecNodeIterator {
            addresses,
            next: 0,
            state: CursorState::Unstarted,
        }
    }
}

impl NodeIterator for VecNodeIterator {
    fn current(&self) -> Option<&NodeAddress> {
        match self.state {
            CursorState::Positioned => self.addresses.get(self.next - 1),
            _ => None,
        }
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn advance(&mut self) -> Result<bool> {
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }
        if self.next < self.addresses.len() {
            self.next += 1;
            self.state = CursorState::Positioned;
            Ok(true)
        } else {
            self.state = CursorState::Exhausted;
            Ok(false)
        }
    }

    fn advance_to_address(&mut self, target: &NodeAddress) -> Result<bool> {
        if self.state == CursorState::Exhausted {
            return Ok(false);
        }
        if self.current().is_some_and(|current| current >= target) {
            return Ok(true);
        }
        let from = self.next;
        let skip = self.addresses[from..].partition_point(|address| address < target);
        self.next = from + skip;
        self.advance()
    }

    fn advance_to_document(&mut self, target: DocId) -> Result<bool> {
        self.advance_to_address(&NodeAddress::document_root(target))
    }
}

/// Adapts a [`NodeIterator`] into a standard iterator of addresses.
pub struct Addresses<I> {
    inner: I,
    failed: bool,
}

impl<I: NodeIterator> Addresses<I> {
    pub fn new(inner: I) -> Self {
        Addresses {
            inner,
            failed: false,
        }
    }

    pub fn into_inner(self) -> I {
        self.inner
    }
}

impl<I: NodeIterator> Iterator for Addresses<I> {
    type Item = Result<NodeAddress>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.inner.advance() {
            Ok(true) => self.inner.current().cloned().map(Ok),
            Ok(false) => None,
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
