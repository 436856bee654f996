use std::cmp::Reverse;
use std::collections::BinaryHeap;

use arbor_common::Result;
use arbor_node_index::{CursorState, DocId, NodeAddress, NodeIterator};

/// Union of several cursors.
///
/// Addresses present in more than one input are yielded once. The inputs are
/// kept in a min-heap keyed by their current address; ties are broken by input
/// index.
pub struct DisjunctionIterator<'a> {
    inputs: Vec<Box<dyn NodeIterator + 'a>>,
    heap: BinaryHeap<Reverse<(NodeAddress, usize)>>,
    current: Option<NodeAddress>,
    state: CursorState,
}

impl<'a> DisjunctionIterator<'a> {
    pub fn new(inputs: Vec<Box<dyn NodeIterator + 'a>>) -> Self {
        DisjunctionIterator {
            heap: BinaryHeap::with_capacity(inputs.len()),
            inputs,
            current: None,
            state: CursorState::Unstarted,
        }
    }

    fn push(&mut self, index: usize) {
        if let Some(current) = self.inputs[index].current() {
            self.heap.push(Reverse((current.clone(), index)));
        }
    }

    fn settle(&mut self) -> bool {
        self.current = self.heap.peek().map(|Reverse((address, _))| address.clone());
        self.state = if self.current.is_some() {
            CursorState::Positioned
        } else {
            CursorState::Exhausted
        };
        self.current.is_some()
    }
}

impl NodeIterator for DisjunctionIterator<'_> {
    fn current(&self) -> Option<&NodeAddress> {
        self.current.as_ref()
    }

    fn state(&self) -> CursorState {
        self.state
    }

    fn advance(&mut self) -> Result<bool> {
        match self.state {
            CursorState::Exhausted => return Ok(false),
            CursorState::Unstarted => {
                for index in 0..self.inputs.len() {
                    if self.inputs[index].advance()? {
                        self.push(index);
                    }
                }
            }
            CursorState::Positioned => {
                while let Some(Reverse((address, index))) = self.heap.peek() {
                    if Some(address) != self.current.as_ref() {
                        break;
                    }
                    let index = *index;
                    self.heap.pop();
                    if self.inputs[index].advance()? {
                        self.push(index);
                    }
                }
            }
        }
        Ok(self.settle())
    }

    fn advance_to_document(&mut self, target: DocId) -> Result<bool> {
        self.advance_to_address(&NodeAddress::document_root(target))
    }

    fn advance_to_address(&mut self, target: &NodeAddress) -> Result<bool> {
        match self.state {
            CursorState::Exhausted => return Ok(false),
            CursorState::Unstarted => {
                for index in 0..self.inputs.len() {
                    if self.inputs[index].advance_to_address(target)? {
                        self.push(index);
                    }
                }
            }
            CursorState::Positioned => {
                if self.current.as_ref().is_some_and(|current| current >= target) {
                    return Ok(true);
                }
                while let Some(Reverse((address, index))) = self.heap.peek() {
                    if address >= target {
                        break;
                    }
                    let index = *index;
                    self.heap.pop();
                    if self.inputs[index].advance_to_address(target)? {
                        self.push(index);
                    }
                }
            }
        }
        Ok(self.settle())
    }
}

#[cfg(test)]
mod tests {
    use arbor_node_index::iterator::{Addresses, EmptyNodeIterator, VecNodeIterator};

    use super::*;

    fn addr(doc: u32, path: &[u32], pos: u32) -> NodeAddress {
        NodeAddress::new(doc, path, pos)
    }

    fn union() -> DisjunctionIterator<'static> {
        DisjunctionIterator::new(vec![
            Box::new(VecNodeIterator::new(vec![
                addr(0, &[0], 1),
                addr(1, &[0, 1], 0),
                addr(4, &[2], 0),
            ])),
            Box::new(EmptyNodeIterator::new()),
            Box::new(VecNodeIterator::new(vec![
                addr(0, &[0], 1),
                addr(0, &[1], 3),
                addr(3, &[0], 0),
            ])),
        ])
    }

    #[test]
    fn test_union_is_sorted_and_deduplicated() {
        let addresses: Vec<NodeAddress> = Addresses::new(union()).map(|a| a.unwrap()).collect();
        assert_eq!(
            addresses,
            vec![
                addr(0, &[0], 1),
                addr(0, &[1], 3),
                addr(1, &[0, 1], 0),
                addr(3, &[0], 0),
                addr(4, &[2], 0),
            ]
        );
    }

    #[test]
    fn test_targeted_advance() {
        let mut iter = union();
        assert!(iter.advance_to_document(1).unwrap());
        assert_eq!(iter.current(), Some(&addr(1, &[0, 1], 0)));
        assert!(iter.advance_to_address(&addr(3, &[0], 0)).unwrap());
        assert_eq!(iter.current(), Some(&addr(3, &[0], 0)));
        assert!(iter.advance().unwrap());
        assert_eq!(iter.current(), Some(&addr(4, &[2], 0)));
        assert!(!iter.advance().unwrap());
        assert!(iter.is_exhausted());
    }
}
