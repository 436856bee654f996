//! Node addresses and the structural relations between them.

use std::cmp::Ordering;
use std::fmt;

use tinyvec::TinyVec;

pub type DocId = u32;

/// Sibling ordinals leading from the document root to a node.
///
/// Most paths are shallow, so up to eight levels are kept inline.
pub type NodePath = TinyVec<[u32; 8]>;

/// The location of a single term occurrence: the document, the node inside the
/// document tree, and the position inside that node's token stream.
///
/// The derived ordering is lexicographic on `(doc_id, path, position)`, with
/// paths compared component-wise and a proper prefix sorting before any of its
/// extensions. All postings are stored and iterated in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeAddress {
    pub doc_id: DocId,
    pub path: NodePath,
    pub position: u32,
}

impl NodeAddress {
    pub fn new(doc_id: DocId, path: &[u32], position: u32) -> NodeAddress {
        NodeAddress {
            doc_id,
            path: path.iter().copied().collect(),
            position,
        }
    }

    /// The address of the document root: empty path, position zero. Sorts
    /// before every other address of the same document.
    pub fn document_root(doc_id: DocId) -> NodeAddress {
        NodeAddress {
            doc_id,
            path: NodePath::default(),
            position: 0,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    #[inline]
    pub fn is_document_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Returns `true` if both addresses belong to the same node of the same
    /// document, regardless of position.
    #[inline]
    pub fn is_same_node(&self, other: &NodeAddress) -> bool {
        self.doc_id == other.doc_id && self.path == other.path
    }

    #[inline]
    pub fn is_ancestor_of(&self, other: &NodeAddress) -> bool {
        is_ancestor(self, other)
    }

    #[inline]
    pub fn is_parent_of(&self, other: &NodeAddress) -> bool {
        is_parent(self, other)
    }

    /// Returns `true` if `self` lies in the subtree rooted at `root`'s node,
    /// the node itself included.
    #[inline]
    pub fn is_within(&self, root: &NodeAddress) -> bool {
        self.doc_id == root.doc_id && self.path.starts_with(&root.path)
    }

    /// Returns `true` while `self` has not yet moved past the subtree rooted at
    /// `root`'s node in address order.
    ///
    /// Addresses that sort before the subtree and addresses inside it both
    /// qualify. Used to bound forward scans to one subtree.
    pub fn precedes_subtree_end(&self, root: &NodeAddress) -> bool {
        match self.doc_id.cmp(&root.doc_id) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => {
                self.path.starts_with(&root.path) || self.path.as_slice() < root.path.as_slice()
            }
        }
    }

    /// The first address of the same node.
    pub fn node_start(&self) -> NodeAddress {
        NodeAddress {
            doc_id: self.doc_id,
            path: self.path.clone(),
            position: 0,
        }
    }

    /// The greatest address of the same node. Every address of a descendant
    /// node sorts after it.
    pub fn node_end(&self) -> NodeAddress {
        NodeAddress {
            doc_id: self.doc_id,
            path: self.path.clone(),
            position: u32::MAX,
        }
    }

    /// The smallest address strictly below the node: its first child's start.
    /// Every address of the node itself sorts before it.
    pub fn first_descendant(&self) -> NodeAddress {
        let mut path = self.path.clone();
        path.push(0);
        NodeAddress {
            doc_id: self.doc_id,
            path,
            position: 0,
        }
    }

    /// The first address of the ancestor node at `depth`, or of the node
    /// itself when `depth >= self.depth()`.
    pub fn ancestor_at(&self, depth: usize) -> NodeAddress {
        NodeAddress {
            doc_id: self.doc_id,
            path: self.path[..depth.min(self.path.len())].iter().copied().collect(),
            position: 0,
        }
    }

    /// Ordinal of the node's last path component, `None` for the document root.
    #[inline]
    pub fn ordinal(&self) -> Option<u32> {
        self.path.last().copied()
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:[", self.doc_id)?;
        for (i, ordinal) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{ordinal}")?;
        }
        write!(f, "]@{}", self.position)
    }
}

/// Canonical total order on addresses.
#[inline]
pub fn compare(a: &NodeAddress, b: &NodeAddress) -> Ordering {
    a.cmp(b)
}

/// `a` is an ancestor of `b` iff both are in the same document and `a.path` is
/// a strict prefix of `b.path`. Positions are ignored.
#[inline]
pub fn is_ancestor(a: &NodeAddress, b: &NodeAddress) -> bool {
    a.doc_id == b.doc_id && a.path.len() < b.path.len() && b.path.starts_with(&a.path)
}

/// Like [`is_ancestor`], restricted to `b` being exactly one level below `a`.
#[inline]
pub fn is_parent(a: &NodeAddress, b: &NodeAddress) -> bool {
    a.doc_id == b.doc_id && a.path.len() + 1 == b.path.len() && b.path.starts_with(&a.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(doc: u32, path: &[u32], pos: u32) -> NodeAddress {
        NodeAddress::new(doc, path, pos)
    }

    #[test]
    fn test_lexicographic_order() {
        let mut addresses = vec![
            addr(1, &[0], 0),
            addr(0, &[1], 0),
            addr(0, &[0, 5], 2),
            addr(0, &[0], 7),
            addr(0, &[], 0),
            addr(0, &[0, 5], 1),
            addr(0, &[0, 10], 0),
        ];
        addresses.sort();
        assert_eq!(
            addresses,
            vec![
                addr(0, &[], 0),
                addr(0, &[0], 7),
                addr(0, &[0, 5], 1),
                addr(0, &[0, 5], 2),
                addr(0, &[0, 10], 0),
                addr(0, &[1], 0),
                addr(1, &[0], 0),
            ]
        );
    }

    #[test]
    fn test_comparator_is_total_and_consistent() {
        fastrand::seed(11);
        let random_addr = || {
            let depth = fastrand::usize(0..4);
            let path: Vec<u32> = (0..depth).map(|_| fastrand::u32(0..3)).collect();
            addr(fastrand::u32(0..2), &path, fastrand::u32(0..3))
        };
        for _ in 0..2000 {
            let a = random_addr();
            let b = random_addr();
            let ab = compare(&a, &b);
            assert_eq!(ab, compare(&b, &a).reverse());
            assert_eq!(ab == Ordering::Equal, a == b);
            if is_parent(&a, &b) {
                assert!(is_ancestor(&a, &b));
            }
            if is_ancestor(&a, &b) {
                assert_eq!(ab, Ordering::Less, "{a} should sort before {b}");
                assert!(!is_ancestor(&b, &a));
                assert!(b.is_within(&a));
            }
        }
    }

    #[test]
    fn test_ancestry() {
        let root = NodeAddress::document_root(3);
        let a = addr(3, &[0], 4);
        let ab = addr(3, &[0, 2], 0);
        let abc = addr(3, &[0, 2, 1], 9);

        assert!(is_ancestor(&root, &a));
        assert!(is_parent(&root, &a));
        assert!(is_ancestor(&a, &abc));
        assert!(!is_parent(&a, &abc));
        assert!(is_parent(&ab, &abc));
        assert!(!is_ancestor(&a, &a));
        assert!(!is_ancestor(&a, &addr(4, &[0, 2], 0)));
        assert!(!is_ancestor(&a, &addr(3, &[1, 2], 0)));
    }

    #[test]
    fn test_node_bounds() {
        let a = addr(2, &[1, 3], 5);
        assert_eq!(a.node_start(), addr(2, &[1, 3], 0));
        assert!(a.node_end() > a);
        assert!(a.node_end() < addr(2, &[1, 3, 0], 0));
        assert_eq!(a.first_descendant(), addr(2, &[1, 3, 0], 0));
        assert!(a.node_end() < a.first_descendant());
        assert_eq!(a.ancestor_at(1), addr(2, &[1], 0));
        assert_eq!(a.ancestor_at(9), addr(2, &[1, 3], 0));
        assert_eq!(a.ordinal(), Some(3));
        assert_eq!(NodeAddress::document_root(2).ordinal(), None);
        assert_eq!(a.to_string(), "2:[1.3]@5");
    }

    #[test]
    fn test_subtree_end() {
        let root = addr(1, &[2], 0);
        assert!(addr(0, &[9], 0).precedes_subtree_end(&root));
        assert!(addr(1, &[1, 7], 0).precedes_subtree_end(&root));
        assert!(addr(1, &[2], 3).precedes_subtree_end(&root));
        assert!(addr(1, &[2, 0, 4], 3).precedes_subtree_end(&root));
        assert!(!addr(1, &[3], 0).precedes_subtree_end(&root));
        assert!(!addr(2, &[], 0).precedes_subtree_end(&root));
    }
}
