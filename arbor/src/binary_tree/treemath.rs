use std::{cmp::Ordering, ops::Range};

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

/// Largest number of leaves a tree can have.
pub(crate) const MAX_TREE_SIZE: u32 = 1 << 30;

/// Position of a member in the tree, counted over leaves only.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct LeafNodeIndex(u32);

impl LeafNodeIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn u32(&self) -> u32 {
        self.0
    }

    pub fn usize(&self) -> usize {
        self.0 as usize
    }

    /// Position in the array representation, where leaves take the even
    /// slots.
    pub(crate) fn to_tree_index(self) -> u32 {
        self.0 << 1
    }
}

impl std::fmt::Display for LeafNodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an intermediate node, counted over parents only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParentNodeIndex(u32);

impl ParentNodeIndex {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn u32(&self) -> u32 {
        self.0
    }

    pub(crate) fn usize(&self) -> usize {
        self.0 as usize
    }

    /// Position in the array representation, where parents take the odd
    /// slots.
    pub(crate) fn to_tree_index(self) -> u32 {
        (self.0 << 1) | 1
    }
}

/// Any node of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeNodeIndex {
    Leaf(LeafNodeIndex),
    Parent(ParentNodeIndex),
}

impl TreeNodeIndex {
    /// Interprets a position in the array representation.
    pub(crate) fn new(index: u32) -> Self {
        match index & 1 {
            0 => Self::Leaf(LeafNodeIndex(index >> 1)),
            _ => Self::Parent(ParentNodeIndex(index >> 1)),
        }
    }

    pub(crate) fn u32(&self) -> u32 {
        match self {
            Self::Leaf(leaf) => leaf.to_tree_index(),
            Self::Parent(parent) => parent.to_tree_index(),
        }
    }
}

impl From<LeafNodeIndex> for TreeNodeIndex {
    fn from(leaf: LeafNodeIndex) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<ParentNodeIndex> for TreeNodeIndex {
    fn from(parent: ParentNodeIndex) -> Self {
        Self::Parent(parent)
    }
}

/// Nodes are ordered by their position in the array, i.e. left to right.
impl Ord for TreeNodeIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.u32().cmp(&other.u32())
    }
}

impl PartialOrd for TreeNodeIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Width of a full tree in leaves, always a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub(crate) struct TreeSize(u32);

impl TreeSize {
    /// The smallest full tree with room for `leaf_count` leaves.
    pub(crate) fn from_leaf_count(leaf_count: u32) -> Self {
        Self(leaf_count.max(1).next_power_of_two())
    }

    pub(crate) fn leaf_count(&self) -> u32 {
        self.0
    }

    pub(crate) fn parent_count(&self) -> u32 {
        self.0 - 1
    }

    pub(crate) fn node_count(&self) -> u32 {
        self.leaf_count() + self.parent_count()
    }

    pub(crate) fn is_leaf_in_tree(&self, leaf_index: LeafNodeIndex) -> bool {
        leaf_index.u32() < self.0
    }

    /// Grows the tree by a full subtree on the right.
    pub(crate) fn inc(&mut self) {
        self.0 <<= 1;
    }

    /// Drops the right half of the tree. A single leaf tree stays as is.
    pub(crate) fn dec(&mut self) {
        debug_assert!(self.0 > 1);
        self.0 = (self.0 >> 1).max(1);
    }
}

/// Height above the leaf level. Leaves are at level 0.
fn level(x: u32) -> u32 {
    x.trailing_ones()
}

pub(crate) fn root(size: TreeSize) -> TreeNodeIndex {
    TreeNodeIndex::new(size.leaf_count() - 1)
}

pub(crate) fn left(index: ParentNodeIndex) -> TreeNodeIndex {
    let x = index.to_tree_index();
    TreeNodeIndex::new(x - (1 << (level(x) - 1)))
}

pub(crate) fn right(index: ParentNodeIndex) -> TreeNodeIndex {
    let x = index.to_tree_index();
    TreeNodeIndex::new(x + (1 << (level(x) - 1)))
}

/// The parent of a node. The caller must make sure the node is not the root.
pub(crate) fn parent(index: TreeNodeIndex) -> ParentNodeIndex {
    let x = index.u32();
    let k = level(x);
    // A left child has a zero bit just above its level.
    let p = if (x >> (k + 1)) & 1 == 0 {
        x + (1 << k)
    } else {
        x - (1 << k)
    };
    ParentNodeIndex(p >> 1)
}

/// The other child of the node's parent.
pub(crate) fn sibling(index: TreeNodeIndex) -> TreeNodeIndex {
    let p = parent(index);
    if index.u32() < p.to_tree_index() {
        right(p)
    } else {
        left(p)
    }
}

/// The parents from just above `leaf_index` up to and including the root.
pub(crate) fn direct_path(leaf_index: LeafNodeIndex, size: TreeSize) -> Vec<ParentNodeIndex> {
    let root = root(size);
    std::iter::successors(
        (TreeNodeIndex::from(leaf_index) != root).then(|| parent(leaf_index.into())),
        |&node| {
            let node = TreeNodeIndex::from(node);
            (node != root).then(|| parent(node))
        },
    )
    .collect()
}

/// The siblings of the leaf and of every direct path node below the root,
/// ordered from the leaf upwards.
pub(crate) fn copath(leaf_index: LeafNodeIndex, size: TreeSize) -> Vec<TreeNodeIndex> {
    let mut path = direct_path(leaf_index, size);
    path.pop();
    std::iter::once(TreeNodeIndex::from(leaf_index))
        .chain(path.into_iter().map(TreeNodeIndex::from))
        .map(sibling)
        .collect()
}

/// The leaf indices covered by the subtree rooted at `node`.
pub(crate) fn leaves_under(node: TreeNodeIndex) -> Range<u32> {
    let x = node.u32();
    let width = 1u32 << level(x);
    let first = (x + 1 - width) >> 1;
    first..first + width
}

/// Checks whether `leaf_index` is in the subtree rooted at `node`.
pub(crate) fn is_descendant(node: TreeNodeIndex, leaf_index: LeafNodeIndex) -> bool {
    leaves_under(node).contains(&leaf_index.u32())
}

/// The lowest node whose subtree holds both leaves. The leaves must differ.
pub(crate) fn lowest_common_ancestor(x: LeafNodeIndex, y: LeafNodeIndex) -> ParentNodeIndex {
    debug_assert_ne!(x, y);
    // The ancestor sits one level above the highest bit in which the leaf
    // indices differ.
    let k = u32::BITS - (x.u32() ^ y.u32()).leading_zeros();
    let prefix = (x.u32() >> k) << (k + 1);
    ParentNodeIndex((prefix + (1 << k) - 1) >> 1)
}
