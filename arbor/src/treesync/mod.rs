//! # The ratchet tree
//!
//! [`RatchetTree`] is the public part of the tree: the leaf and parent nodes of
//! all members, stored in two arrays indexed by [`LeafNodeIndex`] and
//! [`ParentNodeIndex`]. The tree always has a power-of-two number of leaves;
//! blank nodes are `None`.
//!
//! The tree is a plain value. Group operations clone it, apply their changes
//! to the clone and only keep the clone if every step succeeded.
//!
//! [`RatchetTreeIn`] is the wire representation of the tree as it appears in
//! the ratchet tree extension or is exported by a member.

use std::collections::HashSet;

use arbor_traits::crypto::ArborCrypto;
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::{
    binary_tree::{
        direct_path, is_descendant, left, right, LeafNodeIndex, ParentNodeIndex, TreeNodeIndex,
        TreeSize, MAX_TREE_SIZE,
    },
    ciphersuite::Ciphersuite,
    credentials::AuthenticationService,
    group::GroupId,
};

mod hashes;
pub(crate) mod node;
pub(crate) mod private_tree;
pub(crate) mod treekem;

pub mod errors;

#[cfg(test)]
mod tests;

pub use node::{
    encryption_keys::EncryptionKey,
    leaf_node::{Capabilities, LeafNode, LeafNodeSource},
    parent_node::ParentNode,
    Node,
};

use errors::TreeSyncError;
use node::leaf_node::TreePosition;

/// The ratchet tree in its wire representation.
///
/// ```c
/// optional<Node> ratchet_tree<V>;
/// ```
///
/// Trailing blank nodes are omitted.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct RatchetTreeIn(Vec<Option<Node>>);

impl RatchetTreeIn {
    /// Build a tree from a list of nodes in array order.
    pub fn from_nodes(nodes: Vec<Option<Node>>) -> Self {
        Self(nodes)
    }

    /// The nodes in array order.
    pub fn nodes(&self) -> &[Option<Node>] {
        &self.0
    }
}

/// The public ratchet tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetTree {
    leaves: Vec<Option<LeafNode>>,
    parents: Vec<Option<ParentNode>>,
}

impl RatchetTree {
    /// A tree with a single leaf.
    pub(crate) fn new(leaf_node: LeafNode) -> Self {
        Self {
            leaves: vec![Some(leaf_node)],
            parents: vec![],
        }
    }

    /// Import a tree received from another member. This only checks the
    /// shape of the tree; see [`RatchetTree::validate`] for the content checks.
    pub(crate) fn from_ratchet_tree_in(tree_in: RatchetTreeIn) -> Result<Self, TreeSyncError> {
        let nodes = tree_in.0;
        if nodes.is_empty() {
            return Err(TreeSyncError::MalformedTree("the tree is empty"));
        }
        if nodes.len() % 2 == 0 {
            return Err(TreeSyncError::MalformedTree(
                "the tree has an even number of nodes",
            ));
        }
        if nodes.last().map(Option::is_none).unwrap_or(true) {
            return Err(TreeSyncError::MalformedTree("the last node is blank"));
        }
        if nodes.len() as u64 > 2 * MAX_TREE_SIZE as u64 {
            return Err(TreeSyncError::TreeFull);
        }

        let size = TreeSize::from_leaf_count(((nodes.len() + 1) / 2) as u32);
        let mut leaves = Vec::with_capacity(size.leaf_count() as usize);
        let mut parents = Vec::with_capacity(size.parent_count() as usize);
        for (index, node) in nodes.into_iter().enumerate() {
            match (index % 2 == 0, node) {
                (true, Some(Node::LeafNode(leaf))) => leaves.push(Some(leaf)),
                (true, None) => leaves.push(None),
                (false, Some(Node::ParentNode(parent))) => parents.push(Some(parent)),
                (false, None) => parents.push(None),
                _ => {
                    return Err(TreeSyncError::MalformedTree(
                        "a node is in a position of the wrong type",
                    ))
                }
            }
        }
        leaves.resize(size.leaf_count() as usize, None);
        parents.resize(size.parent_count() as usize, None);

        let tree = Self { leaves, parents };
        tree.check_unmerged_leaves()?;
        Ok(tree)
    }

    /// Export the public tree. Trailing blank nodes are removed.
    pub fn export(&self) -> RatchetTreeIn {
        let mut nodes = Vec::with_capacity(self.tree_size().node_count() as usize);
        for (index, leaf) in self.leaves.iter().enumerate() {
            if index > 0 {
                nodes.push(
                    self.parents
                        .get(index - 1)
                        .cloned()
                        .flatten()
                        .map(Node::ParentNode),
                );
            }
            nodes.push(leaf.clone().map(Node::LeafNode));
        }
        while matches!(nodes.last(), Some(None)) {
            nodes.pop();
        }
        RatchetTreeIn(nodes)
    }

    /// The size of the tree in leaves, including blank leaves.
    pub(crate) fn tree_size(&self) -> TreeSize {
        TreeSize::from_leaf_count(self.leaves.len() as u32)
    }

    /// The leaf at `leaf_index` if it is not blank.
    pub fn leaf(&self, leaf_index: LeafNodeIndex) -> Option<&LeafNode> {
        self.leaves.get(leaf_index.usize()).and_then(Option::as_ref)
    }

    /// The parent node at `parent_index` if it is not blank.
    pub fn parent(&self, parent_index: ParentNodeIndex) -> Option<&ParentNode> {
        self.parents.get(parent_index.usize()).and_then(Option::as_ref)
    }

    fn parent_mut(&mut self, parent_index: ParentNodeIndex) -> Option<&mut ParentNode> {
        self.parents
            .get_mut(parent_index.usize())
            .and_then(Option::as_mut)
    }

    /// All non-blank leaves with their index.
    pub fn members(&self) -> impl Iterator<Item = (LeafNodeIndex, &LeafNode)> {
        self.leaves.iter().enumerate().filter_map(|(index, leaf)| {
            leaf.as_ref()
                .map(|leaf| (LeafNodeIndex::new(index as u32), leaf))
        })
    }

    /// The encryption key of a node, if the node is not blank.
    pub(crate) fn encryption_key(&self, node: TreeNodeIndex) -> Option<&EncryptionKey> {
        match node {
            TreeNodeIndex::Leaf(leaf_index) => self.leaf(leaf_index).map(LeafNode::encryption_key),
            TreeNodeIndex::Parent(parent_index) => {
                self.parent(parent_index).map(ParentNode::encryption_key)
            }
        }
    }

    /// The index of the leftmost blank leaf, or the first leaf beyond the
    /// tree if all leaves are taken.
    pub(crate) fn free_leaf_index(&self) -> LeafNodeIndex {
        let index = self
            .leaves
            .iter()
            .position(Option::is_none)
            .unwrap_or(self.leaves.len());
        LeafNodeIndex::new(index as u32)
    }

    /// Add a leaf in the leftmost free slot, doubling the tree if necessary.
    /// The new leaf is recorded as unmerged in all non-blank parents on its
    /// direct path.
    pub(crate) fn add_leaf(&mut self, leaf_node: LeafNode) -> Result<LeafNodeIndex, TreeSyncError> {
        let leaf_index = self.free_leaf_index();
        if leaf_index.usize() == self.leaves.len() {
            let mut size = self.tree_size();
            if size.leaf_count() >= MAX_TREE_SIZE {
                return Err(TreeSyncError::TreeFull);
            }
            size.inc();
            self.leaves.resize(size.leaf_count() as usize, None);
            self.parents.resize(size.parent_count() as usize, None);
            log::trace!("Extended the tree to {} leaves", size.leaf_count());
        }
        self.leaves[leaf_index.usize()] = Some(leaf_node);
        for parent_index in direct_path(leaf_index, self.tree_size()) {
            if let Some(parent) = self.parent_mut(parent_index) {
                parent.add_unmerged_leaf(leaf_index);
            }
        }
        Ok(leaf_index)
    }

    /// Blank a leaf and its direct path, then drop the right half of the tree
    /// as long as it is completely blank.
    pub(crate) fn remove_leaf(&mut self, leaf_index: LeafNodeIndex) -> Result<(), TreeSyncError> {
        if self.leaf(leaf_index).is_none() {
            return Err(TreeSyncError::LeafNotInTree(leaf_index));
        }
        self.leaves[leaf_index.usize()] = None;
        self.blank_direct_path(leaf_index);
        self.truncate();
        Ok(())
    }

    /// Replace a leaf and blank its direct path.
    pub(crate) fn update_leaf(
        &mut self,
        leaf_index: LeafNodeIndex,
        leaf_node: LeafNode,
    ) -> Result<(), TreeSyncError> {
        if self.leaf(leaf_index).is_none() {
            return Err(TreeSyncError::LeafNotInTree(leaf_index));
        }
        self.leaves[leaf_index.usize()] = Some(leaf_node);
        self.blank_direct_path(leaf_index);
        Ok(())
    }

    /// Replace a leaf without touching its direct path.
    pub(crate) fn set_leaf(
        &mut self,
        leaf_index: LeafNodeIndex,
        leaf_node: LeafNode,
    ) -> Result<(), TreeSyncError> {
        let slot = self
            .leaves
            .get_mut(leaf_index.usize())
            .ok_or(TreeSyncError::LeafNotInTree(leaf_index))?;
        *slot = Some(leaf_node);
        Ok(())
    }

    fn blank_direct_path(&mut self, leaf_index: LeafNodeIndex) {
        for parent_index in direct_path(leaf_index, self.tree_size()) {
            self.parents[parent_index.usize()] = None;
        }
    }

    fn truncate(&mut self) {
        while self.leaves.len() > 1 {
            let half = self.leaves.len() / 2;
            if self.leaves[half..].iter().any(Option::is_some) {
                break;
            }
            self.leaves.truncate(half);
            self.parents.truncate(half - 1);
            log::trace!("Truncated the tree to {half} leaves");
        }
    }

    /// The resolution of a node: the node itself if it is not blank, together
    /// with its unmerged leaves, or the resolutions of its children if it is
    /// blank. Leaves in `exclusion` are left out.
    pub(crate) fn resolution(
        &self,
        node: TreeNodeIndex,
        exclusion: &[LeafNodeIndex],
    ) -> Vec<TreeNodeIndex> {
        match node {
            TreeNodeIndex::Leaf(leaf_index) => {
                if self.leaf(leaf_index).is_some() && !exclusion.contains(&leaf_index) {
                    vec![node]
                } else {
                    vec![]
                }
            }
            TreeNodeIndex::Parent(parent_index) => match self.parent(parent_index) {
                Some(parent) => std::iter::once(node)
                    .chain(
                        parent
                            .unmerged_leaves()
                            .iter()
                            .filter(|leaf| !exclusion.contains(leaf))
                            .map(|leaf| TreeNodeIndex::Leaf(*leaf)),
                    )
                    .collect(),
                None => {
                    let mut resolution = self.resolution(left(parent_index), exclusion);
                    resolution.extend(self.resolution(right(parent_index), exclusion));
                    resolution
                }
            },
        }
    }

    /// The child of `parent_index` that is not on the path to `leaf_index`.
    pub(crate) fn copath_child(
        parent_index: ParentNodeIndex,
        leaf_index: LeafNodeIndex,
    ) -> TreeNodeIndex {
        let left_child = left(parent_index);
        if is_descendant(left_child, leaf_index) {
            right(parent_index)
        } else {
            left_child
        }
    }

    /// The direct path of `leaf_index` without the nodes whose copath child
    /// has an empty resolution.
    pub(crate) fn filtered_direct_path(&self, leaf_index: LeafNodeIndex) -> Vec<ParentNodeIndex> {
        direct_path(leaf_index, self.tree_size())
            .into_iter()
            .filter(|parent_index| {
                !self
                    .resolution(Self::copath_child(*parent_index, leaf_index), &[])
                    .is_empty()
            })
            .collect()
    }

    /// Blank the direct path of `leaf_index` and set fresh parent nodes with
    /// the given keys on its filtered direct path. The parent hashes are
    /// computed top-down. Returns the parent hash the leaf node of
    /// `leaf_index` must carry.
    pub(crate) fn apply_path(
        &mut self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        leaf_index: LeafNodeIndex,
        path_keys: Vec<EncryptionKey>,
    ) -> Result<Vec<u8>, TreeSyncError> {
        let filtered_direct_path = self.filtered_direct_path(leaf_index);
        if filtered_direct_path.len() != path_keys.len() {
            return Err(TreeSyncError::PathLengthMismatch);
        }
        self.blank_direct_path(leaf_index);
        for (parent_index, key) in filtered_direct_path.iter().zip(path_keys) {
            self.parents[parent_index.usize()] = Some(ParentNode::new(key));
        }

        let mut parent_hash = vec![];
        for parent_index in filtered_direct_path.iter().rev() {
            let parent = self
                .parent_mut(*parent_index)
                .ok_or_else(|| crate::error::LibraryError::custom("path node was just set"))?;
            parent.set_parent_hash(parent_hash);
            let parent = parent.clone();
            parent_hash = self.parent_hash(
                crypto,
                ciphersuite,
                &parent,
                Self::copath_child(*parent_index, leaf_index),
            )?;
        }
        Ok(parent_hash)
    }

    /// Check that no node uses the encryption key and no other leaf uses the
    /// signature key of `leaf_node`. The leaf at `replaces` is ignored.
    pub(crate) fn check_key_uniqueness(
        &self,
        leaf_node: &LeafNode,
        replaces: Option<LeafNodeIndex>,
    ) -> Result<(), TreeSyncError> {
        for (index, leaf) in self.members() {
            if Some(index) == replaces {
                continue;
            }
            if leaf.encryption_key() == leaf_node.encryption_key() {
                return Err(TreeSyncError::DuplicateEncryptionKey);
            }
            if leaf.signature_key() == leaf_node.signature_key() {
                return Err(TreeSyncError::DuplicateSignatureKey);
            }
        }
        if self
            .parents
            .iter()
            .flatten()
            .any(|parent| parent.encryption_key() == leaf_node.encryption_key())
        {
            return Err(TreeSyncError::DuplicateEncryptionKey);
        }
        Ok(())
    }

    /// Validate a tree received when joining: all leaf nodes, key uniqueness
    /// and the parent hashes.
    pub(crate) fn validate(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        group_id: &GroupId,
        authentication_service: &dyn AuthenticationService,
    ) -> Result<(), TreeSyncError> {
        let mut encryption_keys = HashSet::new();
        let mut signature_keys = HashSet::new();
        for (leaf_index, leaf) in self.members() {
            let position = TreePosition::new(group_id.clone(), leaf_index);
            leaf.validate(crypto, ciphersuite, Some(position), authentication_service)?;
            if !encryption_keys.insert(leaf.encryption_key()) {
                return Err(TreeSyncError::DuplicateEncryptionKey);
            }
            if !signature_keys.insert(leaf.signature_key()) {
                return Err(TreeSyncError::DuplicateSignatureKey);
            }
        }
        for parent in self.parents.iter().flatten() {
            if !encryption_keys.insert(parent.encryption_key()) {
                return Err(TreeSyncError::DuplicateEncryptionKey);
            }
        }
        self.verify_parent_hashes(crypto, ciphersuite)
    }

    /// Unmerged leaves must be sorted, non-blank, below the parent and listed
    /// in every non-blank parent between the leaf and the parent.
    fn check_unmerged_leaves(&self) -> Result<(), TreeSyncError> {
        let size = self.tree_size();
        for (index, parent) in self.parents.iter().enumerate() {
            let Some(parent) = parent else { continue };
            let parent_index = ParentNodeIndex::new(index as u32);
            if !parent.unmerged_leaves().windows(2).all(|w| w[0] < w[1]) {
                return Err(TreeSyncError::MalformedTree("unmerged leaves are not sorted"));
            }
            for leaf_index in parent.unmerged_leaves() {
                if self.leaf(*leaf_index).is_none()
                    || !is_descendant(TreeNodeIndex::Parent(parent_index), *leaf_index)
                {
                    return Err(TreeSyncError::MalformedTree("invalid unmerged leaf"));
                }
                let intermediate = direct_path(*leaf_index, size)
                    .into_iter()
                    .take_while(|p| *p != parent_index);
                for intermediate_index in intermediate {
                    if let Some(node) = self.parent(intermediate_index) {
                        if !node.unmerged_leaves().contains(leaf_index) {
                            return Err(TreeSyncError::MalformedTree(
                                "unmerged leaf missing below its parent",
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// The leaf whose leaf node is `leaf_node`.
    pub(crate) fn find_leaf(&self, leaf_node: &LeafNode) -> Option<LeafNodeIndex> {
        self.members()
            .find(|(_, leaf)| *leaf == leaf_node)
            .map(|(index, _)| index)
    }

    #[cfg(test)]
    pub(crate) fn leaf_mut(&mut self, leaf_index: LeafNodeIndex) -> Option<&mut LeafNode> {
        self.leaves
            .get_mut(leaf_index.usize())
            .and_then(Option::as_mut)
    }
}
