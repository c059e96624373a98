//! The private keys a member holds for its leaf and for the parent nodes on
//! its direct path.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{
    node::encryption_keys::{EncryptionKeyPair, EncryptionPrivateKey},
    treekem::PlainUpdatePathNode,
    EncryptionKey, RatchetTree,
};
use crate::{
    binary_tree::{LeafNodeIndex, ParentNodeIndex, TreeNodeIndex},
    utils::vector_converter,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PrivateTree {
    own_leaf_index: LeafNodeIndex,
    leaf_key: EncryptionKeyPair,
    #[serde(with = "vector_converter")]
    path_keys: BTreeMap<ParentNodeIndex, EncryptionKeyPair>,
    /// Keys of leaf nodes this member proposed in updates that are not
    /// committed yet.
    pending_update_keys: Vec<EncryptionKeyPair>,
}

impl PrivateTree {
    pub(crate) fn new(own_leaf_index: LeafNodeIndex, leaf_key: EncryptionKeyPair) -> Self {
        Self {
            own_leaf_index,
            leaf_key,
            path_keys: BTreeMap::new(),
            pending_update_keys: vec![],
        }
    }

    pub(crate) fn own_leaf_index(&self) -> LeafNodeIndex {
        self.own_leaf_index
    }

    /// The private key for `node`, if this member holds one that matches the
    /// public key currently in the tree.
    pub(crate) fn private_key(
        &self,
        node: TreeNodeIndex,
        tree: &RatchetTree,
    ) -> Option<&EncryptionPrivateKey> {
        let key_pair = match node {
            TreeNodeIndex::Leaf(leaf_index) if leaf_index == self.own_leaf_index => &self.leaf_key,
            TreeNodeIndex::Leaf(_) => return None,
            TreeNodeIndex::Parent(parent_index) => self.path_keys.get(&parent_index)?,
        };
        (tree.encryption_key(node) == Some(key_pair.public_key()))
            .then(|| key_pair.private_key())
    }

    pub(crate) fn set_leaf_key(&mut self, leaf_key: EncryptionKeyPair) {
        self.leaf_key = leaf_key;
    }

    /// Store the key pairs of a path. Returns the path secrets, which are not
    /// kept.
    pub(crate) fn set_path_keys(
        &mut self,
        nodes: Vec<PlainUpdatePathNode>,
    ) -> Vec<super::treekem::PathSecret> {
        nodes
            .into_iter()
            .map(|node| {
                self.path_keys.insert(node.parent_index, node.key_pair);
                node.path_secret
            })
            .collect()
    }

    /// Drop all keys that no longer match the public tree.
    pub(crate) fn prune(&mut self, tree: &RatchetTree) {
        self.path_keys.retain(|parent_index, key_pair| {
            tree.parent(*parent_index)
                .map(|parent| parent.encryption_key() == key_pair.public_key())
                .unwrap_or(false)
        });
    }

    pub(crate) fn add_pending_update_key(&mut self, key_pair: EncryptionKeyPair) {
        self.pending_update_keys.push(key_pair);
    }

    /// Take the pending key pair for a committed update of this member.
    pub(crate) fn take_pending_update_key(
        &mut self,
        public_key: &EncryptionKey,
    ) -> Option<EncryptionKeyPair> {
        let position = self
            .pending_update_keys
            .iter()
            .position(|key_pair| key_pair.public_key() == public_key)?;
        Some(self.pending_update_keys.remove(position))
    }

    /// Pending updates only live for one epoch.
    pub(crate) fn clear_pending_update_keys(&mut self) {
        self.pending_update_keys.clear();
    }
}
