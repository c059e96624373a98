//! Parent nodes of the ratchet tree.

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use super::encryption_keys::EncryptionKey;
use crate::binary_tree::LeafNodeIndex;

/// This struct implements the MLS parent node.
///
/// ```c
/// struct {
///     HPKEPublicKey encryption_key;
///     opaque parent_hash<V>;
///     uint32 unmerged_leaves<V>;
/// } ParentNode;
/// ```
#[derive(
    Debug, Eq, PartialEq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct ParentNode {
    pub(crate) encryption_key: EncryptionKey,
    pub(crate) parent_hash: VLBytes,
    pub(crate) unmerged_leaves: UnmergedLeaves,
}

impl ParentNode {
    /// A fresh parent node without parent hash or unmerged leaves.
    pub(crate) fn new(encryption_key: EncryptionKey) -> Self {
        Self {
            encryption_key,
            parent_hash: VLBytes::new(vec![]),
            unmerged_leaves: UnmergedLeaves::default(),
        }
    }

    /// The public HPKE key of the node.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    /// The parent hash of the node.
    pub fn parent_hash(&self) -> &[u8] {
        self.parent_hash.as_slice()
    }

    /// The leaves below this node that do not know its private key.
    pub fn unmerged_leaves(&self) -> &[LeafNodeIndex] {
        self.unmerged_leaves.list.as_slice()
    }

    pub(crate) fn set_parent_hash(&mut self, parent_hash: Vec<u8>) {
        self.parent_hash = parent_hash.into();
    }

    pub(crate) fn add_unmerged_leaf(&mut self, leaf_index: LeafNodeIndex) {
        self.unmerged_leaves.add(leaf_index);
    }

    /// A copy of this node without the `excluded` leaves in the unmerged list.
    pub(crate) fn without_unmerged(&self, excluded: &[LeafNodeIndex]) -> ParentNode {
        let mut node = self.clone();
        node.unmerged_leaves
            .list
            .retain(|leaf| !excluded.contains(leaf));
        node
    }
}

/// Sorted list of unmerged leaves.
#[derive(
    Default, Debug, Eq, PartialEq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize,
    TlsSize,
)]
pub(crate) struct UnmergedLeaves {
    list: Vec<LeafNodeIndex>,
}

impl UnmergedLeaves {
    /// Add a leaf, keeping the list sorted.
    pub(crate) fn add(&mut self, leaf_index: LeafNodeIndex) {
        if let Err(position) = self.list.binary_search(&leaf_index) {
            self.list.insert(position, leaf_index);
        }
    }

    /// Whether the list is sorted in strictly increasing order.
    pub(crate) fn is_sorted(&self) -> bool {
        self.list.windows(2).all(|pair| pair[0] < pair[1])
    }
}
