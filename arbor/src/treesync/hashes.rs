//! Tree hashes and parent hashes.
//!
//! ```c
//! struct {
//!     NodeType node_type;
//!     select (TreeHashInput.node_type) {
//!         case leaf:   LeafNodeHashInput leaf_node;
//!         case parent: ParentNodeHashInput parent_node;
//!     };
//! } TreeHashInput;
//!
//! struct {
//!     uint32 leaf_index;
//!     optional<LeafNode> leaf_node;
//! } LeafNodeHashInput;
//!
//! struct {
//!     optional<ParentNode> parent_node;
//!     opaque left_hash<V>;
//!     opaque right_hash<V>;
//! } ParentNodeHashInput;
//!
//! struct {
//!     HPKEPublicKey encryption_key;
//!     opaque parent_hash<V>;
//!     opaque original_sibling_tree_hash<V>;
//! } ParentHashInput;
//! ```

use arbor_traits::crypto::ArborCrypto;
use tls_codec::{Serialize, TlsSerialize, TlsSize, VLByteSlice};

use super::{errors::TreeSyncError, EncryptionKey, LeafNode, ParentNode, RatchetTree};
use crate::{
    binary_tree::{left, right, LeafNodeIndex, ParentNodeIndex, TreeNodeIndex},
    ciphersuite::{hash, Ciphersuite},
    error::LibraryError,
};

#[derive(TlsSerialize, TlsSize)]
struct LeafNodeHashInput<'a> {
    leaf_index: LeafNodeIndex,
    leaf_node: Option<&'a LeafNode>,
}

#[derive(TlsSerialize, TlsSize)]
struct ParentNodeHashInput<'a> {
    parent_node: Option<&'a ParentNode>,
    left_hash: VLByteSlice<'a>,
    right_hash: VLByteSlice<'a>,
}

#[derive(TlsSerialize, TlsSize)]
#[repr(u8)]
enum TreeHashInput<'a> {
    #[tls_codec(discriminant = 1)]
    LeafNode(LeafNodeHashInput<'a>),
    #[tls_codec(discriminant = 2)]
    ParentNode(ParentNodeHashInput<'a>),
}

impl TreeHashInput<'_> {
    fn hash(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<Vec<u8>, LibraryError> {
        let payload = self
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        hash(crypto, ciphersuite, &payload).map_err(LibraryError::unexpected_crypto_error)
    }
}

#[derive(TlsSerialize, TlsSize)]
struct ParentHashInput<'a> {
    encryption_key: &'a EncryptionKey,
    parent_hash: VLByteSlice<'a>,
    original_sibling_tree_hash: VLByteSlice<'a>,
}

impl RatchetTree {
    /// The tree hash of the root.
    pub(crate) fn tree_hash(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<Vec<u8>, LibraryError> {
        let root = crate::binary_tree::root(self.tree_size());
        self.node_tree_hash(crypto, ciphersuite, root, &[])
    }

    /// The tree hash of the subtree rooted at `node`, computed as if the
    /// leaves in `exclusion` were blank and absent from all unmerged leaves.
    pub(crate) fn node_tree_hash(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        node: TreeNodeIndex,
        exclusion: &[LeafNodeIndex],
    ) -> Result<Vec<u8>, LibraryError> {
        match node {
            TreeNodeIndex::Leaf(leaf_index) => {
                let leaf_node = if exclusion.contains(&leaf_index) {
                    None
                } else {
                    self.leaf(leaf_index)
                };
                TreeHashInput::LeafNode(LeafNodeHashInput {
                    leaf_index,
                    leaf_node,
                })
                .hash(crypto, ciphersuite)
            }
            TreeNodeIndex::Parent(parent_index) => {
                let left_hash =
                    self.node_tree_hash(crypto, ciphersuite, left(parent_index), exclusion)?;
                let right_hash =
                    self.node_tree_hash(crypto, ciphersuite, right(parent_index), exclusion)?;
                let parent_node = self
                    .parent(parent_index)
                    .map(|parent| parent.without_unmerged(exclusion));
                TreeHashInput::ParentNode(ParentNodeHashInput {
                    parent_node: parent_node.as_ref(),
                    left_hash: VLByteSlice(&left_hash),
                    right_hash: VLByteSlice(&right_hash),
                })
                .hash(crypto, ciphersuite)
            }
        }
    }

    /// The parent hash of `parent` with co-path child `sibling`.
    pub(crate) fn parent_hash(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        parent: &ParentNode,
        sibling: TreeNodeIndex,
    ) -> Result<Vec<u8>, LibraryError> {
        let original_sibling_tree_hash =
            self.node_tree_hash(crypto, ciphersuite, sibling, parent.unmerged_leaves())?;
        let payload = ParentHashInput {
            encryption_key: parent.encryption_key(),
            parent_hash: VLByteSlice(parent.parent_hash()),
            original_sibling_tree_hash: VLByteSlice(&original_sibling_tree_hash),
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
        hash(crypto, ciphersuite, &payload).map_err(LibraryError::unexpected_crypto_error)
    }

    /// Check that every non-blank parent node can be chained back to a leaf:
    /// one of its children must have a node in its resolution (without the
    /// parent's unmerged leaves) that carries the parent hash of the parent
    /// with the other child as co-path child.
    pub(crate) fn verify_parent_hashes(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<(), TreeSyncError> {
        for index in 0..self.tree_size().parent_count() {
            let parent_index = ParentNodeIndex::new(index);
            let Some(parent) = self.parent(parent_index) else {
                continue;
            };
            let children = [
                (left(parent_index), right(parent_index)),
                (right(parent_index), left(parent_index)),
            ];
            let mut valid = false;
            for (child, sibling) in children {
                let expected = self.parent_hash(crypto, ciphersuite, parent, sibling)?;
                valid = self
                    .resolution(child, parent.unmerged_leaves())
                    .into_iter()
                    .any(|node| self.node_parent_hash(node) == Some(expected.as_slice()));
                if valid {
                    break;
                }
            }
            if !valid {
                log::debug!("Parent hash verification failed for parent {index}");
                return Err(TreeSyncError::InvalidParentHash);
            }
        }
        Ok(())
    }

    fn node_parent_hash(&self, node: TreeNodeIndex) -> Option<&[u8]> {
        match node {
            TreeNodeIndex::Leaf(leaf_index) => self.leaf(leaf_index)?.parent_hash(),
            TreeNodeIndex::Parent(parent_index) => {
                self.parent(parent_index).map(ParentNode::parent_hash)
            }
        }
    }
}
