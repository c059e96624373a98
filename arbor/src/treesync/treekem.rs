//! # TreeKEM
//!
//! Path secrets, their derivation along a filtered direct path and the
//! encryption of path secrets to the resolutions of the co-path.
//!
//! ```text
//! path_secret[0] is sampled at random
//! path_secret[n] = DeriveSecret(path_secret[n-1], "path")
//! node_secret[n] = DeriveSecret(path_secret[n], "node")
//! node_priv[n], node_pub[n] = KEM.DeriveKeyPair(node_secret[n])
//! ```
//!
//! The commit secret is the path secret one step above the last node of the
//! filtered direct path.

use arbor_traits::{crypto::ArborCrypto, random::ArborRand};
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use super::{
    errors::TreeSyncError,
    node::encryption_keys::{EncryptionKeyPair, EncryptionPrivateKey},
    private_tree::PrivateTree,
    EncryptionKey, LeafNode, RatchetTree,
};
use crate::{
    binary_tree::{is_descendant, LeafNodeIndex, ParentNodeIndex, TreeNodeIndex},
    ciphersuite::{Ciphersuite, CryptoError, HpkeCiphertext, Secret, UPDATE_PATH_NODE_LABEL},
    error::LibraryError,
    schedule::CommitSecret,
};

/// A secret of a node on a direct path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct PathSecret {
    path_secret: Secret,
}

impl From<Secret> for PathSecret {
    fn from(path_secret: Secret) -> Self {
        Self { path_secret }
    }
}

impl PathSecret {
    /// Sample a fresh path secret.
    pub(crate) fn random(
        ciphersuite: Ciphersuite,
        rand: &impl ArborRand,
    ) -> Result<Self, CryptoError> {
        Ok(Secret::random(ciphersuite, rand)?.into())
    }

    /// Derive the key pair of the node this path secret belongs to.
    pub(crate) fn derive_key_pair(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<EncryptionKeyPair, LibraryError> {
        let node_secret = self
            .path_secret
            .derive_secret(crypto, ciphersuite, "node")
            .map_err(LibraryError::unexpected_crypto_error)?;
        log_crypto!(trace, "Node secret: {:x?}", node_secret.as_slice());
        EncryptionKeyPair::derive(crypto, ciphersuite, node_secret.as_slice())
    }

    /// Derive the path secret of the next node on the path.
    pub(crate) fn derive_path_secret(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<PathSecret, LibraryError> {
        let path_secret = self
            .path_secret
            .derive_secret(crypto, ciphersuite, "path")
            .map_err(LibraryError::unexpected_crypto_error)?;
        Ok(Self { path_secret })
    }

    /// Encrypt the path secret to a node key with the provisional group
    /// context.
    pub(crate) fn encrypt(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        public_key: &EncryptionKey,
        group_context: &[u8],
    ) -> Result<HpkeCiphertext, CryptoError> {
        public_key.encrypt(
            crypto,
            ciphersuite,
            UPDATE_PATH_NODE_LABEL,
            group_context,
            self.path_secret.as_slice(),
        )
    }

    /// Decrypt a path secret.
    pub(crate) fn decrypt(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        ciphertext: &HpkeCiphertext,
        private_key: &EncryptionPrivateKey,
        group_context: &[u8],
    ) -> Result<PathSecret, CryptoError> {
        let secret = private_key.decrypt(
            crypto,
            ciphersuite,
            UPDATE_PATH_NODE_LABEL,
            group_context,
            ciphertext,
        )?;
        Ok(Secret::from_slice(&secret).into())
    }

    pub(crate) fn secret(&self) -> &Secret {
        &self.path_secret
    }

    pub(crate) fn into_secret(self) -> Secret {
        self.path_secret
    }
}

/// A node on a path together with its path secret and key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PlainUpdatePathNode {
    pub(crate) parent_index: ParentNodeIndex,
    pub(crate) path_secret: PathSecret,
    pub(crate) key_pair: EncryptionKeyPair,
}

/// Derive path secrets and key pairs for `parents`, starting with
/// `path_secret` for the first one. Returns the nodes and the commit secret.
pub(crate) fn derive_path(
    crypto: &impl ArborCrypto,
    ciphersuite: Ciphersuite,
    path_secret: PathSecret,
    parents: &[ParentNodeIndex],
) -> Result<(Vec<PlainUpdatePathNode>, CommitSecret), LibraryError> {
    let mut nodes = Vec::with_capacity(parents.len());
    let mut path_secret = path_secret;
    for parent_index in parents {
        let key_pair = path_secret.derive_key_pair(crypto, ciphersuite)?;
        let next = path_secret.derive_path_secret(crypto, ciphersuite)?;
        nodes.push(PlainUpdatePathNode {
            parent_index: *parent_index,
            path_secret,
            key_pair,
        });
        path_secret = next;
    }
    Ok((nodes, CommitSecret::from(path_secret)))
}

/// The encrypted path secret and the public key of one node on the path.
///
/// ```text
/// struct {
///     HPKEPublicKey encryption_key;
///     HPKECiphertext encrypted_path_secret<V>;
/// } UpdatePathNode;
/// ```
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct UpdatePathNode {
    pub(crate) encryption_key: EncryptionKey,
    pub(crate) encrypted_path_secrets: Vec<HpkeCiphertext>,
}

impl UpdatePathNode {
    /// The new public key of the node.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    /// One ciphertext per node in the resolution of the co-path child.
    pub fn encrypted_path_secrets(&self) -> &[HpkeCiphertext] {
        &self.encrypted_path_secrets
    }
}

/// The new leaf node of a committer and the nodes of its filtered direct
/// path.
///
/// ```text
/// struct {
///     LeafNode leaf_node;
///     UpdatePathNode nodes<V>;
/// } UpdatePath;
/// ```
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct UpdatePath {
    leaf_node: LeafNode,
    nodes: Vec<UpdatePathNode>,
}

impl UpdatePath {
    pub(crate) fn new(leaf_node: LeafNode, nodes: Vec<UpdatePathNode>) -> Self {
        Self { leaf_node, nodes }
    }

    /// The committer's new leaf node.
    pub fn leaf_node(&self) -> &LeafNode {
        &self.leaf_node
    }

    /// The path nodes, from the leaf upwards.
    pub fn nodes(&self) -> &[UpdatePathNode] {
        &self.nodes
    }

    /// The public keys of the path nodes.
    pub(crate) fn encryption_keys(&self) -> Vec<EncryptionKey> {
        self.nodes
            .iter()
            .map(|node| node.encryption_key.clone())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<UpdatePathNode> {
        &mut self.nodes
    }
}

impl RatchetTree {
    /// Encrypt the path secrets of `path` to the resolutions of the co-path
    /// of `sender`. Leaves in `exclusion` (the members added by the commit)
    /// get their secret through the welcome instead.
    pub(crate) fn encrypt_path(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        sender: LeafNodeIndex,
        path: &[PlainUpdatePathNode],
        group_context: &[u8],
        exclusion: &[LeafNodeIndex],
    ) -> Result<Vec<UpdatePathNode>, TreeSyncError> {
        let mut nodes = Vec::with_capacity(path.len());
        for plain in path {
            let copath_child = Self::copath_child(plain.parent_index, sender);
            let mut encrypted_path_secrets = vec![];
            for node in self.resolution(copath_child, exclusion) {
                let public_key = self
                    .encryption_key(node)
                    .ok_or_else(|| LibraryError::custom("resolution contains a blank node"))?;
                encrypted_path_secrets.push(plain.path_secret.encrypt(
                    crypto,
                    ciphersuite,
                    public_key,
                    group_context,
                )?);
            }
            nodes.push(UpdatePathNode {
                encryption_key: plain.key_pair.public_key().clone(),
                encrypted_path_secrets,
            });
        }
        Ok(nodes)
    }

    /// Decrypt the path secret addressed to this member and derive the rest
    /// of the path from it. Applying the path does not touch the co-path of
    /// `sender`, so this works on the tree before or after `apply_path`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn decrypt_path(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        sender: LeafNodeIndex,
        update_path: &UpdatePath,
        private_tree: &PrivateTree,
        exclusion: &[LeafNodeIndex],
        group_context: &[u8],
    ) -> Result<(Vec<PlainUpdatePathNode>, CommitSecret), TreeSyncError> {
        let filtered_direct_path = self.filtered_direct_path(sender);
        if filtered_direct_path.len() != update_path.nodes.len() {
            return Err(TreeSyncError::PathLengthMismatch);
        }
        let own_leaf = private_tree.own_leaf_index();
        let position = filtered_direct_path
            .iter()
            .position(|parent| is_descendant(TreeNodeIndex::Parent(*parent), own_leaf))
            .ok_or_else(|| LibraryError::custom("own leaf is not below the sender's path"))?;

        let copath_child = Self::copath_child(filtered_direct_path[position], sender);
        let resolution = self.resolution(copath_child, exclusion);
        let ciphertexts = &update_path.nodes[position].encrypted_path_secrets;
        if ciphertexts.len() != resolution.len() {
            return Err(TreeSyncError::ResolutionLengthMismatch);
        }
        let (ciphertext, private_key) = resolution
            .iter()
            .zip(ciphertexts.iter())
            .find_map(|(node, ciphertext)| {
                private_tree
                    .private_key(*node, self)
                    .map(|private_key| (ciphertext, private_key))
            })
            .ok_or(TreeSyncError::NoMatchingPrivateKey)?;

        let path_secret =
            PathSecret::decrypt(crypto, ciphersuite, ciphertext, private_key, group_context)?;
        let (nodes, commit_secret) = derive_path(
            crypto,
            ciphersuite,
            path_secret,
            &filtered_direct_path[position..],
        )?;

        for (derived, received) in nodes.iter().zip(&update_path.nodes[position..]) {
            if derived.key_pair.public_key() != &received.encryption_key {
                return Err(TreeSyncError::PathMismatch);
            }
        }
        Ok((nodes, commit_secret))
    }

    /// Derive the path from the path secret a new member received in the
    /// welcome and check the keys against the tree.
    pub(crate) fn derive_path_from_welcome(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        committer: LeafNodeIndex,
        own_leaf: LeafNodeIndex,
        path_secret: PathSecret,
    ) -> Result<Vec<PlainUpdatePathNode>, TreeSyncError> {
        let filtered_direct_path = self.filtered_direct_path(committer);
        let position = filtered_direct_path
            .iter()
            .position(|parent| is_descendant(TreeNodeIndex::Parent(*parent), own_leaf))
            .ok_or_else(|| LibraryError::custom("own leaf is not below the committer's path"))?;
        let (nodes, _) = derive_path(
            crypto,
            ciphersuite,
            path_secret,
            &filtered_direct_path[position..],
        )?;
        for node in nodes.iter() {
            if self.parent(node.parent_index).map(|parent| parent.encryption_key())
                != Some(node.key_pair.public_key())
            {
                return Err(TreeSyncError::PathMismatch);
            }
        }
        Ok(nodes)
    }
}
