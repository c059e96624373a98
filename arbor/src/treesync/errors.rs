//! TreeSync errors
//!
//! [`TreeSyncError`] covers everything that can go wrong while building,
//! changing or checking the public ratchet tree and while applying an update
//! path. Problems with a single leaf node are [`LeafNodeValidationError`]s.

use thiserror::Error;

use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{signable::SignatureError, CryptoError},
    error::LibraryError,
};

/// TreeSync error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum TreeSyncError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// See [`CryptoError`] for more details.
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
    /// See [`SignatureError`] for more details.
    #[error(transparent)]
    SignatureError(#[from] SignatureError),
    /// See [`LeafNodeValidationError`] for more details.
    #[error(transparent)]
    LeafNodeValidationError(#[from] LeafNodeValidationError),
    /// The leaf is blank or outside of the tree.
    #[error("The leaf {0} is blank or outside of the tree.")]
    LeafNotInTree(LeafNodeIndex),
    /// Tree is already at maximum size.
    #[error("Tree is already at maximum size.")]
    TreeFull,
    /// The tree is malformed.
    #[error("The tree is malformed: {0}")]
    MalformedTree(&'static str),
    /// A parent node cannot be chained back to a leaf with parent hashes.
    #[error("A parent hash was invalid.")]
    InvalidParentHash,
    /// The tree hash does not match the one in the group context.
    #[error("The tree hash does not match the one in the group context.")]
    TreeHashMismatch,
    /// The parent hash of the committer's new leaf node is invalid.
    #[error("The parent hash of the committer's new leaf node is invalid.")]
    ParentHashMismatch,
    /// The length of the received update path and that of the sender's
    /// filtered direct path do not match.
    #[error(
        "The length of the received update path and that of the sender's filtered direct path do not match."
    )]
    PathLengthMismatch,
    /// The number of encrypted path secrets does not match the resolution.
    #[error("The number of encrypted path secrets does not match the resolution.")]
    ResolutionLengthMismatch,
    /// The received update path and the derived nodes are not identical.
    #[error("The received update path and the derived nodes are not identical.")]
    PathMismatch,
    /// No private key is available to decrypt the path secret.
    #[error("No private key is available to decrypt the path secret.")]
    NoMatchingPrivateKey,
    /// Two leaves share an encryption key.
    #[error("Two nodes share an encryption key.")]
    DuplicateEncryptionKey,
    /// Two leaves share a signature key.
    #[error("Two leaves share a signature key.")]
    DuplicateSignatureKey,
}

/// Leaf node validation error
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum LeafNodeValidationError {
    /// The leaf node source is not the one expected in this context.
    #[error("The leaf node source is not the one expected in this context.")]
    InvalidLeafNodeSource,
    /// The lifetime of the leaf node is not valid.
    #[error("The lifetime of the leaf node is not valid.")]
    InvalidLifetime,
    /// An extension is not supported.
    #[error("An extension is not supported by the leaf node.")]
    UnsupportedExtensions,
    /// A proposal type is not supported.
    #[error("A proposal type is not supported by the leaf node.")]
    UnsupportedProposals,
    /// A credential type is not supported.
    #[error("A credential type is not supported by the leaf node.")]
    UnsupportedCredentials,
    /// The protocol version is not supported.
    #[error("The protocol version is not supported by the leaf node.")]
    UnsupportedVersion,
    /// The ciphersuite is not supported.
    #[error("The ciphersuite is not supported by the leaf node.")]
    UnsupportedCiphersuite,
    /// The authentication service rejected the credential.
    #[error("The authentication service rejected the credential.")]
    InvalidCredential,
    /// The updated leaf changes the member's signature key.
    #[error("The credential of an update does not match the existing member.")]
    CredentialMismatch,
}
