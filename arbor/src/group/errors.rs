//! # Group errors
//!
//! `ProposalValidationError` is returned when a set of proposals cannot be
//! committed, `WelcomeError` when a welcome cannot be processed. Both are
//! folded into [`ArborError`](crate::error::ArborError) at the public API.

use arbor_traits::types::{Ciphersuite, CryptoError};
use thiserror::Error;

use crate::{error::LibraryError, treesync::errors::LeafNodeValidationError};

/// Welcome error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum WelcomeError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// Part of the welcome could not be decoded.
    #[error("Part of the welcome could not be decoded: {0}")]
    CodecError(tls_codec::Error),
    /// See [`CryptoError`] for more details.
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
    /// The ciphersuite of the welcome is not supported by the provider.
    #[error("The ciphersuite {0} is not supported by the provider.")]
    UnsupportedCiphersuite(Ciphersuite),
    /// The ciphersuites of the welcome and the key package do not match.
    #[error("The ciphersuites of the welcome and the key package do not match.")]
    CiphersuiteMismatch,
    /// The welcome has no group secrets for this key package.
    #[error("The welcome has no group secrets for this key package.")]
    JoinerSecretNotFound,
    /// The group info could not be decrypted.
    #[error("The group info could not be decrypted.")]
    UnableToDecryptGroupInfo,
    /// The group info signature does not verify.
    #[error("The group info signature does not verify.")]
    InvalidGroupInfoSignature,
    /// The signer of the group info is not a member.
    #[error("The signer of the group info is not a member.")]
    UnknownSigner,
    /// The confirmation tag of the group info does not match the one computed
    /// from the group secrets.
    #[error("The confirmation tag does not match the one computed from the group secrets.")]
    ConfirmationTagMismatch,
    /// The tree hash of the ratchet tree does not match the group context.
    #[error("The tree hash of the ratchet tree does not match the group context.")]
    TreeHashMismatch,
    /// The path secret does not match the public keys in the tree.
    #[error("The path secret does not match the public keys in the tree.")]
    PathSecretMismatch,
    /// The group uses a protocol version this client does not support.
    #[error("The group uses a protocol version this client does not support.")]
    UnsupportedMlsVersion,
    /// The key package of this client does not support the capabilities the
    /// group requires.
    #[error("The key package does not support the capabilities the group requires.")]
    UnsupportedCapability,
}

/// Proposal validation error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ProposalValidationError {
    /// An update or remove refers to a leaf that is not a member.
    #[error("An update or remove refers to a leaf that is not a member.")]
    UnknownMember,
    /// Two proposals would add the same signature key.
    #[error("Two proposals would add the same signature key.")]
    DuplicateSignatureKey,
    /// Two proposals would add the same encryption key.
    #[error("Two proposals would add the same encryption key.")]
    DuplicateEncryptionKey,
    /// Two add proposals carry the same init key.
    #[error("Two add proposals carry the same init key.")]
    DuplicateInitKey,
    /// The same member is removed twice.
    #[error("The same member is removed twice.")]
    DuplicateMemberRemoval,
    /// A remove proposal targets a blank leaf.
    #[error("A remove proposal targets a blank leaf.")]
    UnknownMemberRemoval,
    /// A member is both updated and removed, or updated twice.
    #[error("A member is both updated and removed, or updated twice.")]
    ConflictingUpdate,
    /// An update proposal was not sent by a member.
    #[error("An update proposal was not sent by a member.")]
    UpdateFromNonMember,
    /// The committer included an update proposal for its own leaf.
    #[error("The committer included an update proposal for its own leaf.")]
    CommitterIncludedOwnUpdate,
    /// The committer included a proposal removing itself.
    #[error("The committer included a proposal removing itself.")]
    CommitterRemovedSelf,
    /// The key package of an add does not support the capabilities the
    /// group requires.
    #[error("The key package of an add does not support the required capabilities.")]
    InsufficientCapabilities,
    /// The key package of an add uses another ciphersuite or version than
    /// the group.
    #[error("The key package of an add uses another ciphersuite or version than the group.")]
    InvalidAddProposalCiphersuiteOrVersion,
    /// A member does not support a proposal type used in the commit.
    #[error("A member does not support a proposal type used in the commit.")]
    UnsupportedProposalType,
    /// A member does not support an extension of the new group context.
    #[error("A member does not support an extension of the new group context.")]
    UnsupportedGroupContextExtensions,
    /// More than one group context extensions proposal.
    #[error("More than one group context extensions proposal.")]
    MultipleGroupContextExtensions,
    /// A reinit proposal is committed together with other proposals.
    #[error("A reinit proposal is committed together with other proposals.")]
    ReInitNotExclusive,
    /// An external init proposal in a regular commit.
    #[error("An external init proposal in a regular commit.")]
    ExternalInitProposalInRegularCommit,
    /// An external commit without exactly one external init proposal.
    #[error("An external commit needs exactly one external init proposal.")]
    InvalidExternalInit,
    /// An external commit with proposals other than external init, PSK or
    /// a single remove of the joiner's old leaf.
    #[error("An external commit contains invalid proposals.")]
    InvalidExternalCommitProposals,
    /// A proposal type that may only be sent by value was sent by reference.
    #[error("A proposal type that may only be sent by value was sent by reference.")]
    ProposalByReference,
    /// The sender type is not allowed to send this proposal.
    #[error("The sender type is not allowed to send this proposal.")]
    InvalidSenderType,
    /// See [`LeafNodeValidationError`] for more details.
    #[error(transparent)]
    LeafNodeValidation(#[from] LeafNodeValidationError),
}
