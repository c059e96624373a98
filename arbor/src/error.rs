//! # Arbor Errors
//!
//! Each module has its own error type. Everything that crosses the public API
//! is folded into [`ArborError`], which sorts failures into five categories:
//!
//! * [`ErrorKind::Codec`]: the input could not be decoded.
//! * [`ErrorKind::Validation`]: the input decoded but violates a protocol rule.
//! * [`ErrorKind::Crypto`]: a decryption, signature or key operation failed.
//! * [`ErrorKind::Usage`]: the caller asked for something the state does not allow.
//! * [`ErrorKind::Dependency`]: the injected provider lacks a required capability.
//!
//! [`LibraryError`] is kept apart. It signals a bug in this crate or in the
//! provider, never bad input.

use arbor_traits::types::{Ciphersuite, CryptoError};
use thiserror::Error;
use tls_codec::Error as TlsCodecError;

use crate::{
    ciphersuite::signable::SignatureError,
    extensions::errors::ExtensionError,
    framing::errors::{MessageDecryptionError, MessageEncryptionError},
    group::errors::{ProposalValidationError, WelcomeError},
    key_packages::errors::{KeyPackageNewError, KeyPackageVerifyError},
    schedule::errors::{KeyScheduleError, PskError},
    tree::secret_tree::SecretTreeError,
    treesync::errors::TreeSyncError,
};

/// Generic error type that indicates unrecoverable errors in the library.
///
/// **MissingBoundsCheck**
///
/// Serializing data that is too big for the wire structs. This should not
/// happen when all input values are checked.
///
/// **CryptoError**
///
/// The provider returned an error where none was expected, e.g. deriving a
/// key pair from a freshly derived secret.
///
/// **Custom**
///
/// Returned in situations where the implementation would otherwise use an
/// `unwrap()`. The string gives context about where the error originated.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum LibraryError {
    #[error(transparent)]
    MissingBoundsCheck(#[from] TlsCodecError),
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
    #[error("Custom library error: {0}")]
    Custom(&'static str),
}

impl LibraryError {
    /// A custom error (typically to avoid an unwrap).
    pub(crate) fn custom(s: &'static str) -> Self {
        #[cfg(test)]
        log::error!("Library error: {s}");

        Self::Custom(s)
    }

    /// A bounds check was missed before serializing.
    pub(crate) fn missing_bound_check(e: TlsCodecError) -> Self {
        log::debug!("Missing bounds check {e:?}");
        Self::MissingBoundsCheck(e)
    }

    /// The provider failed unexpectedly.
    pub(crate) fn unexpected_crypto_error(e: CryptoError) -> Self {
        log::debug!("Unexpected crypto error {e:?}");
        Self::CryptoError(e)
    }
}

/// The five error categories plus library bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Codec,
    Validation,
    Crypto,
    Usage,
    Dependency,
    Library,
}

/// Any error returned by the public API.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ArborError {
    /// The input is not a valid encoding.
    #[error("Codec error: {0:?}")]
    Codec(TlsCodecError),
    /// The input violates a protocol rule.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    /// A cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(CryptoError),
    /// The operation is not allowed in the current state.
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),
    /// The provider does not support what was asked of it.
    #[error("Dependency error: {0}")]
    Dependency(#[from] DependencyError),
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl ArborError {
    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArborError::Codec(_) => ErrorKind::Codec,
            ArborError::Validation(_) => ErrorKind::Validation,
            ArborError::Crypto(_) => ErrorKind::Crypto,
            ArborError::Usage(_) => ErrorKind::Usage,
            ArborError::Dependency(_) => ErrorKind::Dependency,
            ArborError::Library(_) => ErrorKind::Library,
        }
    }
}

impl From<TlsCodecError> for ArborError {
    fn from(e: TlsCodecError) -> Self {
        ArborError::Codec(e)
    }
}

impl From<CryptoError> for ArborError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::UnsupportedCiphersuite
            | CryptoError::UnsupportedSignatureScheme
            | CryptoError::UnsupportedAeadAlgorithm
            | CryptoError::UnsupportedKdf
            | CryptoError::UnsupportedHashAlgorithm
            | CryptoError::InsufficientRandomness => {
                ArborError::Dependency(DependencyError::Provider(e))
            }
            _ => ArborError::Crypto(e),
        }
    }
}

impl From<SignatureError> for ArborError {
    fn from(e: SignatureError) -> Self {
        match e {
            SignatureError::VerificationError => ArborError::Crypto(CryptoError::InvalidSignature),
            SignatureError::SigningError => ArborError::Crypto(CryptoError::SigningError),
            SignatureError::UnsupportedSignatureScheme => {
                ArborError::Dependency(DependencyError::Provider(
                    CryptoError::UnsupportedSignatureScheme,
                ))
            }
            SignatureError::LibraryError(e) => ArborError::Library(e),
        }
    }
}

impl From<SecretTreeError> for ArborError {
    fn from(e: SecretTreeError) -> Self {
        match e {
            SecretTreeError::CryptoError(e) => e.into(),
            SecretTreeError::LibraryError(e) => ArborError::Library(e),
            e => ArborError::Validation(ValidationError::SecretTree(e)),
        }
    }
}

impl From<TreeSyncError> for ArborError {
    fn from(e: TreeSyncError) -> Self {
        match e {
            TreeSyncError::CryptoError(e) => e.into(),
            TreeSyncError::LibraryError(e) => ArborError::Library(e),
            TreeSyncError::SignatureError(e) => e.into(),
            e => ArborError::Validation(ValidationError::TreeSync(e)),
        }
    }
}

impl From<PskError> for ArborError {
    fn from(e: PskError) -> Self {
        match e {
            PskError::CryptoError(e) => e.into(),
            PskError::LibraryError(e) => ArborError::Library(e),
            e => ArborError::Validation(ValidationError::Psk(e)),
        }
    }
}

impl From<ExtensionError> for ArborError {
    fn from(e: ExtensionError) -> Self {
        match e {
            ExtensionError::ReservedExtensionType(t) => {
                ArborError::Usage(UsageError::ReservedExtensionType(t))
            }
            ExtensionError::CodecError(e) => ArborError::Codec(e),
            e => ArborError::Validation(ValidationError::Extension(e)),
        }
    }
}

impl From<KeyPackageVerifyError> for ArborError {
    fn from(e: KeyPackageVerifyError) -> Self {
        match e {
            KeyPackageVerifyError::InvalidSignature | KeyPackageVerifyError::InvalidLeafNodeSignature => {
                ArborError::Crypto(CryptoError::InvalidSignature)
            }
            KeyPackageVerifyError::LibraryError(e) => ArborError::Library(e),
            e => ArborError::Validation(ValidationError::KeyPackage(e)),
        }
    }
}

impl From<MessageDecryptionError> for ArborError {
    fn from(e: MessageDecryptionError) -> Self {
        match e {
            MessageDecryptionError::AeadError => ArborError::Crypto(CryptoError::AeadDecryptionError),
            MessageDecryptionError::SecretTreeError(e) => e.into(),
            MessageDecryptionError::CodecError(e) => ArborError::Codec(e),
            MessageDecryptionError::LibraryError(e) => ArborError::Library(e),
            e => ArborError::Validation(ValidationError::MessageDecryption(e)),
        }
    }
}

impl From<WelcomeError> for ArborError {
    fn from(e: WelcomeError) -> Self {
        match e {
            WelcomeError::LibraryError(e) => ArborError::Library(e),
            WelcomeError::CodecError(e) => ArborError::Codec(e),
            WelcomeError::CryptoError(e) => e.into(),
            WelcomeError::UnsupportedCiphersuite(c) => {
                ArborError::Dependency(DependencyError::UnsupportedCiphersuite(c))
            }
            e => ArborError::Validation(ValidationError::Welcome(e)),
        }
    }
}

impl From<MessageEncryptionError> for ArborError {
    fn from(e: MessageEncryptionError) -> Self {
        match e {
            MessageEncryptionError::LibraryError(e) => ArborError::Library(e),
            MessageEncryptionError::SenderNotAMember => {
                ArborError::Usage(UsageError::RemovedFromGroup)
            }
            MessageEncryptionError::PayloadTooLarge => {
                ArborError::Usage(UsageError::PayloadTooLarge)
            }
            MessageEncryptionError::SecretTreeError(e) => e.into(),
        }
    }
}

impl From<KeyScheduleError> for ArborError {
    fn from(e: KeyScheduleError) -> Self {
        match e {
            KeyScheduleError::LibraryError(e) => ArborError::Library(e),
            KeyScheduleError::CryptoError(e) => e.into(),
            KeyScheduleError::InvalidState(_) => {
                ArborError::Library(LibraryError::custom("Key schedule in wrong state"))
            }
        }
    }
}

impl From<KeyPackageNewError> for ArborError {
    fn from(e: KeyPackageNewError) -> Self {
        match e {
            KeyPackageNewError::LibraryError(e) => ArborError::Library(e),
            KeyPackageNewError::UnsupportedCiphersuite(c) => {
                ArborError::Dependency(DependencyError::UnsupportedCiphersuite(c))
            }
            KeyPackageNewError::CiphersuiteSignatureSchemeMismatch => {
                ArborError::Usage(UsageError::CiphersuiteSignatureSchemeMismatch)
            }
            KeyPackageNewError::CryptoError(e) => e.into(),
            KeyPackageNewError::SignatureError(e) => e.into(),
            KeyPackageNewError::ExtensionError(e) => e.into(),
        }
    }
}

impl From<ProposalValidationError> for ArborError {
    fn from(e: ProposalValidationError) -> Self {
        ArborError::Validation(ValidationError::Proposal(e))
    }
}

/// Protocol rules violated by an input.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ValidationError {
    /// The message belongs to a different group.
    #[error("The message belongs to a different group.")]
    WrongGroupId,
    /// The message was sent in a different epoch.
    #[error("The message was sent in a different epoch.")]
    WrongEpoch,
    /// The wire format of the message is not allowed by the policy.
    #[error("The wire format of the message is not allowed by the policy.")]
    IncompatibleWireFormat,
    /// Application messages have to be encrypted.
    #[error("Application messages have to be encrypted.")]
    UnencryptedApplicationMessage,
    /// The membership tag is missing or does not verify.
    #[error("The membership tag is missing or does not verify.")]
    InvalidMembershipTag,
    /// The confirmation tag is missing.
    #[error("The confirmation tag is missing.")]
    MissingConfirmationTag,
    /// The confirmation tag does not match the one computed locally.
    #[error("The confirmation tag does not match the one computed locally.")]
    ConfirmationTagMismatch,
    /// The sender is not a member of the group.
    #[error("The sender is not a member of the group.")]
    UnknownMember,
    /// This kind of sender is not supported for this content.
    #[error("This kind of sender is not supported for this content.")]
    UnsupportedSender,
    /// Messages sent by this client cannot be processed by it.
    #[error("Messages sent by this client cannot be processed by it.")]
    CannotProcessOwnMessage,
    /// A commit references a proposal that is not known.
    #[error("A commit references a proposal that is not known.")]
    MissingProposal,
    /// The commit needs a path but has none.
    #[error("The commit needs a path but has none.")]
    MissingUpdatePath,
    /// The authentication service rejected a credential.
    #[error("The authentication service rejected a credential.")]
    InvalidCredential,
    /// The group info has no external public key.
    #[error("The group info has no external public key.")]
    MissingExternalPub,
    /// The signer of the group info is not in the tree.
    #[error("The signer of the group info is not in the tree.")]
    UnknownGroupInfoSigner,
    /// See [`ProposalValidationError`] for more details.
    #[error(transparent)]
    Proposal(ProposalValidationError),
    /// See [`TreeSyncError`] for more details.
    #[error(transparent)]
    TreeSync(TreeSyncError),
    /// See [`SecretTreeError`] for more details.
    #[error(transparent)]
    SecretTree(SecretTreeError),
    /// See [`PskError`] for more details.
    #[error(transparent)]
    Psk(PskError),
    /// See [`ExtensionError`] for more details.
    #[error(transparent)]
    Extension(ExtensionError),
    /// See [`KeyPackageVerifyError`] for more details.
    #[error(transparent)]
    KeyPackage(KeyPackageVerifyError),
    /// See [`MessageDecryptionError`] for more details.
    #[error(transparent)]
    MessageDecryption(MessageDecryptionError),
    /// See [`WelcomeError`] for more details.
    #[error(transparent)]
    Welcome(WelcomeError),
}

/// Operations the caller asked for that the state does not allow.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum UsageError {
    /// This client has been removed from the group.
    #[error("This client has been removed from the group.")]
    RemovedFromGroup,
    /// The group is suspended by a pending reinitialization.
    #[error("The group is suspended by a pending reinitialization.")]
    PendingReinit,
    /// Extension types 1 to 5 are reserved for the known extensions.
    #[error("Extension type {0} is reserved.")]
    ReservedExtensionType(u16),
    /// Only public and private messages can be processed.
    #[error("Only public and private messages can be processed.")]
    UnexpectedMessageType,
    /// No leaf in the tree matches the key package of this client.
    #[error("No leaf in the tree matches the key package of this client.")]
    OwnLeafNotFound,
    /// Neither a ratchet tree nor a ratchet tree extension was provided.
    #[error("Neither a ratchet tree nor a ratchet tree extension was provided.")]
    MissingRatchetTree,
    /// The requested exporter length is too large.
    #[error("The requested exporter length is too large.")]
    ExporterLengthTooLarge,
    /// The plaintext is too large to be sent.
    #[error("The plaintext is too large to be sent.")]
    PayloadTooLarge,
    /// The signer's signature scheme does not belong to the ciphersuite.
    #[error("The signer's signature scheme does not belong to the ciphersuite.")]
    CiphersuiteSignatureSchemeMismatch,
    /// The proposal reference is not known.
    #[error("The proposal reference is not known.")]
    UnknownProposal,
}

/// A required capability is missing from the provider.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum DependencyError {
    /// The provider does not support the ciphersuite.
    #[error("The provider does not support the ciphersuite {0}.")]
    UnsupportedCiphersuite(Ciphersuite),
    /// The provider does not support an algorithm or failed to produce randomness.
    #[error("The provider failed: {0}")]
    Provider(CryptoError),
}
