//! # Framing errors.
//!
//! `MessageDecryptionError` is returned when a private message cannot be
//! opened, `MessageEncryptionError` when one cannot be created.

use thiserror::Error;

use crate::{error::LibraryError, tree::secret_tree::SecretTreeError};

/// Message decryption error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum MessageDecryptionError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// Couldn't find a ratcheting secret for the given sender and generation.
    #[error("Couldn't find a ratcheting secret for the given sender and generation.")]
    GenerationOutOfBound,
    /// An error occurred during AEAD decryption.
    #[error("An error occurred during AEAD decryption.")]
    AeadError,
    /// The sender data could not be decrypted.
    #[error("The sender data could not be decrypted.")]
    SenderDataDecryptionError,
    /// The content is malformed.
    #[error("The content is malformed.")]
    MalformedContent,
    /// The padding of the content contains non-zero bytes.
    #[error("The padding of the content contains non-zero bytes.")]
    NonZeroPadding,
    /// The sender of the message is not a member of the group.
    #[error("The sender of the message is not a member of the group.")]
    SenderNotAMember,
    /// See [`SecretTreeError`] for more details.
    #[error(transparent)]
    SecretTreeError(#[from] SecretTreeError),
    /// The decrypted content could not be decoded.
    #[error("The decrypted content could not be decoded: {0}")]
    CodecError(tls_codec::Error),
}

/// Message encryption error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum MessageEncryptionError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// Only members can send private messages.
    #[error("Only members can send private messages.")]
    SenderNotAMember,
    /// The content does not fit into the configured padding size.
    #[error("The content does not fit into the configured padding size.")]
    PayloadTooLarge,
    /// See [`SecretTreeError`] for more details.
    #[error(transparent)]
    SecretTreeError(#[from] SecretTreeError),
}
