//! # Key Package errors
//!
//! `KeyPackageNewError` is returned when building a key package,
//! `KeyPackageVerifyError` when a received key package is validated.

use arbor_traits::types::{Ciphersuite, CryptoError};
use thiserror::Error;

use crate::{
    ciphersuite::signable::SignatureError, error::LibraryError, extensions::errors::ExtensionError,
    treesync::errors::LeafNodeValidationError,
};

/// KeyPackage verify error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum KeyPackageVerifyError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The key package signature is not valid.
    #[error("The key package signature is not valid.")]
    InvalidSignature,
    /// The leaf node signature is not valid.
    #[error("The leaf node signature is not valid.")]
    InvalidLeafNodeSignature,
    /// The leaf node source is not `key_package`.
    #[error("The leaf node source is not `key_package`.")]
    InvalidLeafNodeSourceType,
    /// The lifetime of the leaf node is not valid.
    #[error("The lifetime of the leaf node is not valid.")]
    InvalidLifetime,
    /// The init key and the encryption key are equal.
    #[error("The init key and the encryption key are equal.")]
    InitKeyEqualsEncryptionKey,
    /// The protocol version of the key package does not match the group.
    #[error("The protocol version of the key package does not match the group.")]
    ProtocolVersionMismatch,
    /// The ciphersuite of the key package does not match the group.
    #[error("The ciphersuite of the key package does not match the group.")]
    CiphersuiteMismatch,
    /// See [`LeafNodeValidationError`] for more details.
    #[error(transparent)]
    LeafNode(#[from] LeafNodeValidationError),
}

/// KeyPackage new error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum KeyPackageNewError {
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// The ciphersuite is not supported by the provider.
    #[error("The ciphersuite {0} is not supported by the provider.")]
    UnsupportedCiphersuite(Ciphersuite),
    /// The ciphersuite does not match the signature scheme of the signer.
    #[error("The ciphersuite does not match the signature scheme.")]
    CiphersuiteSignatureSchemeMismatch,
    /// See [`CryptoError`] for more details.
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
    /// See [`SignatureError`] for more details.
    #[error(transparent)]
    SignatureError(#[from] SignatureError),
    /// See [`ExtensionError`] for more details.
    #[error(transparent)]
    ExtensionError(#[from] ExtensionError),
}
