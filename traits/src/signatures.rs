//! Signing capability.
//!
//! Private signature keys never enter the core. Callers hand in a [`Signer`]
//! for every operation that produces a signature.

use crate::types::SignatureScheme;

/// Errors a [`Signer`] can return.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerError {
    #[error("The signer could not produce a signature.")]
    SigningError,
    #[error("The signer does not hold a usable private key.")]
    InvalidSignature,
    #[error("The signer does not support the signature scheme.")]
    UnsupportedSignatureScheme,
}

/// Sign the provided payload and return a signature.
pub trait Signer {
    /// Sign the provided payload.
    ///
    /// Returns a signature on success or an Error.
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignerError>;

    /// The [`SignatureScheme`] of this signer.
    fn signature_scheme(&self) -> SignatureScheme;
}
