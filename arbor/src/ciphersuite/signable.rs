//! # Signing and verification
//!
//! Structs that get signed implement [`Signable`]; signed structs that get
//! verified implement [`Verifiable`]. Both provide the encoded payload and the
//! label that goes into `SignContent`.

use arbor_traits::{crypto::ArborCrypto, signatures::Signer};
use thiserror::Error;

use super::{sign_with_label, Ciphersuite, Signature, SignaturePublicKey};
use crate::error::LibraryError;

/// Signature generation and verification errors.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum SignatureError {
    /// Signature verification failed
    #[error("Signature verification failed.")]
    VerificationError,
    /// Signature generation failed
    #[error("Signature generation failed.")]
    SigningError,
    /// The signature scheme is not supported.
    #[error("The signature scheme is not supported.")]
    UnsupportedSignatureScheme,
    /// See [`LibraryError`] for more details.
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
}

/// This trait must be implemented by all structs that contain a self-signature.
pub(crate) trait SignedStruct<T> {
    /// Build a signed struct version from the payload struct.
    fn from_payload(payload: T, signature: Signature) -> Self;
}

/// The `Signable` trait is implemented by all struct that are being signed.
pub(crate) trait Signable: Sized {
    /// The type of the object once it's signed.
    type SignedOutput;

    /// Return the unsigned, serialized payload that should be signed.
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error>;

    /// Return the string label used for labeled signing.
    fn label(&self) -> &str;

    /// Sign the payload with the given `signer`.
    fn sign(self, signer: &impl Signer) -> Result<Self::SignedOutput, SignatureError>
    where
        Self::SignedOutput: SignedStruct<Self>,
    {
        let payload = self
            .unsigned_payload()
            .map_err(LibraryError::missing_bound_check)?;
        let signature = sign_with_label(signer, self.label(), &payload)?;
        Ok(Self::SignedOutput::from_payload(self, signature))
    }
}

/// The verifiable trait must be implemented by any struct that is signed with
/// a credential.
pub(crate) trait Verifiable {
    /// Return the unsigned, serialized payload that should be verified.
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error>;

    /// A reference to the signature to be verified.
    fn signature(&self) -> &Signature;

    /// Return the string label used for labeled verification.
    fn label(&self) -> &str;

    /// Verify the payload against the signature with the public key.
    fn verify(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        public_key: &SignaturePublicKey,
    ) -> Result<(), SignatureError> {
        let payload = self
            .unsigned_payload()
            .map_err(LibraryError::missing_bound_check)?;
        public_key.verify_with_label(crypto, ciphersuite, self.label(), &payload, self.signature())
    }
}
