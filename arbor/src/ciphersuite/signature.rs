//! Signatures.
//!
//! ```text
//! SignWithLabel(SignatureKey, Label, Content) =
//!     Signature.Sign(SignatureKey, SignContent)
//!
//! VerifyWithLabel(VerificationKey, Label, Content, SignatureValue) =
//!     Signature.Verify(VerificationKey, SignContent, SignatureValue)
//!
//! struct {
//!     opaque label<V> = "MLS 1.0 " + Label;
//!     opaque content<V> = Content;
//! } SignContent;
//! ```

use arbor_traits::{crypto::ArborCrypto, signatures::Signer};
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, TlsDeserialize, TlsSerialize, TlsSize, VLByteSlice, VLBytes};

use super::{signable::SignatureError, Ciphersuite, LABEL_PREFIX};
use crate::error::LibraryError;

/// A public signature key.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TlsSerialize,
    TlsDeserialize, TlsSize,
)]
pub struct SignaturePublicKey {
    value: VLBytes,
}

impl From<Vec<u8>> for SignaturePublicKey {
    fn from(value: Vec<u8>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl From<&[u8]> for SignaturePublicKey {
    fn from(value: &[u8]) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl SignaturePublicKey {
    /// The raw public key bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.value.as_slice()
    }

    /// Verify `signature` over `SignContent(label, payload)`.
    pub(crate) fn verify_with_label(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        label: &str,
        payload: &[u8],
        signature: &Signature,
    ) -> Result<(), SignatureError> {
        let content = sign_content(label, payload)?;
        crypto
            .verify_signature(
                ciphersuite.signature_algorithm(),
                &content,
                self.value.as_slice(),
                signature.value.as_slice(),
            )
            .map_err(|_| SignatureError::VerificationError)
    }
}

/// Signature.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct Signature {
    value: VLBytes,
}

impl From<Vec<u8>> for Signature {
    fn from(value: Vec<u8>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Signature {
    /// The raw signature bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.value.as_slice()
    }

    #[cfg(test)]
    pub(crate) fn modify(&mut self, value: &[u8]) {
        self.value = value.to_vec().into();
    }
}

#[derive(TlsSerialize, TlsSize)]
struct SignContent<'a> {
    label: VLBytes,
    content: VLByteSlice<'a>,
}

fn sign_content(label: &str, payload: &[u8]) -> Result<Vec<u8>, LibraryError> {
    let label = format!("{LABEL_PREFIX}{label}");
    SignContent {
        label: label.as_bytes().into(),
        content: VLByteSlice(payload),
    }
    .tls_serialize_detached()
    .map_err(LibraryError::missing_bound_check)
}

/// Sign `SignContent(label, payload)` with the signer.
pub(crate) fn sign_with_label(
    signer: &impl Signer,
    label: &str,
    payload: &[u8],
) -> Result<Signature, SignatureError> {
    let content = sign_content(label, payload)?;
    let signature = signer.sign(&content).map_err(|e| {
        log::debug!("Signing with label `{label}` failed: {e:?}");
        SignatureError::SigningError
    })?;
    Ok(Signature::from(signature))
}
