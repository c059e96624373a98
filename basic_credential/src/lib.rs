//! # Basic Credential
//!
//! Signature key pairs backing the basic credential, which binds a member
//! identity to nothing more than a signature public key.
//!
//! Ed25519 and ECDSA P-256 keys are generated and used through RustCrypto.

use std::fmt::Debug;

use arbor_traits::{
    signatures::{Signer, SignerError},
    types::{CryptoError, SignatureScheme},
};
use p256::ecdsa::{signature::Signer as _, Signature as EcdsaSignature, SigningKey as EcdsaKey};
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A private signing key with its public half.
///
/// The private key is wiped when the pair is dropped and is redacted from
/// the `Debug` output.
#[derive(serde::Serialize, serde::Deserialize, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "clonable", derive(Clone))]
pub struct SignatureKeyPair {
    private: Vec<u8>,
    #[zeroize(skip)]
    public: Vec<u8>,
    #[zeroize(skip)]
    signature_scheme: SignatureScheme,
}

impl SignatureKeyPair {
    /// Draws a fresh key pair for `signature_scheme` from the OS rng.
    ///
    /// Only [`SignatureScheme::ED25519`] and
    /// [`SignatureScheme::ECDSA_SECP256R1_SHA256`] are available.
    pub fn new(signature_scheme: SignatureScheme) -> Result<Self, CryptoError> {
        let (private, public): (Vec<u8>, Vec<u8>) = match signature_scheme {
            SignatureScheme::ED25519 => {
                let key = ed25519_dalek::SigningKey::generate(&mut OsRng);
                (
                    key.to_bytes().to_vec(),
                    key.verifying_key().as_bytes().to_vec(),
                )
            }
            SignatureScheme::ECDSA_SECP256R1_SHA256 => {
                let key = EcdsaKey::random(&mut OsRng);
                // Uncompressed SEC1 encoding.
                let public = key.verifying_key().to_encoded_point(false);
                (key.to_bytes().to_vec(), public.as_bytes().to_vec())
            }
            _ => return Err(CryptoError::UnsupportedSignatureScheme),
        };
        Ok(Self {
            private,
            public,
            signature_scheme,
        })
    }

    pub fn public(&self) -> &[u8] {
        &self.public
    }

    pub fn to_public_vec(&self) -> Vec<u8> {
        self.public.clone()
    }

    pub fn signature_scheme(&self) -> SignatureScheme {
        self.signature_scheme
    }
}

impl Debug for SignatureKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureKeyPair")
            .field("signature_scheme", &self.signature_scheme)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl Signer for SignatureKeyPair {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignerError> {
        match self.signature_scheme {
            SignatureScheme::ED25519 => {
                let key = ed25519_dalek::SigningKey::try_from(self.private.as_slice())
                    .map_err(|_| SignerError::InvalidSignature)?;
                Ok(ed25519_dalek::Signer::sign(&key, payload).to_bytes().to_vec())
            }
            SignatureScheme::ECDSA_SECP256R1_SHA256 => {
                let key = EcdsaKey::from_slice(&self.private)
                    .map_err(|_| SignerError::InvalidSignature)?;
                let signature: EcdsaSignature = key
                    .try_sign(payload)
                    .map_err(|_| SignerError::SigningError)?;
                // Signatures travel DER encoded.
                Ok(signature.to_der().as_bytes().to_vec())
            }
            _ => Err(SignerError::UnsupportedSignatureScheme),
        }
    }

    fn signature_scheme(&self) -> SignatureScheme {
        self.signature_scheme
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_sign() {
        for (scheme, public_len) in [
            (SignatureScheme::ED25519, 32),
            (SignatureScheme::ECDSA_SECP256R1_SHA256, 65),
        ] {
            let keys = SignatureKeyPair::new(scheme).expect("key generation failed");
            assert_eq!(keys.signature_scheme(), scheme);
            assert_eq!(keys.public().len(), public_len);
            assert!(!keys.sign(b"payload").expect("signing failed").is_empty());
        }
    }

    #[test]
    fn private_key_is_redacted() {
        let keys = SignatureKeyPair::new(SignatureScheme::ED25519).expect("key generation failed");
        assert!(!format!("{keys:?}").contains("private"));
    }

    #[test]
    fn unsupported_scheme() {
        assert_eq!(
            SignatureKeyPair::new(SignatureScheme::ED448).unwrap_err(),
            CryptoError::UnsupportedSignatureScheme
        );
    }
}
