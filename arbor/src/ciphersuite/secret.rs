use arbor_traits::{crypto::ArborCrypto, random::ArborRand};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{equal_ct, kdf_label::KdfLabel, Ciphersuite, CryptoError};

/// A struct to contain secrets. This is to provide better visibility into where
/// and how secrets are used and to avoid passing secrets in their raw
/// representation.
///
/// The value is zeroized when the secret is dropped.
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct Secret {
    value: Vec<u8>,
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ds = f.debug_struct("Secret");

        #[cfg(feature = "crypto-debug")]
        return ds.field("value", &self.value).finish();
        #[cfg(not(feature = "crypto-debug"))]
        ds.field("value", &"***").finish()
    }
}

impl PartialEq for Secret {
    // Constant time comparison.
    fn eq(&self, other: &Secret) -> bool {
        equal_ct(&self.value, &other.value)
    }
}

impl Eq for Secret {}

impl Secret {
    /// Randomly sample a fresh `Secret` of `hash_length` bytes.
    /// Returns a [`CryptoError`] if there is insufficient randomness.
    pub(crate) fn random(
        ciphersuite: Ciphersuite,
        rand: &impl ArborRand,
    ) -> Result<Self, CryptoError> {
        log::trace!("Creating a new random secret for {ciphersuite:?}");
        Ok(Secret {
            value: rand
                .random_vec(ciphersuite.hash_length())
                .map_err(|_| CryptoError::InsufficientRandomness)?,
        })
    }

    /// Create an all zero secret.
    pub(crate) fn zero(ciphersuite: Ciphersuite) -> Self {
        Self {
            value: vec![0u8; ciphersuite.hash_length()],
        }
    }

    /// Create a new secret from a byte slice.
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Secret {
            value: bytes.to_vec(),
        }
    }

    /// HKDF extract where `self` is `salt`.
    pub(crate) fn hkdf_extract(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        ikm: &Secret,
    ) -> Result<Self, CryptoError> {
        log::trace!("HKDF extract with {ciphersuite:?}");
        log_crypto!(trace, "  salt: {:x?}", self.value);
        log_crypto!(trace, "  ikm:  {:x?}", ikm.value);

        let prk = crypto.hkdf_extract(
            ciphersuite.hash_algorithm(),
            self.value.as_slice(),
            ikm.value.as_slice(),
        )?;
        Ok(Self::from_slice(prk.as_slice()))
    }

    /// HKDF expand where `self` is `prk`.
    pub(crate) fn hkdf_expand(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        info: &[u8],
        okm_len: usize,
    ) -> Result<Self, CryptoError> {
        let key = crypto.hkdf_expand(ciphersuite.hash_algorithm(), &self.value, info, okm_len)?;
        if key.as_slice().is_empty() {
            return Err(CryptoError::InvalidLength);
        }
        Ok(Self::from_slice(key.as_slice()))
    }

    /// Expand a `Secret` to a new `Secret` of length `length` including a
    /// `label` and a `context`.
    pub(crate) fn kdf_expand_label(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        label: &str,
        context: &[u8],
        length: usize,
    ) -> Result<Secret, CryptoError> {
        log::trace!("KDF expand with label \"{label}\" and {ciphersuite:?} with context {context:x?}");
        let info = KdfLabel::serialized_label(context, label, length)?;
        log::trace!("  serialized info: {info:x?}");
        log_crypto!(trace, "  secret: {:x?}", self.value);
        self.hkdf_expand(crypto, ciphersuite, &info, length)
    }

    /// Derive a new `Secret` from the this one by expanding it with the given
    /// `label` and an empty `context`.
    pub(crate) fn derive_secret(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        label: &str,
    ) -> Result<Secret, CryptoError> {
        log_crypto!(
            trace,
            "derive secret from {:x?} with label {} and {:?}",
            self.value,
            label,
            ciphersuite
        );
        self.kdf_expand_label(crypto, ciphersuite, label, &[], ciphersuite.hash_length())
    }

    /// Returns the inner bytes of a secret
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.value
    }

    /// Move the value out of this secret. The secret is left empty.
    pub(crate) fn consume(mut self) -> ConsumedSecret {
        ConsumedSecret {
            value: std::mem::take(&mut self.value),
        }
    }
}

/// A one-time secret that was removed from the group state by an operation.
///
/// The value is zeroized when dropped.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ConsumedSecret {
    value: Vec<u8>,
}

impl ConsumedSecret {
    /// The raw bytes of the secret.
    pub fn as_slice(&self) -> &[u8] {
        &self.value
    }
}

impl std::fmt::Debug for ConsumedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumedSecret")
            .field("len", &self.value.len())
            .finish()
    }
}

/// The one-time secrets an operation moved out of the group state.
///
/// The core never uses them again. Call [`ConsumedSecrets::zeroize`] to scrub
/// them as soon as they are no longer needed; they are scrubbed on drop
/// otherwise.
#[derive(Debug, Default)]
pub struct ConsumedSecrets {
    secrets: Vec<ConsumedSecret>,
}

impl ConsumedSecrets {
    pub(crate) fn push(&mut self, secret: Secret) {
        self.secrets.push(secret.consume());
    }

    pub(crate) fn push_bytes(&mut self, value: Vec<u8>) {
        self.secrets.push(ConsumedSecret { value });
    }

    pub(crate) fn append(&mut self, mut other: ConsumedSecrets) {
        self.secrets.append(&mut other.secrets);
    }

    /// Number of consumed secrets.
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Whether the operation consumed no secret.
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Iterate over the consumed secrets.
    pub fn iter(&self) -> impl Iterator<Item = &ConsumedSecret> {
        self.secrets.iter()
    }

    /// Overwrite all consumed secrets with zeros.
    pub fn zeroize(&mut self) {
        for secret in self.secrets.iter_mut() {
            secret.value.zeroize();
        }
    }
}
