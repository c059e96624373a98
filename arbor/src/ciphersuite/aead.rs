use arbor_traits::{crypto::ArborCrypto, types::AeadType};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{Ciphersuite, CryptoError, ReuseGuard, Secret, NONCE_BYTES, REUSE_GUARD_BYTES};

/// An AEAD key. The value is zeroized on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct AeadKey {
    #[zeroize(skip)]
    aead_mode: AeadType,
    value: Vec<u8>,
}

impl std::fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ds = f.debug_struct("AeadKey");
        ds.field("aead_mode", &self.aead_mode);

        #[cfg(feature = "crypto-debug")]
        return ds.field("value", &self.value).finish();
        #[cfg(not(feature = "crypto-debug"))]
        ds.field("value", &"***").finish()
    }
}

/// An AEAD nonce. The value is zeroized on drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub(crate) struct AeadNonce {
    value: [u8; NONCE_BYTES],
}

impl AeadKey {
    /// Create an `AeadKey` from a `Secret`.
    pub(crate) fn from_secret(secret: &Secret, ciphersuite: Ciphersuite) -> Self {
        log::trace!("AeadKey::from_secret with {ciphersuite}");
        AeadKey {
            aead_mode: ciphersuite.aead_algorithm(),
            value: secret.as_slice().to_vec(),
        }
    }

    /// The raw key bytes.
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.value
    }

    /// Encrypt a payload under the AeadKey given a nonce.
    pub(crate) fn aead_seal(
        &self,
        crypto: &impl ArborCrypto,
        msg: &[u8],
        aad: &[u8],
        nonce: &AeadNonce,
    ) -> Result<Vec<u8>, CryptoError> {
        crypto.aead_encrypt(self.aead_mode, &self.value, msg, &nonce.value, aad)
    }

    /// AEAD decrypt `ciphertext` with `key`, `aad`, and `nonce`.
    pub(crate) fn aead_open(
        &self,
        crypto: &impl ArborCrypto,
        ciphertext: &[u8],
        aad: &[u8],
        nonce: &AeadNonce,
    ) -> Result<Vec<u8>, CryptoError> {
        crypto.aead_decrypt(self.aead_mode, &self.value, ciphertext, &nonce.value, aad)
    }
}

impl AeadNonce {
    /// Create an `AeadNonce` from a `Secret` of the nonce length.
    pub(crate) fn from_secret(secret: &Secret) -> Result<Self, CryptoError> {
        let value = secret
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidLength)?;
        Ok(Self { value })
    }

    /// The raw nonce bytes.
    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.value
    }

    /// Xor the first bytes of the nonce with the reuse_guard.
    pub(crate) fn xor_with_reuse_guard(&mut self, reuse_guard: &ReuseGuard) {
        log_crypto!(
            trace,
            "  XOR re-use guard {:x?}^{:x?}",
            self.value,
            reuse_guard.value
        );
        for i in 0..REUSE_GUARD_BYTES {
            self.value[i] ^= reuse_guard.value[i]
        }
        log_crypto!(trace, "    = {:x?}", self.value);
    }
}
