use arbor_traits::{
    crypto::ArborCrypto,
    types::{HpkeKeyPair, HpkePrivateKey},
};
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::{
    ciphersuite::{decrypt_with_label, encrypt_with_label, Ciphersuite, CryptoError, HpkeCiphertext, HpkePublicKey},
    error::LibraryError,
};

/// The public HPKE key of a leaf or parent node.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TlsSerialize,
    TlsDeserialize, TlsSize,
)]
pub struct EncryptionKey {
    key: HpkePublicKey,
}

impl EncryptionKey {
    /// The raw key bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.key.as_slice()
    }

    /// Encrypt to this key with the `label` and `context`.
    pub(crate) fn encrypt(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        label: &str,
        context: &[u8],
        plaintext: &[u8],
    ) -> Result<HpkeCiphertext, CryptoError> {
        encrypt_with_label(self.as_slice(), label, context, plaintext, ciphersuite, crypto)
    }
}

impl From<Vec<u8>> for EncryptionKey {
    fn from(key: Vec<u8>) -> Self {
        Self { key: key.into() }
    }
}

impl From<HpkePublicKey> for EncryptionKey {
    fn from(key: HpkePublicKey) -> Self {
        Self { key }
    }
}

/// The private HPKE key of a leaf or parent node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EncryptionPrivateKey {
    key: HpkePrivateKey,
}

impl std::fmt::Debug for EncryptionPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ds = f.debug_struct("EncryptionPrivateKey");

        #[cfg(feature = "crypto-debug")]
        return ds.field("key", &self.key).finish();
        #[cfg(not(feature = "crypto-debug"))]
        ds.field("key", &"***").finish()
    }
}

impl From<HpkePrivateKey> for EncryptionPrivateKey {
    fn from(key: HpkePrivateKey) -> Self {
        Self { key }
    }
}

impl EncryptionPrivateKey {
    /// Decrypt a ciphertext addressed to this key.
    pub(crate) fn decrypt(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        label: &str,
        context: &[u8],
        ciphertext: &HpkeCiphertext,
    ) -> Result<Vec<u8>, CryptoError> {
        decrypt_with_label(&self.key, label, context, ciphertext, ciphersuite, crypto)
    }

    pub(crate) fn key(&self) -> &HpkePrivateKey {
        &self.key
    }
}

/// A public and private encryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct EncryptionKeyPair {
    public_key: EncryptionKey,
    private_key: EncryptionPrivateKey,
}

impl EncryptionKeyPair {
    /// Derive a key pair from input key material.
    pub(crate) fn derive(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        ikm: &[u8],
    ) -> Result<Self, LibraryError> {
        let key_pair = crypto
            .derive_hpke_keypair(ciphersuite.hpke_config(), ikm)
            .map_err(LibraryError::unexpected_crypto_error)?;
        Ok(key_pair.into())
    }

    /// Sample a fresh key pair.
    pub(crate) fn random(
        crypto: &impl ArborCrypto,
        rand: &impl arbor_traits::random::ArborRand,
        ciphersuite: Ciphersuite,
    ) -> Result<Self, CryptoError> {
        let ikm = rand
            .random_vec(ciphersuite.hash_length())
            .map_err(|_| CryptoError::InsufficientRandomness)?;
        let key_pair = crypto.derive_hpke_keypair(ciphersuite.hpke_config(), &ikm)?;
        Ok(key_pair.into())
    }

    pub(crate) fn public_key(&self) -> &EncryptionKey {
        &self.public_key
    }

    pub(crate) fn private_key(&self) -> &EncryptionPrivateKey {
        &self.private_key
    }

    pub(crate) fn from_raw(public_key: EncryptionKey, private_key: EncryptionPrivateKey) -> Self {
        Self {
            public_key,
            private_key,
        }
    }
}

impl From<HpkeKeyPair> for EncryptionKeyPair {
    fn from(key_pair: HpkeKeyPair) -> Self {
        Self {
            public_key: key_pair.public.into(),
            private_key: key_pair.private.into(),
        }
    }
}
