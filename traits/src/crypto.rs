//! # Crypto capability
//!
//! Every primitive the core needs: the ciphersuite's hash, HKDF, AEAD and
//! HPKE, plus signature verification. Signing stays with the
//! [`Signer`](crate::signatures::Signer) so that private signature keys never
//! pass through the provider.

use tls_codec::SecretVLBytes;

use crate::types::{
    AeadType, Ciphersuite, CryptoError, ExporterSecret, HashType, HpkeCiphertext, HpkeConfig,
    HpkeKeyPair, SignatureScheme,
};

pub trait ArborCrypto: Send + Sync {
    /// `Ok` if every primitive of `ciphersuite` is available, otherwise
    /// [`CryptoError::UnsupportedCiphersuite`].
    fn supports(&self, ciphersuite: Ciphersuite) -> Result<(), CryptoError>;

    /// HKDF-Extract with `salt` over `ikm`.
    fn hkdf_extract(
        &self,
        hash_type: HashType,
        salt: &[u8],
        ikm: &[u8],
    ) -> Result<SecretVLBytes, CryptoError>;

    /// HKDF-Expand of `prk` to `okm_len` bytes.
    fn hkdf_expand(
        &self,
        hash_type: HashType,
        prk: &[u8],
        info: &[u8],
        okm_len: usize,
    ) -> Result<SecretVLBytes, CryptoError>;

    fn hash(&self, hash_type: HashType, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Seals `plaintext` and returns the ciphertext with the tag appended.
    fn aead_encrypt(
        &self,
        alg: AeadType,
        key: &[u8],
        plaintext: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Opens a ciphertext produced by [`Self::aead_encrypt`]. A wrong key,
    /// nonce or aad yields [`CryptoError::AeadDecryptionError`].
    fn aead_decrypt(
        &self,
        alg: AeadType,
        key: &[u8],
        ciphertext: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    fn verify_signature(
        &self,
        alg: SignatureScheme,
        data: &[u8],
        public_key: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError>;

    /// Single-shot HPKE base mode encryption to `public_key`.
    fn hpke_seal(
        &self,
        config: HpkeConfig,
        public_key: &[u8],
        info: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<HpkeCiphertext, CryptoError>;

    fn hpke_open(
        &self,
        config: HpkeConfig,
        input: &HpkeCiphertext,
        private_key: &[u8],
        info: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError>;

    /// Sets up a sender context to `public_key` and exports `length` bytes
    /// from it. Returns the encapsulation together with the secret.
    fn hpke_setup_sender_and_export(
        &self,
        config: HpkeConfig,
        public_key: &[u8],
        info: &[u8],
        exporter_context: &[u8],
        length: usize,
    ) -> Result<(Vec<u8>, ExporterSecret), CryptoError>;

    /// Receiver counterpart of [`Self::hpke_setup_sender_and_export`].
    fn hpke_setup_receiver_and_export(
        &self,
        config: HpkeConfig,
        enc: &[u8],
        private_key: &[u8],
        info: &[u8],
        exporter_context: &[u8],
        length: usize,
    ) -> Result<ExporterSecret, CryptoError>;

    /// Deterministically derives a key pair from `ikm`.
    fn derive_hpke_keypair(
        &self,
        config: HpkeConfig,
        ikm: &[u8],
    ) -> Result<HpkeKeyPair, CryptoError>;
}
