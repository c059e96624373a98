//! # Ciphersuites
//!
//! Thin wrappers around the provider's primitives that add the labels and
//! encodings the protocol requires: `ExpandWithLabel`, `DeriveSecret`,
//! `SignWithLabel`, `EncryptWithLabel`, `RefHash` and the MAC.

use arbor_traits::crypto::ArborCrypto;
pub use arbor_traits::types::{Ciphersuite, CryptoError, HpkeCiphertext, SignatureScheme};

mod aead;
mod hpke;
mod kdf_label;
mod mac;
mod reuse_guard;
mod secret;
mod signature;

// Public
pub mod hash_ref;
pub mod signable;

// Crate
pub(crate) use aead::*;
pub(crate) use hpke::*;
pub use hpke::HpkePublicKey;
pub(crate) use mac::*;
pub(crate) use reuse_guard::*;
pub(crate) use secret::Secret;
pub use secret::{ConsumedSecret, ConsumedSecrets};
pub use signature::*;

#[cfg(test)]
mod tests;

/// Prefix of every label used in key derivation, signing and encryption.
pub(crate) const LABEL_PREFIX: &str = "MLS 1.0 ";

/// The default NONCE size in bytes.
pub(crate) const NONCE_BYTES: usize = 12;

/// Re-use guard size.
pub(crate) const REUSE_GUARD_BYTES: usize = 4;

/// Compare two byte slices in constant time.
pub(crate) fn equal_ct(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for i in 0..a.len() {
        diff |= a[i] ^ b[i];
    }
    diff == 0
}

/// Hash `data` with the hash function of the ciphersuite.
pub(crate) fn hash(
    crypto: &impl ArborCrypto,
    ciphersuite: Ciphersuite,
    data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    crypto.hash(ciphersuite.hash_algorithm(), data)
}
