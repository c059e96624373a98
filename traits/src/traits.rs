//! # Arbor Traits
//!
//! This crate defines the capabilities the `arbor` core consumes without
//! implementing them: hashing, key derivation, AEAD, HPKE, signatures and
//! randomness. A provider bundles one implementation of each.

pub mod crypto;
pub mod random;
pub mod signatures;
pub mod types;

/// The provider trait.
///
/// Every state transition of the core takes a provider and draws all
/// cryptographic operations and randomness from it.
pub trait ArborProvider {
    type CryptoProvider: crypto::ArborCrypto;
    type RandProvider: random::ArborRand;

    /// Get the crypto provider.
    fn crypto(&self) -> &Self::CryptoProvider;

    /// Get the randomness provider.
    fn rand(&self) -> &Self::RandProvider;
}
