//! # Arbor RustCrypto Provider
//!
//! This is an implementation of the [`ArborProvider`] trait to use with
//! arbor.

use arbor_traits::ArborProvider;

mod provider;
pub use provider::*;

#[derive(Default, Debug)]
pub struct ArborRustCrypto {
    crypto: RustCrypto,
}

impl ArborProvider for ArborRustCrypto {
    type CryptoProvider = RustCrypto;
    type RandProvider = RustCrypto;

    fn crypto(&self) -> &Self::CryptoProvider {
        &self.crypto
    }

    fn rand(&self) -> &Self::RandProvider {
        &self.crypto
    }
}
