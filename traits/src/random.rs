//! # Randomness Source
//!
//! The [`ArborRand`] trait defines the functionality required by the core to
//! source randomness.

pub trait ArborRand {
    type Error: std::error::Error + std::fmt::Debug;

    /// Fill an array with random bytes.
    fn random_array<const N: usize>(&self) -> Result<[u8; N], Self::Error>;

    /// Fill a vector of length `len` with bytes.
    fn random_vec(&self, len: usize) -> Result<Vec<u8>, Self::Error>;
}
