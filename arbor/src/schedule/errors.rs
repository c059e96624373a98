//! Errors of the key schedule and of PSK handling.

use arbor_traits::types::CryptoError;
use thiserror::Error;

use crate::{
    error::LibraryError,
    schedule::psk::{PreSharedKeyId, ResumptionPskUsage},
};

/// Failures while resolving or combining pre-shared keys.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum PskError {
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
    /// The PSK count does not fit the `u16` of the PSK label.
    #[error("A commit can reference at most 65535 PSKs.")]
    TooManyKeys,
    /// Neither the external store nor the resumption store holds the PSK.
    #[error("No secret is known for a referenced PSK.")]
    KeyNotFound,
    #[error("Resumption PSK usage {got:?} is not one of {allowed:?}.")]
    UsageMismatch {
        allowed: Vec<ResumptionPskUsage>,
        got: ResumptionPskUsage,
    },
    /// The nonce must be as long as the suite's hash output.
    #[error("PSK nonce has {got} bytes where {expected} are required.")]
    NonceLengthMismatch { expected: usize, got: usize },
    #[error("The PSK {first:?} is referenced more than once.")]
    Duplicate { first: PreSharedKeyId },
}

/// The key schedule stage an operation required.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum ErrorState {
    #[error("Only valid before the group context is added.")]
    Init,
    #[error("Only valid once the group context is added and the epoch secrets are still pending.")]
    Context,
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum KeyScheduleError {
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    /// An operation was called out of order.
    #[error(transparent)]
    InvalidState(#[from] ErrorState),
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
}
