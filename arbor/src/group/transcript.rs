//! The transcript hash chain.
//!
//! ```text
//! confirmed_transcript_hash_[n] =
//!     Hash(interim_transcript_hash_[n-1] || ConfirmedTranscriptHashInput_[n]);
//! interim_transcript_hash_[n] =
//!     Hash(confirmed_transcript_hash_[n] || InterimTranscriptHashInput_[n]);
//! ```
//!
//! The interim transcript hash of epoch 0 is computed from an empty confirmed
//! transcript hash and the confirmation tag of the group creation.

use arbor_traits::{crypto::ArborCrypto, types::Ciphersuite};
use tls_codec::Serialize;

use crate::{
    ciphersuite::hash, error::LibraryError, framing::AuthenticatedContent,
    messages::ConfirmationTag,
};

/// Extend `interim_transcript_hash` with a signed commit.
pub(crate) fn update_confirmed_transcript_hash(
    crypto: &impl ArborCrypto,
    ciphersuite: Ciphersuite,
    commit_content: &AuthenticatedContent,
    interim_transcript_hash: &[u8],
) -> Result<Vec<u8>, LibraryError> {
    let input = commit_content
        .confirmed_transcript_hash_input()
        .map_err(LibraryError::missing_bound_check)?;
    hash(
        crypto,
        ciphersuite,
        &[interim_transcript_hash, &input].concat(),
    )
    .map_err(LibraryError::unexpected_crypto_error)
}

/// ```text
/// struct {
///     MAC confirmation_tag;
/// } InterimTranscriptHashInput;
/// ```
pub(crate) fn update_interim_transcript_hash(
    crypto: &impl ArborCrypto,
    ciphersuite: Ciphersuite,
    confirmed_transcript_hash: &[u8],
    confirmation_tag: &ConfirmationTag,
) -> Result<Vec<u8>, LibraryError> {
    let input = confirmation_tag
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
    hash(
        crypto,
        ciphersuite,
        &[confirmed_transcript_hash, &input].concat(),
    )
    .map_err(LibraryError::unexpected_crypto_error)
}
