//! # Hash references
//!
//! Key packages and proposals are named by a labeled hash of their
//! encoding: `Hash(label<V> || value<V>)` with the suite's hash function.

use arbor_traits::crypto::ArborCrypto;
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, TlsDeserialize, TlsSerialize, TlsSize, VLByteSlice, VLBytes};

use super::{Ciphersuite, CryptoError};

/// A labeled hash naming a key package or a proposal.
#[derive(
    Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TlsSerialize,
    TlsDeserialize, TlsSize,
)]
pub struct HashReference(VLBytes);

pub type KeyPackageRef = HashReference;

pub type ProposalRef = HashReference;

#[derive(TlsSerialize, TlsSize)]
struct RefHashInput<'a> {
    label: VLByteSlice<'a>,
    value: VLByteSlice<'a>,
}

/// The reference of a proposal, from the encoded authenticated content that
/// carried it.
pub(crate) fn make_proposal_ref(
    value: &[u8],
    ciphersuite: Ciphersuite,
    crypto: &impl ArborCrypto,
) -> Result<ProposalRef, CryptoError> {
    HashReference::labeled(b"MLS 1.0 Proposal Reference", value, ciphersuite, crypto)
}

/// The reference of an encoded key package.
pub(crate) fn make_key_package_ref(
    value: &[u8],
    ciphersuite: Ciphersuite,
    crypto: &impl ArborCrypto,
) -> Result<KeyPackageRef, CryptoError> {
    HashReference::labeled(b"MLS 1.0 KeyPackage Reference", value, ciphersuite, crypto)
}

impl HashReference {
    fn labeled(
        label: &[u8],
        value: &[u8],
        ciphersuite: Ciphersuite,
        crypto: &impl ArborCrypto,
    ) -> Result<Self, CryptoError> {
        let input = RefHashInput {
            label: VLByteSlice(label),
            value: VLByteSlice(value),
        }
        .tls_serialize_detached()
        .map_err(|_| CryptoError::TlsSerializationError)?;
        crypto
            .hash(ciphersuite.hash_algorithm(), &input)
            .map(|digest| Self(digest.into()))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        Self(slice.into())
    }
}

impl std::fmt::Display for HashReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_slice()
            .iter()
            .try_for_each(|byte| write!(f, "{byte:02x}"))
    }
}

impl std::fmt::Debug for HashReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HashReference({self})")
    }
}
