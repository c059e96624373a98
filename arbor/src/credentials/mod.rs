//! # Credentials
//!
//! A [`Credential`] binds an identity to a signature key. The core treats the
//! content as opaque; whether a credential is acceptable is decided by the
//! application through an [`AuthenticationService`].
//!
//! ```text
//! struct {
//!     CredentialType credential_type;
//!     select (Credential.credential_type) {
//!         case basic:
//!             opaque identity<V>;
//!         case x509:
//!             Certificate certificates<V>;
//!     };
//! } Credential;
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use crate::ciphersuite::SignaturePublicKey;

#[cfg(test)]
mod tests;

/// Errors when converting credentials.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum CredentialError {
    /// The credential is not of the requested type.
    #[error("The credential is not of the requested type.")]
    UnexpectedCredentialType,
}

/// ```text
/// enum {
///     reserved(0),
///     basic(1),
///     x509(2),
///     (65535)
/// } CredentialType;
/// ```
///
/// Unknown values are kept as [`CredentialType::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CredentialType {
    /// A basic credential.
    Basic,
    /// An X.509 certificate chain.
    X509,
    /// Any other credential type.
    Other(u16),
}

impl From<u16> for CredentialType {
    fn from(value: u16) -> Self {
        match value {
            1 => CredentialType::Basic,
            2 => CredentialType::X509,
            other => CredentialType::Other(other),
        }
    }
}

impl From<CredentialType> for u16 {
    fn from(value: CredentialType) -> Self {
        match value {
            CredentialType::Basic => 1,
            CredentialType::X509 => 2,
            CredentialType::Other(other) => other,
        }
    }
}

impl tls_codec::Size for CredentialType {
    fn tls_serialized_len(&self) -> usize {
        2
    }
}

impl tls_codec::Serialize for CredentialType {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        tls_codec::Serialize::tls_serialize(&u16::from(*self), writer)
    }
}

impl tls_codec::Deserialize for CredentialType {
    fn tls_deserialize<R: std::io::Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        let value = <u16 as tls_codec::Deserialize>::tls_deserialize(bytes)?;
        Ok(value.into())
    }
}

/// A credential with its type and its encoded content.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct Credential {
    credential_type: CredentialType,
    serialized_content: VLBytes,
}

impl Credential {
    /// Create a credential of any type from its content.
    pub fn new(credential_type: CredentialType, serialized_content: Vec<u8>) -> Self {
        Self {
            credential_type,
            serialized_content: serialized_content.into(),
        }
    }

    /// The type of the credential.
    pub fn credential_type(&self) -> CredentialType {
        self.credential_type
    }

    /// The encoded content of the credential.
    pub fn serialized_content(&self) -> &[u8] {
        self.serialized_content.as_slice()
    }
}

/// A basic credential: an identity and nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicCredential {
    identity: VLBytes,
}

impl BasicCredential {
    /// Create a new basic credential for an identity.
    pub fn new(identity: Vec<u8>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    /// The identity of the credential.
    pub fn identity(&self) -> &[u8] {
        self.identity.as_slice()
    }
}

impl From<BasicCredential> for Credential {
    fn from(basic: BasicCredential) -> Self {
        Credential {
            credential_type: CredentialType::Basic,
            serialized_content: basic.identity,
        }
    }
}

impl TryFrom<Credential> for BasicCredential {
    type Error = CredentialError;

    fn try_from(credential: Credential) -> Result<Self, Self::Error> {
        match credential.credential_type {
            CredentialType::Basic => Ok(BasicCredential {
                identity: credential.serialized_content,
            }),
            _ => Err(CredentialError::UnexpectedCredentialType),
        }
    }
}

/// A credential together with the signature key it binds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialWithKey {
    pub credential: Credential,
    pub signature_key: SignaturePublicKey,
}

/// Decides whether a credential is acceptable for a signature key.
///
/// Called for every leaf node that enters the tree and for the signer of every
/// group info that is used to join.
pub trait AuthenticationService: Send + Sync {
    /// Returns `true` if the credential is valid for the key.
    fn validate_credential(
        &self,
        credential: &Credential,
        signature_key: &SignaturePublicKey,
    ) -> bool;
}

/// An [`AuthenticationService`] that accepts every credential.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllCredentials;

impl AuthenticationService for AcceptAllCredentials {
    fn validate_credential(&self, _: &Credential, _: &SignaturePublicKey) -> bool {
        true
    }
}
