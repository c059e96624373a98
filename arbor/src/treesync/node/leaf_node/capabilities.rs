use arbor_traits::types::{Ciphersuite, VerifiableCiphersuite};
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::{
    credentials::CredentialType,
    extensions::{ExtensionType, Extensions, RequiredCapabilitiesExtension},
    messages::proposals::ProposalType,
    treesync::errors::LeafNodeValidationError,
    versions::ProtocolVersion,
};

const DEFAULT_VERSIONS: &[ProtocolVersion] = &[ProtocolVersion::Mls10];

const DEFAULT_CIPHERSUITES: &[Ciphersuite] = &[
    Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519,
    Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256,
    Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519,
];

const DEFAULT_CREDENTIALS: &[CredentialType] = &[CredentialType::Basic];

/// What a member's client can handle.
///
/// Extension and proposal types defined by the protocol itself are always
/// supported and need not be listed.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct Capabilities {
    versions: Vec<ProtocolVersion>,
    ciphersuites: Vec<VerifiableCiphersuite>,
    extensions: Vec<ExtensionType>,
    proposals: Vec<ProposalType>,
    credentials: Vec<CredentialType>,
}

impl Capabilities {
    /// Lists left as `None` get the defaults: version 1.0, the X25519 and
    /// P-256 suites with AES-128-GCM plus X25519 with ChaCha20Poly1305, no
    /// extra extensions or proposals, and basic credentials.
    pub fn new(
        versions: Option<&[ProtocolVersion]>,
        ciphersuites: Option<&[Ciphersuite]>,
        extensions: Option<&[ExtensionType]>,
        proposals: Option<&[ProposalType]>,
        credentials: Option<&[CredentialType]>,
    ) -> Self {
        Self {
            versions: versions.unwrap_or(DEFAULT_VERSIONS).to_vec(),
            ciphersuites: ciphersuites
                .unwrap_or(DEFAULT_CIPHERSUITES)
                .iter()
                .copied()
                .map(VerifiableCiphersuite::from)
                .collect(),
            extensions: extensions.unwrap_or_default().to_vec(),
            proposals: proposals.unwrap_or_default().to_vec(),
            credentials: credentials.unwrap_or(DEFAULT_CREDENTIALS).to_vec(),
        }
    }

    pub fn versions(&self) -> &[ProtocolVersion] {
        &self.versions
    }

    pub fn ciphersuites(&self) -> &[VerifiableCiphersuite] {
        &self.ciphersuites
    }

    pub fn extensions(&self) -> &[ExtensionType] {
        &self.extensions
    }

    pub fn proposals(&self) -> &[ProposalType] {
        &self.proposals
    }

    pub fn credentials(&self) -> &[CredentialType] {
        &self.credentials
    }

    pub(crate) fn supports_extension_type(&self, extension_type: ExtensionType) -> bool {
        extension_type.is_default() || self.extensions.contains(&extension_type)
    }

    pub(crate) fn supports_proposal_type(&self, proposal_type: ProposalType) -> bool {
        proposal_type.is_default() || self.proposals.contains(&proposal_type)
    }

    pub(crate) fn supports_credential_type(&self, credential_type: CredentialType) -> bool {
        self.credentials.contains(&credential_type)
    }

    pub(crate) fn supports_ciphersuite(&self, ciphersuite: Ciphersuite) -> bool {
        self.ciphersuites.contains(&ciphersuite.into())
    }

    pub(crate) fn supports_version(&self, version: ProtocolVersion) -> bool {
        self.versions.contains(&version)
    }

    /// Whether every extension in `extensions` is of a supported type.
    pub(crate) fn contains_extensions(&self, extensions: &Extensions) -> bool {
        extensions
            .iter()
            .all(|extension| self.supports_extension_type(extension.extension_type()))
    }

    /// Checks the group's required capabilities against these, extensions
    /// first, then proposals, then credentials.
    pub(crate) fn supports_required_capabilities(
        &self,
        required: &RequiredCapabilitiesExtension,
    ) -> Result<(), LeafNodeValidationError> {
        fn first_missing<T: Copy + std::fmt::Debug>(
            required: &[T],
            supported: impl Fn(T) -> bool,
            error: LeafNodeValidationError,
        ) -> Result<(), LeafNodeValidationError> {
            match required.iter().copied().find(|item| !supported(*item)) {
                Some(missing) => {
                    log::debug!("{missing:?} is required by the group but not supported");
                    Err(error)
                }
                None => Ok(()),
            }
        }

        first_missing(
            required.extension_types(),
            |t| self.supports_extension_type(t),
            LeafNodeValidationError::UnsupportedExtensions,
        )?;
        first_missing(
            required.proposal_types(),
            |t| self.supports_proposal_type(t),
            LeafNodeValidationError::UnsupportedProposals,
        )?;
        first_missing(
            required.credential_types(),
            |t| self.supports_credential_type(t),
            LeafNodeValidationError::UnsupportedCredentials,
        )
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Capabilities::new(None, None, None, None, None)
    }
}
