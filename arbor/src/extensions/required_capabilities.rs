use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use super::ExtensionType;
use crate::{credentials::CredentialType, messages::proposals::ProposalType};

/// Extension, proposal and credential types every member of the group has
/// to support, on top of the group's version and ciphersuite.
///
/// Lives in the group context. New members are checked against it when
/// they are added, existing members when it changes.
#[derive(
    PartialEq, Eq, Clone, Debug, Default, Serialize, Deserialize, TlsSerialize, TlsDeserialize,
    TlsSize,
)]
pub struct RequiredCapabilitiesExtension {
    extension_types: Vec<ExtensionType>,
    proposal_types: Vec<ProposalType>,
    credential_types: Vec<CredentialType>,
}

impl RequiredCapabilitiesExtension {
    /// Creates a new [`RequiredCapabilitiesExtension`] from extension, proposal
    /// and credential types.
    pub fn new(
        extension_types: &[ExtensionType],
        proposal_types: &[ProposalType],
        credential_types: &[CredentialType],
    ) -> Self {
        Self {
            extension_types: extension_types.into(),
            proposal_types: proposal_types.into(),
            credential_types: credential_types.into(),
        }
    }

    /// Get a slice with the required extension types.
    pub fn extension_types(&self) -> &[ExtensionType] {
        self.extension_types.as_slice()
    }

    /// Get a slice with the required proposal types.
    pub fn proposal_types(&self) -> &[ProposalType] {
        self.proposal_types.as_slice()
    }

    /// Get a slice with the required credential types.
    pub fn credential_types(&self) -> &[CredentialType] {
        self.credential_types.as_slice()
    }
}
