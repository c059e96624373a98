//! The group context: the state every member agrees on in an epoch.

use arbor_traits::types::Ciphersuite;
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use super::{GroupEpoch, GroupId};
use crate::{
    extensions::{Extensions, RequiredCapabilitiesExtension},
    versions::ProtocolVersion,
};

/// Everything a member's view of an epoch is summarized by. Its encoding
/// goes into the key schedule, so two members with equal contexts derive
/// equal secrets.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct GroupContext {
    protocol_version: ProtocolVersion,
    ciphersuite: Ciphersuite,
    group_id: GroupId,
    epoch: GroupEpoch,
    tree_hash: VLBytes,
    confirmed_transcript_hash: VLBytes,
    extensions: Extensions,
}

impl GroupContext {
    /// Epoch 0 of a new group. There is no transcript yet.
    pub(crate) fn initial(
        ciphersuite: Ciphersuite,
        group_id: GroupId,
        tree_hash: Vec<u8>,
        extensions: Extensions,
    ) -> Self {
        Self {
            protocol_version: ProtocolVersion::Mls10,
            ciphersuite,
            group_id,
            epoch: GroupEpoch::default(),
            tree_hash: tree_hash.into(),
            confirmed_transcript_hash: VLBytes::new(Vec::new()),
            extensions,
        }
    }

    /// The next epoch's context with the new tree hash and extensions. The
    /// confirmed transcript hash still is the current one and has to be
    /// replaced once the commit is framed.
    pub(crate) fn provisional(&self, tree_hash: Vec<u8>, extensions: Extensions) -> Self {
        let mut next = Self {
            tree_hash: tree_hash.into(),
            extensions,
            ..self.clone()
        };
        next.epoch.increment();
        next
    }

    pub(crate) fn set_confirmed_transcript_hash(&mut self, confirmed_transcript_hash: Vec<u8>) {
        self.confirmed_transcript_hash = confirmed_transcript_hash.into();
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    pub fn ciphersuite(&self) -> Ciphersuite {
        self.ciphersuite
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }

    pub fn tree_hash(&self) -> &[u8] {
        self.tree_hash.as_slice()
    }

    pub fn confirmed_transcript_hash(&self) -> &[u8] {
        self.confirmed_transcript_hash.as_slice()
    }

    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Shorthand for the required capabilities extension, if the group has
    /// one.
    pub fn required_capabilities(&self) -> Option<&RequiredCapabilitiesExtension> {
        self.extensions.required_capabilities()
    }
}
