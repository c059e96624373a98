//! # Proposals
//!
//! A proposal is encoded as its two byte type followed by the body of that
//! type. Types outside 1 to 7 are kept as [`Proposal::Custom`] with an opaque
//! body.

use arbor_traits::{crypto::ArborCrypto, types::Ciphersuite};
use serde::{Deserialize, Serialize};
use tls_codec::{
    Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size, TlsDeserialize,
    TlsSerialize, TlsSize, VLBytes,
};

use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::hash_ref::{make_proposal_ref, ProposalRef},
    error::LibraryError,
    extensions::Extensions,
    group::GroupId,
    key_packages::KeyPackage,
    schedule::psk::PreSharedKeyId,
    treesync::LeafNode,
    versions::ProtocolVersion,
};

/// The two byte proposal type. Values this crate does not know are kept as
/// [`ProposalType::Custom`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProposalType {
    Add,
    Update,
    Remove,
    PreSharedKey,
    Reinit,
    ExternalInit,
    GroupContextExtensions,
    Custom(u16),
}

/// Code points 1 through 7, in order.
const KNOWN_PROPOSAL_TYPES: [ProposalType; 7] = [
    ProposalType::Add,
    ProposalType::Update,
    ProposalType::Remove,
    ProposalType::PreSharedKey,
    ProposalType::Reinit,
    ProposalType::ExternalInit,
    ProposalType::GroupContextExtensions,
];

impl ProposalType {
    /// Types every member handles without listing them in its capabilities.
    pub fn is_default(&self) -> bool {
        !matches!(self, ProposalType::Custom(_))
    }

    /// External init can't be committed by reference.
    pub(crate) fn is_by_value_only(&self) -> bool {
        *self == ProposalType::ExternalInit
    }
}

impl From<u16> for ProposalType {
    fn from(value: u16) -> Self {
        value
            .checked_sub(1)
            .and_then(|i| KNOWN_PROPOSAL_TYPES.get(usize::from(i)))
            .copied()
            .unwrap_or(ProposalType::Custom(value))
    }
}

impl From<ProposalType> for u16 {
    fn from(value: ProposalType) -> Self {
        match value {
            ProposalType::Custom(code) => code,
            known => KNOWN_PROPOSAL_TYPES
                .iter()
                .position(|t| *t == known)
                .map_or(0, |i| i as u16 + 1),
        }
    }
}

impl Size for ProposalType {
    fn tls_serialized_len(&self) -> usize {
        u16::from(*self).tls_serialized_len()
    }
}

impl TlsSerializeTrait for ProposalType {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        u16::from(*self).tls_serialize(writer)
    }
}

impl TlsDeserializeTrait for ProposalType {
    fn tls_deserialize<R: std::io::Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        u16::tls_deserialize(bytes).map(Self::from)
    }
}

/// A change to the group, waiting for a commit.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub enum Proposal {
    Add(AddProposal),
    Update(UpdateProposal),
    Remove(RemoveProposal),
    PreSharedKey(PreSharedKeyProposal),
    ReInit(ReInitProposal),
    ExternalInit(ExternalInitProposal),
    GroupContextExtensions(GroupContextExtensionProposal),
    Custom(CustomProposal),
}

/// Runs `$f` on the encodable body of a proposal, whichever variant it is.
macro_rules! with_body {
    ($proposal:expr, $body:ident => $f:expr) => {
        match $proposal {
            Proposal::Add($body) => $f,
            Proposal::Update($body) => $f,
            Proposal::Remove($body) => $f,
            Proposal::PreSharedKey($body) => $f,
            Proposal::ReInit($body) => $f,
            Proposal::ExternalInit($body) => $f,
            Proposal::GroupContextExtensions($body) => $f,
            Proposal::Custom(custom) => {
                let $body = &custom.payload;
                $f
            }
        }
    };
}

impl Proposal {
    pub fn proposal_type(&self) -> ProposalType {
        match self {
            Proposal::Add(_) => ProposalType::Add,
            Proposal::Update(_) => ProposalType::Update,
            Proposal::Remove(_) => ProposalType::Remove,
            Proposal::PreSharedKey(_) => ProposalType::PreSharedKey,
            Proposal::ReInit(_) => ProposalType::Reinit,
            Proposal::ExternalInit(_) => ProposalType::ExternalInit,
            Proposal::GroupContextExtensions(_) => ProposalType::GroupContextExtensions,
            Proposal::Custom(custom) => ProposalType::Custom(custom.proposal_type),
        }
    }

    /// Only commits made up of add, PSK and reinit proposals may leave out
    /// the path. Custom proposals always ask for one.
    pub(crate) fn is_path_required(&self) -> bool {
        !matches!(
            self,
            Proposal::Add(_) | Proposal::PreSharedKey(_) | Proposal::ReInit(_)
        )
    }

    pub fn add(key_package: KeyPackage) -> Self {
        Proposal::Add(AddProposal { key_package })
    }

    pub fn remove(removed: LeafNodeIndex) -> Self {
        Proposal::Remove(RemoveProposal { removed })
    }

    pub fn pre_shared_key(psk: PreSharedKeyId) -> Self {
        Proposal::PreSharedKey(PreSharedKeyProposal { psk })
    }

    /// Replaces all group context extensions with `extensions`.
    pub fn group_context_extensions(extensions: Extensions) -> Self {
        Proposal::GroupContextExtensions(GroupContextExtensionProposal { extensions })
    }
}

impl Size for Proposal {
    fn tls_serialized_len(&self) -> usize {
        self.proposal_type().tls_serialized_len() + with_body!(self, body => body.tls_serialized_len())
    }
}

impl TlsSerializeTrait for Proposal {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        let type_len = self.proposal_type().tls_serialize(writer)?;
        let body_len = with_body!(self, body => body.tls_serialize(writer))?;
        Ok(type_len + body_len)
    }
}

impl TlsDeserializeTrait for Proposal {
    fn tls_deserialize<R: std::io::Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        let proposal = match ProposalType::tls_deserialize(bytes)? {
            ProposalType::Add => Proposal::Add(AddProposal::tls_deserialize(bytes)?),
            ProposalType::Update => Proposal::Update(UpdateProposal::tls_deserialize(bytes)?),
            ProposalType::Remove => Proposal::Remove(RemoveProposal::tls_deserialize(bytes)?),
            ProposalType::PreSharedKey => {
                Proposal::PreSharedKey(PreSharedKeyProposal::tls_deserialize(bytes)?)
            }
            ProposalType::Reinit => Proposal::ReInit(ReInitProposal::tls_deserialize(bytes)?),
            ProposalType::ExternalInit => {
                Proposal::ExternalInit(ExternalInitProposal::tls_deserialize(bytes)?)
            }
            ProposalType::GroupContextExtensions => Proposal::GroupContextExtensions(
                GroupContextExtensionProposal::tls_deserialize(bytes)?,
            ),
            ProposalType::Custom(proposal_type) => Proposal::Custom(CustomProposal {
                proposal_type,
                payload: VLBytes::tls_deserialize(bytes)?,
            }),
        };
        Ok(proposal)
    }
}

/// Adds the owner of `key_package`.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct AddProposal {
    pub(crate) key_package: KeyPackage,
}

impl AddProposal {
    pub fn key_package(&self) -> &KeyPackage {
        &self.key_package
    }
}

/// Swaps the sender's leaf for `leaf_node`.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct UpdateProposal {
    pub(crate) leaf_node: LeafNode,
}

impl UpdateProposal {
    pub fn leaf_node(&self) -> &LeafNode {
        &self.leaf_node
    }
}

/// Blanks the leaf at `removed`.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct RemoveProposal {
    pub(crate) removed: LeafNodeIndex,
}

impl RemoveProposal {
    pub fn removed(&self) -> LeafNodeIndex {
        self.removed
    }
}

/// Mixes the named PSK into the next epoch's key schedule.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct PreSharedKeyProposal {
    pub(crate) psk: PreSharedKeyId,
}

impl PreSharedKeyProposal {
    pub fn psk_id(&self) -> &PreSharedKeyId {
        &self.psk
    }
}

/// Announces that the group continues as a new group with these parameters.
/// A commit carrying it has to carry nothing else.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct ReInitProposal {
    pub(crate) group_id: GroupId,
    pub(crate) version: ProtocolVersion,
    pub(crate) ciphersuite: Ciphersuite,
    pub(crate) extensions: Extensions,
}

impl ReInitProposal {
    pub fn new(
        group_id: GroupId,
        version: ProtocolVersion,
        ciphersuite: Ciphersuite,
        extensions: Extensions,
    ) -> Self {
        Self {
            group_id,
            version,
            ciphersuite,
            extensions,
        }
    }

    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    pub fn ciphersuite(&self) -> Ciphersuite {
        self.ciphersuite
    }
}

/// The KEM output an external joiner encapsulated to the group's external
/// public key.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct ExternalInitProposal {
    kem_output: VLBytes,
}

impl ExternalInitProposal {
    pub(crate) fn kem_output(&self) -> &[u8] {
        self.kem_output.as_slice()
    }
}

impl From<Vec<u8>> for ExternalInitProposal {
    fn from(kem_output: Vec<u8>) -> Self {
        Self {
            kem_output: kem_output.into(),
        }
    }
}

/// The complete new list of group context extensions.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct GroupContextExtensionProposal {
    pub(crate) extensions: Extensions,
}

impl GroupContextExtensionProposal {
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }
}

/// A proposal of a type this implementation does not interpret.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct CustomProposal {
    proposal_type: u16,
    payload: VLBytes,
}

impl CustomProposal {
    /// Create a custom proposal. The default proposal types 0 to 7 cannot be
    /// used.
    pub fn new(proposal_type: u16, payload: Vec<u8>) -> Option<Self> {
        if proposal_type <= 7 {
            return None;
        }
        Some(Self {
            proposal_type,
            payload: payload.into(),
        })
    }

    /// The proposal type.
    pub fn proposal_type(&self) -> u16 {
        self.proposal_type
    }

    /// The opaque payload.
    pub fn payload(&self) -> &[u8] {
        self.payload.as_slice()
    }
}

/// A proposal inside a commit, either inline or as the reference of a
/// proposal sent earlier in the epoch.
#[allow(clippy::large_enum_variant)]
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
#[repr(u8)]
pub enum ProposalOrRef {
    #[tls_codec(discriminant = 1)]
    Proposal(Proposal),
    #[tls_codec(discriminant = 2)]
    Reference(ProposalRef),
}

/// Compute the reference of a proposal from the encoded authenticated content
/// it was sent in.
pub(crate) fn proposal_ref(
    crypto: &impl ArborCrypto,
    ciphersuite: Ciphersuite,
    encoded_authenticated_content: &[u8],
) -> Result<ProposalRef, LibraryError> {
    make_proposal_ref(encoded_authenticated_content, ciphersuite, crypto)
        .map_err(LibraryError::unexpected_crypto_error)
}
