//! Proposals received or sent between two commits, and the ordered list of
//! proposals a commit covers.

use std::collections::BTreeMap;

use arbor_traits::{crypto::ArborCrypto, types::Ciphersuite};
use serde::{Deserialize, Serialize};
use tls_codec::Serialize as TlsSerializeTrait;

use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::hash_ref::ProposalRef,
    error::{ArborError, LibraryError, ValidationError},
    framing::{AuthenticatedContent, FramedContentBody, Sender},
    group::errors::ProposalValidationError,
    messages::proposals::{proposal_ref, Proposal, ProposalOrRef},
    utils::vector_converter,
};

/// Whether a proposal reached a commit by value or by reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum ProposalOrRefType {
    Proposal,
    Reference,
}

/// A proposal together with its sender and reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedProposal {
    proposal: Proposal,
    proposal_ref: ProposalRef,
    sender: Sender,
    proposal_or_ref_type: ProposalOrRefType,
}

impl QueuedProposal {
    /// Queue the proposal carried in `authenticated_content`. The reference is
    /// the hash of the encoded authenticated content.
    pub(crate) fn from_authenticated_content(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        authenticated_content: &AuthenticatedContent,
    ) -> Result<Self, LibraryError> {
        let proposal = match authenticated_content.content().body() {
            FramedContentBody::Proposal(proposal) => proposal.clone(),
            _ => return Err(LibraryError::custom("Wrong content type")),
        };
        let encoded = authenticated_content
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        let proposal_ref = proposal_ref(crypto, ciphersuite, &encoded)?;
        Ok(Self {
            proposal,
            proposal_ref,
            sender: *authenticated_content.sender(),
            proposal_or_ref_type: ProposalOrRefType::Reference,
        })
    }

    /// Queue a proposal that is committed by value. Its reference is the hash
    /// of the encoded proposal.
    pub(crate) fn from_proposal_and_sender(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        proposal: Proposal,
        sender: &Sender,
    ) -> Result<Self, LibraryError> {
        let encoded = proposal
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        let proposal_ref = proposal_ref(crypto, ciphersuite, &encoded)?;
        Ok(Self {
            proposal,
            proposal_ref,
            sender: *sender,
            proposal_or_ref_type: ProposalOrRefType::Proposal,
        })
    }

    /// Returns the proposal.
    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    /// Returns the proposal reference.
    pub fn proposal_ref(&self) -> &ProposalRef {
        &self.proposal_ref
    }

    /// Returns the sender.
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// The leaf index of the sender if the sender is a member.
    pub fn sender_leaf_index(&self) -> Option<LeafNodeIndex> {
        self.sender.as_member()
    }

    pub(crate) fn proposal_or_ref_type(&self) -> ProposalOrRefType {
        self.proposal_or_ref_type
    }
}

/// The proposals of the current epoch that were not yet committed, keyed by
/// their reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnappliedProposals {
    #[serde(with = "vector_converter")]
    proposals: BTreeMap<ProposalRef, QueuedProposal>,
}

impl UnappliedProposals {
    pub(crate) fn add(&mut self, queued_proposal: QueuedProposal) {
        self.proposals
            .insert(queued_proposal.proposal_ref.clone(), queued_proposal);
    }

    pub(crate) fn remove(&mut self, proposal_ref: &ProposalRef) -> Option<QueuedProposal> {
        self.proposals.remove(proposal_ref)
    }

    pub(crate) fn clear(&mut self) {
        self.proposals.clear();
    }

    /// Look up a proposal by reference.
    pub fn get(&self, proposal_ref: &ProposalRef) -> Option<&QueuedProposal> {
        self.proposals.get(proposal_ref)
    }

    /// All unapplied proposals, ordered by reference.
    pub fn iter(&self) -> impl Iterator<Item = &QueuedProposal> {
        self.proposals.values()
    }

    /// Number of unapplied proposals.
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    /// Returns `true` if there are no unapplied proposals.
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    /// The references of all unapplied proposals in ascending order.
    pub(crate) fn refs(&self) -> Vec<ProposalRef> {
        self.proposals.keys().cloned().collect()
    }
}

/// The proposals covered by one commit, in the order they appear in it.
#[derive(Debug, Default, Clone)]
pub(crate) struct ProposalQueue {
    queued_proposals: Vec<QueuedProposal>,
}

impl ProposalQueue {
    /// Resolve the proposals of a received commit. References are looked up
    /// in `unapplied`.
    pub(crate) fn from_committed_proposals(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        committed_proposals: &[ProposalOrRef],
        unapplied: &UnappliedProposals,
        committer: &Sender,
    ) -> Result<Self, ArborError> {
        let mut queue = ProposalQueue::default();
        for proposal_or_ref in committed_proposals {
            let queued_proposal = match proposal_or_ref {
                ProposalOrRef::Proposal(proposal) => QueuedProposal::from_proposal_and_sender(
                    crypto,
                    ciphersuite,
                    proposal.clone(),
                    committer,
                )?,
                ProposalOrRef::Reference(reference) => {
                    let queued_proposal = unapplied.get(reference).ok_or_else(|| {
                        log::debug!("Commit references unknown proposal {reference}");
                        ValidationError::MissingProposal
                    })?;
                    if queued_proposal.proposal.proposal_type().is_by_value_only() {
                        return Err(ProposalValidationError::ProposalByReference.into());
                    }
                    queued_proposal.clone()
                }
            };
            queue.queued_proposals.push(queued_proposal);
        }
        Ok(queue)
    }

    pub(crate) fn add(&mut self, queued_proposal: QueuedProposal) {
        self.queued_proposals.push(queued_proposal);
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &QueuedProposal> {
        self.queued_proposals.iter()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queued_proposals.is_empty()
    }

    /// Whether a commit covering these proposals must carry an update path.
    /// An empty commit needs one.
    pub(crate) fn path_required(&self) -> bool {
        self.queued_proposals.is_empty()
            || self
                .queued_proposals
                .iter()
                .any(|queued| queued.proposal.is_path_required())
    }

    /// The entries of the commit: proposals from the store by reference,
    /// proposals passed along with the commit by value.
    pub(crate) fn proposals_or_refs(&self) -> Vec<ProposalOrRef> {
        self.queued_proposals
            .iter()
            .map(|queued| match queued.proposal_or_ref_type {
                ProposalOrRefType::Proposal => ProposalOrRef::Proposal(queued.proposal.clone()),
                ProposalOrRefType::Reference => {
                    ProposalOrRef::Reference(queued.proposal_ref.clone())
                }
            })
            .collect()
    }
}
