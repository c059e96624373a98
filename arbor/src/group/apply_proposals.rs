//! Validating the proposals of a commit and applying them to a copy of the
//! ratchet tree.
//!
//! Proposals are applied grouped by type: updates, removes, adds, and then
//! the proposals that only change the key schedule or the group context.
//! Removes go before adds so that adds can fill the freed leaves.

use std::collections::HashSet;

use arbor_traits::crypto::ArborCrypto;

use super::{
    errors::ProposalValidationError,
    proposal_store::{ProposalOrRefType, ProposalQueue},
    GroupContext,
};
use crate::{
    binary_tree::LeafNodeIndex,
    credentials::AuthenticationService,
    error::ArborError,
    extensions::{Extensions, RequiredCapabilitiesExtension},
    framing::Sender,
    messages::proposals::{AddProposal, Proposal, ReInitProposal},
    schedule::psk::{check_duplicates, PreSharedKeyId},
    treesync::{
        errors::{LeafNodeValidationError, TreeSyncError},
        node::leaf_node::TreePosition,
        LeafNode, LeafNodeSource, RatchetTree,
    },
};

/// What applying the proposals of a commit changed besides the tree.
#[derive(Debug, Default)]
pub(crate) struct ApplyProposalsValues {
    pub(crate) path_required: bool,
    pub(crate) self_removed: bool,
    pub(crate) invitation_list: Vec<(LeafNodeIndex, AddProposal)>,
    pub(crate) presharedkeys: Vec<PreSharedKeyId>,
    pub(crate) external_init_kem_output: Option<Vec<u8>>,
    pub(crate) extensions: Option<Extensions>,
    pub(crate) reinit: Option<ReInitProposal>,
    pub(crate) updated_leaves: Vec<LeafNodeIndex>,
}

impl ApplyProposalsValues {
    /// The leaves added by this commit. Path secrets are not encrypted to
    /// them, they get the secrets in the welcome.
    pub(crate) fn exclusion_list(&self) -> Vec<LeafNodeIndex> {
        self.invitation_list
            .iter()
            .map(|(index, _)| *index)
            .collect()
    }
}

fn duplicate_key_error(e: TreeSyncError) -> ArborError {
    match e {
        TreeSyncError::DuplicateEncryptionKey => {
            ProposalValidationError::DuplicateEncryptionKey.into()
        }
        TreeSyncError::DuplicateSignatureKey => ProposalValidationError::DuplicateSignatureKey.into(),
        e => e.into(),
    }
}

fn check_required_capabilities(
    leaf_node: &LeafNode,
    required_capabilities: Option<&RequiredCapabilitiesExtension>,
) -> Result<(), ProposalValidationError> {
    if let Some(required_capabilities) = required_capabilities {
        leaf_node
            .capabilities()
            .supports_required_capabilities(required_capabilities)
            .map_err(|e| {
                log::debug!("Leaf node lacks required capabilities: {e:?}");
                ProposalValidationError::InsufficientCapabilities
            })?;
    }
    Ok(())
}

/// Check the proposals of a commit against the current group state before
/// anything is applied.
pub(crate) fn validate_proposals(
    crypto: &impl ArborCrypto,
    queue: &ProposalQueue,
    tree: &RatchetTree,
    group_context: &GroupContext,
    committer: &Sender,
    authentication_service: &dyn AuthenticationService,
) -> Result<(), ArborError> {
    let ciphersuite = group_context.ciphersuite();
    let is_external_commit = matches!(committer, Sender::NewMemberCommit);

    let new_extensions = queue.iter().find_map(|queued| match queued.proposal() {
        Proposal::GroupContextExtensions(gce) => Some(gce.extensions()),
        _ => None,
    });
    let required_capabilities = match new_extensions {
        Some(extensions) => extensions.required_capabilities(),
        None => group_context.required_capabilities(),
    };

    let mut removed = HashSet::new();
    let mut updated = HashSet::new();
    let mut init_keys = HashSet::new();
    let mut new_leaves: Vec<&LeafNode> = Vec::new();
    let mut psk_ids = Vec::new();
    let mut proposal_types = HashSet::new();
    let mut group_context_extensions = 0;
    let mut external_inits = 0;
    let mut has_reinit = false;
    let mut count = 0;

    for queued in queue.iter() {
        count += 1;
        let proposal = queued.proposal();
        proposal_types.insert(proposal.proposal_type());
        if is_external_commit {
            if queued.proposal_or_ref_type() == ProposalOrRefType::Reference {
                log::debug!("External commits cannot commit proposals by reference.");
                return Err(ProposalValidationError::InvalidExternalCommitProposals.into());
            }
            if !matches!(
                proposal,
                Proposal::ExternalInit(_) | Proposal::Remove(_) | Proposal::PreSharedKey(_)
            ) {
                return Err(ProposalValidationError::InvalidExternalCommitProposals.into());
            }
        }

        match proposal {
            Proposal::Add(add_proposal) => {
                let key_package = add_proposal.key_package();
                if key_package.ciphersuite() != ciphersuite
                    || key_package.protocol_version() != group_context.protocol_version()
                {
                    return Err(ProposalValidationError::InvalidAddProposalCiphersuiteOrVersion.into());
                }
                key_package.validate(
                    crypto,
                    group_context.protocol_version(),
                    ciphersuite,
                    authentication_service,
                )?;
                check_required_capabilities(key_package.leaf_node(), required_capabilities)?;
                if !init_keys.insert(key_package.init_key().as_slice().to_vec()) {
                    return Err(ProposalValidationError::DuplicateInitKey.into());
                }
                tree.check_key_uniqueness(key_package.leaf_node(), None)
                    .map_err(duplicate_key_error)?;
                new_leaves.push(key_package.leaf_node());
            }
            Proposal::Update(update_proposal) => {
                let sender_index = queued
                    .sender()
                    .as_member()
                    .ok_or(ProposalValidationError::UpdateFromNonMember)?;
                if tree.leaf(sender_index).is_none() {
                    return Err(ProposalValidationError::UnknownMember.into());
                }
                if Some(sender_index) == committer.as_member() {
                    return Err(ProposalValidationError::CommitterIncludedOwnUpdate.into());
                }
                if !updated.insert(sender_index) {
                    return Err(ProposalValidationError::ConflictingUpdate.into());
                }
                let leaf_node = update_proposal.leaf_node();
                if !matches!(leaf_node.leaf_node_source(), LeafNodeSource::Update) {
                    return Err(ProposalValidationError::LeafNodeValidation(
                        LeafNodeValidationError::InvalidLeafNodeSource,
                    )
                    .into());
                }
                leaf_node.validate(
                    crypto,
                    ciphersuite,
                    Some(TreePosition::new(
                        group_context.group_id().clone(),
                        sender_index,
                    )),
                    authentication_service,
                )?;
                check_required_capabilities(leaf_node, required_capabilities)?;
                tree.check_key_uniqueness(leaf_node, Some(sender_index))
                    .map_err(duplicate_key_error)?;
                new_leaves.push(leaf_node);
            }
            Proposal::Remove(remove_proposal) => {
                let removed_index = remove_proposal.removed();
                if tree.leaf(removed_index).is_none() {
                    return Err(ProposalValidationError::UnknownMemberRemoval.into());
                }
                if Some(removed_index) == committer.as_member() {
                    return Err(ProposalValidationError::CommitterRemovedSelf.into());
                }
                if !removed.insert(removed_index) {
                    return Err(ProposalValidationError::DuplicateMemberRemoval.into());
                }
            }
            Proposal::PreSharedKey(psk_proposal) => {
                psk_proposal.psk_id().validate_in_proposal(ciphersuite)?;
                psk_ids.push(psk_proposal.psk_id().clone());
            }
            Proposal::ReInit(_) => has_reinit = true,
            Proposal::ExternalInit(_) => {
                if !is_external_commit {
                    return Err(ProposalValidationError::ExternalInitProposalInRegularCommit.into());
                }
                external_inits += 1;
            }
            Proposal::GroupContextExtensions(gce) => {
                group_context_extensions += 1;
                if group_context_extensions > 1 {
                    return Err(ProposalValidationError::MultipleGroupContextExtensions.into());
                }
                gce.extensions().check_unique()?;
                gce.extensions().validate_for_group_context()?;
            }
            Proposal::Custom(_) => {}
        }
    }

    if updated.intersection(&removed).next().is_some() {
        return Err(ProposalValidationError::ConflictingUpdate.into());
    }
    if has_reinit && count > 1 {
        return Err(ProposalValidationError::ReInitNotExclusive.into());
    }
    if is_external_commit {
        if external_inits != 1 {
            return Err(ProposalValidationError::InvalidExternalInit.into());
        }
        if removed.len() > 1 {
            return Err(ProposalValidationError::InvalidExternalCommitProposals.into());
        }
    }
    check_duplicates(&psk_ids)?;

    // Keys of the new leaves must also be unique among themselves.
    let mut encryption_keys = HashSet::new();
    let mut signature_keys = HashSet::new();
    for leaf_node in new_leaves.iter() {
        if !encryption_keys.insert(leaf_node.encryption_key()) {
            return Err(ProposalValidationError::DuplicateEncryptionKey.into());
        }
        if !signature_keys.insert(leaf_node.signature_key()) {
            return Err(ProposalValidationError::DuplicateSignatureKey.into());
        }
    }

    // Everybody in the group after the commit has to understand it.
    let remaining_members = tree
        .members()
        .filter(|(index, _)| !removed.contains(index) && !updated.contains(index))
        .map(|(_, leaf)| leaf)
        .chain(new_leaves.iter().copied());
    for leaf_node in remaining_members {
        if let Some(unsupported) = proposal_types
            .iter()
            .find(|t| !leaf_node.capabilities().supports_proposal_type(**t))
        {
            log::debug!("A member does not support proposal type {unsupported:?}");
            return Err(ProposalValidationError::UnsupportedProposalType.into());
        }
        if let Some(extensions) = new_extensions {
            if !leaf_node.capabilities().contains_extensions(extensions) {
                return Err(ProposalValidationError::UnsupportedGroupContextExtensions.into());
            }
            if let Some(required_capabilities) = extensions.required_capabilities() {
                leaf_node
                    .capabilities()
                    .supports_required_capabilities(required_capabilities)
                    .map_err(|_| ProposalValidationError::UnsupportedGroupContextExtensions)?;
            }
        }
    }
    Ok(())
}

/// Apply the proposals of a commit to `tree`. `own_leaf` is the leaf of the
/// member applying the commit, if it is a member.
pub(crate) fn apply_proposals(
    tree: &mut RatchetTree,
    queue: &ProposalQueue,
    own_leaf: Option<LeafNodeIndex>,
) -> Result<ApplyProposalsValues, ArborError> {
    log::debug!("Applying proposals");
    let mut values = ApplyProposalsValues {
        path_required: queue.path_required(),
        ..Default::default()
    };

    for queued in queue.iter() {
        if let Proposal::Update(update_proposal) = queued.proposal() {
            let sender_index = queued
                .sender()
                .as_member()
                .ok_or(ProposalValidationError::UpdateFromNonMember)?;
            tree.update_leaf(sender_index, update_proposal.leaf_node().clone())?;
            values.updated_leaves.push(sender_index);
        }
    }

    for queued in queue.iter() {
        if let Proposal::Remove(remove_proposal) = queued.proposal() {
            let removed_index = remove_proposal.removed();
            if Some(removed_index) == own_leaf {
                values.self_removed = true;
            }
            tree.remove_leaf(removed_index)?;
        }
    }

    for queued in queue.iter() {
        if let Proposal::Add(add_proposal) = queued.proposal() {
            let leaf_index = tree.add_leaf(add_proposal.key_package().leaf_node().clone())?;
            values.invitation_list.push((leaf_index, add_proposal.clone()));
        }
    }

    for queued in queue.iter() {
        match queued.proposal() {
            Proposal::PreSharedKey(psk_proposal) => {
                values.presharedkeys.push(psk_proposal.psk_id().clone())
            }
            Proposal::ReInit(reinit_proposal) => values.reinit = Some(reinit_proposal.clone()),
            Proposal::ExternalInit(external_init) => {
                values.external_init_kem_output = Some(external_init.kem_output().to_vec())
            }
            Proposal::GroupContextExtensions(gce) => {
                values.extensions = Some(gce.extensions().clone())
            }
            _ => {}
        }
    }

    Ok(values)
}

