//! Joining a group with an external commit.
//!
//! The joiner needs a group info carrying the external public key of the
//! epoch. It derives the init secret from an HPKE export against that key,
//! sends the KEM output in an `ExternalInit` proposal and adds itself at the
//! leftmost free leaf through the commit's path.

use std::collections::BTreeMap;

use arbor_traits::{signatures::Signer, ArborProvider};

use super::{
    apply_proposals::validate_proposals,
    commit::{stage_own_commit, CommitInput},
    config::ClientConfig,
    errors::ProposalValidationError,
    proposal_store::{ProposalQueue, QueuedProposal},
    state::{check_ciphersuite, ClientState, NextEpoch},
    transcript::update_interim_transcript_hash,
};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::ConsumedSecrets,
    credentials::CredentialWithKey,
    error::{ArborError, LibraryError, UsageError, ValidationError},
    extensions::Extensions,
    framing::{MlsMessageOut, PublicMessage, Sender, WireFormat},
    messages::{
        group_info::GroupInfo,
        proposals::{ExternalInitProposal, Proposal},
    },
    schedule::{
        psk::{PreSharedKeyId, ResumptionPskStore},
        InitSecret,
    },
    treesync::{
        errors::TreeSyncError, node::leaf_node::LeafNodeParams, private_tree::PrivateTree,
        RatchetTree, RatchetTreeIn,
    },
};

/// Optional parts of an external commit.
#[derive(Debug, Clone, Default)]
pub struct ExternalCommitOptions {
    /// The joiner's own old leaf, removed by the commit when rejoining.
    pub resync_leaf: Option<LeafNodeIndex>,
    /// External pre-shared keys to inject, with their secrets.
    pub psks: Vec<(PreSharedKeyId, Vec<u8>)>,
    pub authenticated_data: Vec<u8>,
}

impl ClientState {
    /// Join the group described by `group_info` with an external commit.
    ///
    /// Returns the state of the new epoch and the commit, which has to be
    /// delivered to the members. The commit is always a public message.
    #[allow(clippy::too_many_arguments)]
    pub fn join_by_external_commit<Provider: ArborProvider>(
        provider: &Provider,
        signer: &impl Signer,
        config: ClientConfig,
        group_info: GroupInfo,
        ratchet_tree: Option<RatchetTreeIn>,
        credential_with_key: CredentialWithKey,
        options: ExternalCommitOptions,
    ) -> Result<(Self, MlsMessageOut), ArborError> {
        let crypto = provider.crypto();
        let ciphersuite = group_info.ciphersuite();
        check_ciphersuite(crypto, ciphersuite, signer)?;
        let group_context = group_info.group_context();

        let tree_in = match ratchet_tree {
            Some(tree_in) => tree_in,
            None => group_info
                .extensions()
                .ratchet_tree()
                .map(|extension| extension.ratchet_tree().clone())
                .ok_or(UsageError::MissingRatchetTree)?,
        };
        let tree = RatchetTree::from_ratchet_tree_in(tree_in)?;
        tree.validate(
            crypto,
            ciphersuite,
            group_context.group_id(),
            config.authentication_service(),
        )?;
        if tree.tree_hash(crypto, ciphersuite)? != group_context.tree_hash() {
            return Err(TreeSyncError::TreeHashMismatch.into());
        }
        let signer_leaf = tree
            .leaf(group_info.signer())
            .ok_or(ValidationError::UnknownGroupInfoSigner)?;
        group_info.verify(crypto, signer_leaf.signature_key())?;

        let external_pub = group_info
            .extensions()
            .external_pub()
            .ok_or(ValidationError::MissingExternalPub)?;
        let (init_secret, kem_output) = InitSecret::from_external_pub(
            crypto,
            ciphersuite,
            external_pub.external_pub().as_slice(),
        )?;

        let sender = Sender::NewMemberCommit;
        let mut queue = ProposalQueue::default();
        queue.add(QueuedProposal::from_proposal_and_sender(
            crypto,
            ciphersuite,
            Proposal::ExternalInit(ExternalInitProposal::from(kem_output)),
            &sender,
        )?);
        if let Some(resync_leaf) = options.resync_leaf {
            queue.add(QueuedProposal::from_proposal_and_sender(
                crypto,
                ciphersuite,
                Proposal::remove(resync_leaf),
                &sender,
            )?);
        }
        let mut external_psks = BTreeMap::new();
        for (psk_id, secret) in options.psks {
            if let crate::schedule::psk::Psk::External(external_psk) = psk_id.psk() {
                external_psks.insert(external_psk.psk_id().to_vec(), secret);
            }
            queue.add(QueuedProposal::from_proposal_and_sender(
                crypto,
                ciphersuite,
                Proposal::pre_shared_key(psk_id),
                &sender,
            )?);
        }
        validate_proposals(
            crypto,
            &queue,
            &tree,
            group_context,
            &sender,
            config.authentication_service(),
        )?;

        let leaf_params = LeafNodeParams {
            credential_with_key,
            capabilities: config.leaf_capabilities().clone(),
            extensions: Extensions::empty(),
        };
        if let Some(required_capabilities) = group_context.required_capabilities() {
            leaf_params
                .capabilities
                .supports_required_capabilities(required_capabilities)
                .map_err(|_| ProposalValidationError::InsufficientCapabilities)?;
        }

        let interim_transcript_hash = update_interim_transcript_hash(
            crypto,
            ciphersuite,
            group_context.confirmed_transcript_hash(),
            group_info.confirmation_tag(),
        )?;
        let no_resumption_psks = ResumptionPskStore::new(0);
        let mut consumed = ConsumedSecrets::default();
        let staged = stage_own_commit(
            provider,
            signer,
            CommitInput {
                group_context,
                tree: &tree,
                interim_transcript_hash: &interim_transcript_hash,
                init_secret: &init_secret,
                external_psks: &external_psks,
                resumption_psk_store: &no_resumption_psks,
                sender,
                wire_format: WireFormat::PublicMessage,
                queue,
                force_path: true,
                leaf_params,
                authenticated_data: &options.authenticated_data,
            },
            &mut consumed,
        )?;

        // New members have no membership key yet, the message is not tagged.
        let commit = MlsMessageOut::from(PublicMessage::from(staged.authenticated_content));
        let leaf_key = staged
            .leaf_key
            .ok_or_else(|| LibraryError::custom("external commit without a leaf key"))?;
        let mut private_tree = PrivateTree::new(staged.own_leaf, leaf_key);
        for path_secret in private_tree.set_path_keys(staged.plain_path) {
            consumed.push(path_secret.into_secret());
        }
        log::debug!(
            "Joined group {:x?} at leaf {:?} with an external commit",
            staged.group_context.group_id().as_slice(),
            staged.own_leaf
        );

        let state = ClientState::from_next_epoch(
            NextEpoch {
                group_context: staged.group_context,
                tree: staged.tree,
                private_tree,
                epoch_secrets: staged.epoch_secrets,
                encryption_secret: staged.encryption_secret,
                interim_transcript_hash: staged.interim_transcript_hash,
                confirmation_tag: staged.confirmation_tag,
                reinit: None,
            },
            ResumptionPskStore::new(config.max_resumption_psks()),
            external_psks,
            config,
        );
        Ok((state, commit))
    }
}
