//! Creating commits.
//!
//! A commit covers the unapplied proposals of the epoch plus proposals passed
//! along by value. The committer applies them to a copy of the tree, derives
//! a fresh path when needed, runs the key schedule and returns the state of
//! the next epoch together with the messages for the group and the new
//! members.

use std::collections::BTreeMap;

use arbor_traits::{signatures::Signer, types::Ciphersuite, ArborProvider};
use tls_codec::Serialize as TlsSerializeTrait;

use super::{
    apply_proposals::{apply_proposals, validate_proposals, ApplyProposalsValues},
    proposal_store::{ProposalQueue, QueuedProposal},
    state::{ClientState, NextEpoch},
    transcript::{update_confirmed_transcript_hash, update_interim_transcript_hash},
    GroupContext,
};
use crate::{
    binary_tree::{lowest_common_ancestor, LeafNodeIndex},
    ciphersuite::{hash_ref::ProposalRef, signable::Signable, ConsumedSecrets},
    error::{ArborError, LibraryError, UsageError},
    extensions::{Extension, Extensions, RatchetTreeExtension},
    framing::{
        AuthenticatedContent, FramedContentBody, MlsMessageOut, PrivateMessage, PublicMessage,
        Sender, WireFormat,
    },
    messages::{
        group_info::GroupInfoTbs, proposals::Proposal, Commit, ConfirmationTag, GroupSecrets,
        Welcome,
    },
    schedule::{
        derive_epoch,
        psk::{load_psks, ResumptionPskStore},
        CommitSecret, EncryptionSecret, EpochSecrets, InitSecret, JoinerSecret, PskSecret,
        WelcomeSecret,
    },
    treesync::{
        node::{
            encryption_keys::EncryptionKeyPair,
            leaf_node::{LeafNodeParams, TreeInfoTbs, TreePosition},
        },
        treekem::{derive_path, PathSecret, PlainUpdatePathNode, UpdatePath},
        LeafNode, LeafNodeSource, RatchetTree,
    },
};

/// What to put into a commit besides the unapplied proposals.
#[derive(Debug, Clone, Default)]
pub struct CommitOptions {
    proposals: Vec<Proposal>,
    excluded_proposals: Vec<ProposalRef>,
    force_self_update: bool,
    authenticated_data: Vec<u8>,
}

impl CommitOptions {
    /// Returns a builder for [`CommitOptions`].
    pub fn builder() -> CommitOptionsBuilder {
        CommitOptionsBuilder::default()
    }

    /// Proposals committed by value.
    pub fn proposals(&self) -> &[Proposal] {
        &self.proposals
    }

    /// Unapplied proposals that are left out of the commit.
    pub fn excluded_proposals(&self) -> &[ProposalRef] {
        &self.excluded_proposals
    }

    /// Whether the commit carries a path even if none of the proposals needs
    /// one.
    pub fn force_self_update(&self) -> bool {
        self.force_self_update
    }

    /// The authenticated data of the commit message.
    pub fn authenticated_data(&self) -> &[u8] {
        &self.authenticated_data
    }
}

/// Builder for [`CommitOptions`].
#[derive(Debug, Default)]
pub struct CommitOptionsBuilder {
    options: CommitOptions,
}

impl CommitOptionsBuilder {
    /// Commit `proposal` by value.
    pub fn proposal(mut self, proposal: Proposal) -> Self {
        self.options.proposals.push(proposal);
        self
    }

    /// Commit all of `proposals` by value.
    pub fn proposals(mut self, proposals: impl IntoIterator<Item = Proposal>) -> Self {
        self.options.proposals.extend(proposals);
        self
    }

    /// Leave the unapplied proposal `proposal_ref` out of the commit.
    pub fn exclude(mut self, proposal_ref: ProposalRef) -> Self {
        self.options.excluded_proposals.push(proposal_ref);
        self
    }

    pub fn force_self_update(mut self, force_self_update: bool) -> Self {
        self.options.force_self_update = force_self_update;
        self
    }

    pub fn authenticated_data(mut self, authenticated_data: Vec<u8>) -> Self {
        self.options.authenticated_data = authenticated_data;
        self
    }

    pub fn build(self) -> CommitOptions {
        self.options
    }
}

/// The result of [`ClientState::create_commit()`].
#[derive(Debug)]
pub struct CommitOutput {
    /// The state of the new epoch.
    pub state: ClientState,
    /// The commit for the other members.
    pub commit: MlsMessageOut,
    /// The welcome for the added members, if any.
    pub welcome: Option<MlsMessageOut>,
    /// A signed group info of the new epoch.
    pub group_info: MlsMessageOut,
    /// One-time secrets used while creating the commit.
    pub consumed: ConsumedSecrets,
}

/// Everything a committer needs from the epoch it commits in.
pub(crate) struct CommitInput<'a> {
    pub(crate) group_context: &'a GroupContext,
    pub(crate) tree: &'a RatchetTree,
    pub(crate) interim_transcript_hash: &'a [u8],
    pub(crate) init_secret: &'a InitSecret,
    pub(crate) external_psks: &'a BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) resumption_psk_store: &'a ResumptionPskStore,
    pub(crate) sender: Sender,
    pub(crate) wire_format: WireFormat,
    pub(crate) queue: ProposalQueue,
    pub(crate) force_path: bool,
    pub(crate) leaf_params: LeafNodeParams,
    pub(crate) authenticated_data: &'a [u8],
}

/// A signed commit with the values of the epoch it leads to.
pub(crate) struct StagedOwnCommit {
    pub(crate) authenticated_content: AuthenticatedContent,
    pub(crate) own_leaf: LeafNodeIndex,
    pub(crate) tree: RatchetTree,
    pub(crate) group_context: GroupContext,
    pub(crate) leaf_key: Option<EncryptionKeyPair>,
    pub(crate) plain_path: Vec<PlainUpdatePathNode>,
    pub(crate) joiner_secret: JoinerSecret,
    /// Taken when the welcome is built.
    pub(crate) welcome_secret: Option<WelcomeSecret>,
    pub(crate) epoch_secrets: EpochSecrets,
    pub(crate) encryption_secret: EncryptionSecret,
    pub(crate) interim_transcript_hash: Vec<u8>,
    pub(crate) confirmation_tag: ConfirmationTag,
    pub(crate) values: ApplyProposalsValues,
}

/// The secrets of the epoch following a commit.
pub(crate) struct ScheduledEpoch {
    pub(crate) joiner_secret: JoinerSecret,
    pub(crate) welcome_secret: WelcomeSecret,
    pub(crate) epoch_secrets: EpochSecrets,
    pub(crate) encryption_secret: EncryptionSecret,
}

/// Run the key schedule for the epoch described by `group_context`, which
/// already carries the new confirmed transcript hash.
#[allow(clippy::too_many_arguments)]
pub(crate) fn schedule_epoch(
    crypto: &impl arbor_traits::crypto::ArborCrypto,
    ciphersuite: Ciphersuite,
    commit_secret: CommitSecret,
    init_secret: &InitSecret,
    values: &ApplyProposalsValues,
    external_psks: &BTreeMap<Vec<u8>, Vec<u8>>,
    resumption_psk_store: &ResumptionPskStore,
    group_context: &GroupContext,
    consumed: &mut ConsumedSecrets,
) -> Result<ScheduledEpoch, ArborError> {
    let serialized_group_context = group_context
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
    let joiner_secret = JoinerSecret::new(
        crypto,
        ciphersuite,
        commit_secret,
        init_secret,
        &serialized_group_context,
        consumed,
    )?;
    let psks = load_psks(
        &values.presharedkeys,
        external_psks,
        resumption_psk_store,
        group_context.group_id(),
    )?;
    let psk_secret = PskSecret::new(crypto, ciphersuite, &psks)?;
    let (welcome_secret, epoch_secrets, encryption_secret) = derive_epoch(
        crypto,
        ciphersuite,
        &joiner_secret,
        psk_secret,
        group_context,
        consumed,
    )?;
    Ok(ScheduledEpoch {
        joiner_secret,
        welcome_secret,
        epoch_secrets,
        encryption_secret,
    })
}

/// Apply the proposals of `input`, derive a path if one is needed, sign the
/// commit and run the key schedule. Nothing is sent and no state changes.
///
/// Without a member sender this is an external commit: the committer takes
/// the leftmost free leaf and always sends a path.
pub(crate) fn stage_own_commit<Provider: ArborProvider>(
    provider: &Provider,
    signer: &impl Signer,
    input: CommitInput<'_>,
    consumed: &mut ConsumedSecrets,
) -> Result<StagedOwnCommit, ArborError> {
    let crypto = provider.crypto();
    let ciphersuite = input.group_context.ciphersuite();
    let group_id = input.group_context.group_id();

    let mut tree = input.tree.clone();
    let member_leaf = input.sender.as_member();
    let values = apply_proposals(&mut tree, &input.queue, member_leaf)?;
    let extensions = values
        .extensions
        .clone()
        .unwrap_or_else(|| input.group_context.extensions().clone());
    let own_leaf = match member_leaf {
        Some(leaf_index) => leaf_index,
        None => tree.free_leaf_index(),
    };
    let path_required = values.path_required || input.force_path || member_leaf.is_none();

    let (path, plain_path, leaf_key, commit_secret, provisional_group_context) = if path_required {
        log::debug!("Deriving a new path for leaf {own_leaf:?}");
        let leaf_key = EncryptionKeyPair::random(crypto, provider.rand(), ciphersuite)?;
        let position = TreePosition::new(group_id.clone(), own_leaf);
        if member_leaf.is_none() {
            // Reserve the leaf so the path is computed for the final tree size.
            let placeholder = LeafNode::new_with_key(
                leaf_key.public_key().clone(),
                input.leaf_params.clone(),
                LeafNodeSource::Commit(Vec::new().into()),
                TreeInfoTbs::Commit(position.clone()),
                signer,
            )?;
            tree.add_leaf(placeholder)?;
        }

        let filtered_direct_path = tree.filtered_direct_path(own_leaf);
        let (plain_path, commit_secret) = derive_path(
            crypto,
            ciphersuite,
            PathSecret::random(ciphersuite, provider.rand())?,
            &filtered_direct_path,
        )?;
        let path_keys = plain_path
            .iter()
            .map(|node| node.key_pair.public_key().clone())
            .collect();
        let parent_hash = tree.apply_path(crypto, ciphersuite, own_leaf, path_keys)?;
        let leaf_node = LeafNode::new_with_key(
            leaf_key.public_key().clone(),
            input.leaf_params,
            LeafNodeSource::Commit(parent_hash.into()),
            TreeInfoTbs::Commit(position),
            signer,
        )?;
        tree.set_leaf(own_leaf, leaf_node.clone())?;

        let tree_hash = tree.tree_hash(crypto, ciphersuite)?;
        let provisional_group_context = input.group_context.provisional(tree_hash, extensions);
        let serialized_group_context = provisional_group_context
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        let nodes = tree.encrypt_path(
            crypto,
            ciphersuite,
            own_leaf,
            &plain_path,
            &serialized_group_context,
            &values.exclusion_list(),
        )?;
        (
            Some(UpdatePath::new(leaf_node, nodes)),
            plain_path,
            Some(leaf_key),
            commit_secret,
            provisional_group_context,
        )
    } else {
        let tree_hash = tree.tree_hash(crypto, ciphersuite)?;
        (
            None,
            vec![],
            None,
            CommitSecret::zero_secret(ciphersuite),
            input.group_context.provisional(tree_hash, extensions),
        )
    };

    let commit = Commit {
        proposals: input.queue.proposals_or_refs(),
        path,
    };
    let mut authenticated_content = AuthenticatedContent::new_and_sign(
        input.wire_format,
        input.sender,
        input.authenticated_data,
        FramedContentBody::Commit(commit),
        input.group_context,
        signer,
    )?;

    let mut group_context = provisional_group_context;
    group_context.set_confirmed_transcript_hash(update_confirmed_transcript_hash(
        crypto,
        ciphersuite,
        &authenticated_content,
        input.interim_transcript_hash,
    )?);

    let scheduled = schedule_epoch(
        crypto,
        ciphersuite,
        commit_secret,
        input.init_secret,
        &values,
        input.external_psks,
        input.resumption_psk_store,
        &group_context,
        consumed,
    )?;
    let confirmation_tag = scheduled.epoch_secrets.confirmation_key().tag(
        crypto,
        ciphersuite,
        group_context.confirmed_transcript_hash(),
    )?;
    authenticated_content.set_confirmation_tag(confirmation_tag.clone());
    let interim_transcript_hash = update_interim_transcript_hash(
        crypto,
        ciphersuite,
        group_context.confirmed_transcript_hash(),
        &confirmation_tag,
    )?;

    Ok(StagedOwnCommit {
        authenticated_content,
        own_leaf,
        tree,
        group_context,
        leaf_key,
        plain_path,
        joiner_secret: scheduled.joiner_secret,
        welcome_secret: Some(scheduled.welcome_secret),
        epoch_secrets: scheduled.epoch_secrets,
        encryption_secret: scheduled.encryption_secret,
        interim_transcript_hash,
        confirmation_tag,
        values,
    })
}

impl ClientState {
    /// Commit the unapplied proposals of this epoch, minus the excluded ones,
    /// together with the proposals in `options`.
    ///
    /// Own update proposals are never committed, the commit path replaces
    /// the own leaf instead. Returns a [`CommitOutput`] with the state of the
    /// next epoch. This state is left unchanged.
    pub fn create_commit<Provider: ArborProvider>(
        &self,
        provider: &Provider,
        signer: &impl Signer,
        options: CommitOptions,
    ) -> Result<CommitOutput, ArborError> {
        self.ensure_active()?;
        let crypto = provider.crypto();
        let ciphersuite = self.ciphersuite();
        let own_leaf = self.own_leaf_index();
        let sender = Sender::build_member(own_leaf);

        let CommitOptions {
            proposals,
            excluded_proposals,
            force_self_update,
            authenticated_data,
        } = options;

        if let Some(unknown) = excluded_proposals
            .iter()
            .find(|proposal_ref| self.unapplied_proposals.get(proposal_ref).is_none())
        {
            log::debug!("Excluded proposal {unknown:?} is not known.");
            return Err(UsageError::UnknownProposal.into());
        }

        let mut queue = ProposalQueue::default();
        let mut own_update_pending = false;
        for queued in self.unapplied_proposals.iter() {
            if excluded_proposals.contains(queued.proposal_ref()) {
                continue;
            }
            match queued.proposal() {
                Proposal::Update(_) if queued.sender_leaf_index() == Some(own_leaf) => {
                    own_update_pending = true;
                    continue;
                }
                Proposal::Remove(remove) if remove.removed() == own_leaf => {
                    log::debug!("Skipping a proposal that removes the committer.");
                    continue;
                }
                _ => queue.add(queued.clone()),
            }
        }
        for proposal in proposals {
            queue.add(QueuedProposal::from_proposal_and_sender(
                crypto, ciphersuite, proposal, &sender,
            )?);
        }

        validate_proposals(
            crypto,
            &queue,
            &self.tree,
            &self.group_context,
            &sender,
            self.config.authentication_service(),
        )?;

        let own_leaf_node = self
            .own_leaf_node()
            .ok_or_else(|| LibraryError::custom("own leaf is blank"))?;
        let wire_format = self.config.wire_format_policy().handshake_wire_format();
        let mut consumed = ConsumedSecrets::default();
        let mut staged = stage_own_commit(
            provider,
            signer,
            CommitInput {
                group_context: &self.group_context,
                tree: &self.tree,
                interim_transcript_hash: &self.interim_transcript_hash,
                init_secret: self.epoch_secrets.init_secret(),
                external_psks: &self.external_psks,
                resumption_psk_store: &self.resumption_psk_store,
                sender,
                wire_format,
                queue,
                force_path: force_self_update || own_update_pending,
                leaf_params: LeafNodeParams::derive(own_leaf_node),
                authenticated_data: &authenticated_data,
            },
            &mut consumed,
        )?;

        // The commit is protected with the keys of the current epoch.
        let commit: MlsMessageOut = match wire_format {
            WireFormat::PrivateMessage => {
                let mut secret_tree = self.secret_tree.clone();
                PrivateMessage::encrypt(
                    crypto,
                    provider.rand(),
                    &staged.authenticated_content,
                    ciphersuite,
                    &mut secret_tree,
                    self.epoch_secrets.sender_data_secret(),
                    self.config.padding(),
                    &mut consumed,
                )?
                .into()
            }
            _ => {
                let mut public_message = PublicMessage::from(staged.authenticated_content.clone());
                public_message.set_membership_tag(
                    crypto,
                    ciphersuite,
                    self.epoch_secrets.membership_key(),
                    &self.group_context,
                )?;
                public_message.into()
            }
        };

        let welcome = self.build_welcome(provider, signer, &mut staged)?;
        let StagedOwnCommit {
            tree,
            group_context,
            leaf_key,
            plain_path,
            epoch_secrets,
            encryption_secret,
            interim_transcript_hash,
            confirmation_tag,
            values,
            ..
        } = staged;

        let mut private_tree = self.private_tree.clone();
        if let Some(leaf_key) = leaf_key {
            private_tree.set_leaf_key(leaf_key);
        }
        for path_secret in private_tree.set_path_keys(plain_path) {
            consumed.push(path_secret.into_secret());
        }

        let state = self.with_next_epoch(NextEpoch {
            group_context,
            tree,
            private_tree,
            epoch_secrets,
            encryption_secret,
            interim_transcript_hash,
            confirmation_tag,
            reinit: values.reinit,
        });
        let group_info = state.export_group_info(provider, signer)?;
        log::debug!(
            "Created commit for epoch {} with {} new members",
            state.epoch(),
            values.invitation_list.len()
        );

        Ok(CommitOutput {
            state,
            commit,
            welcome: welcome.map(MlsMessageOut::from),
            group_info,
            consumed,
        })
    }

    /// Build the welcome for the members added by `staged`. Each new member
    /// gets the path secret of the lowest node the committer's path shares
    /// with it.
    fn build_welcome<Provider: ArborProvider>(
        &self,
        provider: &Provider,
        signer: &impl Signer,
        staged: &mut StagedOwnCommit,
    ) -> Result<Option<Welcome>, ArborError> {
        if staged.values.invitation_list.is_empty() {
            return Ok(None);
        }
        let welcome_secret = staged
            .welcome_secret
            .take()
            .ok_or_else(|| LibraryError::custom("welcome secret was already used"))?;
        let crypto = provider.crypto();
        let ciphersuite = self.ciphersuite();

        let mut extensions = Extensions::empty();
        if self.config.use_ratchet_tree_extension() {
            extensions.add_or_replace(Extension::RatchetTree(RatchetTreeExtension::new(
                staged.tree.export(),
            )));
        }
        let group_info = GroupInfoTbs::new(
            staged.group_context.clone(),
            extensions,
            staged.confirmation_tag.clone(),
            staged.own_leaf,
        )
        .sign(signer)?;
        let serialized_group_info = group_info
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;

        let (welcome_key, welcome_nonce) = welcome_secret.derive_welcome_key_nonce(crypto)?;
        let encrypted_group_info =
            welcome_key.aead_seal(crypto, &serialized_group_info, &[], &welcome_nonce)?;

        let mut secrets = Vec::with_capacity(staged.values.invitation_list.len());
        for (leaf_index, add_proposal) in staged.values.invitation_list.iter() {
            let common_ancestor = lowest_common_ancestor(staged.own_leaf, *leaf_index);
            let path_secret = staged
                .plain_path
                .iter()
                .find(|node| node.parent_index == common_ancestor)
                .map(|node| &node.path_secret);
            let key_package = add_proposal.key_package();
            let group_secrets = GroupSecrets::new(
                &staged.joiner_secret,
                path_secret,
                staged.values.presharedkeys.clone(),
            );
            secrets.push(group_secrets.encrypt(
                crypto,
                ciphersuite,
                key_package.hash_ref(crypto)?,
                key_package.init_key().as_slice(),
                &encrypted_group_info,
            )?);
        }
        Ok(Some(Welcome::new(ciphersuite, secrets, encrypted_group_info)))
    }
}
