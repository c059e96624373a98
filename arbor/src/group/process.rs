//! Processing incoming messages.
//!
//! A message is unprotected with the secrets of the current epoch and its
//! signature is checked against the sender's leaf. Proposals and commits are
//! handed to an [`IncomingMessageCallback`] before they take effect. A
//! rejected message leaves the state as it was.

use arbor_traits::{crypto::ArborCrypto, ArborProvider};
use tls_codec::Serialize as TlsSerializeTrait;

use super::{
    apply_proposals::{apply_proposals, validate_proposals, ApplyProposalsValues},
    commit::schedule_epoch,
    proposal_store::{ProposalQueue, QueuedProposal},
    state::{ClientState, GroupActiveState, NextEpoch},
    transcript::{update_confirmed_transcript_hash, update_interim_transcript_hash},
    GroupEpoch,
};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{equal_ct, ConsumedSecrets, SignaturePublicKey},
    error::{ArborError, LibraryError, UsageError, ValidationError},
    framing::{
        AuthenticatedContent, FramedContentBody, MlsMessageBody, MlsMessageIn, Sender, WireFormat,
    },
    group::{errors::ProposalValidationError, WireFormatPolicy},
    messages::{
        proposals::{Proposal, ReInitProposal},
        Commit,
    },
    schedule::{CommitSecret, InitSecret},
    treesync::{
        errors::{LeafNodeValidationError, TreeSyncError},
        node::leaf_node::TreePosition,
        LeafNodeSource,
    },
};

/// Whether an incoming proposal or commit should take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncomingMessageAction {
    Accept,
    Reject,
}

/// Lets the application decide about incoming proposals and commits after
/// they were validated and before they are applied.
///
/// Both methods accept by default.
pub trait IncomingMessageCallback {
    fn on_proposal(&mut self, _proposal: &QueuedProposal) -> IncomingMessageAction {
        IncomingMessageAction::Accept
    }

    fn on_commit(&mut self, _commit: &StagedCommitInfo) -> IncomingMessageAction {
        IncomingMessageAction::Accept
    }
}

/// A callback that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl IncomingMessageCallback for AcceptAll {}

/// A decrypted application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationMessage {
    sender: LeafNodeIndex,
    authenticated_data: Vec<u8>,
    plaintext: Vec<u8>,
}

impl ApplicationMessage {
    /// The leaf of the sender.
    pub fn sender(&self) -> LeafNodeIndex {
        self.sender
    }

    pub fn authenticated_data(&self) -> &[u8] {
        &self.authenticated_data
    }

    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    pub fn into_plaintext(self) -> Vec<u8> {
        self.plaintext
    }
}

/// A validated commit as shown to the [`IncomingMessageCallback`].
#[derive(Debug, Clone, PartialEq)]
pub struct StagedCommitInfo {
    sender: Sender,
    proposals: Vec<QueuedProposal>,
    added_members: Vec<LeafNodeIndex>,
    removed_members: Vec<LeafNodeIndex>,
    updated_members: Vec<LeafNodeIndex>,
    self_removed: bool,
    reinit: Option<ReInitProposal>,
    has_path: bool,
    epoch: GroupEpoch,
}

impl StagedCommitInfo {
    fn new(
        sender: Sender,
        queue: &ProposalQueue,
        values: &ApplyProposalsValues,
        has_path: bool,
        epoch: GroupEpoch,
    ) -> Self {
        let removed_members = queue
            .iter()
            .filter_map(|queued| match queued.proposal() {
                Proposal::Remove(remove) => Some(remove.removed()),
                _ => None,
            })
            .collect();
        Self {
            sender,
            proposals: queue.iter().cloned().collect(),
            added_members: values.exclusion_list(),
            removed_members,
            updated_members: values.updated_leaves.clone(),
            self_removed: values.self_removed,
            reinit: values.reinit.clone(),
            has_path,
            epoch,
        }
    }

    /// The committer.
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// The committed proposals in the order of the commit.
    pub fn proposals(&self) -> &[QueuedProposal] {
        &self.proposals
    }

    /// The leaves the added members got.
    pub fn added_members(&self) -> &[LeafNodeIndex] {
        &self.added_members
    }

    pub fn removed_members(&self) -> &[LeafNodeIndex] {
        &self.removed_members
    }

    pub fn updated_members(&self) -> &[LeafNodeIndex] {
        &self.updated_members
    }

    /// Whether the commit removes this client.
    pub fn self_removed(&self) -> bool {
        self.self_removed
    }

    /// The committed reinit, if any.
    pub fn reinit(&self) -> Option<&ReInitProposal> {
        self.reinit.as_ref()
    }

    pub fn has_path(&self) -> bool {
        self.has_path
    }

    /// The epoch the commit leads to.
    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }
}

/// What an incoming message turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedContent {
    ApplicationMessage(ApplicationMessage),
    /// An accepted proposal. It was added to the unapplied proposals.
    Proposal(QueuedProposal),
    /// An accepted commit. The returned state is in the new epoch.
    Commit(StagedCommitInfo),
    /// The callback rejected the proposal or commit.
    Rejected,
}

/// The result of [`ClientState::process_message()`].
#[derive(Debug)]
pub struct ProcessOutput {
    /// The state after the message.
    pub state: ClientState,
    pub content: ProcessedContent,
    /// One-time secrets used while processing the message.
    pub consumed: ConsumedSecrets,
}

/// A commit that passed all checks, with the state it leads to.
struct ProcessedCommit {
    info: StagedCommitInfo,
    state: ClientState,
}

impl ClientState {
    /// Process a public or private message of the current epoch.
    ///
    /// Returns a [`ValidationError`] if the message breaks a protocol rule,
    /// an [`ArborError::Crypto`] if it cannot be decrypted or its signature
    /// does not verify. In both cases the state is unchanged. A group that
    /// is suspended by a reinit still decrypts application messages.
    pub fn process_message<Provider: ArborProvider>(
        &self,
        provider: &Provider,
        message: MlsMessageIn,
        callback: &mut impl IncomingMessageCallback,
    ) -> Result<ProcessOutput, ArborError> {
        if self.active_state == GroupActiveState::RemovedFromGroup {
            return Err(UsageError::RemovedFromGroup.into());
        }
        let crypto = provider.crypto();
        let ciphersuite = self.ciphersuite();
        let mut consumed = ConsumedSecrets::default();
        let mut secret_tree = self.secret_tree.clone();

        let authenticated_content = match message.extract() {
            MlsMessageBody::PublicMessage(public_message) => {
                self.check_group_and_epoch(public_message.group_id(), public_message.epoch())?;
                if let Sender::Member(leaf_index) = public_message.sender() {
                    self.check_member_sender(*leaf_index)?;
                    if self.config.wire_format_policy() == WireFormatPolicy::AlwaysPrivate {
                        log::debug!("Public message from a member while private ones are required.");
                        return Err(ValidationError::IncompatibleWireFormat.into());
                    }
                }
                public_message.into_authenticated_content(
                    crypto,
                    ciphersuite,
                    self.epoch_secrets.membership_key(),
                    &self.group_context,
                )?
            }
            MlsMessageBody::PrivateMessage(private_message) => {
                self.check_group_and_epoch(private_message.group_id(), private_message.epoch())?;
                let sender_data = private_message.sender_data(
                    crypto,
                    ciphersuite,
                    self.epoch_secrets.sender_data_secret(),
                )?;
                self.check_member_sender(sender_data.leaf_index)?;
                private_message.decrypt(
                    crypto,
                    ciphersuite,
                    &sender_data,
                    &mut secret_tree,
                    self.config.sender_ratchet_configuration(),
                    &mut consumed,
                )?
            }
            _ => return Err(UsageError::UnexpectedMessageType.into()),
        };

        let signature_key = self.sender_signature_key(&authenticated_content)?;
        authenticated_content.verify(crypto, ciphersuite, &signature_key, &self.group_context)?;
        log::debug!(
            "Processing {:?} from {:?}",
            authenticated_content.content().content_type(),
            authenticated_content.sender()
        );

        match authenticated_content.content().body() {
            FramedContentBody::Application(plaintext) => {
                if authenticated_content.wire_format() != WireFormat::PrivateMessage {
                    return Err(ValidationError::UnencryptedApplicationMessage.into());
                }
                let sender = authenticated_content
                    .sender()
                    .as_member()
                    .ok_or(ValidationError::UnsupportedSender)?;
                log_content!(debug, "  plaintext: {:x?}", plaintext.as_slice());
                let mut state = self.clone();
                state.secret_tree = secret_tree;
                Ok(ProcessOutput {
                    state,
                    content: ProcessedContent::ApplicationMessage(ApplicationMessage {
                        sender,
                        authenticated_data: authenticated_content
                            .content()
                            .authenticated_data()
                            .to_vec(),
                        plaintext: plaintext.as_slice().to_vec(),
                    }),
                    consumed,
                })
            }
            FramedContentBody::Proposal(proposal) => {
                self.ensure_active()?;
                if proposal.proposal_type().is_by_value_only() {
                    return Err(ProposalValidationError::ProposalByReference.into());
                }
                let queued = QueuedProposal::from_authenticated_content(
                    crypto,
                    ciphersuite,
                    &authenticated_content,
                )?;
                if callback.on_proposal(&queued) == IncomingMessageAction::Reject {
                    log::debug!("Proposal {} rejected by the application", queued.proposal_ref());
                    return Ok(self.rejected());
                }
                let mut state = self.clone();
                state.secret_tree = secret_tree;
                state.unapplied_proposals.add(queued.clone());
                Ok(ProcessOutput {
                    state,
                    content: ProcessedContent::Proposal(queued),
                    consumed,
                })
            }
            FramedContentBody::Commit(commit) => {
                self.ensure_active()?;
                let processed =
                    self.process_commit(crypto, &authenticated_content, commit, &mut consumed)?;
                if callback.on_commit(&processed.info) == IncomingMessageAction::Reject {
                    log::debug!("Commit rejected by the application");
                    return Ok(self.rejected());
                }
                Ok(ProcessOutput {
                    state: processed.state,
                    content: ProcessedContent::Commit(processed.info),
                    consumed,
                })
            }
        }
    }

    fn rejected(&self) -> ProcessOutput {
        ProcessOutput {
            state: self.clone(),
            content: ProcessedContent::Rejected,
            consumed: ConsumedSecrets::default(),
        }
    }

    fn check_group_and_epoch(
        &self,
        group_id: &super::GroupId,
        epoch: GroupEpoch,
    ) -> Result<(), ValidationError> {
        if group_id != self.group_id() {
            return Err(ValidationError::WrongGroupId);
        }
        if epoch != self.epoch() {
            log::debug!("Message for epoch {epoch}, the group is in {}", self.epoch());
            return Err(ValidationError::WrongEpoch);
        }
        Ok(())
    }

    fn check_member_sender(&self, leaf_index: LeafNodeIndex) -> Result<(), ValidationError> {
        if leaf_index == self.own_leaf_index() {
            return Err(ValidationError::CannotProcessOwnMessage);
        }
        if self.tree.leaf(leaf_index).is_none() {
            return Err(ValidationError::UnknownMember);
        }
        Ok(())
    }

    /// The key the content must be signed with. New members signing their
    /// external commit use the key of the leaf in the commit's path.
    fn sender_signature_key(
        &self,
        authenticated_content: &AuthenticatedContent,
    ) -> Result<SignaturePublicKey, ArborError> {
        match authenticated_content.sender() {
            Sender::Member(leaf_index) => Ok(self
                .tree
                .leaf(*leaf_index)
                .ok_or(ValidationError::UnknownMember)?
                .signature_key()
                .clone()),
            Sender::NewMemberCommit => match authenticated_content.content().body() {
                FramedContentBody::Commit(commit) => Ok(commit
                    .path()
                    .ok_or(ValidationError::MissingUpdatePath)?
                    .leaf_node()
                    .signature_key()
                    .clone()),
                _ => Err(ValidationError::UnsupportedSender.into()),
            },
            Sender::External(_) | Sender::NewMemberProposal => {
                Err(ValidationError::UnsupportedSender.into())
            }
        }
    }

    /// Validate and apply a commit of another member to a copy of the state.
    fn process_commit(
        &self,
        crypto: &impl ArborCrypto,
        authenticated_content: &AuthenticatedContent,
        commit: &Commit,
        consumed: &mut ConsumedSecrets,
    ) -> Result<ProcessedCommit, ArborError> {
        let ciphersuite = self.ciphersuite();
        let sender = *authenticated_content.sender();
        let received_confirmation_tag = authenticated_content
            .confirmation_tag()
            .ok_or(ValidationError::MissingConfirmationTag)?;
        let authentication_service = self.config.authentication_service();

        let queue = ProposalQueue::from_committed_proposals(
            crypto,
            ciphersuite,
            commit.proposals(),
            &self.unapplied_proposals,
            &sender,
        )?;
        validate_proposals(
            crypto,
            &queue,
            &self.tree,
            &self.group_context,
            &sender,
            authentication_service,
        )?;

        let own_leaf = self.own_leaf_index();
        let mut tree = self.tree.clone();
        let values = apply_proposals(&mut tree, &queue, Some(own_leaf))?;
        let is_external_commit = matches!(sender, Sender::NewMemberCommit);
        if (values.path_required || is_external_commit) && commit.path().is_none() {
            return Err(ValidationError::MissingUpdatePath.into());
        }
        let info = StagedCommitInfo::new(
            sender,
            &queue,
            &values,
            commit.has_path(),
            GroupEpoch::from(self.epoch().as_u64() + 1),
        );

        if values.self_removed {
            // Without a leaf the new epoch's secrets are out of reach.
            log::debug!("This client was removed from the group.");
            let mut state = self.clone();
            state.unapplied_proposals.clear();
            state.active_state = GroupActiveState::RemovedFromGroup;
            return Ok(ProcessedCommit { info, state });
        }

        let mut private_tree = self.private_tree.clone();
        if values.updated_leaves.contains(&own_leaf) {
            let own_leaf_node = tree
                .leaf(own_leaf)
                .ok_or_else(|| LibraryError::custom("updated own leaf is blank"))?;
            let leaf_key = private_tree
                .take_pending_update_key(own_leaf_node.encryption_key())
                .ok_or_else(|| LibraryError::custom("no key for the own update"))?;
            private_tree.set_leaf_key(leaf_key);
        }

        let committer = match sender {
            Sender::Member(leaf_index) => leaf_index,
            Sender::NewMemberCommit => {
                let path = commit.path().ok_or(ValidationError::MissingUpdatePath)?;
                tree.add_leaf(path.leaf_node().clone())?
            }
            _ => return Err(ValidationError::UnsupportedSender.into()),
        };
        let extensions = values
            .extensions
            .clone()
            .unwrap_or_else(|| self.group_context.extensions().clone());

        let (commit_secret, mut group_context) = match commit.path() {
            Some(path) => {
                let leaf_node = path.leaf_node();
                if !matches!(leaf_node.leaf_node_source(), LeafNodeSource::Commit(_)) {
                    return Err(ProposalValidationError::LeafNodeValidation(
                        LeafNodeValidationError::InvalidLeafNodeSource,
                    )
                    .into());
                }
                leaf_node.validate(
                    crypto,
                    ciphersuite,
                    Some(TreePosition::new(self.group_id().clone(), committer)),
                    authentication_service,
                )?;
                if let Some(required_capabilities) = extensions.required_capabilities() {
                    leaf_node
                        .capabilities()
                        .supports_required_capabilities(required_capabilities)
                        .map_err(|_| ProposalValidationError::InsufficientCapabilities)?;
                }
                tree.check_key_uniqueness(leaf_node, Some(committer))
                    .map_err(|e| match e {
                        TreeSyncError::DuplicateEncryptionKey => {
                            ProposalValidationError::DuplicateEncryptionKey.into()
                        }
                        TreeSyncError::DuplicateSignatureKey => {
                            ProposalValidationError::DuplicateSignatureKey.into()
                        }
                        e => ArborError::from(e),
                    })?;

                let parent_hash =
                    tree.apply_path(crypto, ciphersuite, committer, path.encryption_keys())?;
                if leaf_node.parent_hash() != Some(parent_hash.as_slice()) {
                    log::debug!("The leaf of the path does not carry the computed parent hash.");
                    return Err(TreeSyncError::ParentHashMismatch.into());
                }
                tree.set_leaf(committer, leaf_node.clone())?;

                let tree_hash = tree.tree_hash(crypto, ciphersuite)?;
                let provisional_group_context = self.group_context.provisional(tree_hash, extensions);
                let serialized_group_context = provisional_group_context
                    .tls_serialize_detached()
                    .map_err(LibraryError::missing_bound_check)?;
                let (nodes, commit_secret) = tree.decrypt_path(
                    crypto,
                    ciphersuite,
                    committer,
                    path,
                    &private_tree,
                    &values.exclusion_list(),
                    &serialized_group_context,
                )?;
                for path_secret in private_tree.set_path_keys(nodes) {
                    consumed.push(path_secret.into_secret());
                }
                (commit_secret, provisional_group_context)
            }
            None => {
                let tree_hash = tree.tree_hash(crypto, ciphersuite)?;
                (
                    CommitSecret::zero_secret(ciphersuite),
                    self.group_context.provisional(tree_hash, extensions),
                )
            }
        };

        group_context.set_confirmed_transcript_hash(update_confirmed_transcript_hash(
            crypto,
            ciphersuite,
            authenticated_content,
            &self.interim_transcript_hash,
        )?);

        let init_secret = match &values.external_init_kem_output {
            Some(kem_output) => {
                let external_key_pair = self
                    .epoch_secrets
                    .external_secret()
                    .derive_external_keypair(crypto, ciphersuite)?;
                InitSecret::from_kem_output(
                    crypto,
                    ciphersuite,
                    &external_key_pair.private,
                    kem_output,
                )?
            }
            None => self.epoch_secrets.init_secret().clone(),
        };
        let scheduled = schedule_epoch(
            crypto,
            ciphersuite,
            commit_secret,
            &init_secret,
            &values,
            &self.external_psks,
            &self.resumption_psk_store,
            &group_context,
            consumed,
        )?;

        let confirmation_tag = scheduled.epoch_secrets.confirmation_key().tag(
            crypto,
            ciphersuite,
            group_context.confirmed_transcript_hash(),
        )?;
        if !equal_ct(
            confirmation_tag.as_slice(),
            received_confirmation_tag.as_slice(),
        ) {
            log::error!("Confirmation tag mismatch");
            return Err(ValidationError::ConfirmationTagMismatch.into());
        }
        let interim_transcript_hash = update_interim_transcript_hash(
            crypto,
            ciphersuite,
            group_context.confirmed_transcript_hash(),
            &confirmation_tag,
        )?;

        let state = self.with_next_epoch(NextEpoch {
            group_context,
            tree,
            private_tree,
            epoch_secrets: scheduled.epoch_secrets,
            encryption_secret: scheduled.encryption_secret,
            interim_transcript_hash,
            confirmation_tag,
            reinit: values.reinit.clone(),
        });
        Ok(ProcessedCommit { info, state })
    }
}
