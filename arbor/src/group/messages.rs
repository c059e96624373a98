//! Sending application messages and proposals, and exporting values of the
//! current epoch.

use arbor_traits::{signatures::Signer, ArborProvider};

use super::{errors::ProposalValidationError, proposal_store::QueuedProposal, state::ClientState};
use crate::{
    ciphersuite::{hash_ref::ProposalRef, signable::Signable, ConsumedSecrets, HpkePublicKey},
    error::{ArborError, LibraryError, UsageError},
    extensions::{Extension, ExternalPubExtension, Extensions, RatchetTreeExtension},
    framing::{
        AuthenticatedContent, FramedContentBody, MlsMessageOut, PrivateMessage, PublicMessage,
        Sender, WireFormat,
    },
    messages::{
        group_info::GroupInfoTbs,
        proposals::{Proposal, UpdateProposal},
    },
    treesync::{
        node::leaf_node::{LeafNodeParams, TreeInfoTbs, TreePosition},
        LeafNode, LeafNodeSource,
    },
};

impl ClientState {
    /// Creates an application message.
    ///
    /// Application messages are always encrypted and padded as configured.
    /// Returns the new state, whose sender ratchet moved past the used key,
    /// and the consumed ratchet secrets.
    /// Returns an error if the group is not active.
    pub fn create_application_message<Provider: ArborProvider>(
        &self,
        provider: &Provider,
        signer: &impl Signer,
        authenticated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<(Self, MlsMessageOut, ConsumedSecrets), ArborError> {
        self.ensure_active()?;
        log_content!(debug, "Encrypting application message {:x?}", plaintext);
        let authenticated_content = AuthenticatedContent::new_and_sign(
            WireFormat::PrivateMessage,
            Sender::build_member(self.own_leaf_index()),
            authenticated_data,
            FramedContentBody::Application(plaintext.into()),
            &self.group_context,
            signer,
        )?;
        let mut state = self.clone();
        let mut consumed = ConsumedSecrets::default();
        let message = state.protect(provider, &authenticated_content, &mut consumed)?;
        Ok((state, message, consumed))
    }

    /// Send a proposal to the group. The proposal is stored in the unapplied
    /// proposals of the returned state, so that it can be committed by this
    /// client as well.
    ///
    /// Own updates are proposed with [`ClientState::propose_self_update()`].
    pub fn propose<Provider: ArborProvider>(
        &self,
        provider: &Provider,
        signer: &impl Signer,
        proposal: Proposal,
    ) -> Result<(Self, MlsMessageOut, ProposalRef), ArborError> {
        self.ensure_active()?;
        match proposal {
            Proposal::Update(_) => {
                log::debug!("Updates are sent with propose_self_update.");
                Err(ProposalValidationError::InvalidSenderType.into())
            }
            proposal if proposal.proposal_type().is_by_value_only() => {
                Err(ProposalValidationError::ProposalByReference.into())
            }
            proposal => self.send_proposal(provider, signer, proposal),
        }
    }

    /// Propose to replace the own leaf with a fresh one. The new private
    /// key is kept until the proposal is committed or the epoch ends.
    pub fn propose_self_update<Provider: ArborProvider>(
        &self,
        provider: &Provider,
        signer: &impl Signer,
    ) -> Result<(Self, MlsMessageOut, ProposalRef), ArborError> {
        self.ensure_active()?;
        let own_leaf_index = self.own_leaf_index();
        let own_leaf = self
            .own_leaf_node()
            .ok_or_else(|| LibraryError::custom("own leaf is blank"))?;
        let (leaf_node, key_pair) = LeafNode::new(
            provider.crypto(),
            provider.rand(),
            signer,
            self.ciphersuite(),
            LeafNodeParams::derive(own_leaf),
            LeafNodeSource::Update,
            TreeInfoTbs::Update(TreePosition::new(self.group_id().clone(), own_leaf_index)),
        )?;
        let (mut state, message, proposal_ref) = self.send_proposal(
            provider,
            signer,
            Proposal::Update(UpdateProposal { leaf_node }),
        )?;
        state.private_tree.add_pending_update_key(key_pair);
        Ok((state, message, proposal_ref))
    }

    fn send_proposal<Provider: ArborProvider>(
        &self,
        provider: &Provider,
        signer: &impl Signer,
        proposal: Proposal,
    ) -> Result<(Self, MlsMessageOut, ProposalRef), ArborError> {
        let crypto = provider.crypto();
        let authenticated_content = AuthenticatedContent::new_and_sign(
            self.config.wire_format_policy().handshake_wire_format(),
            Sender::build_member(self.own_leaf_index()),
            &[],
            FramedContentBody::Proposal(proposal),
            &self.group_context,
            signer,
        )?;
        let queued = QueuedProposal::from_authenticated_content(
            crypto,
            self.ciphersuite(),
            &authenticated_content,
        )?;
        let proposal_ref = queued.proposal_ref().clone();

        let mut state = self.clone();
        let mut consumed = ConsumedSecrets::default();
        let message = state.protect(provider, &authenticated_content, &mut consumed)?;
        state.unapplied_proposals.add(queued);
        log::debug!("Sent proposal {proposal_ref}");
        Ok((state, message, proposal_ref))
    }

    /// Protect `authenticated_content` with the keys of the current epoch.
    /// Private messages advance the own sender ratchet of this state.
    fn protect<Provider: ArborProvider>(
        &mut self,
        provider: &Provider,
        authenticated_content: &AuthenticatedContent,
        consumed: &mut ConsumedSecrets,
    ) -> Result<MlsMessageOut, ArborError> {
        let crypto = provider.crypto();
        let ciphersuite = self.ciphersuite();
        match authenticated_content.wire_format() {
            WireFormat::PrivateMessage => Ok(PrivateMessage::encrypt(
                crypto,
                provider.rand(),
                authenticated_content,
                ciphersuite,
                &mut self.secret_tree,
                self.epoch_secrets.sender_data_secret(),
                self.config.padding(),
                consumed,
            )?
            .into()),
            _ => {
                let mut public_message = PublicMessage::from(authenticated_content.clone());
                public_message.set_membership_tag(
                    crypto,
                    ciphersuite,
                    self.epoch_secrets.membership_key(),
                    &self.group_context,
                )?;
                Ok(public_message.into())
            }
        }
    }

    /// `MLS-Exporter(label, context, length)` of the current epoch.
    pub fn export_secret<Provider: ArborProvider>(
        &self,
        provider: &Provider,
        label: &str,
        context: &[u8],
        length: usize,
    ) -> Result<Vec<u8>, ArborError> {
        if length > u16::MAX as usize {
            log::debug!("Exporter length {length} does not fit into a u16.");
            return Err(UsageError::ExporterLengthTooLarge.into());
        }
        Ok(self.epoch_secrets.exporter_secret().derive_exported_secret(
            self.ciphersuite(),
            provider.crypto(),
            label,
            context,
            length,
        )?)
    }

    /// A secret all members of the epoch share. Comparing it out of band
    /// confirms that they agree on the group state.
    pub fn epoch_authenticator(&self) -> &[u8] {
        self.epoch_secrets.epoch_authenticator().as_slice()
    }

    /// A group info of the current epoch signed by this client. It carries
    /// the external public key, so that it can be used for external commits,
    /// and the ratchet tree if the configuration asks for it.
    pub fn export_group_info<Provider: ArborProvider>(
        &self,
        provider: &Provider,
        signer: &impl Signer,
    ) -> Result<MlsMessageOut, ArborError> {
        let crypto = provider.crypto();
        let ciphersuite = self.ciphersuite();
        let external_pub = self
            .epoch_secrets
            .external_secret()
            .external_pub(crypto, ciphersuite)?;
        let mut extensions = Extensions::single(Extension::ExternalPub(
            ExternalPubExtension::new(HpkePublicKey::from(external_pub.as_slice())),
        ));
        if self.config.use_ratchet_tree_extension() {
            extensions.add_or_replace(Extension::RatchetTree(RatchetTreeExtension::new(
                self.tree.export(),
            )));
        }
        let group_info = GroupInfoTbs::new(
            self.group_context.clone(),
            extensions,
            self.confirmation_tag.clone(),
            self.own_leaf_index(),
        )
        .sign(signer)?;
        Ok(group_info.into())
    }
}
