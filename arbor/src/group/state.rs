//! The state of one member in one epoch, group creation and persistence.

use std::collections::BTreeMap;

use arbor_traits::{crypto::ArborCrypto, signatures::Signer, types::Ciphersuite, ArborProvider};
use serde::{Deserialize, Serialize};
use tls_codec::Serialize as TlsSerializeTrait;

use super::{
    config::ClientConfig, errors::ProposalValidationError, proposal_store::UnappliedProposals,
    transcript, GroupContext, GroupEpoch, GroupId,
};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{ConsumedSecrets, SignaturePublicKey},
    credentials::{Credential, CredentialWithKey},
    error::{ArborError, DependencyError, LibraryError, UsageError},
    extensions::Extensions,
    messages::{proposals::ReInitProposal, ConfirmationTag},
    schedule::{
        derive_epoch, psk::ResumptionPskStore, CommitSecret, EncryptionSecret, EpochSecrets,
        InitSecret, JoinerSecret, PskSecret,
    },
    tree::secret_tree::SecretTree,
    treesync::{
        node::leaf_node::{LeafNodeParams, TreeInfoTbs},
        private_tree::PrivateTree,
        LeafNode, LeafNodeSource, RatchetTree, RatchetTreeIn,
    },
    utils::vector_converter,
};

/// Whether the member can still take part in the group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupActiveState {
    /// The member can send and process messages.
    Active,
    /// A reinitialization was committed. The group can no longer be used and
    /// the members are expected to move to a new group with the parameters of
    /// the proposal.
    SuspendedPendingReinit(ReInitProposal),
    /// The member was removed from the group. This state is terminal.
    RemovedFromGroup,
}

impl GroupActiveState {
    /// Returns `true` if the group can be used.
    pub fn is_active(&self) -> bool {
        matches!(self, GroupActiveState::Active)
    }
}

/// A member of the group as listed in the ratchet tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// The leaf of the member.
    pub index: LeafNodeIndex,
    /// The credential of the member.
    pub credential: Credential,
    /// The public encryption key of the member's leaf.
    pub encryption_key: Vec<u8>,
    /// The public signature key of the member.
    pub signature_key: Vec<u8>,
}

/// One member's view of a group in one epoch.
///
/// A `ClientState` is never changed in place. Operations that advance or
/// update the state return a new `ClientState` and leave the old one usable.
/// The [`ClientConfig`] is not part of the persisted state, see
/// [`ClientState::from_json()`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientState {
    pub(crate) group_context: GroupContext,
    pub(crate) tree: RatchetTree,
    pub(crate) private_tree: PrivateTree,
    pub(crate) epoch_secrets: EpochSecrets,
    pub(crate) secret_tree: SecretTree,
    pub(crate) interim_transcript_hash: Vec<u8>,
    pub(crate) confirmation_tag: ConfirmationTag,
    pub(crate) unapplied_proposals: UnappliedProposals,
    pub(crate) resumption_psk_store: ResumptionPskStore,
    #[serde(with = "vector_converter")]
    pub(crate) external_psks: BTreeMap<Vec<u8>, Vec<u8>>,
    pub(crate) active_state: GroupActiveState,
    #[serde(skip)]
    pub(crate) config: ClientConfig,
}

/// The parts of a [`ClientState`] that a commit replaces.
pub(crate) struct NextEpoch {
    pub(crate) group_context: GroupContext,
    pub(crate) tree: RatchetTree,
    pub(crate) private_tree: PrivateTree,
    pub(crate) epoch_secrets: EpochSecrets,
    pub(crate) encryption_secret: EncryptionSecret,
    pub(crate) interim_transcript_hash: Vec<u8>,
    pub(crate) confirmation_tag: ConfirmationTag,
    pub(crate) reinit: Option<ReInitProposal>,
}

/// Check that the provider supports `ciphersuite` and that `signer` signs
/// with its signature scheme.
pub(crate) fn check_ciphersuite(
    crypto: &impl ArborCrypto,
    ciphersuite: Ciphersuite,
    signer: &impl Signer,
) -> Result<(), ArborError> {
    crypto
        .supports(ciphersuite)
        .map_err(|_| DependencyError::UnsupportedCiphersuite(ciphersuite))?;
    if signer.signature_scheme() != ciphersuite.signature_algorithm() {
        return Err(UsageError::CiphersuiteSignatureSchemeMismatch.into());
    }
    Ok(())
}

impl ClientState {
    /// Create a new group with this client as its only member.
    ///
    /// `extensions` become the extensions of the group context. The ratchet
    /// tree and external public key extensions cannot be used there.
    pub fn create_group<Provider: ArborProvider>(
        provider: &Provider,
        signer: &impl Signer,
        config: ClientConfig,
        ciphersuite: Ciphersuite,
        group_id: GroupId,
        credential_with_key: CredentialWithKey,
        extensions: Extensions,
    ) -> Result<Self, ArborError> {
        let crypto = provider.crypto();
        check_ciphersuite(crypto, ciphersuite, signer)?;
        extensions.check_unique()?;
        extensions.validate_for_group_context()?;

        let params = LeafNodeParams {
            credential_with_key,
            capabilities: config.leaf_capabilities().clone(),
            extensions: Extensions::empty(),
        };
        let (leaf_node, leaf_key) = LeafNode::new(
            crypto,
            provider.rand(),
            signer,
            ciphersuite,
            params,
            LeafNodeSource::KeyPackage(config.leaf_lifetime()),
            TreeInfoTbs::KeyPackage,
        )?;
        leaf_node
            .validate_locally(ciphersuite)
            .map_err(ProposalValidationError::from)?;
        if !leaf_node.capabilities().contains_extensions(&extensions) {
            log::debug!("The own leaf does not support the group context extensions.");
            return Err(ProposalValidationError::UnsupportedGroupContextExtensions.into());
        }
        if let Some(required_capabilities) = extensions.required_capabilities() {
            leaf_node
                .capabilities()
                .supports_required_capabilities(required_capabilities)
                .map_err(|_| ProposalValidationError::InsufficientCapabilities)?;
        }

        let tree = RatchetTree::new(leaf_node);
        let tree_hash = tree.tree_hash(crypto, ciphersuite)?;
        let group_context = GroupContext::initial(
            ciphersuite,
            group_id,
            tree_hash,
            extensions,
        );
        let serialized_group_context = group_context
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;

        // Secrets used only to bootstrap the first epoch are dropped (and
        // zeroized) at the end of this function.
        let mut consumed = ConsumedSecrets::default();
        let init_secret = InitSecret::random(ciphersuite, provider.rand())?;
        let joiner_secret = JoinerSecret::new(
            crypto,
            ciphersuite,
            CommitSecret::zero_secret(ciphersuite),
            &init_secret,
            &serialized_group_context,
            &mut consumed,
        )?;
        let psk_secret = PskSecret::new(crypto, ciphersuite, &[])?;
        let (_, epoch_secrets, encryption_secret) = derive_epoch(
            crypto,
            ciphersuite,
            &joiner_secret,
            psk_secret,
            &group_context,
            &mut consumed,
        )?;

        let confirmation_tag = epoch_secrets.confirmation_key().tag(
            crypto,
            ciphersuite,
            group_context.confirmed_transcript_hash(),
        )?;
        let interim_transcript_hash = transcript::update_interim_transcript_hash(
            crypto,
            ciphersuite,
            group_context.confirmed_transcript_hash(),
            &confirmation_tag,
        )?;

        let own_leaf_index = LeafNodeIndex::new(0);
        let secret_tree = SecretTree::new(encryption_secret, tree.tree_size(), own_leaf_index);
        let mut resumption_psk_store = ResumptionPskStore::new(config.max_resumption_psks());
        resumption_psk_store.add(
            group_context.epoch(),
            epoch_secrets.resumption_psk().secret().clone(),
        );
        log::debug!(
            "Created group {:x?} with {ciphersuite}",
            group_context.group_id().as_slice()
        );

        Ok(ClientState {
            group_context,
            tree,
            private_tree: PrivateTree::new(own_leaf_index, leaf_key),
            epoch_secrets,
            secret_tree,
            interim_transcript_hash,
            confirmation_tag,
            unapplied_proposals: UnappliedProposals::default(),
            resumption_psk_store,
            external_psks: BTreeMap::new(),
            active_state: GroupActiveState::Active,
            config,
        })
    }

    /// Assemble the state of a new epoch. Pending update keys and private
    /// keys that no longer match the tree are dropped.
    pub(crate) fn from_next_epoch(
        next: NextEpoch,
        mut resumption_psk_store: ResumptionPskStore,
        external_psks: BTreeMap<Vec<u8>, Vec<u8>>,
        config: ClientConfig,
    ) -> Self {
        let NextEpoch {
            group_context,
            tree,
            mut private_tree,
            epoch_secrets,
            encryption_secret,
            interim_transcript_hash,
            confirmation_tag,
            reinit,
        } = next;
        private_tree.clear_pending_update_keys();
        private_tree.prune(&tree);
        let secret_tree = SecretTree::new(
            encryption_secret,
            tree.tree_size(),
            private_tree.own_leaf_index(),
        );
        resumption_psk_store.add(
            group_context.epoch(),
            epoch_secrets.resumption_psk().secret().clone(),
        );
        let active_state = match reinit {
            Some(reinit) => {
                log::debug!("Group suspended by a reinit to {:?}", reinit.group_id());
                GroupActiveState::SuspendedPendingReinit(reinit)
            }
            None => GroupActiveState::Active,
        };
        log::debug!("Entered epoch {}", group_context.epoch());

        ClientState {
            group_context,
            tree,
            private_tree,
            epoch_secrets,
            secret_tree,
            interim_transcript_hash,
            confirmation_tag,
            unapplied_proposals: UnappliedProposals::default(),
            resumption_psk_store,
            external_psks,
            active_state,
            config,
        }
    }

    /// The state following this one after a commit.
    pub(crate) fn with_next_epoch(&self, next: NextEpoch) -> Self {
        Self::from_next_epoch(
            next,
            self.resumption_psk_store.clone(),
            self.external_psks.clone(),
            self.config.clone(),
        )
    }

    /// Returns a copy of this state that knows the external pre-shared key
    /// `psk_id`. An existing key with the same id is replaced.
    pub fn with_external_psk(&self, psk_id: Vec<u8>, secret: Vec<u8>) -> Self {
        let mut state = self.clone();
        state.external_psks.insert(psk_id, secret);
        state
    }

    /// Serialize the state to JSON. The configuration is not included.
    pub fn to_json(&self) -> Result<String, ArborError> {
        serde_json::to_string(self).map_err(|e| {
            log::error!("Failed to serialize the client state: {e}");
            LibraryError::custom("Failed to serialize the client state").into()
        })
    }

    /// Restore a state from its JSON projection and the configuration it is
    /// used with.
    pub fn from_json(json: &str, config: ClientConfig) -> Result<Self, ArborError> {
        let mut state: ClientState = serde_json::from_str(json).map_err(|e| {
            log::debug!("Invalid client state JSON: {e}");
            ArborError::Codec(tls_codec::Error::DecodingError(e.to_string()))
        })?;
        state.config = config;
        Ok(state)
    }

    /// Fail unless the group is active.
    pub(crate) fn ensure_active(&self) -> Result<(), ArborError> {
        match self.active_state {
            GroupActiveState::Active => Ok(()),
            GroupActiveState::SuspendedPendingReinit(_) => Err(UsageError::PendingReinit.into()),
            GroupActiveState::RemovedFromGroup => Err(UsageError::RemovedFromGroup.into()),
        }
    }

    /// The current epoch.
    pub fn epoch(&self) -> GroupEpoch {
        self.group_context.epoch()
    }

    /// The group context of the current epoch.
    pub fn group_context(&self) -> &GroupContext {
        &self.group_context
    }

    /// The group id.
    pub fn group_id(&self) -> &GroupId {
        self.group_context.group_id()
    }

    /// The ciphersuite of the group.
    pub fn ciphersuite(&self) -> Ciphersuite {
        self.group_context.ciphersuite()
    }

    /// The leaf of this client.
    pub fn own_leaf_index(&self) -> LeafNodeIndex {
        self.private_tree.own_leaf_index()
    }

    /// The leaf node of this client.
    pub fn own_leaf_node(&self) -> Option<&LeafNode> {
        self.tree.leaf(self.own_leaf_index())
    }

    /// The configuration this state is used with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether the group is active, suspended or left.
    pub fn active_state(&self) -> &GroupActiveState {
        &self.active_state
    }

    /// Proposals received or sent in this epoch that were not committed yet.
    pub fn unapplied_proposals(&self) -> &UnappliedProposals {
        &self.unapplied_proposals
    }

    /// The confirmation tag of the commit that started this epoch.
    pub fn confirmation_tag(&self) -> &ConfirmationTag {
        &self.confirmation_tag
    }

    /// The public ratchet tree, as sent alongside a welcome.
    pub fn export_ratchet_tree(&self) -> RatchetTreeIn {
        self.tree.export()
    }

    /// The members of the group ordered by leaf index.
    pub fn members(&self) -> impl Iterator<Item = Member> + '_ {
        self.tree.members().map(|(index, leaf)| Member {
            index,
            credential: leaf.credential().clone(),
            encryption_key: leaf.encryption_key().as_slice().to_vec(),
            signature_key: leaf.signature_key().as_slice().to_vec(),
        })
    }

    /// The leaf of the member with the given signature key.
    pub fn find_member(&self, signature_key: &SignaturePublicKey) -> Option<LeafNodeIndex> {
        self.tree
            .members()
            .find(|(_, leaf)| leaf.signature_key() == signature_key)
            .map(|(index, _)| index)
    }

    /// Overwrite the current head of the own application ratchet with zeros.
    /// Messages encrypted afterwards cannot be decrypted by the other
    /// members. The ratchet must have been used at least once.
    #[cfg(any(feature = "test-utils", test))]
    pub fn zero_ratchet_head(&self) -> Result<Self, ArborError> {
        let mut state = self.clone();
        state.secret_tree.zero_ratchet_head(
            self.own_leaf_index(),
            crate::tree::secret_tree::SecretType::ApplicationSecret,
        )?;
        Ok(state)
    }
}
