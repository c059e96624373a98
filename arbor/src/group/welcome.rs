//! Joining a group from a welcome.

use std::collections::BTreeMap;

use arbor_traits::{crypto::ArborCrypto, ArborProvider};
use tls_codec::{Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait};

use super::{
    config::ClientConfig,
    errors::WelcomeError,
    state::{ClientState, NextEpoch},
    transcript::update_interim_transcript_hash,
};
use crate::{
    ciphersuite::{equal_ct, ConsumedSecrets},
    error::{ArborError, LibraryError, UsageError},
    key_packages::KeyPackageBundle,
    messages::{group_info::GroupInfo, GroupSecrets, Welcome},
    schedule::{
        psk::{load_psks, ResumptionPskStore},
        KeySchedule, PskSecret,
    },
    treesync::{errors::TreeSyncError, private_tree::PrivateTree, RatchetTree, RatchetTreeIn},
    versions::ProtocolVersion,
};

impl ClientState {
    /// Join a group with a welcome addressed to `key_package_bundle`.
    ///
    /// The ratchet tree is taken from `ratchet_tree` or, if that is `None`,
    /// from the ratchet tree extension of the group info. `external_psks`
    /// must hold every external pre-shared key the welcome refers to. They
    /// are kept in the returned state.
    ///
    /// Resumption PSKs are looked up in `prior_state`, the client's state in
    /// the group the welcome resumes (e.g. after a reinit or for a branch).
    /// Without it, a welcome that carries a resumption PSK cannot be joined.
    pub fn join_group<Provider: ArborProvider>(
        provider: &Provider,
        config: ClientConfig,
        welcome: Welcome,
        ratchet_tree: Option<RatchetTreeIn>,
        key_package_bundle: &KeyPackageBundle,
        external_psks: BTreeMap<Vec<u8>, Vec<u8>>,
        prior_state: Option<&ClientState>,
    ) -> Result<Self, ArborError> {
        let crypto = provider.crypto();
        let ciphersuite = welcome.ciphersuite();
        crypto
            .supports(ciphersuite)
            .map_err(|_| WelcomeError::UnsupportedCiphersuite(ciphersuite))?;
        let key_package = key_package_bundle.key_package();
        if key_package.ciphersuite() != ciphersuite {
            return Err(WelcomeError::CiphersuiteMismatch.into());
        }

        let key_package_ref = key_package.hash_ref(crypto)?;
        let encrypted_group_secrets = welcome
            .secrets()
            .iter()
            .find(|secrets| secrets.new_member() == &key_package_ref)
            .ok_or(WelcomeError::JoinerSecretNotFound)?;
        let group_secrets = GroupSecrets::decrypt(
            crypto,
            ciphersuite,
            encrypted_group_secrets,
            key_package_bundle.init_private_key(),
            welcome.encrypted_group_info(),
        )?;

        let no_resumption_psks = ResumptionPskStore::new(0);
        let no_group_id = super::GroupId::from_slice(&[]);
        let (resumption_psks, resumption_group_id) = match prior_state {
            Some(prior_state) => (&prior_state.resumption_psk_store, prior_state.group_id()),
            None => (&no_resumption_psks, &no_group_id),
        };
        let psks = load_psks(
            group_secrets.psks(),
            &external_psks,
            resumption_psks,
            resumption_group_id,
        )?;
        let psk_secret = PskSecret::new(crypto, ciphersuite, &psks)?;
        let joiner_secret = group_secrets.joiner_secret();
        let mut key_schedule = KeySchedule::init(ciphersuite, crypto, &joiner_secret, psk_secret)?;
        let (welcome_key, welcome_nonce) = key_schedule
            .welcome(crypto)?
            .derive_welcome_key_nonce(crypto)?;
        let group_info_bytes = welcome_key
            .aead_open(crypto, welcome.encrypted_group_info(), &[], &welcome_nonce)
            .map_err(|_| WelcomeError::UnableToDecryptGroupInfo)?;
        let group_info = GroupInfo::tls_deserialize_exact(&group_info_bytes)
            .map_err(WelcomeError::CodecError)?;

        let group_context = group_info.group_context().clone();
        if group_context.ciphersuite() != ciphersuite {
            return Err(WelcomeError::CiphersuiteMismatch.into());
        }
        if group_context.protocol_version() != ProtocolVersion::Mls10 {
            return Err(WelcomeError::UnsupportedMlsVersion.into());
        }

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
            return Err(WelcomeError::TreeHashMismatch.into());
        }

        let signer_leaf = tree
            .leaf(group_info.signer())
            .ok_or(WelcomeError::UnknownSigner)?;
        group_info
            .verify(crypto, signer_leaf.signature_key())
            .map_err(|_| WelcomeError::InvalidGroupInfoSignature)?;

        let own_leaf = tree
            .find_leaf(key_package.leaf_node())
            .ok_or(UsageError::OwnLeafNotFound)?;
        if let Some(required_capabilities) = group_context.required_capabilities() {
            key_package
                .leaf_node()
                .capabilities()
                .supports_required_capabilities(required_capabilities)
                .map_err(|_| WelcomeError::UnsupportedCapability)?;
        }

        let mut consumed = ConsumedSecrets::default();
        let serialized_group_context = group_context
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        key_schedule.add_context(crypto, &serialized_group_context)?;
        let (epoch_secrets, encryption_secret) = key_schedule.epoch_secrets(crypto, &mut consumed)?;

        let confirmation_tag = epoch_secrets.confirmation_key().tag(
            crypto,
            ciphersuite,
            group_context.confirmed_transcript_hash(),
        )?;
        if !equal_ct(
            confirmation_tag.as_slice(),
            group_info.confirmation_tag().as_slice(),
        ) {
            log::error!("Confirmation tag mismatch in the welcome");
            return Err(WelcomeError::ConfirmationTagMismatch.into());
        }

        let mut private_tree =
            PrivateTree::new(own_leaf, key_package_bundle.encryption_key_pair().clone());
        if let Some(path_secret) = group_secrets.path_secret() {
            let nodes = tree
                .derive_path_from_welcome(
                    crypto,
                    ciphersuite,
                    group_info.signer(),
                    own_leaf,
                    path_secret,
                )
                .map_err(|e| match e {
                    TreeSyncError::PathMismatch => WelcomeError::PathSecretMismatch.into(),
                    e => ArborError::from(e),
                })?;
            for path_secret in private_tree.set_path_keys(nodes) {
                consumed.push(path_secret.into_secret());
            }
        }

        let interim_transcript_hash = update_interim_transcript_hash(
            crypto,
            ciphersuite,
            group_context.confirmed_transcript_hash(),
            group_info.confirmation_tag(),
        )?;
        log::debug!(
            "Joined group {:x?} at leaf {own_leaf:?} in epoch {}",
            group_context.group_id().as_slice(),
            group_context.epoch()
        );

        let resumption_psk_store = ResumptionPskStore::new(config.max_resumption_psks());
        Ok(ClientState::from_next_epoch(
            NextEpoch {
                group_context,
                tree,
                private_tree,
                epoch_secrets,
                encryption_secret,
                interim_transcript_hash,
                confirmation_tag,
                reinit: None,
            },
            resumption_psk_store,
            external_psks,
            config,
        ))
    }
}
