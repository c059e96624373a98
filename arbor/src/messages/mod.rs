//! # Messages
//!
//! This module contains the types and implementations for Commit & Welcome
//! messages, as well as Proposals & the group info used for External Commits.

use arbor_traits::{
    crypto::ArborCrypto,
    types::{Ciphersuite, HpkeCiphertext},
};
use serde::{Deserialize, Serialize};
use tls_codec::{
    Deserialize as TlsDeserializeTrait, SecretVLBytes, Serialize as TlsSerializeTrait,
    TlsDeserialize, TlsSerialize, TlsSize, VLBytes,
};

use crate::{
    ciphersuite::{
        decrypt_with_label, encrypt_with_label, hash_ref::KeyPackageRef, Mac, WELCOME_LABEL,
    },
    error::LibraryError,
    group::errors::WelcomeError,
    schedule::{psk::PreSharedKeyId, JoinerSecret},
    treesync::{node::encryption_keys::EncryptionPrivateKey, treekem::{PathSecret, UpdatePath}},
};

// Public
pub mod group_info;
pub mod proposals;

// Tests
#[cfg(test)]
mod tests;

use proposals::ProposalOrRef;

/// Welcome message
///
/// This message is generated when a new member is added to a group. The
/// invited member can use this message to join the group using
/// [`ClientState::join_group()`](crate::group::ClientState::join_group()).
///
/// ```text
/// struct {
///   CipherSuite cipher_suite;
///   EncryptedGroupSecrets secrets<V>;
///   opaque encrypted_group_info<V>;
/// } Welcome;
/// ```
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct Welcome {
    cipher_suite: Ciphersuite,
    secrets: Vec<EncryptedGroupSecrets>,
    encrypted_group_info: VLBytes,
}

impl Welcome {
    /// Create a new welcome message from the provided data.
    pub(crate) fn new(
        cipher_suite: Ciphersuite,
        secrets: Vec<EncryptedGroupSecrets>,
        encrypted_group_info: Vec<u8>,
    ) -> Self {
        Self {
            cipher_suite,
            secrets,
            encrypted_group_info: encrypted_group_info.into(),
        }
    }

    /// Returns the ciphersuite of this Welcome message.
    pub fn ciphersuite(&self) -> Ciphersuite {
        self.cipher_suite
    }

    /// Returns a reference to the encrypted group secrets in this Welcome message.
    pub fn secrets(&self) -> &[EncryptedGroupSecrets] {
        &self.secrets
    }

    /// Returns a reference to the encrypted group info.
    pub(crate) fn encrypted_group_info(&self) -> &[u8] {
        self.encrypted_group_info.as_slice()
    }

    #[cfg(test)]
    pub(crate) fn set_encrypted_group_info(&mut self, encrypted_group_info: Vec<u8>) {
        self.encrypted_group_info = encrypted_group_info.into();
    }
}

/// EncryptedGroupSecrets
///
/// This is part of a [`Welcome`] message. It can be used to correlate the
/// correct secrets with each new member.
#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct EncryptedGroupSecrets {
    /// Key package reference of the new member
    new_member: KeyPackageRef,
    /// Ciphertext of the encrypted group secret
    encrypted_group_secrets: HpkeCiphertext,
}

impl EncryptedGroupSecrets {
    /// Returns the encrypted group secrets' new [`KeyPackageRef`].
    pub fn new_member(&self) -> &KeyPackageRef {
        &self.new_member
    }
}

/// Commit.
///
/// A Commit message initiates a new epoch for the group, based on a
/// collection of Proposals. It instructs group members to update their
/// representation of the state of the group by applying the proposals and
/// advancing the key schedule.
///
/// ```text
/// struct {
///     ProposalOrRef proposals<V>;
///     optional<UpdatePath> path;
/// } Commit;
/// ```
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct Commit {
    pub(crate) proposals: Vec<ProposalOrRef>,
    pub(crate) path: Option<UpdatePath>,
}

impl Commit {
    /// The proposals covered by this commit, by value or by reference.
    pub fn proposals(&self) -> &[ProposalOrRef] {
        &self.proposals
    }

    /// Returns the update path of the Commit if it has one.
    pub fn path(&self) -> Option<&UpdatePath> {
        self.path.as_ref()
    }

    /// Returns `true` if the commit contains an update path.
    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }
}

/// Confirmation tag field of a commit. For type safety this is a wrapper
/// around a `Mac`.
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct ConfirmationTag(pub(crate) Mac);

impl ConfirmationTag {
    /// The raw tag.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// The secrets a new member needs to join.
///
/// ```text
/// struct {
///   opaque path_secret<V>;
/// } PathSecret;
///
/// struct {
///   opaque joiner_secret<V>;
///   optional<PathSecret> path_secret;
///   PreSharedKeyID psks<V>;
/// } GroupSecrets;
/// ```
#[derive(Debug, TlsSerialize, TlsDeserialize, TlsSize)]
pub(crate) struct GroupSecrets {
    joiner_secret: SecretVLBytes,
    path_secret: Option<SecretVLBytes>,
    psks: Vec<PreSharedKeyId>,
}

impl GroupSecrets {
    pub(crate) fn new(
        joiner_secret: &JoinerSecret,
        path_secret: Option<&PathSecret>,
        psks: Vec<PreSharedKeyId>,
    ) -> Self {
        Self {
            joiner_secret: joiner_secret.as_slice().into(),
            path_secret: path_secret.map(|path_secret| path_secret.secret().as_slice().into()),
            psks,
        }
    }

    /// Encrypt the group secrets to the init key of a new member, bound to
    /// the encrypted group info of the same welcome.
    pub(crate) fn encrypt(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        new_member: KeyPackageRef,
        init_key: &[u8],
        encrypted_group_info: &[u8],
    ) -> Result<EncryptedGroupSecrets, LibraryError> {
        let group_secrets_bytes = self
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        let encrypted_group_secrets = encrypt_with_label(
            init_key,
            WELCOME_LABEL,
            encrypted_group_info,
            &group_secrets_bytes,
            ciphersuite,
            crypto,
        )
        .map_err(LibraryError::unexpected_crypto_error)?;
        Ok(EncryptedGroupSecrets {
            new_member,
            encrypted_group_secrets,
        })
    }

    /// Decrypt the group secrets addressed to a key package.
    pub(crate) fn decrypt(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        encrypted_group_secrets: &EncryptedGroupSecrets,
        init_private_key: &EncryptionPrivateKey,
        encrypted_group_info: &[u8],
    ) -> Result<Self, WelcomeError> {
        let group_secrets_bytes = decrypt_with_label(
            init_private_key.key(),
            WELCOME_LABEL,
            encrypted_group_info,
            &encrypted_group_secrets.encrypted_group_secrets,
            ciphersuite,
            crypto,
        )?;
        GroupSecrets::tls_deserialize_exact(&group_secrets_bytes).map_err(WelcomeError::CodecError)
    }

    pub(crate) fn joiner_secret(&self) -> JoinerSecret {
        JoinerSecret::from_slice(self.joiner_secret.as_slice())
    }

    pub(crate) fn path_secret(&self) -> Option<PathSecret> {
        self.path_secret
            .as_ref()
            .map(|path_secret| crate::ciphersuite::Secret::from_slice(path_secret.as_slice()).into())
    }

    pub(crate) fn psks(&self) -> &[PreSharedKeyId] {
        &self.psks
    }
}
