//! Leaf nodes: a member's keys, credential and capabilities, signed by the
//! member.

use arbor_traits::{crypto::ArborCrypto, random::ArborRand, signatures::Signer};
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, Size, TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use super::encryption_keys::{EncryptionKey, EncryptionKeyPair};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{
        signable::{Signable, SignatureError, SignedStruct, Verifiable},
        Ciphersuite, Signature, SignaturePublicKey,
    },
    credentials::{AuthenticationService, Credential, CredentialWithKey},
    error::LibraryError,
    extensions::{ExtensionType, Extensions},
    group::GroupId,
    key_packages::Lifetime,
    treesync::errors::{LeafNodeValidationError, TreeSyncError},
    versions::ProtocolVersion,
};

mod capabilities;

pub use capabilities::*;

const SIGN_LABEL: &str = "LeafNodeTBS";

/// What a member picks for its own leaf. The encryption key and the source
/// are supplied when the leaf is built.
#[derive(Debug, PartialEq, Clone)]
pub(crate) struct LeafNodeParams {
    pub(crate) credential_with_key: CredentialWithKey,
    pub(crate) capabilities: Capabilities,
    pub(crate) extensions: Extensions,
}

impl LeafNodeParams {
    /// Carries the choices of `leaf_node` over to a replacement leaf.
    pub(crate) fn derive(leaf_node: &LeafNode) -> Self {
        let LeafNodeContent {
            signature_key,
            credential,
            capabilities,
            extensions,
            ..
        } = leaf_node.content.clone();
        Self {
            credential_with_key: CredentialWithKey {
                credential,
                signature_key,
            },
            capabilities,
            extensions,
        }
    }
}

/// A signed leaf.
///
/// Update and commit leaves are signed over their [`TreePosition`] as well,
/// which is not part of the encoding and has to be supplied on verification.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct LeafNode {
    content: LeafNodeContent,
    signature: Signature,
}

impl LeafNode {
    /// Builds and signs a leaf around a freshly drawn encryption key pair.
    /// The private half is returned for the caller to keep.
    pub(crate) fn new(
        crypto: &impl ArborCrypto,
        rand: &impl ArborRand,
        signer: &impl Signer,
        ciphersuite: Ciphersuite,
        params: LeafNodeParams,
        leaf_node_source: LeafNodeSource,
        tree_info_tbs: TreeInfoTbs,
    ) -> Result<(Self, EncryptionKeyPair), TreeSyncError> {
        let key_pair = EncryptionKeyPair::random(crypto, rand, ciphersuite)?;
        let encryption_key = key_pair.public_key().clone();
        let leaf_node =
            Self::new_with_key(encryption_key, params, leaf_node_source, tree_info_tbs, signer)?;
        Ok((leaf_node, key_pair))
    }

    /// Builds and signs a leaf for a known encryption key.
    pub(crate) fn new_with_key(
        encryption_key: EncryptionKey,
        params: LeafNodeParams,
        leaf_node_source: LeafNodeSource,
        tree_info_tbs: TreeInfoTbs,
        signer: &impl Signer,
    ) -> Result<Self, SignatureError> {
        let LeafNodeParams {
            credential_with_key,
            capabilities,
            extensions,
        } = params;
        let content = LeafNodeContent {
            encryption_key,
            signature_key: credential_with_key.signature_key,
            credential: credential_with_key.credential,
            capabilities,
            leaf_node_source,
            extensions,
        };
        LeafNodeTbs {
            content,
            tree_info_tbs,
        }
        .sign(signer)
    }

    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.content.encryption_key
    }

    pub fn signature_key(&self) -> &SignaturePublicKey {
        &self.content.signature_key
    }

    pub fn credential(&self) -> &Credential {
        &self.content.credential
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.content.capabilities
    }

    pub fn extensions(&self) -> &Extensions {
        &self.content.extensions
    }

    pub fn leaf_node_source(&self) -> &LeafNodeSource {
        &self.content.leaf_node_source
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Set only for leaves from a commit's update path.
    pub fn parent_hash(&self) -> Option<&[u8]> {
        match self.leaf_node_source() {
            LeafNodeSource::Commit(parent_hash) => Some(parent_hash.as_slice()),
            LeafNodeSource::KeyPackage(_) | LeafNodeSource::Update => None,
        }
    }

    /// Set only for leaves from key packages.
    pub fn lifetime(&self) -> Option<&Lifetime> {
        match self.leaf_node_source() {
            LeafNodeSource::KeyPackage(lifetime) => Some(lifetime),
            LeafNodeSource::Update | LeafNodeSource::Commit(_) => None,
        }
    }

    /// Fails with [`LeafNodeValidationError::UnsupportedExtensions`] unless
    /// every type in `required` is listed in the capabilities.
    pub(crate) fn check_extension_support(
        &self,
        required: &[ExtensionType],
    ) -> Result<(), LeafNodeValidationError> {
        let capabilities = self.capabilities();
        match required
            .iter()
            .find(|extension_type| !capabilities.supports_extension_type(**extension_type))
        {
            Some(missing) => {
                log::error!("Required extension {missing:?} is missing from {capabilities:?}");
                Err(LeafNodeValidationError::UnsupportedExtensions)
            }
            None => Ok(()),
        }
    }

    /// The checks that need nothing but the leaf itself: its capabilities
    /// must cover its own extensions and credential type, protocol version 1.0
    /// and `ciphersuite`.
    pub(crate) fn validate_locally(
        &self,
        ciphersuite: Ciphersuite,
    ) -> Result<(), LeafNodeValidationError> {
        let capabilities = self.capabilities();
        if !capabilities.contains_extensions(self.extensions()) {
            log::error!(
                "Leaf uses extensions {:?} beyond its capabilities {capabilities:?}",
                self.extensions()
            );
            Err(LeafNodeValidationError::UnsupportedExtensions)
        } else if !capabilities.supports_credential_type(self.credential().credential_type()) {
            Err(LeafNodeValidationError::UnsupportedCredentials)
        } else if !capabilities.supports_version(ProtocolVersion::Mls10) {
            Err(LeafNodeValidationError::UnsupportedVersion)
        } else if !capabilities.supports_ciphersuite(ciphersuite) {
            Err(LeafNodeValidationError::UnsupportedCiphersuite)
        } else {
            Ok(())
        }
    }

    /// Checks the signature. `tree_position` is required for update and
    /// commit leaves and ignored for key package leaves.
    pub(crate) fn verify(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        tree_position: Option<TreePosition>,
    ) -> Result<(), SignatureError> {
        let tree_info_tbs = match (self.leaf_node_source(), tree_position) {
            (LeafNodeSource::KeyPackage(_), _) => TreeInfoTbs::KeyPackage,
            (LeafNodeSource::Update, Some(position)) => TreeInfoTbs::Update(position),
            (LeafNodeSource::Commit(_), Some(position)) => TreeInfoTbs::Commit(position),
            (_, None) => {
                return Err(LibraryError::custom("leaf position needed for verification").into())
            }
        };
        SignedLeafNode {
            leaf_node: self,
            tree_info_tbs,
        }
        .verify(crypto, ciphersuite, self.signature_key())
    }

    /// Signature, local checks and the authentication service, in that order.
    pub(crate) fn validate(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        tree_position: Option<TreePosition>,
        authentication_service: &dyn AuthenticationService,
    ) -> Result<(), TreeSyncError> {
        self.verify(crypto, ciphersuite, tree_position)?;
        self.validate_locally(ciphersuite)?;
        if authentication_service.validate_credential(self.credential(), self.signature_key()) {
            Ok(())
        } else {
            Err(LeafNodeValidationError::InvalidCredential.into())
        }
    }

    #[cfg(test)]
    pub(crate) fn corrupt_signature(&mut self) {
        let mut bytes = self.signature.as_slice().to_vec();
        if let Some(first) = bytes.first_mut() {
            *first ^= 0x01;
        }
        self.signature = bytes.into();
    }
}

/// Everything of a [`LeafNode`] except the signature, in wire order.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
struct LeafNodeContent {
    encryption_key: EncryptionKey,
    signature_key: SignaturePublicKey,
    credential: Credential,
    capabilities: Capabilities,
    leaf_node_source: LeafNodeSource,
    extensions: Extensions,
}

/// How a leaf entered the tree, with the data that comes with each way.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
#[repr(u8)]
pub enum LeafNodeSource {
    #[tls_codec(discriminant = 1)]
    KeyPackage(Lifetime),
    #[tls_codec(discriminant = 2)]
    Update,
    #[tls_codec(discriminant = 3)]
    Commit(ParentHash),
}

pub type ParentHash = VLBytes;

/// Binds an update or commit leaf to one slot of one group.
#[derive(Debug, Clone, PartialEq, Eq, TlsSerialize, TlsSize)]
pub(crate) struct TreePosition {
    group_id: GroupId,
    leaf_index: LeafNodeIndex,
}

impl TreePosition {
    pub(crate) fn new(group_id: GroupId, leaf_index: LeafNodeIndex) -> Self {
        Self {
            group_id,
            leaf_index,
        }
    }
}

/// The context a leaf is signed in. Key package leaves have none.
#[derive(Debug)]
pub(crate) enum TreeInfoTbs {
    KeyPackage,
    Update(TreePosition),
    Commit(TreePosition),
}

impl TreeInfoTbs {
    fn position(&self) -> Option<&TreePosition> {
        match self {
            TreeInfoTbs::KeyPackage => None,
            TreeInfoTbs::Update(position) | TreeInfoTbs::Commit(position) => Some(position),
        }
    }
}

impl Size for TreeInfoTbs {
    fn tls_serialized_len(&self) -> usize {
        self.position().map_or(0, Size::tls_serialized_len)
    }
}

impl TlsSerializeTrait for TreeInfoTbs {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        self.position()
            .map_or(Ok(0), |position| position.tls_serialize(writer))
    }
}

#[derive(Debug, TlsSerialize, TlsSize)]
pub(crate) struct LeafNodeTbs {
    content: LeafNodeContent,
    tree_info_tbs: TreeInfoTbs,
}

impl Signable for LeafNodeTbs {
    type SignedOutput = LeafNode;

    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tls_serialize_detached()
    }

    fn label(&self) -> &str {
        SIGN_LABEL
    }
}

impl SignedStruct<LeafNodeTbs> for LeafNode {
    fn from_payload(tbs: LeafNodeTbs, signature: Signature) -> Self {
        Self {
            content: tbs.content,
            signature,
        }
    }
}

/// A received leaf paired with the context it claims to be signed in.
struct SignedLeafNode<'a> {
    leaf_node: &'a LeafNode,
    tree_info_tbs: TreeInfoTbs,
}

impl Verifiable for SignedLeafNode<'_> {
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        let mut payload = self.leaf_node.content.tls_serialize_detached()?;
        self.tree_info_tbs.tls_serialize(&mut payload)?;
        Ok(payload)
    }

    fn signature(&self) -> &Signature {
        self.leaf_node.signature()
    }

    fn label(&self) -> &str {
        SIGN_LABEL
    }
}
