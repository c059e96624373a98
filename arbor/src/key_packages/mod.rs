//! # Key Packages
//!
//! Key packages are pre-published public keys that provide some information
//! about a client in order to facilitate the asynchronous addition of clients
//! to a group.
//!
//! A key package specifies:
//!
//! - A **protocol version** and ciphersuite that the client supports
//! - An **init key** that a `Welcome` is encrypted to
//! - A **leaf node** with the client's credential, capabilities and the
//!   encryption key it will use once it is in the tree
//! - A list of **extensions** for the key package itself
//!
//! The whole structure is signed with the client's signature key.
//!
//! Key packages are intended to be used only once. The init key MUST differ
//! from the encryption key of the leaf node.
//!
//! ## Creating key package bundles
//!
//! A [`KeyPackageBundle`] is a key package together with the private keys of
//! the init key and of the leaf node. Bundles are created with a
//! [`KeyPackageBuilder`]:
//!
//! ```ignore
//! let bundle = KeyPackage::builder()
//!     .lifetime(Lifetime::new(60 * 60 * 24))
//!     .build(&provider, ciphersuite, &signer, credential_with_key)?;
//! ```

use arbor_traits::{crypto::ArborCrypto, signatures::Signer, ArborProvider};
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, TlsDeserialize, TlsSerialize, TlsSize};

use crate::{
    ciphersuite::{
        hash_ref::{make_key_package_ref, KeyPackageRef},
        signable::{Signable, SignedStruct, Verifiable},
        Ciphersuite, HpkePublicKey, Signature,
    },
    credentials::{AuthenticationService, CredentialWithKey},
    error::LibraryError,
    extensions::{ExtensionType, Extensions},
    treesync::{
        errors::{LeafNodeValidationError, TreeSyncError},
        node::{
            encryption_keys::{EncryptionKeyPair, EncryptionPrivateKey},
            leaf_node::{Capabilities, LeafNode, LeafNodeParams, LeafNodeSource, TreeInfoTbs},
        },
    },
    versions::ProtocolVersion,
};

mod lifetime;

pub mod errors;

#[cfg(test)]
mod tests;

pub use lifetime::Lifetime;

use errors::{KeyPackageNewError, KeyPackageVerifyError};

const SIGN_LABEL: &str = "KeyPackageTBS";

/// Everything of a key package except the signature.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
struct KeyPackageTbs {
    protocol_version: ProtocolVersion,
    ciphersuite: Ciphersuite,
    init_key: HpkePublicKey,
    leaf_node: LeafNode,
    extensions: Extensions,
}

impl Signable for KeyPackageTbs {
    type SignedOutput = KeyPackage;

    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tls_serialize_detached()
    }

    fn label(&self) -> &str {
        SIGN_LABEL
    }
}

/// A signed, single use invitation: the init key a `Welcome` is sealed to
/// and the leaf the client will occupy, signed with the leaf's signature
/// key.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct KeyPackage {
    tbs: KeyPackageTbs,
    signature: Signature,
}

impl SignedStruct<KeyPackageTbs> for KeyPackage {
    fn from_payload(tbs: KeyPackageTbs, signature: Signature) -> Self {
        Self { tbs, signature }
    }
}

impl Verifiable for KeyPackage {
    fn unsigned_payload(&self) -> Result<Vec<u8>, tls_codec::Error> {
        self.tbs.unsigned_payload()
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn label(&self) -> &str {
        SIGN_LABEL
    }
}

impl KeyPackage {
    /// Create a key package builder.
    pub fn builder() -> KeyPackageBuilder {
        KeyPackageBuilder::new()
    }

    /// Compute the [`KeyPackageRef`] of this [`KeyPackage`].
    pub fn hash_ref(&self, crypto: &impl ArborCrypto) -> Result<KeyPackageRef, LibraryError> {
        let encoded = self
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        make_key_package_ref(&encoded, self.tbs.ciphersuite, crypto)
            .map_err(LibraryError::unexpected_crypto_error)
    }

    /// Get the [`Ciphersuite`].
    pub fn ciphersuite(&self) -> Ciphersuite {
        self.tbs.ciphersuite
    }

    /// Get the protocol version.
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.tbs.protocol_version
    }

    /// Get the [`LeafNode`] reference.
    pub fn leaf_node(&self) -> &LeafNode {
        &self.tbs.leaf_node
    }

    /// Get the public HPKE init key.
    pub fn init_key(&self) -> &HpkePublicKey {
        &self.tbs.init_key
    }

    /// Get the extensions of the key package.
    pub fn extensions(&self) -> &Extensions {
        &self.tbs.extensions
    }

    /// Validate a key package received for a group with the given protocol
    /// version and ciphersuite:
    ///
    /// - the signatures of the key package and of its leaf node
    /// - the leaf node source is `key_package` and its lifetime is valid
    /// - the init key differs from the encryption key
    /// - version and ciphersuite match the group
    /// - the leaf node covers its own extensions and those of the key package
    /// - the authentication service accepts the credential
    pub(crate) fn validate(
        &self,
        crypto: &impl ArborCrypto,
        protocol_version: ProtocolVersion,
        ciphersuite: Ciphersuite,
        authentication_service: &dyn AuthenticationService,
    ) -> Result<(), KeyPackageVerifyError> {
        let leaf_node = self.leaf_node();
        Verifiable::verify(self, crypto, self.ciphersuite(), leaf_node.signature_key())
            .map_err(|_| KeyPackageVerifyError::InvalidSignature)?;
        leaf_node
            .verify(crypto, self.ciphersuite(), None)
            .map_err(|_| KeyPackageVerifyError::InvalidLeafNodeSignature)?;

        match leaf_node.leaf_node_source() {
            LeafNodeSource::KeyPackage(lifetime) => {
                if !lifetime.is_valid() {
                    log::debug!(
                        "Key package lifetime {}..{} is not valid.",
                        lifetime.not_before(),
                        lifetime.not_after()
                    );
                    return Err(KeyPackageVerifyError::InvalidLifetime);
                }
            }
            _ => return Err(KeyPackageVerifyError::InvalidLeafNodeSourceType),
        }

        if self.init_key().as_slice() == leaf_node.encryption_key().as_slice() {
            return Err(KeyPackageVerifyError::InitKeyEqualsEncryptionKey);
        }
        if self.protocol_version() != protocol_version {
            return Err(KeyPackageVerifyError::ProtocolVersionMismatch);
        }
        if self.ciphersuite() != ciphersuite {
            return Err(KeyPackageVerifyError::CiphersuiteMismatch);
        }

        leaf_node.validate_locally(ciphersuite)?;
        let extension_types: Vec<ExtensionType> = self
            .extensions()
            .iter()
            .map(|extension| extension.extension_type())
            .collect();
        leaf_node.check_extension_support(&extension_types)?;

        if !authentication_service
            .validate_credential(leaf_node.credential(), leaf_node.signature_key())
        {
            return Err(LeafNodeValidationError::InvalidCredential.into());
        }
        Ok(())
    }
}

#[cfg(test)]
impl KeyPackage {
    /// Replace the init key and re-sign.
    pub(crate) fn resign_with_init_key(
        self,
        init_key: HpkePublicKey,
        signer: &impl Signer,
    ) -> Self {
        let mut payload = self.tbs;
        payload.init_key = init_key;
        payload.sign(signer).expect("signing failed")
    }

    pub(crate) fn signature_mut(&mut self) -> &mut Signature {
        &mut self.signature
    }
}

/// A key package with the private keys that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPackageBundle {
    key_package: KeyPackage,
    init_private_key: EncryptionPrivateKey,
    encryption_key_pair: EncryptionKeyPair,
}

impl KeyPackageBundle {
    /// The public key package.
    pub fn key_package(&self) -> &KeyPackage {
        &self.key_package
    }

    pub(crate) fn init_private_key(&self) -> &EncryptionPrivateKey {
        &self.init_private_key
    }

    pub(crate) fn encryption_key_pair(&self) -> &EncryptionKeyPair {
        &self.encryption_key_pair
    }
}

/// Builder for [`KeyPackageBundle`]s.
#[derive(Debug, Clone, Default)]
pub struct KeyPackageBuilder {
    lifetime: Option<Lifetime>,
    capabilities: Option<Capabilities>,
    leaf_node_extensions: Option<Extensions>,
    key_package_extensions: Option<Extensions>,
}

impl KeyPackageBuilder {
    /// Create a key package builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lifetime of the leaf node.
    pub fn lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = Some(lifetime);
        self
    }

    /// Set the capabilities of the leaf node.
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Set the extensions of the leaf node.
    pub fn leaf_node_extensions(mut self, extensions: Extensions) -> Self {
        self.leaf_node_extensions = Some(extensions);
        self
    }

    /// Set the extensions of the key package.
    pub fn key_package_extensions(mut self, extensions: Extensions) -> Self {
        self.key_package_extensions = Some(extensions);
        self
    }

    /// Create the key package and its private keys.
    pub fn build(
        self,
        provider: &impl ArborProvider,
        ciphersuite: Ciphersuite,
        signer: &impl Signer,
        credential_with_key: CredentialWithKey,
    ) -> Result<KeyPackageBundle, KeyPackageNewError> {
        provider
            .crypto()
            .supports(ciphersuite)
            .map_err(|_| KeyPackageNewError::UnsupportedCiphersuite(ciphersuite))?;
        if signer.signature_scheme() != ciphersuite.signature_algorithm() {
            return Err(KeyPackageNewError::CiphersuiteSignatureSchemeMismatch);
        }

        let key_package_extensions = self.key_package_extensions.unwrap_or_default();
        key_package_extensions.check_unique()?;
        let leaf_node_extensions = self.leaf_node_extensions.unwrap_or_default();
        leaf_node_extensions.check_unique()?;

        let params = LeafNodeParams {
            credential_with_key,
            capabilities: self.capabilities.unwrap_or_default(),
            extensions: leaf_node_extensions,
        };
        let (leaf_node, encryption_key_pair) = LeafNode::new(
            provider.crypto(),
            provider.rand(),
            signer,
            ciphersuite,
            params,
            LeafNodeSource::KeyPackage(self.lifetime.unwrap_or_default()),
            TreeInfoTbs::KeyPackage,
        )
        .map_err(key_package_new_error)?;

        let init_key_pair =
            EncryptionKeyPair::random(provider.crypto(), provider.rand(), ciphersuite)?;
        let key_package = KeyPackageTbs {
            protocol_version: ProtocolVersion::default(),
            ciphersuite,
            init_key: HpkePublicKey::from(init_key_pair.public_key().as_slice()),
            leaf_node,
            extensions: key_package_extensions,
        }
        .sign(signer)?;
        log::debug!("Created key package for {ciphersuite}");

        Ok(KeyPackageBundle {
            key_package,
            init_private_key: init_key_pair.private_key().clone(),
            encryption_key_pair,
        })
    }
}

fn key_package_new_error(e: TreeSyncError) -> KeyPackageNewError {
    match e {
        TreeSyncError::CryptoError(e) => KeyPackageNewError::CryptoError(e),
        TreeSyncError::SignatureError(e) => KeyPackageNewError::SignatureError(e),
        TreeSyncError::LibraryError(e) => KeyPackageNewError::LibraryError(e),
        _ => KeyPackageNewError::LibraryError(LibraryError::custom(
            "unexpected error creating a leaf node",
        )),
    }
}
