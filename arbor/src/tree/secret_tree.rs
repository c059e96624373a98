//! # Secret tree
//!
//! The encryption secret of an epoch sits at the root of a tree with the same
//! shape as the ratchet tree. Secrets are derived down towards a leaf only
//! when a message of that leaf is protected, and every inner secret is deleted
//! once both children are derived:
//!
//! ```text
//! tree_node_[N]_secret
//!         |
//!         +--> ExpandWithLabel(., "tree", "left", KDF.Nh)  = left child
//!         +--> ExpandWithLabel(., "tree", "right", KDF.Nh) = right child
//!
//! leaf_secret
//!         +--> ExpandWithLabel(., "handshake", "", KDF.Nh)   = handshake_ratchet_secret_[N]_[0]
//!         +--> ExpandWithLabel(., "application", "", KDF.Nh) = application_ratchet_secret_[N]_[0]
//! ```

use arbor_traits::crypto::ArborCrypto;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::sender_ratchet::{
    DecryptionRatchet, RatchetKeyMaterial, RatchetSecret, SenderRatchet,
    SenderRatchetConfiguration,
};
use crate::{
    binary_tree::{direct_path, left, right, root, LeafNodeIndex, ParentNodeIndex, TreeNodeIndex, TreeSize},
    ciphersuite::{Ciphersuite, ConsumedSecrets, CryptoError, Secret},
    error::LibraryError,
    framing::ContentType,
    schedule::EncryptionSecret,
};

#[derive(Error, Debug, PartialEq, Clone)]
pub enum SecretTreeError {
    /// The generation dropped out of the window of retained keys.
    #[error("The generation is older than the retained window.")]
    TooDistantInThePast,
    #[error("The generation is further ahead than the sender may skip.")]
    TooDistantInTheFuture,
    /// The leaf is outside the tree.
    #[error("The leaf is not part of the secret tree.")]
    IndexOutOfBounds,
    /// The key material was handed out before and is gone.
    #[error("The key material of this generation was already used.")]
    SecretReuseError,
    /// Own leaf ratchets only encrypt, the others only decrypt.
    #[error("The ratchet of this leaf cannot be used in this direction.")]
    RatchetTypeError,
    #[error("The ratchet ran out of generations.")]
    RatchetTooLong,
    #[error(transparent)]
    LibraryError(#[from] LibraryError),
    #[error(transparent)]
    CryptoError(#[from] CryptoError),
}

/// Which of the two chains of a leaf protects a message.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SecretType {
    HandshakeSecret,
    ApplicationSecret,
}

impl From<ContentType> for SecretType {
    fn from(content_type: ContentType) -> SecretType {
        match content_type {
            ContentType::Application => SecretType::ApplicationSecret,
            ContentType::Commit | ContentType::Proposal => SecretType::HandshakeSecret,
        }
    }
}

/// ExpandWithLabel with the big endian generation as context.
pub(crate) fn derive_tree_secret(
    ciphersuite: Ciphersuite,
    secret: &Secret,
    label: &str,
    generation: u32,
    length: usize,
    crypto: &impl ArborCrypto,
) -> Result<Secret, SecretTreeError> {
    log::trace!("Tree secret \"{label}\" for generation {generation}, {length} bytes");
    let derived = secret.kdf_expand_label(
        crypto,
        ciphersuite,
        label,
        &generation.to_be_bytes(),
        length,
    )?;
    log_crypto!(trace, "{label} secret {:x?} -> {:x?}", secret.as_slice(), derived.as_slice());
    Ok(derived)
}

/// Both chains of one leaf. They are always started together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LeafRatchets {
    handshake: SenderRatchet,
    application: SenderRatchet,
}

impl LeafRatchets {
    fn start(own: bool, handshake: Secret, application: Secret) -> Self {
        let chain = |secret| {
            if own {
                SenderRatchet::EncryptionRatchet(RatchetSecret::initial_ratchet_secret(secret))
            } else {
                SenderRatchet::DecryptionRatchet(DecryptionRatchet::new(secret))
            }
        };
        Self {
            handshake: chain(handshake),
            application: chain(application),
        }
    }

    fn get(&self, secret_type: SecretType) -> &SenderRatchet {
        match secret_type {
            SecretType::HandshakeSecret => &self.handshake,
            SecretType::ApplicationSecret => &self.application,
        }
    }

    fn get_mut(&mut self, secret_type: SecretType) -> &mut SenderRatchet {
        match secret_type {
            SecretType::HandshakeSecret => &mut self.handshake,
            SecretType::ApplicationSecret => &mut self.application,
        }
    }
}

/// Per-epoch source of message keys.
///
/// `nodes` follows the array layout of the ratchet tree. A slot holds a
/// secret only while none of its children was derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SecretTree {
    own_index: LeafNodeIndex,
    size: TreeSize,
    nodes: Vec<Option<Secret>>,
    ratchets: Vec<Option<LeafRatchets>>,
}

impl SecretTree {
    /// Places `encryption_secret` at the root. Nothing else is derived until
    /// a leaf needs its keys.
    pub(crate) fn new(
        encryption_secret: EncryptionSecret,
        size: TreeSize,
        own_index: LeafNodeIndex,
    ) -> Self {
        let mut nodes = vec![None; size.node_count() as usize];
        if let Some(slot) = nodes.get_mut(root(size).u32() as usize) {
            *slot = Some(encryption_secret.into_secret());
        }
        Self {
            own_index,
            size,
            nodes,
            ratchets: vec![None; size.leaf_count() as usize],
        }
    }

    /// The next generation of the chain. Chains that were never started are
    /// at generation 0.
    pub(crate) fn generation(&self, index: LeafNodeIndex, secret_type: SecretType) -> u32 {
        self.ratchets
            .get(index.usize())
            .and_then(Option::as_ref)
            .map_or(0, |ratchets| ratchets.get(secret_type).generation())
    }

    /// Key material of another member's leaf in `generation`.
    pub(crate) fn secret_for_decryption(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl ArborCrypto,
        index: LeafNodeIndex,
        secret_type: SecretType,
        generation: u32,
        configuration: &SenderRatchetConfiguration,
        consumed: &mut ConsumedSecrets,
    ) -> Result<RatchetKeyMaterial, SecretTreeError> {
        log::debug!("{secret_type:?} key of leaf {index}, generation {generation}");
        match self.chain(ciphersuite, crypto, index, secret_type, consumed)? {
            SenderRatchet::DecryptionRatchet(ratchet) => ratchet.secret_for_decryption(
                ciphersuite,
                crypto,
                generation,
                configuration,
                consumed,
            ),
            SenderRatchet::EncryptionRatchet(_) => {
                log::error!("Own messages are never decrypted from the secret tree.");
                Err(SecretTreeError::RatchetTypeError)
            }
        }
    }

    /// Next key material of the own leaf, with its generation.
    pub(crate) fn secret_for_encryption(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl ArborCrypto,
        secret_type: SecretType,
        consumed: &mut ConsumedSecrets,
    ) -> Result<(u32, RatchetKeyMaterial), SecretTreeError> {
        let own_index = self.own_index;
        match self.chain(ciphersuite, crypto, own_index, secret_type, consumed)? {
            SenderRatchet::EncryptionRatchet(ratchet) => {
                ratchet.ratchet_forward(crypto, ciphersuite, consumed)
            }
            SenderRatchet::DecryptionRatchet(_) => {
                log::error!("The own leaf has a decryption ratchet.");
                Err(SecretTreeError::RatchetTypeError)
            }
        }
    }

    /// Replaces the head of a started chain with zeros.
    #[cfg(any(feature = "test-utils", test))]
    pub(crate) fn zero_ratchet_head(
        &mut self,
        index: LeafNodeIndex,
        secret_type: SecretType,
    ) -> Result<(), SecretTreeError> {
        self.ratchets
            .get_mut(index.usize())
            .and_then(Option::as_mut)
            .ok_or(SecretTreeError::IndexOutOfBounds)?
            .get_mut(secret_type)
            .zero_head();
        Ok(())
    }

    /// The chain of `index`, started on first use.
    fn chain(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl ArborCrypto,
        index: LeafNodeIndex,
        secret_type: SecretType,
        consumed: &mut ConsumedSecrets,
    ) -> Result<&mut SenderRatchet, SecretTreeError> {
        if !self.size.is_leaf_in_tree(index) {
            log::error!("Leaf {index} is outside a tree of {} leaves.", self.size.leaf_count());
            return Err(SecretTreeError::IndexOutOfBounds);
        }
        if self.ratchets[index.usize()].is_none() {
            let ratchets = self.start_ratchets(ciphersuite, crypto, index, consumed)?;
            self.ratchets[index.usize()] = Some(ratchets);
        }
        self.ratchets[index.usize()]
            .as_mut()
            .map(|ratchets| ratchets.get_mut(secret_type))
            .ok_or_else(|| LibraryError::custom("leaf ratchets were just started").into())
    }

    /// Derives the leaf secret of `index` from the closest ancestor that
    /// still has one, and turns it into the two chains.
    fn start_ratchets(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl ArborCrypto,
        index: LeafNodeIndex,
        consumed: &mut ConsumedSecrets,
    ) -> Result<LeafRatchets, SecretTreeError> {
        log::trace!("Starting the ratchets of leaf {index}");
        let leaf = TreeNodeIndex::Leaf(index);
        if self.slot(leaf)?.is_none() {
            let mut pending = Vec::new();
            for ancestor in direct_path(index, self.size) {
                pending.push(ancestor);
                if self.slot(ancestor.into())?.is_some() {
                    break;
                }
            }
            for ancestor in pending.into_iter().rev() {
                self.split(ciphersuite, crypto, ancestor, consumed)?;
            }
        }

        let leaf_secret = self.slot(leaf)?.take().ok_or_else(|| {
            log::debug!("The secret of leaf {index} is gone.");
            SecretTreeError::SecretReuseError
        })?;
        let expand = |label| {
            leaf_secret.kdf_expand_label(crypto, ciphersuite, label, b"", ciphersuite.hash_length())
        };
        let handshake = expand("handshake")?;
        let application = expand("application")?;
        consumed.push(leaf_secret);
        log_crypto!(trace, "Chains of leaf {index}: {handshake:x?} / {application:x?}");

        Ok(LeafRatchets::start(index == self.own_index, handshake, application))
    }

    /// Moves the secret of `parent` into its two children.
    fn split(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl ArborCrypto,
        parent: ParentNodeIndex,
        consumed: &mut ConsumedSecrets,
    ) -> Result<(), SecretTreeError> {
        let secret = self
            .slot(parent.into())?
            .take()
            .ok_or_else(|| LibraryError::custom("parents are split from the top down"))?;
        let child = |side: &[u8]| {
            secret.kdf_expand_label(crypto, ciphersuite, "tree", side, ciphersuite.hash_length())
        };
        let (left_secret, right_secret) = (child(b"left")?, child(b"right")?);
        consumed.push(secret);
        *self.slot(left(parent))? = Some(left_secret);
        *self.slot(right(parent))? = Some(right_secret);
        Ok(())
    }

    fn slot(&mut self, index: TreeNodeIndex) -> Result<&mut Option<Secret>, SecretTreeError> {
        self.nodes
            .get_mut(index.u32() as usize)
            .ok_or(SecretTreeError::IndexOutOfBounds)
    }
}
