//! # Sender ratchets
//!
//! Every leaf of the secret tree starts two hash chains, one for handshake
//! and one for application messages:
//!
//! ```text
//! secret[j]
//!     |
//!     +--> DeriveTreeSecret(., "nonce", j, AEAD.Nn) = nonce[j]
//!     +--> DeriveTreeSecret(., "key",   j, AEAD.Nk) = key[j]
//!     V
//! DeriveTreeSecret(., "secret", j, KDF.Nh) = secret[j+1]
//! ```
//!
//! The own leaf only ever encrypts and uses an [`EncryptionRatchet`]. All
//! other leaves use a [`DecryptionRatchet`], which keeps the key material of
//! a bounded number of skipped generations to tolerate reordering.

use std::collections::VecDeque;

use arbor_traits::crypto::ArborCrypto;
use serde::{Deserialize, Serialize};

use super::secret_tree::{derive_tree_secret, SecretTreeError};
use crate::ciphersuite::{AeadKey, AeadNonce, Ciphersuite, ConsumedSecrets, Secret};

/// The key and nonce of one generation.
pub(crate) type RatchetKeyMaterial = (AeadKey, AeadNonce);

/// Bounds of the window of retained past generations.
///
/// `out_of_order_tolerance` is the number of generations before the newest
/// one that stay decryptable. `maximum_forward_distance` is the number of
/// generations a sender may skip ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderRatchetConfiguration {
    out_of_order_tolerance: u32,
    maximum_forward_distance: u32,
}

impl SenderRatchetConfiguration {
    /// Create a new configuration.
    pub fn new(out_of_order_tolerance: u32, maximum_forward_distance: u32) -> Self {
        Self {
            out_of_order_tolerance,
            maximum_forward_distance,
        }
    }

    /// Number of past generations that stay decryptable.
    pub fn out_of_order_tolerance(&self) -> u32 {
        self.out_of_order_tolerance
    }

    /// Number of generations a sender may skip ahead.
    pub fn maximum_forward_distance(&self) -> u32 {
        self.maximum_forward_distance
    }
}

impl Default for SenderRatchetConfiguration {
    fn default() -> Self {
        Self::new(5, 1000)
    }
}

/// The head of a hash chain: the secret of the next unused generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RatchetSecret {
    secret: Secret,
    generation: u32,
}

impl RatchetSecret {
    pub(crate) fn initial_ratchet_secret(secret: Secret) -> Self {
        Self {
            secret,
            generation: 0,
        }
    }

    pub(crate) fn generation(&self) -> u32 {
        self.generation
    }

    /// Derive the key material of the current generation and move the head
    /// to the next one. The replaced secret ends up in `consumed`.
    pub(crate) fn ratchet_forward(
        &mut self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        consumed: &mut ConsumedSecrets,
    ) -> Result<(u32, RatchetKeyMaterial), SecretTreeError> {
        log::trace!("Ratcheting forward in generation {}.", self.generation);
        if self.generation == u32::MAX {
            return Err(SecretTreeError::RatchetTooLong);
        }
        let nonce = derive_tree_secret(
            ciphersuite,
            &self.secret,
            "nonce",
            self.generation,
            ciphersuite.aead_nonce_length(),
            crypto,
        )?;
        let key = derive_tree_secret(
            ciphersuite,
            &self.secret,
            "key",
            self.generation,
            ciphersuite.aead_key_length(),
            crypto,
        )?;
        let next_secret = derive_tree_secret(
            ciphersuite,
            &self.secret,
            "secret",
            self.generation,
            ciphersuite.hash_length(),
            crypto,
        )?;
        let generation = self.generation;
        consumed.push(std::mem::replace(&mut self.secret, next_secret));
        self.generation += 1;
        Ok((
            generation,
            (
                AeadKey::from_secret(&key, ciphersuite),
                AeadNonce::from_secret(&nonce)?,
            ),
        ))
    }

    #[cfg(any(feature = "test-utils", test))]
    pub(crate) fn zero_secret(&mut self) {
        self.secret = Secret::from_slice(&vec![0u8; self.secret.as_slice().len()]);
    }
}

/// The ratchet of another member's leaf.
///
/// `past_secrets` holds the key material of the generations just before the
/// head, newest first. An entry is `None` once its generation was used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DecryptionRatchet {
    past_secrets: VecDeque<Option<RatchetKeyMaterial>>,
    ratchet_head: RatchetSecret,
}

impl DecryptionRatchet {
    pub(crate) fn new(secret: Secret) -> Self {
        Self {
            past_secrets: VecDeque::new(),
            ratchet_head: RatchetSecret::initial_ratchet_secret(secret),
        }
    }

    /// The generation of the ratchet head.
    pub(crate) fn generation(&self) -> u32 {
        self.ratchet_head.generation()
    }

    fn prune_past_secrets(&mut self, configuration: &SenderRatchetConfiguration) {
        self.past_secrets
            .truncate(configuration.out_of_order_tolerance() as usize)
    }

    /// The key material for `generation`.
    ///
    /// Generations ahead of the head ratchet the chain forward; the skipped
    /// ones are kept in the window. Generations behind the head are taken out
    /// of the window, so each one can be used once.
    pub(crate) fn secret_for_decryption(
        &mut self,
        ciphersuite: Ciphersuite,
        crypto: &impl ArborCrypto,
        generation: u32,
        configuration: &SenderRatchetConfiguration,
        consumed: &mut ConsumedSecrets,
    ) -> Result<RatchetKeyMaterial, SecretTreeError> {
        let head = self.generation();
        if generation > head.saturating_add(configuration.maximum_forward_distance()) {
            log::debug!("Generation {generation} is too far ahead of {head}.");
            return Err(SecretTreeError::TooDistantInTheFuture);
        }
        if generation < head && head - generation > configuration.out_of_order_tolerance() {
            log::debug!("Generation {generation} is too far behind {head}.");
            return Err(SecretTreeError::TooDistantInThePast);
        }

        if generation >= head {
            for _ in head..generation {
                let (_, key_material) =
                    self.ratchet_head
                        .ratchet_forward(crypto, ciphersuite, consumed)?;
                self.past_secrets.push_front(Some(key_material));
            }
            let (_, key_material) =
                self.ratchet_head
                    .ratchet_forward(crypto, ciphersuite, consumed)?;
            // Placeholder for the generation handed out now.
            self.past_secrets.push_front(None);
            self.prune_past_secrets(configuration);
            Ok(key_material)
        } else {
            let index = (head - generation - 1) as usize;
            self.past_secrets
                .get_mut(index)
                .ok_or(SecretTreeError::TooDistantInThePast)?
                .take()
                .ok_or(SecretTreeError::SecretReuseError)
        }
    }

    #[cfg(any(feature = "test-utils", test))]
    pub(crate) fn zero_head(&mut self) {
        self.ratchet_head.zero_secret()
    }
}

/// The ratchet of the own leaf.
pub(crate) type EncryptionRatchet = RatchetSecret;

/// Either kind of sender ratchet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum SenderRatchet {
    EncryptionRatchet(EncryptionRatchet),
    DecryptionRatchet(DecryptionRatchet),
}

impl SenderRatchet {
    pub(crate) fn generation(&self) -> u32 {
        match self {
            SenderRatchet::EncryptionRatchet(enc_ratchet) => enc_ratchet.generation(),
            SenderRatchet::DecryptionRatchet(dec_ratchet) => dec_ratchet.generation(),
        }
    }

    #[cfg(any(feature = "test-utils", test))]
    pub(crate) fn zero_head(&mut self) {
        match self {
            SenderRatchet::EncryptionRatchet(enc_ratchet) => enc_ratchet.zero_secret(),
            SenderRatchet::DecryptionRatchet(dec_ratchet) => dec_ratchet.zero_head(),
        }
    }
}
