//! # Pre-shared keys
//!
//! A PSK is named by a [`PreSharedKeyId`]: either an application chosen id
//! for a secret shared out of band, or a group id and epoch whose
//! resumption secret is reused. Every id carries a fresh nonce so the same
//! PSK can be injected more than once.

use std::collections::{BTreeMap, HashSet, VecDeque};

use arbor_traits::{crypto::ArborCrypto, random::ArborRand};
use serde::{Deserialize, Serialize};
use tls_codec::{Serialize as TlsSerializeTrait, TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use super::errors::PskError;
use crate::{
    ciphersuite::{Ciphersuite, CryptoError, Secret},
    error::LibraryError,
    group::{GroupEpoch, GroupId},
};

/// What a resumption PSK is injected for. Only `Application` may be
/// proposed inside a running group.
#[derive(
    Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
#[repr(u8)]
pub enum ResumptionPskUsage {
    Application = 1,
    Reinit = 2,
    Branch = 3,
}

/// A PSK the application manages itself, named by an opaque id.
#[derive(
    Debug, PartialEq, Eq, Clone, Hash, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct ExternalPsk {
    psk_id: VLBytes,
}

impl ExternalPsk {
    pub fn new(psk_id: Vec<u8>) -> Self {
        let psk_id = VLBytes::from(psk_id);
        Self { psk_id }
    }

    pub fn psk_id(&self) -> &[u8] {
        self.psk_id.as_slice()
    }
}

/// The resumption secret of `psk_epoch` in group `psk_group_id`.
#[derive(
    Debug, PartialEq, Eq, Clone, Hash, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct ResumptionPsk {
    pub(crate) usage: ResumptionPskUsage,
    pub(crate) psk_group_id: GroupId,
    pub(crate) psk_epoch: GroupEpoch,
}

impl ResumptionPsk {
    pub fn new(usage: ResumptionPskUsage, psk_group_id: GroupId, psk_epoch: GroupEpoch) -> Self {
        Self {
            usage,
            psk_group_id,
            psk_epoch,
        }
    }

    pub fn usage(&self) -> ResumptionPskUsage {
        self.usage
    }

    pub fn psk_group_id(&self) -> &GroupId {
        &self.psk_group_id
    }

    pub fn psk_epoch(&self) -> GroupEpoch {
        self.psk_epoch
    }
}

/// The different PSK types, tagged with their `PSKType` on the wire.
#[derive(
    Debug, PartialEq, Eq, Clone, Hash, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
#[repr(u8)]
pub enum Psk {
    #[tls_codec(discriminant = 1)]
    External(ExternalPsk),
    #[tls_codec(discriminant = 2)]
    Resumption(ResumptionPsk),
}

/// Names one PSK injection. Two ids for the same PSK differ in their nonce.
#[derive(
    Debug, PartialEq, Eq, Clone, Hash, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize,
)]
pub struct PreSharedKeyId {
    pub(crate) psk: Psk,
    pub(crate) psk_nonce: VLBytes,
}

impl PreSharedKeyId {
    /// Create a new `PreSharedKeyID` with a fresh nonce of the ciphersuite's
    /// hash length.
    pub fn new(
        ciphersuite: Ciphersuite,
        rand: &impl ArborRand,
        psk: Psk,
    ) -> Result<Self, CryptoError> {
        let psk_nonce = rand
            .random_vec(ciphersuite.hash_length())
            .map_err(|_| CryptoError::InsufficientRandomness)?
            .into();
        Ok(Self { psk, psk_nonce })
    }

    /// An external PSK id with a fresh nonce.
    pub fn external(
        ciphersuite: Ciphersuite,
        rand: &impl ArborRand,
        psk_id: Vec<u8>,
    ) -> Result<Self, CryptoError> {
        Self::new(ciphersuite, rand, Psk::External(ExternalPsk::new(psk_id)))
    }

    /// An application resumption PSK id with a fresh nonce.
    pub fn resumption(
        ciphersuite: Ciphersuite,
        rand: &impl ArborRand,
        psk_group_id: GroupId,
        psk_epoch: GroupEpoch,
    ) -> Result<Self, CryptoError> {
        Self::new(
            ciphersuite,
            rand,
            Psk::Resumption(ResumptionPsk::new(
                ResumptionPskUsage::Application,
                psk_group_id,
                psk_epoch,
            )),
        )
    }

    pub fn psk(&self) -> &Psk {
        &self.psk
    }

    pub fn psk_nonce(&self) -> &[u8] {
        self.psk_nonce.as_slice()
    }

    /// Check the rules every PSK id in a commit has to follow: the nonce has
    /// the hash length and resumption PSKs are of the `application` usage.
    pub(crate) fn validate_in_proposal(&self, ciphersuite: Ciphersuite) -> Result<(), PskError> {
        if let Psk::Resumption(resumption_psk) = &self.psk {
            if resumption_psk.usage != ResumptionPskUsage::Application {
                return Err(PskError::UsageMismatch {
                    allowed: vec![ResumptionPskUsage::Application],
                    got: resumption_psk.usage,
                });
            }
        }
        let expected = ciphersuite.hash_length();
        let got = self.psk_nonce.as_slice().len();
        if got != expected {
            return Err(PskError::NonceLengthMismatch { expected, got });
        }
        Ok(())
    }
}

/// Context of the "derived psk" expansion: the id plus its position in the
/// list of injected PSKs.
#[derive(TlsSerialize, TlsSize)]
struct PskLabel<'a> {
    id: &'a PreSharedKeyId,
    index: u16,
    count: u16,
}

/// The `psk_secret` that enters the key schedule.
#[derive(Debug)]
pub(crate) struct PskSecret {
    secret: Secret,
}

impl PskSecret {
    /// Folds the PSKs into one secret in the order they were committed.
    ///
    /// Each PSK is extracted with a zero salt and expanded under "derived
    /// psk" with its label. The result becomes the salt of an extract over
    /// the running secret, which starts at zero. An empty list gives the zero
    /// secret.
    pub(crate) fn new(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        psks: &[(PreSharedKeyId, Secret)],
    ) -> Result<Self, PskError> {
        let count = u16::try_from(psks.len()).map_err(|_| PskError::TooManyKeys)?;
        let mut psk_secret = Secret::zero(ciphersuite);
        for (index, (psk_id, psk)) in psks.iter().enumerate() {
            let psk_extracted = Secret::zero(ciphersuite).hkdf_extract(crypto, ciphersuite, psk)?;
            let psk_label = PskLabel {
                id: psk_id,
                index: index as u16,
                count,
            }
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
            let psk_input = psk_extracted.kdf_expand_label(
                crypto,
                ciphersuite,
                "derived psk",
                &psk_label,
                ciphersuite.hash_length(),
            )?;
            psk_secret = psk_input.hkdf_extract(crypto, ciphersuite, &psk_secret)?;
        }
        Ok(Self { secret: psk_secret })
    }

    pub(crate) fn secret(&self) -> &Secret {
        &self.secret
    }
}

/// The resumption PSKs of the most recent epochs of a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ResumptionPskStore {
    max_number_of_secrets: usize,
    resumption_psks: VecDeque<(GroupEpoch, Secret)>,
}

impl ResumptionPskStore {
    pub(crate) fn new(max_number_of_secrets: usize) -> Self {
        Self {
            max_number_of_secrets,
            resumption_psks: VecDeque::new(),
        }
    }

    /// Store the resumption PSK of an epoch, evicting the oldest one if the
    /// store is full.
    pub(crate) fn add(&mut self, epoch: GroupEpoch, resumption_psk: Secret) {
        if self.max_number_of_secrets == 0 {
            return;
        }
        while self.resumption_psks.len() >= self.max_number_of_secrets {
            self.resumption_psks.pop_front();
        }
        self.resumption_psks.push_back((epoch, resumption_psk));
    }

    pub(crate) fn get(&self, epoch: GroupEpoch) -> Option<&Secret> {
        self.resumption_psks
            .iter()
            .find(|(e, _)| *e == epoch)
            .map(|(_, secret)| secret)
    }
}

/// Resolve the secrets for a list of PSK ids.
///
/// External PSKs come from `external_psks`. Resumption PSKs have to belong to
/// `group_id` and are taken from `resumption_psks`.
pub(crate) fn load_psks(
    psk_ids: &[PreSharedKeyId],
    external_psks: &BTreeMap<Vec<u8>, Vec<u8>>,
    resumption_psks: &ResumptionPskStore,
    group_id: &GroupId,
) -> Result<Vec<(PreSharedKeyId, Secret)>, PskError> {
    psk_ids
        .iter()
        .map(|psk_id| {
            let secret = match psk_id.psk() {
                Psk::External(external_psk) => external_psks
                    .get(external_psk.psk_id())
                    .map(|bytes| Secret::from_slice(bytes)),
                Psk::Resumption(resumption_psk) if resumption_psk.psk_group_id() == group_id => {
                    resumption_psks.get(resumption_psk.psk_epoch()).cloned()
                }
                Psk::Resumption(_) => None,
            };
            let secret = secret.ok_or_else(|| {
                log::debug!("PSK {psk_id:?} is not known.");
                PskError::KeyNotFound
            })?;
            Ok((psk_id.clone(), secret))
        })
        .collect()
}

/// Fail on the first PSK id that occurs twice.
pub(crate) fn check_duplicates(psk_ids: &[PreSharedKeyId]) -> Result<(), PskError> {
    let mut seen = HashSet::new();
    for psk_id in psk_ids {
        if !seen.insert(psk_id.psk()) {
            return Err(PskError::Duplicate {
                first: psk_id.clone(),
            });
        }
    }
    Ok(())
}
