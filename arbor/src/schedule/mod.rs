//! # Key schedule
//!
//! The key schedule evolves in epochs. In each epoch the commit secret and
//! the PSK secret inject new key material:
//!
//! 1. `init_secret` of the previous epoch is the salt of an extract over the
//!    commit secret. Expanding that under "joiner" with the new group
//!    context gives the `joiner_secret`.
//! 2. `joiner_secret` is the salt of an extract over the PSK secret (zero
//!    without PSKs). From there "welcome" derives the `welcome_secret`, and an
//!    expansion under "epoch" with the group context the `epoch_secret`.
//! 3. Every per-epoch secret is derived from the `epoch_secret` with its
//!    label:
//!
//! | secret                  | label           |
//! |:------------------------|:----------------|
//! | `sender_data_secret`    | "sender data"   |
//! | `encryption_secret`     | "encryption"    |
//! | `exporter_secret`       | "exporter"      |
//! | `epoch_authenticator`   | "authentication"|
//! | `external_secret`       | "external"      |
//! | `confirmation_key`      | "confirm"       |
//! | `membership_key`        | "membership"    |
//! | `resumption_psk`        | "resumption"    |
//! | `init_secret`           | "init"          |
//!
//! Each secret has its own type so that secrets cannot be confused and the
//! schedule cannot be walked out of order. A member joining from a `Welcome`
//! starts at the `joiner_secret`.

use arbor_traits::crypto::ArborCrypto;
use serde::{Deserialize, Serialize};
use tls_codec::Serialize as TlsSerializeTrait;

use crate::{
    ciphersuite::{hash, AeadKey, AeadNonce, Ciphersuite, ConsumedSecrets, CryptoError, Mac, Secret},
    error::LibraryError,
    group::GroupContext,
    messages::ConfirmationTag,
    treesync::{treekem::PathSecret, EncryptionKey},
};

pub mod errors;
pub mod psk;

#[cfg(test)]
mod tests;

use errors::{ErrorState, KeyScheduleError};
pub(crate) use psk::PskSecret;

const EXTERNAL_INIT_LABEL: &[u8] = b"MLS 1.0 external init secret";

/// The secret a commit contributes to the key schedule.
#[derive(Debug, PartialEq)]
pub(crate) struct CommitSecret {
    secret: Secret,
}

impl From<PathSecret> for CommitSecret {
    fn from(path_secret: PathSecret) -> Self {
        CommitSecret {
            secret: path_secret.into_secret(),
        }
    }
}

impl CommitSecret {
    /// The commit secret of a commit without path.
    pub(crate) fn zero_secret(ciphersuite: Ciphersuite) -> Self {
        CommitSecret {
            secret: Secret::zero(ciphersuite),
        }
    }

    pub(crate) fn secret(&self) -> &Secret {
        &self.secret
    }

    pub(crate) fn into_secret(self) -> Secret {
        self.secret
    }

    #[cfg(test)]
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Self {
            secret: Secret::from_slice(bytes),
        }
    }
}

/// The `InitSecret` is used to connect the next epoch to the current one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct InitSecret {
    secret: Secret,
}

impl InitSecret {
    /// Derive an `InitSecret` from an `EpochSecret`.
    fn new(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<Self, CryptoError> {
        let secret = epoch_secret
            .secret
            .derive_secret(crypto, ciphersuite, "init")?;
        log_crypto!(trace, "Init secret: {:x?}", secret);
        Ok(InitSecret { secret })
    }

    #[cfg(test)]
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Self {
            secret: Secret::from_slice(bytes),
        }
    }

    /// Sample a fresh, random `InitSecret` for the creation of a new group.
    pub(crate) fn random(
        ciphersuite: Ciphersuite,
        rand: &impl arbor_traits::random::ArborRand,
    ) -> Result<Self, CryptoError> {
        Ok(InitSecret {
            secret: Secret::random(ciphersuite, rand)?,
        })
    }

    /// The init secret of an external commit, exported from an HPKE context
    /// set up against the group's external public key. Returns the KEM output
    /// that goes into the `ExternalInit` proposal.
    pub(crate) fn from_external_pub(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        external_pub: &[u8],
    ) -> Result<(Self, Vec<u8>), CryptoError> {
        let (kem_output, raw_init_secret) = crypto.hpke_setup_sender_and_export(
            ciphersuite.hpke_config(),
            external_pub,
            &[],
            EXTERNAL_INIT_LABEL,
            ciphersuite.hash_length(),
        )?;
        Ok((
            InitSecret {
                secret: Secret::from_slice(&raw_init_secret),
            },
            kem_output,
        ))
    }

    /// The init secret of an external commit on the receiving side.
    pub(crate) fn from_kem_output(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        external_private_key: &[u8],
        kem_output: &[u8],
    ) -> Result<Self, CryptoError> {
        let raw_init_secret = crypto.hpke_setup_receiver_and_export(
            ciphersuite.hpke_config(),
            kem_output,
            external_private_key,
            &[],
            EXTERNAL_INIT_LABEL,
            ciphersuite.hash_length(),
        )?;
        Ok(InitSecret {
            secret: Secret::from_slice(&raw_init_secret),
        })
    }
}

/// The `joiner_secret`. It is both an output of one epoch's schedule and the
/// input of the next, and it is sent to new members in the `GroupSecrets`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct JoinerSecret {
    secret: Secret,
}

impl JoinerSecret {
    /// ```text
    /// joiner_secret = ExpandWithLabel(KDF.Extract(init_secret_[n-1], commit_secret),
    ///                                 "joiner", GroupContext_[n], KDF.Nh)
    /// ```
    pub(crate) fn new(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        commit_secret: CommitSecret,
        init_secret: &InitSecret,
        serialized_group_context: &[u8],
        consumed: &mut ConsumedSecrets,
    ) -> Result<Self, CryptoError> {
        let intermediate_secret =
            init_secret
                .secret
                .hkdf_extract(crypto, ciphersuite, commit_secret.secret())?;
        consumed.push(commit_secret.into_secret());
        let secret = intermediate_secret.kdf_expand_label(
            crypto,
            ciphersuite,
            "joiner",
            serialized_group_context,
            ciphersuite.hash_length(),
        )?;
        log_crypto!(trace, "Joiner secret: {:x?}", secret);
        Ok(JoinerSecret { secret })
    }

    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Self {
            secret: Secret::from_slice(bytes),
        }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        self.secret.as_slice()
    }
}

/// Where a [`KeySchedule`] stands. Each transition consumes the secret of
/// the previous stage.
enum Stage {
    /// The welcome secret is available; the group context is still missing.
    Intermediate(IntermediateSecret),
    /// The context went in, the epoch secrets can be taken out.
    Epoch(EpochSecret),
    Done,
}

/// The part of the key schedule that starts at the `joiner_secret`.
pub(crate) struct KeySchedule {
    ciphersuite: Ciphersuite,
    stage: Stage,
}

impl KeySchedule {
    /// Mixes the PSK secret into `joiner_secret`.
    pub(crate) fn init(
        ciphersuite: Ciphersuite,
        crypto: &impl ArborCrypto,
        joiner_secret: &JoinerSecret,
        psk: PskSecret,
    ) -> Result<Self, LibraryError> {
        log::debug!("Starting a key schedule with {ciphersuite:?}");
        log_crypto!(trace, "joiner secret {:x?}", joiner_secret.secret.as_slice());
        let intermediate = IntermediateSecret::new(crypto, ciphersuite, joiner_secret, psk)
            .map_err(LibraryError::unexpected_crypto_error)?;
        Ok(Self {
            ciphersuite,
            stage: Stage::Intermediate(intermediate),
        })
    }

    /// Only available before [`Self::add_context`].
    pub(crate) fn welcome(
        &self,
        crypto: &impl ArborCrypto,
    ) -> Result<WelcomeSecret, KeyScheduleError> {
        let Stage::Intermediate(intermediate) = &self.stage else {
            log::error!("The welcome secret is gone once the context is added.");
            return Err(ErrorState::Init.into());
        };
        Ok(WelcomeSecret::new(crypto, self.ciphersuite, intermediate)?)
    }

    /// Derives the epoch secret from the encoded group context.
    pub(crate) fn add_context(
        &mut self,
        crypto: &impl ArborCrypto,
        serialized_group_context: &[u8],
    ) -> Result<(), KeyScheduleError> {
        let intermediate = match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Intermediate(intermediate) => intermediate,
            later => {
                log::error!("The group context was added before.");
                self.stage = later;
                return Err(ErrorState::Init.into());
            }
        };
        let epoch_secret =
            EpochSecret::new(crypto, self.ciphersuite, intermediate, serialized_group_context)?;
        self.stage = Stage::Epoch(epoch_secret);
        Ok(())
    }

    /// Derives all epoch secrets plus the encryption secret, once. The
    /// epoch secret itself ends up in `consumed`.
    pub(crate) fn epoch_secrets(
        &mut self,
        crypto: &impl ArborCrypto,
        consumed: &mut ConsumedSecrets,
    ) -> Result<(EpochSecrets, EncryptionSecret), KeyScheduleError> {
        let epoch_secret = match std::mem::replace(&mut self.stage, Stage::Done) {
            Stage::Epoch(epoch_secret) => epoch_secret,
            other => {
                log::error!("Epoch secrets need the group context and can be taken only once.");
                self.stage = other;
                return Err(ErrorState::Context.into());
            }
        };
        let secrets = EpochSecrets::new(crypto, self.ciphersuite, &epoch_secret)?;
        consumed.push(epoch_secret.secret);
        Ok(secrets)
    }
}

/// `KDF.Extract(joiner_secret, psk_secret)`
struct IntermediateSecret {
    secret: Secret,
}

impl IntermediateSecret {
    fn new(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        joiner_secret: &JoinerSecret,
        psk: PskSecret,
    ) -> Result<Self, CryptoError> {
        log_crypto!(trace, "PSK input: {:x?}", psk.secret());
        let secret = joiner_secret
            .secret
            .hkdf_extract(crypto, ciphersuite, psk.secret())?;
        log_crypto!(trace, "Intermediate secret: {:x?}", secret);
        Ok(Self { secret })
    }
}

/// The secret that protects the `GroupInfo` in a `Welcome`.
pub(crate) struct WelcomeSecret {
    ciphersuite: Ciphersuite,
    secret: Secret,
}

impl WelcomeSecret {
    fn new(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        intermediate_secret: &IntermediateSecret,
    ) -> Result<Self, CryptoError> {
        let secret = intermediate_secret
            .secret
            .derive_secret(crypto, ciphersuite, "welcome")?;
        log_crypto!(trace, "Welcome secret: {:x?}", secret);
        Ok(WelcomeSecret {
            ciphersuite,
            secret,
        })
    }

    /// Derive the AEAD key and nonce, consuming the secret.
    pub(crate) fn derive_welcome_key_nonce(
        self,
        crypto: &impl ArborCrypto,
    ) -> Result<(AeadKey, AeadNonce), CryptoError> {
        let key_secret = self.secret.kdf_expand_label(
            crypto,
            self.ciphersuite,
            "key",
            &[],
            self.ciphersuite.aead_key_length(),
        )?;
        let nonce_secret = self.secret.kdf_expand_label(
            crypto,
            self.ciphersuite,
            "nonce",
            &[],
            self.ciphersuite.aead_nonce_length(),
        )?;
        Ok((
            AeadKey::from_secret(&key_secret, self.ciphersuite),
            AeadNonce::from_secret(&nonce_secret)?,
        ))
    }
}

/// `ExpandWithLabel(intermediate_secret, "epoch", GroupContext_[n], KDF.Nh)`
struct EpochSecret {
    secret: Secret,
}

impl EpochSecret {
    fn new(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        intermediate_secret: IntermediateSecret,
        serialized_group_context: &[u8],
    ) -> Result<Self, CryptoError> {
        let secret = intermediate_secret.secret.kdf_expand_label(
            crypto,
            ciphersuite,
            "epoch",
            serialized_group_context,
            ciphersuite.hash_length(),
        )?;
        log_crypto!(trace, "Epoch secret: {:x?}", secret);
        Ok(EpochSecret { secret })
    }
}

/// The `EncryptionSecret` seeds the `SecretTree` of an epoch.
#[derive(Debug)]
pub(crate) struct EncryptionSecret {
    secret: Secret,
}

impl EncryptionSecret {
    pub(crate) fn into_secret(self) -> Secret {
        self.secret
    }

    #[cfg(test)]
    pub(crate) fn from_slice(bytes: &[u8]) -> Self {
        Self {
            secret: Secret::from_slice(bytes),
        }
    }
}

/// A secret from which secrets for use outside of this crate are derived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ExporterSecret {
    secret: Secret,
}

impl ExporterSecret {
    /// ```text
    /// MLS-Exporter(Label, Context, Length) =
    ///     ExpandWithLabel(DeriveSecret(exporter_secret, Label),
    ///                     "exported", Hash(Context), Length)
    /// ```
    pub(crate) fn derive_exported_secret(
        &self,
        ciphersuite: Ciphersuite,
        crypto: &impl ArborCrypto,
        label: &str,
        context: &[u8],
        key_length: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        let context_hash = hash(crypto, ciphersuite, context)?;
        Ok(self
            .secret
            .derive_secret(crypto, ciphersuite, label)?
            .kdf_expand_label(crypto, ciphersuite, "exported", &context_hash, key_length)?
            .as_slice()
            .to_vec())
    }
}

/// A secret that members can compare to make sure they agree on the group
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct EpochAuthenticator {
    secret: Secret,
}

impl EpochAuthenticator {
    pub(crate) fn as_slice(&self) -> &[u8] {
        self.secret.as_slice()
    }
}

/// A secret used when joining a group with an external Commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ExternalSecret {
    secret: Secret,
}

impl ExternalSecret {
    /// The HPKE key pair for external commits:
    /// `external_priv, external_pub = KEM.DeriveKeyPair(external_secret)`.
    pub(crate) fn derive_external_keypair(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<arbor_traits::types::HpkeKeyPair, CryptoError> {
        crypto.derive_hpke_keypair(ciphersuite.hpke_config(), self.secret.as_slice())
    }

    /// The public key published in the `ExternalPub` extension.
    pub(crate) fn external_pub(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
    ) -> Result<EncryptionKey, CryptoError> {
        Ok(self
            .derive_external_keypair(crypto, ciphersuite)?
            .public
            .into())
    }
}

/// The confirmation key is used to calculate the `ConfirmationTag`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ConfirmationKey {
    secret: Secret,
}

impl ConfirmationKey {
    /// ```text
    /// confirmation_tag = MAC(confirmation_key, GroupContext.confirmed_transcript_hash)
    /// ```
    pub(crate) fn tag(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        confirmed_transcript_hash: &[u8],
    ) -> Result<ConfirmationTag, CryptoError> {
        log::debug!("Computing confirmation tag.");
        log_crypto!(trace, "  confirmation key {:x?}", self.secret.as_slice());
        log_crypto!(trace, "  transcript hash  {:x?}", confirmed_transcript_hash);
        Ok(ConfirmationTag(Mac::new(
            crypto,
            ciphersuite,
            &self.secret,
            confirmed_transcript_hash,
        )?))
    }
}

/// The membership key is used to calculate the `MembershipTag`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct MembershipKey {
    secret: Secret,
}

impl MembershipKey {
    /// `membership_tag = MAC(membership_key, AuthenticatedContentTBM)`
    pub(crate) fn tag(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        tbm: &[u8],
    ) -> Result<Mac, CryptoError> {
        Mac::new(crypto, ciphersuite, &self.secret, tbm)
    }
}

/// The secret that later epochs or other groups can inject as a resumption
/// PSK.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct ResumptionPskSecret {
    secret: Secret,
}

impl ResumptionPskSecret {
    pub(crate) fn secret(&self) -> &Secret {
        &self.secret
    }
}

/// The first `hash_length` bytes of the ciphertext, or all of it if it is
/// shorter.
fn ciphertext_sample(ciphersuite: Ciphersuite, ciphertext: &[u8]) -> &[u8] {
    ciphertext
        .get(..ciphersuite.hash_length())
        .unwrap_or(ciphertext)
}

/// The secret the sender data of private messages is encrypted with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct SenderDataSecret {
    secret: Secret,
}

impl SenderDataSecret {
    /// `ExpandWithLabel(sender_data_secret, "key", ciphertext_sample, AEAD.Nk)`
    pub(crate) fn derive_aead_key(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        ciphertext: &[u8],
    ) -> Result<AeadKey, CryptoError> {
        let ciphertext_sample = ciphertext_sample(ciphersuite, ciphertext);
        log::trace!("SenderDataSecret::derive_aead_key ciphertext sample: {ciphertext_sample:x?}");
        let secret = self.secret.kdf_expand_label(
            crypto,
            ciphersuite,
            "key",
            ciphertext_sample,
            ciphersuite.aead_key_length(),
        )?;
        Ok(AeadKey::from_secret(&secret, ciphersuite))
    }

    /// `ExpandWithLabel(sender_data_secret, "nonce", ciphertext_sample, AEAD.Nn)`
    pub(crate) fn derive_aead_nonce(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        ciphertext: &[u8],
    ) -> Result<AeadNonce, CryptoError> {
        let ciphertext_sample = ciphertext_sample(ciphersuite, ciphertext);
        let nonce_secret = self.secret.kdf_expand_label(
            crypto,
            ciphersuite,
            "nonce",
            ciphertext_sample,
            ciphersuite.aead_nonce_length(),
        )?;
        AeadNonce::from_secret(&nonce_secret)
    }
}

/// The secrets of an epoch that stay around for the whole epoch.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct EpochSecrets {
    init_secret: InitSecret,
    sender_data_secret: SenderDataSecret,
    exporter_secret: ExporterSecret,
    epoch_authenticator: EpochAuthenticator,
    external_secret: ExternalSecret,
    confirmation_key: ConfirmationKey,
    membership_key: MembershipKey,
    resumption_psk: ResumptionPskSecret,
}

impl std::fmt::Debug for EpochSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochSecrets").finish_non_exhaustive()
    }
}

impl EpochSecrets {
    fn new(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        epoch_secret: &EpochSecret,
    ) -> Result<(Self, EncryptionSecret), CryptoError> {
        log::debug!("Computing EpochSecrets from epoch secret with {ciphersuite}");
        log_crypto!(trace, "  epoch_secret: {:x?}", epoch_secret.secret.as_slice());
        let derive = |label: &str| epoch_secret.secret.derive_secret(crypto, ciphersuite, label);

        let encryption_secret = EncryptionSecret {
            secret: derive("encryption")?,
        };
        let epoch_secrets = EpochSecrets {
            sender_data_secret: SenderDataSecret {
                secret: derive("sender data")?,
            },
            exporter_secret: ExporterSecret {
                secret: derive("exporter")?,
            },
            epoch_authenticator: EpochAuthenticator {
                secret: derive("authentication")?,
            },
            external_secret: ExternalSecret {
                secret: derive("external")?,
            },
            confirmation_key: ConfirmationKey {
                secret: derive("confirm")?,
            },
            membership_key: MembershipKey {
                secret: derive("membership")?,
            },
            resumption_psk: ResumptionPskSecret {
                secret: derive("resumption")?,
            },
            init_secret: InitSecret::new(crypto, ciphersuite, epoch_secret)?,
        };
        Ok((epoch_secrets, encryption_secret))
    }

    pub(crate) fn init_secret(&self) -> &InitSecret {
        &self.init_secret
    }

    pub(crate) fn sender_data_secret(&self) -> &SenderDataSecret {
        &self.sender_data_secret
    }

    pub(crate) fn exporter_secret(&self) -> &ExporterSecret {
        &self.exporter_secret
    }

    pub(crate) fn epoch_authenticator(&self) -> &EpochAuthenticator {
        &self.epoch_authenticator
    }

    pub(crate) fn external_secret(&self) -> &ExternalSecret {
        &self.external_secret
    }

    pub(crate) fn confirmation_key(&self) -> &ConfirmationKey {
        &self.confirmation_key
    }

    pub(crate) fn membership_key(&self) -> &MembershipKey {
        &self.membership_key
    }

    pub(crate) fn resumption_psk(&self) -> &ResumptionPskSecret {
        &self.resumption_psk
    }
}

/// Run the key schedule from the `joiner_secret` to the epoch secrets of the
/// epoch described by `group_context`. Returns the welcome secret, which is
/// only needed by committers that add members.
pub(crate) fn derive_epoch(
    crypto: &impl ArborCrypto,
    ciphersuite: Ciphersuite,
    joiner_secret: &JoinerSecret,
    psk_secret: PskSecret,
    group_context: &GroupContext,
    consumed: &mut ConsumedSecrets,
) -> Result<(WelcomeSecret, EpochSecrets, EncryptionSecret), KeyScheduleError> {
    let serialized_group_context = group_context
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
    let mut key_schedule = KeySchedule::init(ciphersuite, crypto, joiner_secret, psk_secret)?;
    let welcome_secret = key_schedule.welcome(crypto)?;
    key_schedule.add_context(crypto, &serialized_group_context)?;
    let (epoch_secrets, encryption_secret) = key_schedule.epoch_secrets(crypto, consumed)?;
    Ok((welcome_secret, epoch_secrets, encryption_secret))
}
