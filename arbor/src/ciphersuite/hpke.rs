//! Labeled HPKE.
//!
//! Both directions use single-shot base mode with an empty aad. The HPKE
//! `info` is the encoding of the prefixed label followed by the caller's
//! context, which binds each ciphertext to its purpose.

use arbor_traits::crypto::ArborCrypto;
use tls_codec::{Serialize, TlsSerialize, TlsSize, VLBytes};

use super::{Ciphersuite, CryptoError, HpkeCiphertext, LABEL_PREFIX};

/// The HPKE `info` of a labeled encryption.
#[derive(Debug, Clone, TlsSerialize, TlsSize)]
struct EncryptContext {
    label: VLBytes,
    context: VLBytes,
}

impl EncryptContext {
    fn new(label: &str, context: &[u8]) -> Self {
        let label = format!("{LABEL_PREFIX}{label}");
        Self {
            label: label.as_bytes().into(),
            context: context.into(),
        }
    }

    fn serialized(&self) -> Result<Vec<u8>, CryptoError> {
        self.tls_serialize_detached()
            .map_err(|_| CryptoError::TlsSerializationError)
    }
}

/// Labels used with [`encrypt_with_label`].
pub(crate) const UPDATE_PATH_NODE_LABEL: &str = "UpdatePathNode";
pub(crate) const WELCOME_LABEL: &str = "Welcome";

/// Seals `plaintext` to `public_key` under `label` and `context`.
pub(crate) fn encrypt_with_label(
    public_key: &[u8],
    label: &str,
    context: &[u8],
    plaintext: &[u8],
    ciphersuite: Ciphersuite,
    crypto: &impl ArborCrypto,
) -> Result<HpkeCiphertext, CryptoError> {
    let info = EncryptContext::new(label, context).serialized()?;
    log::trace!("HPKE encrypt with label `{label}` and ciphersuite `{ciphersuite:?}`:");
    log::trace!("* context:     {context:x?}");
    log_crypto!(trace, "* info:        {info:x?}");
    log_crypto!(trace, "* plaintext:   {plaintext:x?}");

    let cipher = crypto.hpke_seal(ciphersuite.hpke_config(), public_key, &info, &[], plaintext)?;

    log_crypto!(trace, "* ciphertext:  {:x?}", cipher);
    Ok(cipher)
}

/// Opens a ciphertext sealed by [`encrypt_with_label`] with the same
/// label and context.
pub(crate) fn decrypt_with_label(
    private_key: &[u8],
    label: &str,
    context: &[u8],
    ciphertext: &HpkeCiphertext,
    ciphersuite: Ciphersuite,
    crypto: &impl ArborCrypto,
) -> Result<Vec<u8>, CryptoError> {
    log::trace!("HPKE decrypt with label `{label}` and `ciphersuite` {ciphersuite:?}:");
    let info = EncryptContext::new(label, context).serialized()?;
    let plaintext = crypto
        .hpke_open(ciphersuite.hpke_config(), ciphertext, private_key, &info, &[])
        .map_err(|e| {
            log::debug!("HPKE decryption with label `{label}` failed: {e:?}");
            CryptoError::HpkeDecryptionError
        })?;

    log_crypto!(trace, "* plaintext:   {plaintext:x?}");
    Ok(plaintext)
}

/// An HPKE public key.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
    TlsSerialize, tls_codec::TlsDeserialize, TlsSize,
)]
pub struct HpkePublicKey(VLBytes);

impl HpkePublicKey {
    /// The raw key bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<Vec<u8>> for HpkePublicKey {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

impl From<&[u8]> for HpkePublicKey {
    fn from(value: &[u8]) -> Self {
        Self(value.into())
    }
}
