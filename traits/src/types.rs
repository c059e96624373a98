//! # Primitive types
//!
//! Algorithm identifiers, key containers and the error type shared by the
//! capability traits and the core.

use std::ops::Deref;

use serde::{Deserialize, Serialize};
use tls_codec::{SecretVLBytes, TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

/// Every AEAD of the registered ciphersuites uses a 12 byte nonce.
const AEAD_NONCE_SIZE: usize = 12;

/// Symmetric AEAD schemes.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum AeadType {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl AeadType {
    pub const fn key_size(&self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }

    pub const fn nonce_size(&self) -> usize {
        AEAD_NONCE_SIZE
    }
}

/// Hash functions, also used as the HKDF hash.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
#[allow(non_camel_case_types)]
pub enum HashType {
    Sha2_256,
    Sha2_384,
    Sha2_512,
}

impl HashType {
    /// Digest length in bytes.
    pub const fn size(&self) -> usize {
        match self {
            Self::Sha2_256 => 32,
            Self::Sha2_384 => 48,
            Self::Sha2_512 => 64,
        }
    }
}

/// Signature algorithms, named after their TLS `SignatureScheme` code points.
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Hash, Eq, PartialEq, Clone, Debug, Serialize, Deserialize)]
pub enum SignatureScheme {
    ECDSA_SECP256R1_SHA256,
    ECDSA_SECP384R1_SHA384,
    ECDSA_SECP521R1_SHA512,
    ED25519,
    ED448,
}

/// Failures of a crypto or randomness provider.
#[derive(thiserror::Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum CryptoError {
    #[error("The underlying crypto library failed.")]
    CryptoLibraryError,
    #[error("AEAD decryption failed.")]
    AeadDecryptionError,
    #[error("HPKE decryption failed.")]
    HpkeDecryptionError,
    #[error("HPKE encryption failed.")]
    HpkeEncryptionError,
    #[error("The signature scheme is not supported.")]
    UnsupportedSignatureScheme,
    #[error("The KDF label is too long to be encoded.")]
    KdfLabelTooLarge,
    #[error("The KDF label could not be encoded.")]
    KdfSerializationError,
    #[error("The requested HKDF output length is invalid.")]
    HkdfOutputLengthInvalid,
    #[error("Not enough randomness was available.")]
    InsufficientRandomness,
    #[error("The signature is invalid.")]
    InvalidSignature,
    #[error("The AEAD algorithm is not supported.")]
    UnsupportedAeadAlgorithm,
    #[error("The KDF is not supported.")]
    UnsupportedKdf,
    #[error("An input has an invalid length.")]
    InvalidLength,
    #[error("The hash algorithm is not supported.")]
    UnsupportedHashAlgorithm,
    #[error("The HPKE sender context could not be set up.")]
    SenderSetupError,
    #[error("The HPKE receiver context could not be set up.")]
    ReceiverSetupError,
    #[error("The HPKE exporter failed.")]
    ExporterError,
    #[error("The ciphersuite is not supported.")]
    UnsupportedCiphersuite,
    #[error("A value could not be TLS encoded.")]
    TlsSerializationError,
    #[error("Signing failed.")]
    SigningError,
    #[error("The public key is invalid.")]
    InvalidPublicKey,
}

/// HPKE KEMs.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash, Serialize, Deserialize)]
pub enum HpkeKemType {
    DhKemP256,
    DhKemP384,
    DhKemP521,
    DhKem25519,
    DhKem448,
}

/// HPKE KDFs.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash, Serialize, Deserialize)]
pub enum HpkeKdfType {
    HkdfSha256,
    HkdfSha384,
    HkdfSha512,
}

impl From<HashType> for HpkeKdfType {
    fn from(hash: HashType) -> Self {
        match hash {
            HashType::Sha2_256 => Self::HkdfSha256,
            HashType::Sha2_384 => Self::HkdfSha384,
            HashType::Sha2_512 => Self::HkdfSha512,
        }
    }
}

/// HPKE AEADs. `Export` disables sealing and only allows secret export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HpkeAeadType {
    AesGcm128,
    AesGcm256,
    ChaCha20Poly1305,
    Export,
}

impl From<AeadType> for HpkeAeadType {
    fn from(aead: AeadType) -> Self {
        match aead {
            AeadType::Aes128Gcm => Self::AesGcm128,
            AeadType::Aes256Gcm => Self::AesGcm256,
            AeadType::ChaCha20Poly1305 => Self::ChaCha20Poly1305,
        }
    }
}

/// A KEM, KDF and AEAD triple selecting one HPKE instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HpkeConfig(pub HpkeKemType, pub HpkeKdfType, pub HpkeAeadType);

/// Output of a single-shot HPKE seal.
///
/// ```text
/// struct {
///     opaque kem_output<V>;
///     opaque ciphertext<V>;
/// } HPKECiphertext;
/// ```
#[derive(
    Debug, PartialEq, Eq, Clone, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct HpkeCiphertext {
    pub kem_output: VLBytes,
    pub ciphertext: VLBytes,
}

/// An HPKE private key. The bytes are zeroized on drop.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
#[serde(transparent)]
pub struct HpkePrivateKey(SecretVLBytes);

impl From<Vec<u8>> for HpkePrivateKey {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<&[u8]> for HpkePrivateKey {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }
}

impl Deref for HpkePrivateKey {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

/// A freshly derived HPKE key pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HpkeKeyPair {
    pub private: HpkePrivateKey,
    pub public: Vec<u8>,
}

/// A secret exported from an HPKE context.
#[derive(Clone, Debug)]
pub struct ExporterSecret(SecretVLBytes);

impl Deref for ExporterSecret {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<Vec<u8>> for ExporterSecret {
    fn from(secret: Vec<u8>) -> Self {
        Self(secret.into())
    }
}

/// A raw ciphersuite code point as it appears in leaf capabilities.
///
/// Members may advertise suites this implementation does not know, so the
/// value is kept as is and only interpreted on demand.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, TlsSerialize, TlsDeserialize,
    TlsSize,
)]
pub struct VerifiableCiphersuite(u16);

impl VerifiableCiphersuite {
    pub fn new(value: u16) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u16 {
        self.0
    }
}

impl From<Ciphersuite> for VerifiableCiphersuite {
    fn from(ciphersuite: Ciphersuite) -> Self {
        Self(ciphersuite.value())
    }
}

impl TryFrom<VerifiableCiphersuite> for Ciphersuite {
    type Error = tls_codec::Error;

    fn try_from(value: VerifiableCiphersuite) -> Result<Self, Self::Error> {
        Ciphersuite::try_from(value.0)
    }
}

/// The registered MLS ciphersuites.
///
/// All of them can be decoded. Which ones can be used depends on the crypto
/// provider, see [`ArborCrypto::supports`](crate::crypto::ArborCrypto::supports).
#[allow(non_camel_case_types)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Ciphersuite {
    MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519 = 0x0001,
    MLS_128_DHKEMP256_AES128GCM_SHA256_P256 = 0x0002,
    MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519 = 0x0003,
    MLS_256_DHKEMX448_AES256GCM_SHA512_Ed448 = 0x0004,
    MLS_256_DHKEMP521_AES256GCM_SHA512_P521 = 0x0005,
    MLS_256_DHKEMX448_CHACHA20POLY1305_SHA512_Ed448 = 0x0006,
    MLS_256_DHKEMP384_AES256GCM_SHA384_P384 = 0x0007,
}

/// The primitives a ciphersuite is made of.
struct Primitives {
    kem: HpkeKemType,
    aead: AeadType,
    hash: HashType,
    signature: SignatureScheme,
}

impl Ciphersuite {
    const ALL: [Ciphersuite; 7] = [
        Self::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519,
        Self::MLS_128_DHKEMP256_AES128GCM_SHA256_P256,
        Self::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519,
        Self::MLS_256_DHKEMX448_AES256GCM_SHA512_Ed448,
        Self::MLS_256_DHKEMP521_AES256GCM_SHA512_P521,
        Self::MLS_256_DHKEMX448_CHACHA20POLY1305_SHA512_Ed448,
        Self::MLS_256_DHKEMP384_AES256GCM_SHA384_P384,
    ];

    const fn primitives(&self) -> Primitives {
        use {AeadType::*, HashType::*, HpkeKemType::*, SignatureScheme::*};
        let (kem, aead, hash, signature) = match self {
            Self::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519 => {
                (DhKem25519, Aes128Gcm, Sha2_256, ED25519)
            }
            Self::MLS_128_DHKEMP256_AES128GCM_SHA256_P256 => {
                (DhKemP256, Aes128Gcm, Sha2_256, ECDSA_SECP256R1_SHA256)
            }
            Self::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519 => {
                (DhKem25519, ChaCha20Poly1305, Sha2_256, ED25519)
            }
            Self::MLS_256_DHKEMX448_AES256GCM_SHA512_Ed448 => {
                (DhKem448, Aes256Gcm, Sha2_512, ED448)
            }
            Self::MLS_256_DHKEMP521_AES256GCM_SHA512_P521 => {
                (DhKemP521, Aes256Gcm, Sha2_512, ECDSA_SECP521R1_SHA512)
            }
            Self::MLS_256_DHKEMX448_CHACHA20POLY1305_SHA512_Ed448 => {
                (DhKem448, ChaCha20Poly1305, Sha2_512, ED448)
            }
            Self::MLS_256_DHKEMP384_AES256GCM_SHA384_P384 => {
                (DhKemP384, Aes256Gcm, Sha2_384, ECDSA_SECP384R1_SHA384)
            }
        };
        Primitives {
            kem,
            aead,
            hash,
            signature,
        }
    }

    /// The IANA code point.
    pub const fn value(&self) -> u16 {
        *self as u16
    }

    pub const fn hash_algorithm(&self) -> HashType {
        self.primitives().hash
    }

    pub const fn signature_algorithm(&self) -> SignatureScheme {
        self.primitives().signature
    }

    pub const fn aead_algorithm(&self) -> AeadType {
        self.primitives().aead
    }

    /// The HPKE instantiation used for path secrets, welcomes and external
    /// init. Its KDF always matches the suite's hash.
    pub fn hpke_config(&self) -> HpkeConfig {
        let primitives = self.primitives();
        HpkeConfig(
            primitives.kem,
            primitives.hash.into(),
            primitives.aead.into(),
        )
    }

    /// Output length of the suite's hash, which is also the length of every
    /// key schedule secret.
    pub const fn hash_length(&self) -> usize {
        self.hash_algorithm().size()
    }

    pub const fn aead_key_length(&self) -> usize {
        self.aead_algorithm().key_size()
    }

    pub const fn aead_nonce_length(&self) -> usize {
        self.aead_algorithm().nonce_size()
    }
}

impl TryFrom<u16> for Ciphersuite {
    type Error = tls_codec::Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|suite| suite.value() == value)
            .ok_or_else(|| {
                tls_codec::Error::DecodingError(format!("unknown ciphersuite {value:#06x}"))
            })
    }
}

impl From<Ciphersuite> for u16 {
    fn from(ciphersuite: Ciphersuite) -> u16 {
        ciphersuite.value()
    }
}

impl std::fmt::Display for Ciphersuite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl tls_codec::Size for Ciphersuite {
    fn tls_serialized_len(&self) -> usize {
        std::mem::size_of::<u16>()
    }
}

impl tls_codec::Serialize for Ciphersuite {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        tls_codec::Serialize::tls_serialize(&self.value(), writer)
    }
}

impl tls_codec::Deserialize for Ciphersuite {
    fn tls_deserialize<R: std::io::Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        <u16 as tls_codec::Deserialize>::tls_deserialize(bytes).and_then(Ciphersuite::try_from)
    }
}
