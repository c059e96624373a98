use std::sync::RwLock;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes128Gcm, Aes256Gcm,
};
use arbor_traits::{
    crypto::ArborCrypto,
    random::ArborRand,
    types::{
        AeadType, Ciphersuite, CryptoError, ExporterSecret, HashType, HpkeAeadType,
        HpkeCiphertext, HpkeConfig, HpkeKdfType, HpkeKemType, HpkeKeyPair, SignatureScheme,
    },
};
use chacha20poly1305::ChaCha20Poly1305;
use hkdf::Hkdf;
use hpke::Hpke;
use hpke_rs_crypto::types::{AeadAlgorithm, KdfAlgorithm, KemAlgorithm};
use hpke_rs_rust_crypto::HpkeRustCrypto;
use p256::ecdsa::{signature::Verifier, Signature as EcdsaSignature, VerifyingKey};
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256, Sha384, Sha512};
use tls_codec::SecretVLBytes;

/// Nonce length shared by AES-GCM and ChaCha20-Poly1305.
const NONCE_LENGTH: usize = 12;

/// Runs `$body` with `$h` bound to the digest type selected by `$hash`.
macro_rules! with_digest {
    ($hash:expr, $h:ident => $body:expr) => {
        match $hash {
            HashType::Sha2_256 => {
                type $h = Sha256;
                $body
            }
            HashType::Sha2_384 => {
                type $h = Sha384;
                $body
            }
            HashType::Sha2_512 => {
                type $h = Sha512;
                $body
            }
        }
    };
}

/// Crypto and randomness backed by the RustCrypto crates and `hpke-rs`.
///
/// Supports the X25519 and P-256 ciphersuites with SHA-256.
#[derive(Debug)]
pub struct RustCrypto {
    rng: RwLock<rand_chacha::ChaCha20Rng>,
}

impl Default for RustCrypto {
    fn default() -> Self {
        Self {
            rng: RwLock::new(rand_chacha::ChaCha20Rng::from_entropy()),
        }
    }
}

/// Instantiates HPKE in base mode. Only the X25519 and P-256 KEMs are
/// available.
fn hpke_instance(
    HpkeConfig(kem, kdf, aead): HpkeConfig,
) -> Result<Hpke<HpkeRustCrypto>, CryptoError> {
    let kem = match kem {
        HpkeKemType::DhKem25519 => KemAlgorithm::DhKem25519,
        HpkeKemType::DhKemP256 => KemAlgorithm::DhKemP256,
        HpkeKemType::DhKemP384 | HpkeKemType::DhKemP521 | HpkeKemType::DhKem448 => {
            return Err(CryptoError::UnsupportedCiphersuite)
        }
    };
    let kdf = match kdf {
        HpkeKdfType::HkdfSha256 => KdfAlgorithm::HkdfSha256,
        HpkeKdfType::HkdfSha384 => KdfAlgorithm::HkdfSha384,
        HpkeKdfType::HkdfSha512 => KdfAlgorithm::HkdfSha512,
    };
    let aead = match aead {
        HpkeAeadType::AesGcm128 => AeadAlgorithm::Aes128Gcm,
        HpkeAeadType::AesGcm256 => AeadAlgorithm::Aes256Gcm,
        HpkeAeadType::ChaCha20Poly1305 => AeadAlgorithm::ChaCha20Poly1305,
        HpkeAeadType::Export => AeadAlgorithm::HpkeExport,
    };
    Ok(Hpke::new(hpke::Mode::Base, kem, kdf, aead))
}

fn seal<A: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    payload: Payload<'_, '_>,
) -> Result<Vec<u8>, CryptoError> {
    A::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidLength)?
        .encrypt(nonce.into(), payload)
        .map_err(|_| CryptoError::CryptoLibraryError)
}

fn open<A: Aead + KeyInit>(
    key: &[u8],
    nonce: &[u8],
    payload: Payload<'_, '_>,
) -> Result<Vec<u8>, CryptoError> {
    A::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidLength)?
        .decrypt(nonce.into(), payload)
        .map_err(|_| CryptoError::AeadDecryptionError)
}

/// ECDSA keys are uncompressed SEC1 points and signatures are DER encoded.
fn verify_p256(data: &[u8], public_key: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key =
        VerifyingKey::from_sec1_bytes(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
    let signature =
        EcdsaSignature::from_der(signature).map_err(|_| CryptoError::InvalidSignature)?;
    key.verify(data, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

fn verify_ed25519(data: &[u8], public_key: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
    let key = ed25519_dalek::VerifyingKey::try_from(public_key)
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let signature = ed25519_dalek::Signature::from_slice(signature)
        .map_err(|_| CryptoError::InvalidSignature)?;
    key.verify_strict(data, &signature)
        .map_err(|_| CryptoError::InvalidSignature)
}

impl ArborCrypto for RustCrypto {
    fn supports(&self, ciphersuite: Ciphersuite) -> Result<(), CryptoError> {
        match ciphersuite {
            Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519
            | Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519
            | Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256 => Ok(()),
            _ => Err(CryptoError::UnsupportedCiphersuite),
        }
    }

    fn hkdf_extract(
        &self,
        hash_type: HashType,
        salt: &[u8],
        ikm: &[u8],
    ) -> Result<SecretVLBytes, CryptoError> {
        let prk = with_digest!(hash_type, H => Hkdf::<H>::extract(Some(salt), ikm).0.to_vec());
        Ok(prk.into())
    }

    fn hkdf_expand(
        &self,
        hash_type: HashType,
        prk: &[u8],
        info: &[u8],
        okm_len: usize,
    ) -> Result<SecretVLBytes, CryptoError> {
        let mut okm = vec![0u8; okm_len];
        with_digest!(hash_type, H => Hkdf::<H>::from_prk(prk)
            .map_err(|_| CryptoError::HkdfOutputLengthInvalid)?
            .expand(info, &mut okm)
            .map_err(|_| CryptoError::HkdfOutputLengthInvalid)?);
        Ok(okm.into())
    }

    fn hash(&self, hash_type: HashType, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        Ok(with_digest!(hash_type, H => H::digest(data).to_vec()))
    }

    fn aead_encrypt(
        &self,
        alg: AeadType,
        key: &[u8],
        plaintext: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != NONCE_LENGTH {
            return Err(CryptoError::InvalidLength);
        }
        let payload = Payload {
            msg: plaintext,
            aad,
        };
        match alg {
            AeadType::Aes128Gcm => seal::<Aes128Gcm>(key, nonce, payload),
            AeadType::Aes256Gcm => seal::<Aes256Gcm>(key, nonce, payload),
            AeadType::ChaCha20Poly1305 => seal::<ChaCha20Poly1305>(key, nonce, payload),
        }
    }

    fn aead_decrypt(
        &self,
        alg: AeadType,
        key: &[u8],
        ciphertext: &[u8],
        nonce: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != NONCE_LENGTH {
            return Err(CryptoError::InvalidLength);
        }
        let payload = Payload {
            msg: ciphertext,
            aad,
        };
        match alg {
            AeadType::Aes128Gcm => open::<Aes128Gcm>(key, nonce, payload),
            AeadType::Aes256Gcm => open::<Aes256Gcm>(key, nonce, payload),
            AeadType::ChaCha20Poly1305 => open::<ChaCha20Poly1305>(key, nonce, payload),
        }
    }

    fn verify_signature(
        &self,
        alg: SignatureScheme,
        data: &[u8],
        public_key: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        match alg {
            SignatureScheme::ED25519 => verify_ed25519(data, public_key, signature),
            SignatureScheme::ECDSA_SECP256R1_SHA256 => verify_p256(data, public_key, signature),
            _ => Err(CryptoError::UnsupportedSignatureScheme),
        }
    }

    fn hpke_seal(
        &self,
        config: HpkeConfig,
        public_key: &[u8],
        info: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<HpkeCiphertext, CryptoError> {
        let (enc, ct) = hpke_instance(config)?
            .seal(&public_key.into(), info, aad, plaintext, None, None, None)
            .map_err(|_| CryptoError::HpkeEncryptionError)?;
        Ok(HpkeCiphertext {
            kem_output: enc.into(),
            ciphertext: ct.into(),
        })
    }

    fn hpke_open(
        &self,
        config: HpkeConfig,
        input: &HpkeCiphertext,
        private_key: &[u8],
        info: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        hpke_instance(config)?
            .open(
                input.kem_output.as_slice(),
                &private_key.into(),
                info,
                aad,
                input.ciphertext.as_slice(),
                None,
                None,
                None,
            )
            .map_err(|_| CryptoError::HpkeDecryptionError)
    }

    fn hpke_setup_sender_and_export(
        &self,
        config: HpkeConfig,
        public_key: &[u8],
        info: &[u8],
        exporter_context: &[u8],
        length: usize,
    ) -> Result<(Vec<u8>, ExporterSecret), CryptoError> {
        let (enc, context) = hpke_instance(config)?
            .setup_sender(&public_key.into(), info, None, None, None)
            .map_err(|_| CryptoError::SenderSetupError)?;
        let secret = context
            .export(exporter_context, length)
            .map_err(|_| CryptoError::ExporterError)?;
        Ok((enc, secret.into()))
    }

    fn hpke_setup_receiver_and_export(
        &self,
        config: HpkeConfig,
        enc: &[u8],
        private_key: &[u8],
        info: &[u8],
        exporter_context: &[u8],
        length: usize,
    ) -> Result<ExporterSecret, CryptoError> {
        let context = hpke_instance(config)?
            .setup_receiver(enc, &private_key.into(), info, None, None, None)
            .map_err(|_| CryptoError::ReceiverSetupError)?;
        context
            .export(exporter_context, length)
            .map(ExporterSecret::from)
            .map_err(|_| CryptoError::ExporterError)
    }

    fn derive_hpke_keypair(
        &self,
        config: HpkeConfig,
        ikm: &[u8],
    ) -> Result<HpkeKeyPair, CryptoError> {
        let (private, public) = hpke_instance(config)?
            .derive_key_pair(ikm)
            .map_err(|_| CryptoError::CryptoLibraryError)?
            .into_keys();
        Ok(HpkeKeyPair {
            private: private.as_slice().into(),
            public: public.as_slice().into(),
        })
    }
}

impl RustCrypto {
    fn fill(&self, out: &mut [u8]) -> Result<(), RandError> {
        self.rng
            .write()
            .map_err(|_| RandError::LockPoisoned)?
            .try_fill_bytes(out)
            .map_err(|_| RandError::NotEnoughRandomness)
    }
}

impl ArborRand for RustCrypto {
    type Error = RandError;

    fn random_array<const N: usize>(&self) -> Result<[u8; N], Self::Error> {
        let mut out = [0u8; N];
        self.fill(&mut out)?;
        Ok(out)
    }

    fn random_vec(&self, len: usize) -> Result<Vec<u8>, Self::Error> {
        let mut out = vec![0u8; len];
        self.fill(&mut out)?;
        Ok(out)
    }
}

#[derive(thiserror::Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RandError {
    #[error("The rng lock is poisoned.")]
    LockPoisoned,
    #[error("The rng could not produce enough bytes.")]
    NotEnoughRandomness,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hpke_round_trip() {
        let crypto = RustCrypto::default();
        for ciphersuite in [
            Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519,
            Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519,
            Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256,
        ] {
            let ikm = crypto.random_vec(32).expect("randomness");
            let key_pair = crypto
                .derive_hpke_keypair(ciphersuite.hpke_config(), &ikm)
                .expect("key derivation failed");
            let ciphertext = crypto
                .hpke_seal(
                    ciphersuite.hpke_config(),
                    &key_pair.public,
                    b"info",
                    b"aad",
                    b"plaintext",
                )
                .expect("seal failed");
            let plaintext = crypto
                .hpke_open(
                    ciphersuite.hpke_config(),
                    &ciphertext,
                    &key_pair.private,
                    b"info",
                    b"aad",
                )
                .expect("open failed");
            assert_eq!(plaintext, b"plaintext");
        }
    }

    #[test]
    fn aead_rejects_tampered_ciphertext() {
        let crypto = RustCrypto::default();
        let key = [7u8; 16];
        let nonce = [1u8; 12];
        let mut ciphertext = crypto
            .aead_encrypt(AeadType::Aes128Gcm, &key, b"message", &nonce, b"aad")
            .expect("encryption failed");
        ciphertext[0] ^= 0xff;
        assert_eq!(
            crypto.aead_decrypt(AeadType::Aes128Gcm, &key, &ciphertext, &nonce, b"aad"),
            Err(CryptoError::AeadDecryptionError)
        );
    }
}
