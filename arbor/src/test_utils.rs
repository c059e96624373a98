//! Test utilities
#![allow(dead_code)]
#![allow(unused_imports)]

pub(crate) use arbor_basic_credential::SignatureKeyPair;
pub(crate) use arbor_rust_crypto::ArborRustCrypto;
pub(crate) use arbor_traits::{types::Ciphersuite, ArborProvider};
pub(crate) use rstest::*;
pub(crate) use rstest_reuse::{self, *};

use crate::{
    credentials::{BasicCredential, CredentialWithKey},
    extensions::Extensions,
    group::{ClientConfig, ClientState, GroupId},
    key_packages::{KeyPackage, KeyPackageBundle},
};

// === Ciphersuites ===

#[template]
#[rstest(
    ciphersuite,
    case::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519(
        Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519
    ),
    case::MLS_128_DHKEMP256_AES128GCM_SHA256_P256(
        Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256
    ),
    case::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519(
        Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519
    )
)]
#[allow(non_snake_case)]
pub(crate) fn ciphersuites(ciphersuite: Ciphersuite) {}

// === Ciphersuites & providers ===

#[template]
#[rstest(ciphersuite, provider,
    case::rust_crypto_MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519(Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519, &ArborRustCrypto::default()),
    case::rust_crypto_MLS_128_DHKEMP256_AES128GCM_SHA256_P256(Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256, &ArborRustCrypto::default()),
    case::rust_crypto_MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519(Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519, &ArborRustCrypto::default()),
  )
]
#[allow(non_snake_case)]
pub(crate) fn ciphersuites_and_providers(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {}

/// A basic credential for `identity` with a fresh signature key.
pub(crate) fn new_credential(
    identity: &[u8],
    ciphersuite: Ciphersuite,
) -> (CredentialWithKey, SignatureKeyPair) {
    let signer =
        SignatureKeyPair::new(ciphersuite.signature_algorithm()).expect("key generation failed");
    let credential_with_key = CredentialWithKey {
        credential: BasicCredential::new(identity.to_vec()).into(),
        signature_key: signer.to_public_vec().into(),
    };
    (credential_with_key, signer)
}

/// A key package bundle for a fresh client called `identity`.
pub(crate) fn new_key_package(
    provider: &impl ArborProvider,
    ciphersuite: Ciphersuite,
    identity: &[u8],
) -> (KeyPackageBundle, SignatureKeyPair) {
    let (credential_with_key, signer) = new_credential(identity, ciphersuite);
    let bundle = KeyPackage::builder()
        .build(provider, ciphersuite, &signer, credential_with_key)
        .expect("key package creation failed");
    (bundle, signer)
}

/// A group with a single member and the default configuration.
pub(crate) fn new_group(
    provider: &impl ArborProvider,
    ciphersuite: Ciphersuite,
    identity: &[u8],
) -> (ClientState, SignatureKeyPair) {
    let (credential_with_key, signer) = new_credential(identity, ciphersuite);
    let state = ClientState::create_group(
        provider,
        &signer,
        ClientConfig::default(),
        ciphersuite,
        GroupId::from_slice(b"test group"),
        credential_with_key,
        Extensions::empty(),
    )
    .expect("group creation failed");
    (state, signer)
}
