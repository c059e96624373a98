use tls_codec::{Deserialize, Serialize};

use super::*;
use crate::{
    credentials::AcceptAllCredentials,
    extensions::{Extension, ExtensionType},
    test_utils::*,
};

fn validate(
    provider: &impl ArborProvider,
    key_package: &KeyPackage,
    ciphersuite: Ciphersuite,
) -> Result<(), KeyPackageVerifyError> {
    key_package.validate(
        provider.crypto(),
        ProtocolVersion::Mls10,
        ciphersuite,
        &AcceptAllCredentials,
    )
}

#[apply(ciphersuites_and_providers)]
fn generate_key_package(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (bundle, _signer) = new_key_package(provider, ciphersuite, b"Alice");
    let key_package = bundle.key_package();
    assert_eq!(key_package.ciphersuite(), ciphersuite);
    assert_eq!(key_package.protocol_version(), ProtocolVersion::Mls10);
    assert_ne!(
        key_package.init_key().as_slice(),
        key_package.leaf_node().encryption_key().as_slice()
    );
    validate(provider, key_package, ciphersuite).expect("invalid key package");

    let encoded = key_package
        .tls_serialize_detached()
        .expect("encoding failed");
    let decoded = KeyPackage::tls_deserialize_exact(&encoded).expect("decoding failed");
    assert_eq!(&decoded, key_package);
    assert_eq!(
        decoded.hash_ref(provider.crypto()).expect("hashing failed"),
        key_package.hash_ref(provider.crypto()).expect("hashing failed")
    );
    validate(provider, &decoded, ciphersuite).expect("invalid key package");
}

#[apply(ciphersuites_and_providers)]
fn invalid_signature(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (bundle, _signer) = new_key_package(provider, ciphersuite, b"Alice");
    let mut key_package = bundle.key_package().clone();
    let mut signature = key_package.signature_mut().as_slice().to_vec();
    signature[0] ^= 0xff;
    key_package.signature_mut().modify(&signature);

    assert_eq!(
        validate(provider, &key_package, ciphersuite),
        Err(KeyPackageVerifyError::InvalidSignature)
    );
}

#[apply(ciphersuites_and_providers)]
fn init_key_must_differ_from_encryption_key(
    ciphersuite: Ciphersuite,
    provider: &impl ArborProvider,
) {
    let (bundle, signer) = new_key_package(provider, ciphersuite, b"Alice");
    let key_package = bundle.key_package().clone();
    let encryption_key =
        HpkePublicKey::from(key_package.leaf_node().encryption_key().as_slice());
    let key_package = key_package.resign_with_init_key(encryption_key, &signer);

    assert_eq!(
        validate(provider, &key_package, ciphersuite),
        Err(KeyPackageVerifyError::InitKeyEqualsEncryptionKey)
    );
}

#[apply(ciphersuites_and_providers)]
fn expired_key_package(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (credential_with_key, signer) = new_credential(b"Alice", ciphersuite);
    let bundle = KeyPackage::builder()
        .lifetime(Lifetime::expired())
        .build(provider, ciphersuite, &signer, credential_with_key)
        .expect("key package creation failed");

    assert_eq!(
        validate(provider, bundle.key_package(), ciphersuite),
        Err(KeyPackageVerifyError::InvalidLifetime)
    );
}

#[apply(ciphersuites_and_providers)]
fn ciphersuite_must_match_the_group(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (bundle, _signer) = new_key_package(provider, ciphersuite, b"Alice");
    let other = if ciphersuite == Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519 {
        Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519
    } else {
        Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519
    };

    assert_eq!(
        validate(provider, bundle.key_package(), other),
        Err(KeyPackageVerifyError::CiphersuiteMismatch)
    );
}

#[apply(ciphersuites_and_providers)]
fn key_package_extensions_need_support(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let custom = Extension::custom(0xff00, vec![1, 2, 3]).expect("not reserved");

    let (credential_with_key, signer) = new_credential(b"Alice", ciphersuite);
    let unsupported = KeyPackage::builder()
        .key_package_extensions(Extensions::single(custom.clone()))
        .build(provider, ciphersuite, &signer, credential_with_key.clone())
        .expect("key package creation failed");
    assert_eq!(
        validate(provider, unsupported.key_package(), ciphersuite),
        Err(KeyPackageVerifyError::LeafNode(
            LeafNodeValidationError::UnsupportedExtensions
        ))
    );

    let supported = KeyPackage::builder()
        .capabilities(Capabilities::new(
            None,
            None,
            Some(&[ExtensionType::Unknown(0xff00)][..]),
            None,
            None,
        ))
        .key_package_extensions(Extensions::single(custom))
        .build(provider, ciphersuite, &signer, credential_with_key)
        .expect("key package creation failed");
    validate(provider, supported.key_package(), ciphersuite).expect("invalid key package");
}

#[apply(ciphersuites_and_providers)]
fn signer_must_match_ciphersuite(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let other = if ciphersuite == Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256 {
        Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519
    } else {
        Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256
    };
    let (credential_with_key, signer) = new_credential(b"Alice", other);

    assert_eq!(
        KeyPackage::builder()
            .build(provider, ciphersuite, &signer, credential_with_key)
            .expect_err("built a key package with a mismatching signer"),
        KeyPackageNewError::CiphersuiteSignatureSchemeMismatch
    );
}

#[apply(ciphersuites_and_providers)]
fn duplicate_extensions(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (credential_with_key, signer) = new_credential(b"Alice", ciphersuite);
    let mut extensions = Extensions::empty();
    extensions
        .add(Extension::custom(0xff00, vec![]).expect("not reserved"))
        .expect("first extension");
    let encoded = {
        let mut encoded = extensions.tls_serialize_detached().expect("encoding failed");
        // Append the same extension a second time and fix the length prefix.
        let entry = encoded[1..].to_vec();
        encoded.extend_from_slice(&entry);
        encoded[0] = (entry.len() * 2) as u8;
        encoded
    };
    let duplicated = Extensions::tls_deserialize_exact(&encoded).expect("decoding failed");

    assert_eq!(
        KeyPackage::builder()
            .key_package_extensions(duplicated)
            .build(provider, ciphersuite, &signer, credential_with_key)
            .expect_err("built a key package with duplicate extensions"),
        KeyPackageNewError::ExtensionError(
            crate::extensions::errors::ExtensionError::DuplicateExtension(0xff00)
        )
    );
}
