use arbor_traits::crypto::ArborCrypto;

use super::{hash_ref::*, *};
use crate::test_utils::*;

#[apply(ciphersuites_and_providers)]
fn derive_secret_is_label_separated(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let secret = Secret::random(ciphersuite, provider.rand()).expect("Not enough randomness.");

    let a = secret
        .derive_secret(crypto, ciphersuite, "my_test_label")
        .expect("derivation failed");
    let b = secret
        .derive_secret(crypto, ciphersuite, "my_test_label")
        .expect("derivation failed");
    let c = secret
        .derive_secret(crypto, ciphersuite, "other_label")
        .expect("derivation failed");
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.as_slice().len(), ciphersuite.hash_length());

    let short = secret
        .kdf_expand_label(crypto, ciphersuite, "my_test_label", b"context", 7)
        .expect("derivation failed");
    assert_eq!(short.as_slice().len(), 7);
}

#[apply(ciphersuites_and_providers)]
fn hash_references_are_domain_separated(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let proposal_ref = make_proposal_ref(b"value", ciphersuite, crypto).expect("hash failed");
    let key_package_ref =
        make_key_package_ref(b"value", ciphersuite, crypto).expect("hash failed");
    assert_ne!(proposal_ref, key_package_ref);
    assert_eq!(proposal_ref.as_slice().len(), ciphersuite.hash_length());
    assert_eq!(
        proposal_ref,
        make_proposal_ref(b"value", ciphersuite, crypto).expect("hash failed")
    );
}

#[apply(ciphersuites_and_providers)]
fn signatures_are_label_bound(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (credential_with_key, signer) = new_credential(b"Alice", ciphersuite);
    let public_key = credential_with_key.signature_key;

    let signature =
        signature::sign_with_label(&signer, "LeafNodeTBS", b"payload").expect("signing failed");
    public_key
        .verify_with_label(crypto, ciphersuite, "LeafNodeTBS", b"payload", &signature)
        .expect("signature did not verify");

    // The label is part of the signed content.
    assert!(public_key
        .verify_with_label(crypto, ciphersuite, "GroupInfoTBS", b"payload", &signature)
        .is_err());
    assert!(public_key
        .verify_with_label(crypto, ciphersuite, "LeafNodeTBS", b"other", &signature)
        .is_err());
}

#[apply(ciphersuites_and_providers)]
fn hpke_encryption_is_label_bound(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let key_pair = crypto
        .derive_hpke_keypair(ciphersuite.hpke_config(), &[7u8; 32])
        .expect("key derivation failed");

    let ciphertext = encrypt_with_label(
        &key_pair.public,
        WELCOME_LABEL,
        b"context",
        b"group secrets",
        ciphersuite,
        crypto,
    )
    .expect("encryption failed");
    let plaintext = decrypt_with_label(
        &key_pair.private,
        WELCOME_LABEL,
        b"context",
        &ciphertext,
        ciphersuite,
        crypto,
    )
    .expect("decryption failed");
    assert_eq!(plaintext, b"group secrets");

    assert_eq!(
        decrypt_with_label(
            &key_pair.private,
            WELCOME_LABEL,
            b"other context",
            &ciphertext,
            ciphersuite,
            crypto,
        ),
        Err(CryptoError::HpkeDecryptionError)
    );
    assert_eq!(
        decrypt_with_label(
            &key_pair.private,
            UPDATE_PATH_NODE_LABEL,
            b"context",
            &ciphertext,
            ciphersuite,
            crypto,
        ),
        Err(CryptoError::HpkeDecryptionError)
    );
}

#[apply(ciphersuites_and_providers)]
fn aead_with_reuse_guard(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let key = AeadKey::from_secret(
        &Secret::from_slice(&vec![3u8; ciphersuite.aead_key_length()]),
        ciphersuite,
    );
    let nonce =
        AeadNonce::from_secret(&Secret::from_slice(&[5u8; NONCE_BYTES])).expect("invalid nonce");

    let ciphertext = key
        .aead_seal(crypto, b"message", b"aad", &nonce)
        .expect("sealing failed");
    assert_eq!(
        key.aead_open(crypto, &ciphertext, b"aad", &nonce)
            .expect("opening failed"),
        b"message"
    );
    assert!(key.aead_open(crypto, &ciphertext, b"bad", &nonce).is_err());

    let reuse_guard = ReuseGuard::try_from_random(provider.rand()).expect("Not enough randomness.");
    let mut guarded_nonce = nonce.clone();
    guarded_nonce.xor_with_reuse_guard(&reuse_guard);
    assert_eq!(
        &guarded_nonce.as_slice()[REUSE_GUARD_BYTES..],
        &nonce.as_slice()[REUSE_GUARD_BYTES..]
    );
    guarded_nonce.xor_with_reuse_guard(&reuse_guard);
    assert_eq!(guarded_nonce, nonce);
}

#[test]
fn nonce_must_have_nonce_length() {
    assert_eq!(
        AeadNonce::from_secret(&Secret::from_slice(&[0u8; 16])),
        Err(CryptoError::InvalidLength)
    );
}

#[test]
fn constant_time_comparison() {
    assert!(equal_ct(b"abc", b"abc"));
    assert!(!equal_ct(b"abc", b"abd"));
    assert!(!equal_ct(b"abc", b"ab"));
    assert!(equal_ct(b"", b""));
}

#[test]
fn consumed_secrets_are_scrubbed() {
    let mut consumed = ConsumedSecrets::default();
    assert!(consumed.is_empty());
    consumed.push(Secret::from_slice(&[1, 2, 3]));
    consumed.push_bytes(vec![4, 5]);
    assert_eq!(consumed.len(), 2);

    consumed.zeroize();
    for secret in consumed.iter() {
        assert!(secret.as_slice().iter().all(|b| *b == 0));
    }
}

#[test]
fn kdf_label_encoding() {
    let label = kdf_label::KdfLabel::serialized_label(b"ctx", "test", 32)
        .expect("label serialization failed");
    assert_eq!(
        label,
        hex::decode("00200c4d4c5320312e30207465737403637478").expect("invalid hex")
    );
    assert_eq!(
        kdf_label::KdfLabel::serialized_label(&[], "test", u16::MAX as usize + 1),
        Err(CryptoError::KdfLabelTooLarge)
    );
}
