use super::{
    secret_tree::{SecretTree, SecretTreeError, SecretType},
    sender_ratchet::{RatchetKeyMaterial, SenderRatchetConfiguration},
};
use crate::{
    binary_tree::{LeafNodeIndex, TreeSize},
    ciphersuite::ConsumedSecrets,
    schedule::EncryptionSecret,
    test_utils::*,
};

fn secret_tree(ciphersuite: Ciphersuite, leaf_count: u32, own_index: u32) -> SecretTree {
    SecretTree::new(
        EncryptionSecret::from_slice(&vec![0x17; ciphersuite.hash_length()]),
        TreeSize::from_leaf_count(leaf_count),
        LeafNodeIndex::new(own_index),
    )
}

fn encrypt(
    provider: &impl ArborProvider,
    ciphersuite: Ciphersuite,
    tree: &mut SecretTree,
    secret_type: SecretType,
) -> (u32, RatchetKeyMaterial) {
    tree.secret_for_encryption(
        ciphersuite,
        provider.crypto(),
        secret_type,
        &mut ConsumedSecrets::default(),
    )
    .expect("no encryption secret")
}

fn decrypt(
    provider: &impl ArborProvider,
    ciphersuite: Ciphersuite,
    tree: &mut SecretTree,
    sender: u32,
    generation: u32,
    configuration: &SenderRatchetConfiguration,
) -> Result<RatchetKeyMaterial, SecretTreeError> {
    tree.secret_for_decryption(
        ciphersuite,
        provider.crypto(),
        LeafNodeIndex::new(sender),
        SecretType::ApplicationSecret,
        generation,
        configuration,
        &mut ConsumedSecrets::default(),
    )
}

#[apply(ciphersuites_and_providers)]
fn sender_and_receiver_agree(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let mut sender = secret_tree(ciphersuite, 4, 2);
    let mut receiver = secret_tree(ciphersuite, 4, 0);
    let configuration = SenderRatchetConfiguration::default();

    for expected_generation in 0..4 {
        let (generation, key_material) =
            encrypt(provider, ciphersuite, &mut sender, SecretType::ApplicationSecret);
        assert_eq!(generation, expected_generation);
        assert_eq!(
            decrypt(provider, ciphersuite, &mut receiver, 2, generation, &configuration),
            Ok(key_material)
        );
    }
    assert_eq!(
        sender.generation(LeafNodeIndex::new(2), SecretType::ApplicationSecret),
        4
    );
    assert_eq!(
        sender.generation(LeafNodeIndex::new(2), SecretType::HandshakeSecret),
        0
    );
}

#[apply(ciphersuites_and_providers)]
fn handshake_and_application_keys_differ(
    ciphersuite: Ciphersuite,
    provider: &impl ArborProvider,
) {
    let mut tree = secret_tree(ciphersuite, 2, 0);
    let (_, handshake) = encrypt(provider, ciphersuite, &mut tree, SecretType::HandshakeSecret);
    let (_, application) =
        encrypt(provider, ciphersuite, &mut tree, SecretType::ApplicationSecret);
    assert_ne!(handshake, application);
}

#[apply(ciphersuites_and_providers)]
fn leaves_have_independent_keys(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let mut receiver = secret_tree(ciphersuite, 8, 0);
    let configuration = SenderRatchetConfiguration::default();
    let mut keys = Vec::new();
    for sender in 1..8 {
        keys.push(
            decrypt(provider, ciphersuite, &mut receiver, sender, 0, &configuration)
                .expect("no decryption secret"),
        );
    }
    for (i, a) in keys.iter().enumerate() {
        for b in keys.iter().skip(i + 1) {
            assert_ne!(a, b);
        }
    }
}

#[apply(ciphersuites_and_providers)]
fn out_of_order_generations(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let mut sender = secret_tree(ciphersuite, 2, 1);
    let mut receiver = secret_tree(ciphersuite, 2, 0);
    let configuration = SenderRatchetConfiguration::default();
    let sent: Vec<_> = (0..4)
        .map(|_| encrypt(provider, ciphersuite, &mut sender, SecretType::ApplicationSecret).1)
        .collect();

    for generation in [3, 1, 2, 0] {
        assert_eq!(
            decrypt(provider, ciphersuite, &mut receiver, 1, generation, &configuration),
            Ok(sent[generation as usize].clone())
        );
    }

    // Every generation can be used once.
    for generation in 0..4 {
        assert_eq!(
            decrypt(provider, ciphersuite, &mut receiver, 1, generation, &configuration),
            Err(SecretTreeError::SecretReuseError)
        );
    }
}

#[apply(ciphersuites_and_providers)]
fn window_bounds(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let mut receiver = secret_tree(ciphersuite, 2, 0);
    let configuration = SenderRatchetConfiguration::new(2, 10);

    assert_eq!(
        decrypt(provider, ciphersuite, &mut receiver, 1, 11, &configuration),
        Err(SecretTreeError::TooDistantInTheFuture)
    );
    decrypt(provider, ciphersuite, &mut receiver, 1, 10, &configuration)
        .expect("within the forward distance");

    // The head is at 11 now and only generations 9 and 10 are retained.
    decrypt(provider, ciphersuite, &mut receiver, 1, 9, &configuration)
        .expect("within the tolerance");
    assert_eq!(
        decrypt(provider, ciphersuite, &mut receiver, 1, 8, &configuration),
        Err(SecretTreeError::TooDistantInThePast)
    );
    assert_eq!(
        decrypt(provider, ciphersuite, &mut receiver, 1, 10, &configuration),
        Err(SecretTreeError::SecretReuseError)
    );
}

#[apply(ciphersuites_and_providers)]
fn wrong_ratchet_or_leaf(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let mut tree = secret_tree(ciphersuite, 4, 0);
    let configuration = SenderRatchetConfiguration::default();

    encrypt(provider, ciphersuite, &mut tree, SecretType::ApplicationSecret);
    assert_eq!(
        decrypt(provider, ciphersuite, &mut tree, 0, 0, &configuration),
        Err(SecretTreeError::RatchetTypeError)
    );
    assert_eq!(
        decrypt(provider, ciphersuite, &mut tree, 4, 0, &configuration),
        Err(SecretTreeError::IndexOutOfBounds)
    );
}

#[apply(ciphersuites_and_providers)]
fn derived_secrets_are_consumed(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let mut tree = secret_tree(ciphersuite, 4, 0);
    let mut consumed = ConsumedSecrets::default();
    tree.secret_for_encryption(
        ciphersuite,
        provider.crypto(),
        SecretType::ApplicationSecret,
        &mut consumed,
    )
    .expect("no encryption secret");
    // The root, the parent of leaf 0, the leaf secret and the first
    // application ratchet secret.
    assert_eq!(consumed.len(), 4);

    let mut consumed = ConsumedSecrets::default();
    tree.secret_for_decryption(
        ciphersuite,
        provider.crypto(),
        LeafNodeIndex::new(1),
        SecretType::ApplicationSecret,
        0,
        &SenderRatchetConfiguration::default(),
        &mut consumed,
    )
    .expect("no decryption secret");
    // The sibling leaf was derived already, so only its leaf and ratchet
    // secrets are used up.
    assert_eq!(consumed.len(), 2);
}

#[apply(ciphersuites_and_providers)]
fn zeroed_ratchet_head(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let mut sender = secret_tree(ciphersuite, 2, 1);
    let mut receiver = secret_tree(ciphersuite, 2, 0);
    let configuration = SenderRatchetConfiguration::default();

    let (_, first) = encrypt(provider, ciphersuite, &mut sender, SecretType::ApplicationSecret);
    assert_eq!(
        decrypt(provider, ciphersuite, &mut receiver, 1, 0, &configuration),
        Ok(first)
    );

    sender
        .zero_ratchet_head(LeafNodeIndex::new(1), SecretType::ApplicationSecret)
        .expect("ratchet exists");
    let (generation, second) =
        encrypt(provider, ciphersuite, &mut sender, SecretType::ApplicationSecret);
    assert_eq!(generation, 1);
    assert_ne!(
        decrypt(provider, ciphersuite, &mut receiver, 1, 1, &configuration),
        Ok(second)
    );
}

#[test]
fn secret_tree_known_answers() {
    let provider = ArborRustCrypto::default();
    let ciphersuite = Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;
    let mut tree = secret_tree(ciphersuite, 4, 1);
    let configuration = SenderRatchetConfiguration::default();

    // (leaf, chain, generation, key, nonce)
    let vectors = [
        (0, SecretType::HandshakeSecret, 0, "62be85d7e7d83f944eb3905b734eb36b", "564cee7642100cdd82bd0f0d"),
        (0, SecretType::HandshakeSecret, 1, "18624f213d2e22bc30a27c70c1f061c7", "100488eea75e0d47b1a27a1a"),
        (0, SecretType::ApplicationSecret, 0, "240f8c2c5f12e9f5f77cc863c028d022", "03647c244f2a69194c10fba6"),
        (0, SecretType::ApplicationSecret, 1, "08de12c345e4233a4e161194a4d7127a", "cf43570452252b73a9bb4d20"),
        (3, SecretType::HandshakeSecret, 0, "af113c3f9b9127cd3a792701305a4268", "24eb6cda1415af3353721a2a"),
        (3, SecretType::HandshakeSecret, 1, "3a873c530ba5fa8868d93f16539c6414", "04940e85b7f68005918bf407"),
        (3, SecretType::ApplicationSecret, 0, "a4887769b1202542dfb8adfdfb1dd8e8", "3fdc27e61e1467d969f206e9"),
        (3, SecretType::ApplicationSecret, 1, "bbb7b3a4e8b670e84f2aa5467fc82a65", "aec4e789a054787cb62ac605"),
    ];
    for (leaf, secret_type, generation, key, nonce) in vectors {
        let (aead_key, aead_nonce) = tree
            .secret_for_decryption(
                ciphersuite,
                provider.crypto(),
                LeafNodeIndex::new(leaf),
                secret_type,
                generation,
                &configuration,
                &mut ConsumedSecrets::default(),
            )
            .expect("no decryption secret");
        assert_eq!(aead_key.as_slice(), hex::decode(key).expect("invalid hex"));
        assert_eq!(aead_nonce.as_slice(), hex::decode(nonce).expect("invalid hex"));
    }
}
