use tls_codec::{Deserialize, Serialize};

use super::*;
use crate::{
    binary_tree::{LeafNodeIndex, TreeSize},
    ciphersuite::ConsumedSecrets,
    error::{ArborError, ValidationError},
    group::{ClientState, PaddingConfig},
    messages::proposals::Proposal,
    schedule::EncryptionSecret,
    test_utils::*,
    tree::{secret_tree::SecretTree, sender_ratchet::SenderRatchetConfiguration},
};

/// Secret trees of two members of the same epoch, seen from leaf 0 and leaf 1.
fn secret_trees(ciphersuite: Ciphersuite) -> (SecretTree, SecretTree) {
    let encryption_secret = vec![0x42; ciphersuite.hash_length()];
    let size = TreeSize::from_leaf_count(2);
    (
        SecretTree::new(
            EncryptionSecret::from_slice(&encryption_secret),
            size,
            LeafNodeIndex::new(0),
        ),
        SecretTree::new(
            EncryptionSecret::from_slice(&encryption_secret),
            size,
            LeafNodeIndex::new(1),
        ),
    )
}

fn application_content(
    state: &ClientState,
    signer: &SignatureKeyPair,
    payload: &[u8],
) -> AuthenticatedContent {
    AuthenticatedContent::new_and_sign(
        WireFormat::PrivateMessage,
        Sender::build_member(LeafNodeIndex::new(0)),
        b"aad",
        FramedContentBody::Application(payload.into()),
        state.group_context(),
        signer,
    )
    .expect("signing failed")
}

fn encrypt(
    provider: &impl ArborProvider,
    state: &ClientState,
    content: &AuthenticatedContent,
    secret_tree: &mut SecretTree,
    padding: PaddingConfig,
) -> Result<PrivateMessage, MessageEncryptionError> {
    PrivateMessage::encrypt(
        provider.crypto(),
        provider.rand(),
        content,
        state.ciphersuite(),
        secret_tree,
        state.epoch_secrets.sender_data_secret(),
        padding,
        &mut ConsumedSecrets::default(),
    )
}

fn decrypt(
    provider: &impl ArborProvider,
    state: &ClientState,
    message: &PrivateMessage,
    secret_tree: &mut SecretTree,
) -> Result<AuthenticatedContent, MessageDecryptionError> {
    let crypto = provider.crypto();
    let sender_data =
        message.sender_data(crypto, state.ciphersuite(), state.epoch_secrets.sender_data_secret())?;
    message.decrypt(
        crypto,
        state.ciphersuite(),
        &sender_data,
        secret_tree,
        &SenderRatchetConfiguration::default(),
        &mut ConsumedSecrets::default(),
    )
}

#[apply(ciphersuites_and_providers)]
fn private_message_round_trip(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (state, signer) = new_group(provider, ciphersuite, b"Alice");
    let (mut sender_tree, mut receiver_tree) = secret_trees(ciphersuite);

    let content = application_content(&state, &signer, b"Hello bob!");
    let message = encrypt(
        provider,
        &state,
        &content,
        &mut sender_tree,
        PaddingConfig::None,
    )
    .expect("encryption failed");
    assert_eq!(message.content_type(), ContentType::Application);
    assert_eq!(message.epoch(), state.epoch());

    // The message survives the wire.
    let encoded = message.tls_serialize_detached().expect("encoding failed");
    let message = PrivateMessage::tls_deserialize_exact(&encoded).expect("decoding failed");

    let decrypted =
        decrypt(provider, &state, &message, &mut receiver_tree).expect("decryption failed");
    assert_eq!(decrypted, content);
    assert_eq!(decrypted.sender(), &Sender::Member(LeafNodeIndex::new(0)));

    // Every key is used once.
    assert!(decrypt(provider, &state, &message, &mut receiver_tree).is_err());
}

#[apply(ciphersuites_and_providers)]
fn padding(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (state, signer) = new_group(provider, ciphersuite, b"Alice");
    let (mut sender_tree, mut receiver_tree) = secret_trees(ciphersuite);
    let content = application_content(&state, &signer, b"short");

    let unpadded = encrypt(
        provider,
        &state,
        &content,
        &mut sender_tree,
        PaddingConfig::None,
    )
    .expect("encryption failed");
    let padded = encrypt(
        provider,
        &state,
        &content,
        &mut sender_tree,
        PaddingConfig::PadUntilLength(512),
    )
    .expect("encryption failed");
    assert!(padded.ciphertext().len() > 512);
    assert!(unpadded.ciphertext().len() < padded.ciphertext().len());

    decrypt(provider, &state, &unpadded, &mut receiver_tree).expect("decryption failed");
    let decrypted =
        decrypt(provider, &state, &padded, &mut receiver_tree).expect("decryption failed");
    assert_eq!(decrypted, content);

    // Payloads that do not fit the fixed size are refused.
    assert_eq!(
        encrypt(
            provider,
            &state,
            &application_content(&state, &signer, &[1u8; 100]),
            &mut sender_tree,
            PaddingConfig::AlwaysPad(32),
        ),
        Err(MessageEncryptionError::PayloadTooLarge)
    );
}

#[apply(ciphersuites_and_providers)]
fn tampered_ciphertext(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (state, signer) = new_group(provider, ciphersuite, b"Alice");
    let (mut sender_tree, mut receiver_tree) = secret_trees(ciphersuite);
    let content = application_content(&state, &signer, b"Hello bob!");
    let mut message = encrypt(
        provider,
        &state,
        &content,
        &mut sender_tree,
        PaddingConfig::None,
    )
    .expect("encryption failed");

    // Flip a byte after the sample the sender data key is derived from.
    let mut ciphertext = message.ciphertext().to_vec();
    let last = ciphertext.len() - 1;
    ciphertext[last] ^= 0xff;
    *message.ciphertext_mut() = ciphertext.into();

    let error = decrypt(provider, &state, &message, &mut receiver_tree)
        .expect_err("decrypted a tampered message");
    assert_eq!(error, MessageDecryptionError::AeadError);
    assert!(matches!(ArborError::from(error), ArborError::Crypto(_)));
}

#[apply(ciphersuites_and_providers)]
fn membership_tag(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (state, signer) = new_group(provider, ciphersuite, b"Alice");
    let content = AuthenticatedContent::new_and_sign(
        WireFormat::PublicMessage,
        Sender::build_member(LeafNodeIndex::new(0)),
        &[],
        FramedContentBody::Proposal(Proposal::remove(LeafNodeIndex::new(1))),
        state.group_context(),
        &signer,
    )
    .expect("signing failed");
    let mut message = PublicMessage::from(content.clone());
    message
        .set_membership_tag(
            crypto,
            ciphersuite,
            state.epoch_secrets.membership_key(),
            state.group_context(),
        )
        .expect("tagging failed");

    let bytes = MlsMessageOut::from(message.clone())
        .to_bytes()
        .expect("encoding failed");
    let MlsMessageBody::PublicMessage(decoded) = MlsMessageIn::from_bytes(&bytes)
        .expect("decoding failed")
        .extract()
    else {
        panic!("expected a public message");
    };
    assert_eq!(decoded, message);

    let authenticated_content = decoded
        .into_authenticated_content(
            crypto,
            ciphersuite,
            state.epoch_secrets.membership_key(),
            state.group_context(),
        )
        .expect("membership tag did not verify");
    assert_eq!(authenticated_content, content);
    authenticated_content
        .verify(
            crypto,
            ciphersuite,
            state.own_leaf_node().expect("own leaf").signature_key(),
            state.group_context(),
        )
        .expect("signature did not verify");

    message.invalidate_membership_tag();
    assert_eq!(
        message
            .into_authenticated_content(
                crypto,
                ciphersuite,
                state.epoch_secrets.membership_key(),
                state.group_context(),
            )
            .expect_err("accepted an invalid membership tag"),
        ArborError::Validation(ValidationError::InvalidMembershipTag)
    );
}

#[apply(ciphersuites_and_providers)]
fn signature_covers_content(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let (state, signer) = new_group(provider, ciphersuite, b"Alice");
    let signature_key = state
        .own_leaf_node()
        .expect("own leaf")
        .signature_key()
        .clone();
    let mut content = application_content(&state, &signer, b"payload");
    content
        .verify(
            provider.crypto(),
            ciphersuite,
            &signature_key,
            state.group_context(),
        )
        .expect("signature did not verify");

    content.content_mut().authenticated_data = b"changed".as_slice().into();
    assert!(content
        .verify(
            provider.crypto(),
            ciphersuite,
            &signature_key,
            state.group_context(),
        )
        .is_err());
}

#[test]
fn trailing_bytes_are_rejected() {
    let (state, signer) = new_group(
        &ArborRustCrypto::default(),
        Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519,
        b"Alice",
    );
    let content = AuthenticatedContent::new_and_sign(
        WireFormat::PublicMessage,
        Sender::build_member(LeafNodeIndex::new(0)),
        &[],
        FramedContentBody::Application(b"x".as_slice().into()),
        state.group_context(),
        &signer,
    )
    .expect("signing failed");
    let mut bytes = MlsMessageOut::from(PublicMessage::from(content))
        .to_bytes()
        .expect("encoding failed");
    assert!(MlsMessageIn::from_bytes(&bytes).is_ok());
    bytes.push(0);
    assert!(matches!(
        MlsMessageIn::from_bytes(&bytes),
        Err(ArborError::Codec(_))
    ));
}

#[test]
fn wire_format_codes() {
    assert_eq!(
        WireFormat::PrivateMessage
            .tls_serialize_detached()
            .expect("encoding failed"),
        [0, 2]
    );
    assert_eq!(ContentType::try_from(3u8), Ok(ContentType::Commit));
    assert!(ContentType::try_from(0u8).is_err());
    assert!(ContentType::Proposal.is_handshake_message());
    assert!(!ContentType::Application.is_handshake_message());
}
