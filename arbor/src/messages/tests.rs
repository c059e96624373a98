use tls_codec::{Deserialize, Serialize, Size};

use super::{group_info::GroupInfo, proposals::*, *};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::signable::SignatureError,
    extensions::{Extension, ExtensionType, Extensions},
    group::GroupId,
    test_utils::*,
    versions::ProtocolVersion,
};

#[apply(ciphersuites_and_providers)]
fn group_secrets_are_bound_to_the_group_info(
    ciphersuite: Ciphersuite,
    provider: &impl ArborProvider,
) {
    let crypto = provider.crypto();
    let (bundle, _signer) = new_key_package(provider, ciphersuite, b"Bob");
    let key_package = bundle.key_package();
    let joiner_secret = JoinerSecret::from_slice(&vec![0x23; ciphersuite.hash_length()]);
    let psk = PreSharedKeyId::external(ciphersuite, provider.rand(), b"psk".to_vec())
        .expect("Not enough randomness.");

    let encrypted = GroupSecrets::new(&joiner_secret, None, vec![psk.clone()])
        .encrypt(
            crypto,
            ciphersuite,
            key_package.hash_ref(crypto).expect("hashing failed"),
            key_package.init_key().as_slice(),
            b"encrypted group info",
        )
        .expect("encryption failed");
    assert_eq!(
        encrypted.new_member(),
        &key_package.hash_ref(crypto).expect("hashing failed")
    );

    let decrypted = GroupSecrets::decrypt(
        crypto,
        ciphersuite,
        &encrypted,
        bundle.init_private_key(),
        b"encrypted group info",
    )
    .expect("decryption failed");
    assert_eq!(decrypted.joiner_secret(), joiner_secret);
    assert!(decrypted.path_secret().is_none());
    assert_eq!(decrypted.psks(), &[psk]);

    // The secrets cannot be moved to another welcome.
    assert!(matches!(
        GroupSecrets::decrypt(
            crypto,
            ciphersuite,
            &encrypted,
            bundle.init_private_key(),
            b"other group info",
        ),
        Err(WelcomeError::CryptoError(_))
    ));
}

#[apply(ciphersuites_and_providers)]
fn welcome_encoding(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (bundle, _signer) = new_key_package(provider, ciphersuite, b"Bob");
    let key_package = bundle.key_package();
    let joiner_secret = JoinerSecret::from_slice(&vec![0x23; ciphersuite.hash_length()]);
    let encrypted = GroupSecrets::new(&joiner_secret, None, vec![])
        .encrypt(
            crypto,
            ciphersuite,
            key_package.hash_ref(crypto).expect("hashing failed"),
            key_package.init_key().as_slice(),
            &[1, 2, 3],
        )
        .expect("encryption failed");
    let welcome = Welcome::new(ciphersuite, vec![encrypted.clone()], vec![1, 2, 3]);

    let encoded = welcome.tls_serialize_detached().expect("encoding failed");
    let decoded = Welcome::tls_deserialize_exact(&encoded).expect("decoding failed");
    assert_eq!(decoded, welcome);
    assert_eq!(decoded.ciphersuite(), ciphersuite);
    assert_eq!(decoded.secrets(), &[encrypted]);
    assert_eq!(decoded.encrypted_group_info(), &[1, 2, 3]);
}

#[apply(ciphersuites_and_providers)]
fn group_info_signature(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (state, signer) = new_group(provider, ciphersuite, b"Alice");
    let signature_key = state
        .own_leaf_node()
        .expect("own leaf")
        .signature_key()
        .clone();

    let group_info = state
        .export_group_info(provider, &signer)
        .expect("group info export failed")
        .into_group_info()
        .expect("not a group info");
    assert_eq!(group_info.group_context(), state.group_context());
    assert_eq!(group_info.confirmation_tag(), state.confirmation_tag());
    assert_eq!(group_info.signer(), state.own_leaf_index());
    assert!(group_info.extensions().contains(ExtensionType::ExternalPub));
    group_info
        .verify(crypto, &signature_key)
        .expect("signature did not verify");

    let encoded = group_info.tls_serialize_detached().expect("encoding failed");
    let decoded = GroupInfo::tls_deserialize_exact(&encoded).expect("decoding failed");
    assert_eq!(decoded, group_info);

    // The extensions are covered by the signature.
    let mut tampered = group_info;
    tampered
        .payload_mut()
        .extensions_mut()
        .add_or_replace(Extension::custom(0xff00, vec![1]).expect("not reserved"));
    assert_eq!(
        tampered.verify(crypto, &signature_key),
        Err(SignatureError::VerificationError)
    );
}

#[test]
fn commit_without_proposals() {
    let commit = Commit {
        proposals: vec![],
        path: None,
    };
    assert!(!commit.has_path());
    let encoded = commit.tls_serialize_detached().expect("encoding failed");
    assert_eq!(encoded, [0, 0]);
    assert_eq!(
        Commit::tls_deserialize_exact(&encoded).expect("decoding failed"),
        commit
    );
}

#[test]
fn proposal_encoding() {
    let remove = Proposal::remove(LeafNodeIndex::new(5));
    let encoded = remove.tls_serialize_detached().expect("encoding failed");
    assert_eq!(encoded, [0, 3, 0, 0, 0, 5]);
    assert_eq!(encoded.len(), remove.tls_serialized_len());
    assert_eq!(
        Proposal::tls_deserialize_exact(&encoded).expect("decoding failed"),
        remove
    );

    let reinit = Proposal::ReInit(ReInitProposal::new(
        GroupId::from_slice(b"next"),
        ProtocolVersion::Mls10,
        Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519,
        Extensions::empty(),
    ));
    let encoded = reinit.tls_serialize_detached().expect("encoding failed");
    assert_eq!(&encoded[..2], &[0, 5]);
    assert_eq!(
        Proposal::tls_deserialize_exact(&encoded).expect("decoding failed"),
        reinit
    );
}

#[test]
fn custom_proposals() {
    assert!(CustomProposal::new(7, vec![]).is_none());
    let custom = CustomProposal::new(0x0a0a, vec![1, 2]).expect("not a default type");
    let proposal = Proposal::Custom(custom);
    assert_eq!(proposal.proposal_type(), ProposalType::Custom(0x0a0a));
    assert!(!proposal.proposal_type().is_default());
    assert!(proposal.is_path_required());

    let encoded = proposal.tls_serialize_detached().expect("encoding failed");
    assert_eq!(encoded, [0x0a, 0x0a, 2, 1, 2]);
    assert_eq!(
        Proposal::tls_deserialize_exact(&encoded).expect("decoding failed"),
        proposal
    );
}

#[test]
fn proposal_types() {
    for value in 1..=7u16 {
        let proposal_type = ProposalType::from(value);
        assert!(proposal_type.is_default());
        assert_eq!(u16::from(proposal_type), value);
    }
    assert!(ProposalType::ExternalInit.is_by_value_only());
    assert!(!ProposalType::Add.is_by_value_only());
    assert!(!Proposal::remove(LeafNodeIndex::new(1))
        .proposal_type()
        .is_by_value_only());
}
