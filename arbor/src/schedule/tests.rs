use std::collections::BTreeMap;

use tls_codec::Deserialize as TlsDeserializeTrait;

use super::{
    errors::*,
    psk::{
        check_duplicates, load_psks, ExternalPsk, Psk, ResumptionPsk, ResumptionPskStore,
        ResumptionPskUsage,
    },
    *,
};
use crate::{
    error::ArborError,
    extensions::Extensions,
    group::{GroupEpoch, GroupId},
    schedule::psk::PreSharedKeyId,
    test_utils::*,
    utils::vl_prefix_len,
};

fn group_context(ciphersuite: Ciphersuite) -> GroupContext {
    GroupContext::initial(
        ciphersuite,
        GroupId::from_slice(b"group"),
        vec![1; ciphersuite.hash_length()],
        Extensions::empty(),
    )
}

fn joiner_secret(ciphersuite: Ciphersuite) -> JoinerSecret {
    JoinerSecret::from_slice(&vec![0x11; ciphersuite.hash_length()])
}

fn no_psks(provider: &impl ArborProvider, ciphersuite: Ciphersuite) -> PskSecret {
    PskSecret::new(provider.crypto(), ciphersuite, &[]).expect("no PSKs")
}

#[apply(ciphersuites_and_providers)]
fn key_schedule_states(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let serialized_context = group_context(ciphersuite)
        .tls_serialize_detached()
        .expect("encoding failed");
    let mut key_schedule = KeySchedule::init(
        ciphersuite,
        crypto,
        &joiner_secret(ciphersuite),
        no_psks(provider, ciphersuite),
    )
    .expect("init failed");

    // The epoch secrets need the group context.
    assert!(matches!(
        key_schedule.epoch_secrets(crypto, &mut ConsumedSecrets::default()),
        Err(KeyScheduleError::InvalidState(ErrorState::Context))
    ));

    key_schedule.welcome(crypto).expect("welcome secret");
    key_schedule
        .add_context(crypto, &serialized_context)
        .expect("adding the context failed");

    // The welcome secret comes before the context.
    assert!(matches!(
        key_schedule.welcome(crypto),
        Err(KeyScheduleError::InvalidState(ErrorState::Init))
    ));
    assert!(matches!(
        key_schedule.add_context(crypto, &serialized_context),
        Err(KeyScheduleError::InvalidState(ErrorState::Init))
    ));

    let mut consumed = ConsumedSecrets::default();
    key_schedule
        .epoch_secrets(crypto, &mut consumed)
        .expect("epoch secrets");
    assert_eq!(consumed.len(), 1);
    assert!(matches!(
        key_schedule.epoch_secrets(crypto, &mut consumed),
        Err(KeyScheduleError::InvalidState(ErrorState::Context))
    ));
}

fn unhex(value: &str) -> Vec<u8> {
    hex::decode(value).expect("invalid hex")
}

/// Two external PSKs with fixed nonces.
fn fixed_psks(ciphersuite: Ciphersuite) -> Vec<(PreSharedKeyId, Secret)> {
    [(b"psk-a", 0x42, b"secret-a"), (b"psk-b", 0x43, b"secret-b")]
        .into_iter()
        .map(|(psk_id, nonce, secret)| {
            let psk_id = PreSharedKeyId {
                psk: Psk::External(ExternalPsk::new(psk_id.to_vec())),
                psk_nonce: vec![nonce; ciphersuite.hash_length()].into(),
            };
            (psk_id, Secret::from_slice(secret))
        })
        .collect()
}

#[test]
fn key_schedule_known_answers() {
    let provider = ArborRustCrypto::default();
    let crypto = provider.crypto();
    let ciphersuite = Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;
    let serialized_context = group_context(ciphersuite)
        .tls_serialize_detached()
        .expect("encoding failed");
    assert_eq!(
        serialized_context,
        unhex("000100010567726f757000000000000000002001010101010101010101010101010101010101010101010101010101010101010000")
    );

    let joiner_secret = JoinerSecret::new(
        crypto,
        ciphersuite,
        CommitSecret::from_slice(&[0x3c; 32]),
        &InitSecret::from_slice(&[0x5a; 32]),
        &serialized_context,
        &mut ConsumedSecrets::default(),
    )
    .expect("joiner secret");
    assert_eq!(
        joiner_secret.as_slice(),
        unhex("786b24470b23be6170cd9336f5bf281c235a7d716953bec04458c39586154b1a")
    );

    let mut key_schedule =
        KeySchedule::init(ciphersuite, crypto, &joiner_secret, no_psks(&provider, ciphersuite))
            .expect("init failed");
    let welcome_secret = key_schedule.welcome(crypto).expect("welcome secret");
    assert_eq!(
        welcome_secret.secret.as_slice(),
        unhex("2fdbb0dd422f0a2d45a8e0f2d6945c9f3189cfdeb54e96c3bc36d2a8744a64b1")
    );
    let (welcome_key, welcome_nonce) = welcome_secret
        .derive_welcome_key_nonce(crypto)
        .expect("welcome key");
    assert_eq!(welcome_key.as_slice(), unhex("42223526314d7269d2ea4d176288b6f6"));
    assert_eq!(welcome_nonce.as_slice(), unhex("43a87464e69e9d83c577b91f"));

    key_schedule
        .add_context(crypto, &serialized_context)
        .expect("adding the context failed");
    let mut consumed = ConsumedSecrets::default();
    let (epoch_secrets, encryption_secret) = key_schedule
        .epoch_secrets(crypto, &mut consumed)
        .expect("epoch secrets");
    let epoch_secret = consumed.iter().next().expect("epoch secret");
    assert_eq!(
        epoch_secret.as_slice(),
        unhex("d98e73164bc45f4b282c91457500df543a6ebdf9741187ff43beb40d2c137306")
    );

    let derived = [
        (
            &epoch_secrets.sender_data_secret().secret,
            "d87ac553e8cc51e471bd4a44695607b4c8761e0e302d22d181678edb14f49838",
        ),
        (
            &encryption_secret.secret,
            "2b38f8b9478feae2ab44ca4084b3b9fe17954f34af74e14ab85dff1513806fa8",
        ),
        (
            &epoch_secrets.exporter_secret().secret,
            "67aae3120083057b569a2e333f869600e8a9c7631ae235ad5f28281f6458f04e",
        ),
        (
            &epoch_secrets.epoch_authenticator().secret,
            "e1d1146fb16750e807c73f190084e410e70dd237d162817a5bbba41dc26ee31b",
        ),
        (
            &epoch_secrets.external_secret().secret,
            "466037041475bf50d43aad40b380aa9a11220980a27d858399ce071adf4c406b",
        ),
        (
            &epoch_secrets.confirmation_key().secret,
            "926d1f5cf3ce5eb14465b9e0aa46accc297d6422ac9a912480d08411d099865c",
        ),
        (
            &epoch_secrets.membership_key().secret,
            "b65278760a704b5cf27360b451fe0b3f489c36ef116344f5f18df619cbd1a740",
        ),
        (
            &epoch_secrets.resumption_psk().secret,
            "2fce5d062b1df75c061f89c5bb9d6cd8cbd54012373464c3c29e0d67e3deae61",
        ),
        (
            &epoch_secrets.init_secret().secret,
            "fa19736bd8ad4c85f5536b36f32b82a66c6361f53262582691b38952edaaa087",
        ),
    ];
    for (secret, expected) in derived {
        assert_eq!(secret.as_slice(), unhex(expected));
    }

    let exported = epoch_secrets
        .exporter_secret()
        .derive_exported_secret(ciphersuite, crypto, "label", b"context", 32)
        .expect("export failed");
    assert_eq!(
        exported,
        unhex("8b267227a82b5c7b85055abcb04fa60fbc736c6c1e2283b521c51f54add6cd01")
    );

    // The same epoch with two PSKs injected.
    let psk_secret = PskSecret::new(crypto, ciphersuite, &fixed_psks(ciphersuite))
        .expect("PSK derivation failed");
    let (_, epoch_secrets, _) = derive_epoch(
        crypto,
        ciphersuite,
        &joiner_secret,
        psk_secret,
        &group_context(ciphersuite),
        &mut ConsumedSecrets::default(),
    )
    .expect("key schedule failed");
    assert_eq!(
        epoch_secrets.epoch_authenticator().as_slice(),
        unhex("52da8c6944afdc65461dda3d914867e8ad97f0ac4ac194e1bb62e18f055efd02")
    );
}

#[test]
fn psk_secret_known_answers() {
    let provider = ArborRustCrypto::default();
    let ciphersuite = Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519;
    let psks = fixed_psks(ciphersuite);

    let single = PskSecret::new(provider.crypto(), ciphersuite, &psks[..1])
        .expect("PSK derivation failed");
    assert_eq!(
        single.secret().as_slice(),
        unhex("b0b25efd55ba5587221a26cbd9638360d7ffbdf6129fa699f371def80dfccc30")
    );
    let both =
        PskSecret::new(provider.crypto(), ciphersuite, &psks).expect("PSK derivation failed");
    assert_eq!(
        both.secret().as_slice(),
        unhex("114c0c741c86ac11bfa3cb6279fecc7f637f10c413c02ef6c7cca7d6e7e836f7")
    );
    assert_eq!(
        no_psks(&provider, ciphersuite).secret().as_slice(),
        vec![0u8; ciphersuite.hash_length()]
    );
}

#[apply(ciphersuites_and_providers)]
fn epoch_secrets_are_bound_to_the_context(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let context = group_context(ciphersuite);
    let derive = |context: &GroupContext, psk: PskSecret| {
        let (_, epoch_secrets, _) = derive_epoch(
            crypto,
            ciphersuite,
            &joiner_secret(ciphersuite),
            psk,
            context,
            &mut ConsumedSecrets::default(),
        )
        .expect("key schedule failed");
        epoch_secrets
    };

    let a = derive(&context, no_psks(provider, ciphersuite));
    let b = derive(&context, no_psks(provider, ciphersuite));
    assert_eq!(a, b);
    assert_eq!(
        a.epoch_authenticator().as_slice().len(),
        ciphersuite.hash_length()
    );
    assert_ne!(a.membership_key().secret, a.confirmation_key().secret);

    let next = context.provisional(context.tree_hash().to_vec(), Extensions::empty());
    let c = derive(&next, no_psks(provider, ciphersuite));
    assert_ne!(a.epoch_authenticator(), c.epoch_authenticator());

    let psk_id = PreSharedKeyId::external(ciphersuite, provider.rand(), b"psk".to_vec())
        .expect("Not enough randomness.");
    let psk = PskSecret::new(
        crypto,
        ciphersuite,
        &[(psk_id, Secret::from_slice(b"secret"))],
    )
    .expect("PSK derivation failed");
    let d = derive(&context, psk);
    assert_ne!(a.epoch_authenticator(), d.epoch_authenticator());
}

#[apply(ciphersuites_and_providers)]
fn exporter(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let (_, epoch_secrets, _) = derive_epoch(
        crypto,
        ciphersuite,
        &joiner_secret(ciphersuite),
        no_psks(provider, ciphersuite),
        &group_context(ciphersuite),
        &mut ConsumedSecrets::default(),
    )
    .expect("key schedule failed");
    let exporter = epoch_secrets.exporter_secret();

    let export = |label: &str, context: &[u8], length: usize| {
        exporter
            .derive_exported_secret(ciphersuite, crypto, label, context, length)
            .expect("export failed")
    };
    assert_eq!(export("label", b"context", 32), export("label", b"context", 32));
    assert_ne!(export("label", b"context", 32), export("other", b"context", 32));
    assert_ne!(export("label", b"context", 32), export("label", b"other", 32));
    assert_eq!(export("label", b"", 7).len(), 7);
    assert_eq!(export("label", b"", 100).len(), 100);
}

#[apply(ciphersuites_and_providers)]
fn psk_order_matters(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let crypto = provider.crypto();
    let first = PreSharedKeyId::external(ciphersuite, provider.rand(), b"first".to_vec())
        .expect("Not enough randomness.");
    let second = PreSharedKeyId::external(ciphersuite, provider.rand(), b"second".to_vec())
        .expect("Not enough randomness.");
    let psk = |ids: &[&PreSharedKeyId]| {
        let psks: Vec<_> = ids
            .iter()
            .map(|id| ((*id).clone(), Secret::from_slice(id.psk_nonce())))
            .collect();
        PskSecret::new(crypto, ciphersuite, &psks).expect("PSK derivation failed")
    };

    assert_eq!(
        no_psks(provider, ciphersuite).secret(),
        &Secret::zero(ciphersuite)
    );
    let forward = psk(&[&first, &second]);
    let backward = psk(&[&second, &first]);
    assert_ne!(forward.secret(), backward.secret());
    assert_eq!(forward.secret(), psk(&[&first, &second]).secret());
    assert_ne!(forward.secret(), psk(&[&first]).secret());
}

#[apply(ciphersuites_and_providers)]
fn psk_id_validation(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let psk_id = PreSharedKeyId::external(ciphersuite, provider.rand(), b"psk".to_vec())
        .expect("Not enough randomness.");
    assert_eq!(psk_id.psk_nonce().len(), ciphersuite.hash_length());
    assert!(psk_id.validate_in_proposal(ciphersuite).is_ok());

    let short_nonce = PreSharedKeyId {
        psk: psk_id.psk().clone(),
        psk_nonce: vec![0u8; 4].into(),
    };
    assert_eq!(
        short_nonce.validate_in_proposal(ciphersuite),
        Err(PskError::NonceLengthMismatch {
            expected: ciphersuite.hash_length(),
            got: 4,
        })
    );

    let reinit = PreSharedKeyId::new(
        ciphersuite,
        provider.rand(),
        Psk::Resumption(ResumptionPsk::new(
            ResumptionPskUsage::Reinit,
            GroupId::from_slice(b"group"),
            GroupEpoch::from(1),
        )),
    )
    .expect("Not enough randomness.");
    assert_eq!(
        reinit.validate_in_proposal(ciphersuite),
        Err(PskError::UsageMismatch {
            allowed: vec![ResumptionPskUsage::Application],
            got: ResumptionPskUsage::Reinit,
        })
    );

    // Two ids for the same key are duplicates even with different nonces.
    let again = PreSharedKeyId::external(ciphersuite, provider.rand(), b"psk".to_vec())
        .expect("Not enough randomness.");
    assert!(check_duplicates(&[psk_id.clone(), reinit.clone()]).is_ok());
    assert_eq!(
        check_duplicates(&[psk_id, reinit, again.clone()]),
        Err(PskError::Duplicate { first: again })
    );
}

#[apply(ciphersuites_and_providers)]
fn load_psks_from_stores(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let group_id = GroupId::from_slice(b"group");
    let mut external_psks = BTreeMap::new();
    external_psks.insert(b"known".to_vec(), b"secret".to_vec());
    let mut resumption_psks = ResumptionPskStore::new(4);
    resumption_psks.add(GroupEpoch::from(3), Secret::from_slice(b"resumption"));

    let external = PreSharedKeyId::external(ciphersuite, provider.rand(), b"known".to_vec())
        .expect("Not enough randomness.");
    let resumption =
        PreSharedKeyId::resumption(ciphersuite, provider.rand(), group_id.clone(), GroupEpoch::from(3))
            .expect("Not enough randomness.");
    let loaded = load_psks(
        &[external.clone(), resumption.clone()],
        &external_psks,
        &resumption_psks,
        &group_id,
    )
    .expect("PSKs are known");
    assert_eq!(
        loaded,
        vec![
            (external, Secret::from_slice(b"secret")),
            (resumption, Secret::from_slice(b"resumption")),
        ]
    );

    let unknown = |psk_id: PreSharedKeyId| {
        load_psks(&[psk_id], &external_psks, &resumption_psks, &group_id)
    };
    assert_eq!(
        unknown(
            PreSharedKeyId::external(ciphersuite, provider.rand(), b"unknown".to_vec())
                .expect("Not enough randomness.")
        ),
        Err(PskError::KeyNotFound)
    );
    assert_eq!(
        unknown(
            PreSharedKeyId::resumption(ciphersuite, provider.rand(), group_id.clone(), GroupEpoch::from(2))
                .expect("Not enough randomness.")
        ),
        Err(PskError::KeyNotFound)
    );
    assert_eq!(
        unknown(
            PreSharedKeyId::resumption(
                ciphersuite,
                provider.rand(),
                GroupId::from_slice(b"other group"),
                GroupEpoch::from(3)
            )
            .expect("Not enough randomness.")
        ),
        Err(PskError::KeyNotFound)
    );
}

#[test]
fn resumption_psk_store_evicts_the_oldest_epoch() {
    let mut store = ResumptionPskStore::new(2);
    for epoch in 0..3u64 {
        store.add(GroupEpoch::from(epoch), Secret::from_slice(&[epoch as u8]));
    }
    assert!(store.get(GroupEpoch::from(0)).is_none());
    assert_eq!(store.get(GroupEpoch::from(1)), Some(&Secret::from_slice(&[1])));
    assert_eq!(store.get(GroupEpoch::from(2)), Some(&Secret::from_slice(&[2])));

    let mut disabled = ResumptionPskStore::new(0);
    disabled.add(GroupEpoch::from(0), Secret::from_slice(&[0]));
    assert!(disabled.get(GroupEpoch::from(0)).is_none());
}

#[rstest]
#[case::empty(0, 1)]
#[case::largest_one_byte(63, 1)]
#[case::smallest_two_bytes(64, 2)]
#[case::largest_two_bytes(16383, 2)]
#[case::smallest_four_bytes(16384, 4)]
fn psk_id_length_prefix(#[case] len: usize, #[case] prefix_len: usize) {
    let psk = ExternalPsk::new(vec![0xab; len]);
    let bytes = psk.tls_serialize_detached().expect("encoding failed");
    assert_eq!(vl_prefix_len(len), prefix_len);
    assert_eq!(bytes.len(), prefix_len + len);
    // The two top bits of the first byte encode the prefix length.
    let expected_tag = match prefix_len {
        1 => 0b00,
        2 => 0b01,
        _ => 0b10,
    };
    assert_eq!(bytes[0] >> 6, expected_tag);
    assert_eq!(
        ExternalPsk::tls_deserialize_exact(&bytes).expect("decoding failed"),
        psk
    );

    let truncated = ExternalPsk::tls_deserialize_exact(&bytes[..bytes.len() - 1])
        .expect_err("decoded a truncated psk id");
    assert!(matches!(ArborError::from(truncated), ArborError::Codec(_)));

    // 0b11 is reserved.
    let mut reserved = bytes.clone();
    reserved[0] |= 0xc0;
    let reserved = ExternalPsk::tls_deserialize_exact(&reserved)
        .expect_err("decoded a reserved length prefix");
    assert!(matches!(ArborError::from(reserved), ArborError::Codec(_)));
}
