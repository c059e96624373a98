mod utils;

use arbor::{
    extensions::RequiredCapabilitiesExtension,
    messages::proposals::ReInitProposal,
    schedule::psk::PreSharedKeyId,
    versions::ProtocolVersion,
};
use tls_codec::Serialize;
use utils::*;
#[allow(unused_imports)]
use rstest_reuse;

/// Rejects every commit.
struct RejectCommits;

impl IncomingMessageCallback for RejectCommits {
    fn on_commit(&mut self, _commit: &StagedCommitInfo) -> IncomingMessageAction {
        IncomingMessageAction::Reject
    }
}

#[apply(ciphersuites_and_providers)]
fn hello_bob(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let _ = pretty_env_logger::try_init();
    let alice = Client::new(b"Alice", ciphersuite);
    let bob = Client::new(b"Bob", ciphersuite);

    let alice_state = alice.create_group(provider, ciphersuite, b"group1", ClientConfig::default());
    let (alice_state, bob_state) =
        add_member(provider, &alice_state, &alice, &bob, ClientConfig::default());
    assert_agree(&[&alice_state, &bob_state]);

    let (alice_state, message, _) = alice_state
        .create_application_message(provider, &alice.signer, &[], b"Hello bob!")
        .expect("encryption failed");
    let old_bob_state = bob_state;
    let output = old_bob_state
        .process_message(provider, transmit(&message), &mut AcceptAll)
        .expect("decryption failed");
    let ProcessedContent::ApplicationMessage(received) = output.content else {
        panic!("expected an application message");
    };
    assert_eq!(received.plaintext(), b"Hello bob!");
    assert_eq!(received.sender(), alice_state.own_leaf_index());
    let new_bob_state = output.state;

    // With a zeroed ratchet head Alice encrypts under a key Bob never
    // derives.
    let broken_alice = alice_state.zero_ratchet_head().expect("zeroing failed");
    let (_, broken_message, _) = broken_alice
        .create_application_message(provider, &alice.signer, &[], b"Hello bob!")
        .expect("encryption failed");
    assert!(matches!(
        new_bob_state.process_message(provider, transmit(&broken_message), &mut AcceptAll),
        Err(ArborError::Crypto(_))
    ));

    // Bob's state before the first message is untouched and still decrypts
    // the original message.
    let (_, plaintext) = decrypt(provider, &old_bob_state, &message);
    assert_eq!(plaintext, b"Hello bob!");
}

#[apply(ciphersuites_and_providers)]
fn epoch_authenticators_agree(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let alice = Client::new(b"Alice", ciphersuite);
    let bob = Client::new(b"Bob", ciphersuite);
    let charlie = Client::new(b"Charlie", ciphersuite);

    let alice_state = alice.create_group(provider, ciphersuite, b"group", ClientConfig::default());
    let (alice_state, bob_state) =
        add_member(provider, &alice_state, &alice, &bob, ClientConfig::default());

    // Bob adds Charlie.
    let charlie_bundle = charlie.key_package(provider, ciphersuite);
    let output = bob_state
        .create_commit(
            provider,
            &bob.signer,
            CommitOptions::builder()
                .proposal(Proposal::add(charlie_bundle.key_package().clone()))
                .build(),
        )
        .expect("commit failed");
    let alice_state = deliver(provider, &alice_state, &output.commit)
        .expect("commit failed")
        .state;
    let charlie_state = ClientState::join_group(
        provider,
        ClientConfig::default(),
        output
            .welcome
            .expect("no welcome")
            .into_welcome()
            .expect("not a welcome"),
        Some(output.state.export_ratchet_tree()),
        &charlie_bundle,
        Default::default(),
        None,
    )
    .expect("joining failed");
    let bob_state = output.state;
    assert_agree(&[&alice_state, &bob_state, &charlie_state]);
    assert_eq!(charlie_state.epoch().as_u64(), 2);

    // Charlie updates and removes Alice.
    let output = charlie_state
        .create_commit(
            provider,
            &charlie.signer,
            CommitOptions::builder()
                .proposal(Proposal::remove(alice_state.own_leaf_index()))
                .force_self_update(true)
                .build(),
        )
        .expect("commit failed");
    let charlie_state = output.state;
    let bob_state = deliver(provider, &bob_state, &output.commit)
        .expect("commit failed")
        .state;
    let removed = deliver(provider, &alice_state, &output.commit)
        .expect("commit failed")
        .state;
    assert_eq!(removed.active_state(), &GroupActiveState::RemovedFromGroup);
    assert_agree(&[&bob_state, &charlie_state]);
    assert_ne!(bob_state.epoch_authenticator(), alice_state.epoch_authenticator());
    assert_eq!(bob_state.members().count(), 2);
}

#[apply(ciphersuites_and_providers)]
fn rejection_is_idempotent(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let alice = Client::new(b"Alice", ciphersuite);
    let bob = Client::new(b"Bob", ciphersuite);
    let charlie = Client::new(b"Charlie", ciphersuite);
    let alice_state = alice.create_group(provider, ciphersuite, b"group", ClientConfig::default());
    let (alice_state, bob_state) =
        add_member(provider, &alice_state, &alice, &bob, ClientConfig::default());

    let output = alice_state
        .create_commit(
            provider,
            &alice.signer,
            CommitOptions::builder()
                .proposal(Proposal::add(
                    charlie.key_package(provider, ciphersuite).key_package().clone(),
                ))
                .build(),
        )
        .expect("commit failed");

    let encoded_tree = |state: &ClientState| {
        state
            .export_ratchet_tree()
            .tls_serialize_detached()
            .expect("encoding failed")
    };
    let encoded_context = |state: &ClientState| {
        state
            .group_context()
            .tls_serialize_detached()
            .expect("encoding failed")
    };

    let mut state = bob_state.clone();
    for _ in 0..2 {
        let processed = state
            .process_message(provider, transmit(&output.commit), &mut RejectCommits)
            .expect("processing failed");
        assert_eq!(processed.content, ProcessedContent::Rejected);
        assert_eq!(encoded_tree(&processed.state), encoded_tree(&bob_state));
        assert_eq!(encoded_context(&processed.state), encoded_context(&bob_state));
        assert_eq!(
            processed.state.epoch_authenticator(),
            bob_state.epoch_authenticator()
        );
        state = processed.state;
    }

    let accepted = deliver(provider, &state, &output.commit).expect("commit failed");
    assert_agree(&[&output.state, &accepted.state]);
}

#[apply(ciphersuites_and_providers)]
fn required_capabilities_are_enforced(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let alice = Client::new(b"Alice", ciphersuite);
    let bob = Client::new(b"Bob", ciphersuite);
    let alice_state = alice.create_group(provider, ciphersuite, b"group", ClientConfig::default());
    let (alice_state, bob_state) =
        add_member(provider, &alice_state, &alice, &bob, ClientConfig::default());

    let required = Extensions::single(Extension::RequiredCapabilities(
        RequiredCapabilitiesExtension::new(&[ExtensionType::Unknown(0xff00)], &[], &[]),
    ));
    let error = alice_state
        .create_commit(
            provider,
            &alice.signer,
            CommitOptions::builder()
                .proposal(Proposal::group_context_extensions(required.clone()))
                .build(),
        )
        .expect_err("required a capability no member has");
    assert!(matches!(error, ArborError::Validation(_)));

    // A proposal for it is refused by Bob as well and leaves his state as
    // it was.
    let (_, proposal, _) = alice_state
        .propose(
            provider,
            &alice.signer,
            Proposal::group_context_extensions(required),
        )
        .expect("proposal failed");
    let queued = deliver(provider, &bob_state, &proposal).expect("proposal failed");
    let output = queued
        .state
        .create_commit(provider, &bob.signer, CommitOptions::default());
    assert!(matches!(output, Err(ArborError::Validation(_))));
    assert_eq!(queued.state.epoch(), bob_state.epoch());
    assert_eq!(queued.state.group_context(), bob_state.group_context());
}

#[apply(ciphersuites_and_providers)]
fn padding_hides_the_length(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let alice = Client::new(b"Alice", ciphersuite);
    let bob = Client::new(b"Bob", ciphersuite);
    let config = ClientConfig::builder()
        .padding(PaddingConfig::PadUntilLength(512))
        .build();
    let alice_state = alice.create_group(provider, ciphersuite, b"group", config);
    let (alice_state, bob_state) =
        add_member(provider, &alice_state, &alice, &bob, ClientConfig::default());

    let (alice_state, short, _) = alice_state
        .create_application_message(provider, &alice.signer, &[], b"yes")
        .expect("encryption failed");
    let (_, long, _) = alice_state
        .create_application_message(provider, &alice.signer, &[], &[b'n'; 200])
        .expect("encryption failed");
    assert_eq!(
        short.to_bytes().expect("encoding failed").len(),
        long.to_bytes().expect("encoding failed").len()
    );

    let (bob_state, plaintext) = decrypt(provider, &bob_state, &short);
    assert_eq!(plaintext, b"yes");
    let (_, plaintext) = decrypt(provider, &bob_state, &long);
    assert_eq!(plaintext, vec![b'n'; 200]);
}

#[apply(ciphersuites_and_providers)]
fn persisted_state(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let alice = Client::new(b"Alice", ciphersuite);
    let bob = Client::new(b"Bob", ciphersuite);
    let alice_state = alice.create_group(provider, ciphersuite, b"group", ClientConfig::default());
    let (alice_state, bob_state) =
        add_member(provider, &alice_state, &alice, &bob, ClientConfig::default());

    let restore = |state: &ClientState| {
        ClientState::from_json(
            &state.to_json().expect("serialization failed"),
            ClientConfig::default(),
        )
        .expect("deserialization failed")
    };
    let alice_state = restore(&alice_state);
    let bob_state = restore(&bob_state);

    let output = bob_state
        .create_commit(
            provider,
            &bob.signer,
            CommitOptions::builder().force_self_update(true).build(),
        )
        .expect("commit failed");
    let alice_state = restore(
        &deliver(provider, &alice_state, &output.commit)
            .expect("commit failed")
            .state,
    );
    let bob_state = restore(&output.state);
    assert_agree(&[&alice_state, &bob_state]);

    let (_, message, _) = alice_state
        .create_application_message(provider, &alice.signer, &[], b"still here")
        .expect("encryption failed");
    let (_, plaintext) = decrypt(provider, &bob_state, &message);
    assert_eq!(plaintext, b"still here");
}

#[apply(ciphersuites_and_providers)]
fn external_rejoin_with_psk(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let alice = Client::new(b"Alice", ciphersuite);
    let bob = Client::new(b"Bob", ciphersuite);
    let config = ClientConfig::builder()
        .use_ratchet_tree_extension(true)
        .build();
    let alice_state = alice.create_group(provider, ciphersuite, b"group", config);
    let (alice_state, bob_state) =
        add_member(provider, &alice_state, &alice, &bob, ClientConfig::default());
    let alice_state = alice_state.with_external_psk(b"backup".to_vec(), b"shared secret".to_vec());

    // Bob lost his state and rejoins from a group info that carries the
    // tree, proving knowledge of a shared key.
    let group_info = alice_state
        .export_group_info(provider, &alice.signer)
        .expect("group info export failed");
    let group_info = transmit(&group_info)
        .into_group_info()
        .expect("not a group info");
    let psk_id = PreSharedKeyId::external(ciphersuite, provider.rand(), b"backup".to_vec())
        .expect("Not enough randomness.");
    let (rejoined, commit) = ClientState::join_by_external_commit(
        provider,
        &bob.signer,
        ClientConfig::default(),
        group_info,
        None,
        bob.credential_with_key.clone(),
        ExternalCommitOptions {
            resync_leaf: Some(bob_state.own_leaf_index()),
            psks: vec![(psk_id, b"shared secret".to_vec())],
            authenticated_data: vec![],
        },
    )
    .expect("external commit failed");

    let processed = deliver(provider, &alice_state, &commit).expect("commit failed");
    let ProcessedContent::Commit(info) = &processed.content else {
        panic!("expected a commit");
    };
    assert_eq!(info.sender(), &Sender::NewMemberCommit);
    assert_eq!(info.removed_members(), &[bob_state.own_leaf_index()]);
    let alice_state = processed.state;
    assert_agree(&[&alice_state, &rejoined]);
    assert_eq!(alice_state.members().count(), 2);

    // Bob's old state is gone from the group.
    assert_eq!(
        deliver(provider, &bob_state, &commit)
            .expect("commit failed")
            .state
            .active_state(),
        &GroupActiveState::RemovedFromGroup
    );

    let (_, message, _) = rejoined
        .create_application_message(provider, &bob.signer, &[], b"back again")
        .expect("encryption failed");
    let (_, plaintext) = decrypt(provider, &alice_state, &message);
    assert_eq!(plaintext, b"back again");
}

#[apply(ciphersuites_and_providers)]
fn reinit(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {
    let alice = Client::new(b"Alice", ciphersuite);
    let bob = Client::new(b"Bob", ciphersuite);
    let alice_state = alice.create_group(provider, ciphersuite, b"group", ClientConfig::default());
    let (alice_state, bob_state) =
        add_member(provider, &alice_state, &alice, &bob, ClientConfig::default());

    let reinit = ReInitProposal::new(
        GroupId::from_slice(b"group, again"),
        ProtocolVersion::Mls10,
        ciphersuite,
        Extensions::empty(),
    );
    let (alice_state, proposal, _) = alice_state
        .propose(provider, &alice.signer, Proposal::ReInit(reinit.clone()))
        .expect("proposal failed");
    let bob_state = deliver(provider, &bob_state, &proposal)
        .expect("proposal failed")
        .state;
    let output = bob_state
        .create_commit(provider, &bob.signer, CommitOptions::default())
        .expect("commit failed");
    let bob_state = output.state;
    let alice_state = deliver(provider, &alice_state, &output.commit)
        .expect("commit failed")
        .state;

    for state in [&alice_state, &bob_state] {
        assert_eq!(
            state.active_state(),
            &GroupActiveState::SuspendedPendingReinit(reinit.clone())
        );
    }
    assert_agree(&[&alice_state, &bob_state]);
    assert_eq!(
        alice_state
            .create_application_message(provider, &alice.signer, &[], b"too late")
            .expect_err("sent in a suspended group"),
        ArborError::Usage(UsageError::PendingReinit)
    );

    // The members carry on in the group the reinit describes.
    let next = alice.create_group(
        provider,
        reinit.ciphersuite(),
        reinit.group_id().as_slice(),
        ClientConfig::default(),
    );
    let (next, bob_next) = add_member(provider, &next, &alice, &bob, ClientConfig::default());
    assert_agree(&[&next, &bob_next]);
}
