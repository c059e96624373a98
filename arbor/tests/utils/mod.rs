//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;

pub use arbor::prelude::*;
pub use arbor_basic_credential::SignatureKeyPair;
pub use arbor_rust_crypto::ArborRustCrypto;
pub use arbor_traits::ArborProvider;
pub use rstest::*;
pub use rstest_reuse::{self, *};

#[template]
#[rstest(ciphersuite, provider,
    case::rust_crypto_MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519(Ciphersuite::MLS_128_DHKEMX25519_AES128GCM_SHA256_Ed25519, &ArborRustCrypto::default()),
    case::rust_crypto_MLS_128_DHKEMP256_AES128GCM_SHA256_P256(Ciphersuite::MLS_128_DHKEMP256_AES128GCM_SHA256_P256, &ArborRustCrypto::default()),
    case::rust_crypto_MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519(Ciphersuite::MLS_128_DHKEMX25519_CHACHA20POLY1305_SHA256_Ed25519, &ArborRustCrypto::default()),
  )
]
#[allow(non_snake_case)]
pub fn ciphersuites_and_providers(ciphersuite: Ciphersuite, provider: &impl ArborProvider) {}

/// A client of the integration tests: its signer and the credential bound
/// to it.
pub struct Client {
    pub signer: SignatureKeyPair,
    pub credential_with_key: CredentialWithKey,
}

impl Client {
    pub fn new(identity: &[u8], ciphersuite: Ciphersuite) -> Self {
        let signer = SignatureKeyPair::new(ciphersuite.signature_algorithm())
            .expect("key generation failed");
        let credential_with_key = CredentialWithKey {
            credential: BasicCredential::new(identity.to_vec()).into(),
            signature_key: signer.to_public_vec().into(),
        };
        Self {
            signer,
            credential_with_key,
        }
    }

    pub fn key_package(
        &self,
        provider: &impl ArborProvider,
        ciphersuite: Ciphersuite,
    ) -> KeyPackageBundle {
        KeyPackage::builder()
            .build(
                provider,
                ciphersuite,
                &self.signer,
                self.credential_with_key.clone(),
            )
            .expect("key package creation failed")
    }

    pub fn create_group(
        &self,
        provider: &impl ArborProvider,
        ciphersuite: Ciphersuite,
        group_id: &[u8],
        config: ClientConfig,
    ) -> ClientState {
        ClientState::create_group(
            provider,
            &self.signer,
            config,
            ciphersuite,
            GroupId::from_slice(group_id),
            self.credential_with_key.clone(),
            Extensions::empty(),
        )
        .expect("group creation failed")
    }
}

/// `committer` adds `joiner`. Returns the committer's new state and the
/// joiner's state, built from the welcome and the exported tree.
pub fn add_member(
    provider: &impl ArborProvider,
    committer: &ClientState,
    committer_client: &Client,
    joiner: &Client,
    joiner_config: ClientConfig,
) -> (ClientState, ClientState) {
    let bundle = joiner.key_package(provider, committer.ciphersuite());
    let output = committer
        .create_commit(
            provider,
            &committer_client.signer,
            CommitOptions::builder()
                .proposal(Proposal::add(bundle.key_package().clone()))
                .build(),
        )
        .expect("commit failed");
    let welcome = output
        .welcome
        .expect("no welcome")
        .into_welcome()
        .expect("not a welcome");
    let joined = ClientState::join_group(
        provider,
        joiner_config,
        welcome,
        Some(output.state.export_ratchet_tree()),
        &bundle,
        BTreeMap::new(),
        None,
    )
    .expect("joining failed");
    (output.state, joined)
}

/// Deliver `message` to `state`, accepting whatever it carries.
pub fn deliver(
    provider: &impl ArborProvider,
    state: &ClientState,
    message: &MlsMessageOut,
) -> Result<ProcessOutput, ArborError> {
    state.process_message(provider, MlsMessageIn::from(message.clone()), &mut AcceptAll)
}

/// Send `message` over the wire: encode it and decode it again.
pub fn transmit(message: &MlsMessageOut) -> MlsMessageIn {
    MlsMessageIn::from_bytes(&message.to_bytes().expect("encoding failed"))
        .expect("decoding failed")
}

/// Decrypt an application message or panic.
pub fn decrypt(
    provider: &impl ArborProvider,
    state: &ClientState,
    message: &MlsMessageOut,
) -> (ClientState, Vec<u8>) {
    let output = deliver(provider, state, message).expect("processing failed");
    match output.content {
        ProcessedContent::ApplicationMessage(message) => (output.state, message.into_plaintext()),
        other => panic!("expected an application message, got {other:?}"),
    }
}

pub fn assert_agree(states: &[&ClientState]) {
    for pair in states.windows(2) {
        assert_eq!(pair[0].epoch(), pair[1].epoch());
        assert_eq!(pair[0].group_context(), pair[1].group_context());
        assert_eq!(pair[0].epoch_authenticator(), pair[1].epoch_authenticator());
    }
}
