//! # arbor
//!
//! The state machine of a continuous group key agreement protocol in the
//! style of MLS: a ratchet tree shared by all members, a secret tree that
//! derives per-sender message keys, and a key schedule that moves the group
//! from epoch to epoch with every commit.
//!
//! The central type is [`group::ClientState`], one member's view of one
//! epoch. Every operation borrows a state and returns a new one, so a caller
//! that wants to roll back simply keeps the old value.
//!
//! Cryptography, randomness and signing are injected through the traits in
//! `arbor_traits`.
//!
//! ```ignore
//! let alice = ClientState::create_group(
//!     &provider,
//!     &signer,
//!     ClientConfig::default(),
//!     ciphersuite,
//!     GroupId::from_slice(b"group1"),
//!     credential_with_key,
//!     Extensions::empty(),
//! )?;
//! let output = alice.create_commit(
//!     &provider,
//!     &signer,
//!     CommitOptions::builder()
//!         .proposal(Proposal::add(bob_key_package))
//!         .build(),
//! )?;
//! ```
#![forbid(unsafe_code)]

#[cfg(test)]
use rstest_reuse;

#[macro_use]
mod utils;

pub mod error;

#[cfg(test)]
#[macro_use]
pub(crate) mod test_utils;

pub mod binary_tree;
pub mod ciphersuite;
pub mod credentials;
pub mod extensions;
pub mod framing;
pub mod group;
pub mod key_packages;
pub mod messages;
pub mod schedule;
pub(crate) mod tree;
pub mod treesync;
pub mod versions;

/// Single place, re-exporting the most used public types.
pub mod prelude {
    pub use crate::{
        binary_tree::LeafNodeIndex,
        ciphersuite::{hash_ref::ProposalRef, Ciphersuite, ConsumedSecrets, SignaturePublicKey},
        credentials::{
            AcceptAllCredentials, AuthenticationService, BasicCredential, Credential,
            CredentialType, CredentialWithKey,
        },
        error::{ArborError, UsageError, ValidationError},
        extensions::{Extension, ExtensionType, Extensions},
        framing::{MlsMessageBody, MlsMessageIn, MlsMessageOut, Sender},
        group::*,
        key_packages::{KeyPackage, KeyPackageBundle, Lifetime},
        messages::{group_info::GroupInfo, proposals::Proposal, Welcome},
        treesync::{Capabilities, RatchetTreeIn},
    };
}
