//! # Groups
//!
//! [`ClientState`] is one member's view of a group in one epoch. It is a
//! plain value: every operation borrows the state, works on a copy and
//! returns the copy as the new state if and only if the operation succeeded.
//! The old state stays usable, which is how a caller rolls back.
//!
//! Nothing in here panics on bad input. Internal inconsistencies surface as
//! a `LibraryError`.

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

mod apply_proposals;
mod commit;
mod external_commit;
mod group_context;
mod messages;
mod process;
mod proposal_store;
mod state;
mod transcript;
mod welcome;

pub mod config;
pub mod errors;


pub use commit::{CommitOptions, CommitOptionsBuilder, CommitOutput};
pub use external_commit::ExternalCommitOptions;
pub use config::{ClientConfig, ClientConfigBuilder, PaddingConfig, WireFormatPolicy};
pub use group_context::GroupContext;
pub use process::{
    AcceptAll, ApplicationMessage, IncomingMessageCallback, IncomingMessageAction, ProcessOutput, ProcessedContent,
    StagedCommitInfo,
};
pub use proposal_store::{QueuedProposal, UnappliedProposals};
pub use state::{ClientState, GroupActiveState, Member};

/// Opaque identifier the creator picks for a group.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TlsSerialize,
    TlsDeserialize, TlsSize,
)]
pub struct GroupId(VLBytes);

impl GroupId {
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(VLBytes::new(bytes.to_vec()))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

/// Counts the commits merged since the group was created, which is epoch 0.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
    TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct GroupEpoch(u64);

impl GroupEpoch {
    pub(crate) fn increment(&mut self) {
        self.0 += 1;
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for GroupEpoch {
    fn from(epoch: u64) -> Self {
        GroupEpoch(epoch)
    }
}

impl std::fmt::Display for GroupEpoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
