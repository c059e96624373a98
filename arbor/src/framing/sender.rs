//! Who sent a framed message.

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::binary_tree::LeafNodeIndex;

/// The sender field of framed content, tagged with a one byte type.
///
/// Members are named by their leaf, external senders by their position in
/// the group's external senders extension. New members carry nothing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TlsSerialize,
    TlsDeserialize, TlsSize,
)]
#[repr(u8)]
pub enum Sender {
    #[tls_codec(discriminant = 1)]
    Member(LeafNodeIndex),
    #[tls_codec(discriminant = 2)]
    External(u32),
    /// Someone outside the group proposing their own addition.
    #[tls_codec(discriminant = 3)]
    NewMemberProposal,
    /// Someone joining through an external commit.
    #[tls_codec(discriminant = 4)]
    NewMemberCommit,
}

impl Sender {
    pub(crate) fn build_member(leaf_index: LeafNodeIndex) -> Self {
        Sender::Member(leaf_index)
    }

    pub fn is_member(&self) -> bool {
        self.as_member().is_some()
    }

    /// The sender's leaf if the sender is a member.
    pub fn as_member(&self) -> Option<LeafNodeIndex> {
        if let Sender::Member(leaf_index) = self {
            Some(*leaf_index)
        } else {
            None
        }
    }

    /// Members and external committers sign over the group context as well.
    pub(crate) fn signs_group_context(&self) -> bool {
        matches!(self, Sender::Member(_) | Sender::NewMemberCommit)
    }
}
