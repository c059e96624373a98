use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::treesync::RatchetTreeIn;

/// # Ratchet Tree Extension.
///
/// The ratchet tree extension contains a list of (optional) nodes that
/// represent the public state of the tree in an MLS group.
///
/// ```text
/// optional<Node> ratchet_tree<V>;
/// ```
#[derive(
    PartialEq, Eq, Clone, Debug, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct RatchetTreeExtension {
    ratchet_tree: RatchetTreeIn,
}

impl RatchetTreeExtension {
    /// Build a new extension from a ratchet tree.
    pub fn new(ratchet_tree: RatchetTreeIn) -> Self {
        RatchetTreeExtension { ratchet_tree }
    }

    /// Return the [`RatchetTreeIn`] from this extension.
    pub fn ratchet_tree(&self) -> &RatchetTreeIn {
        &self.ratchet_tree
    }
}
