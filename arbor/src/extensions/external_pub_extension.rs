use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

use crate::ciphersuite::HpkePublicKey;

/// Carried in a `GroupInfo` so that non-members can encapsulate the init
/// secret of an external commit to the group.
///
/// ```text
/// struct {
///     HPKEPublicKey external_pub;
/// } ExternalPub;
/// ```
#[derive(
    PartialEq, Eq, Clone, Debug, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct ExternalPubExtension {
    public_key: HpkePublicKey,
}

impl ExternalPubExtension {
    pub fn new(public_key: HpkePublicKey) -> Self {
        Self { public_key }
    }

    /// The HPKE key derived from the epoch's external secret.
    pub fn external_pub(&self) -> &HpkePublicKey {
        &self.public_key
    }
}
