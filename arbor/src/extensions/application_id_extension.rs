use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

/// An application chosen identifier for a leaf, opaque to the protocol.
///
/// ```text
/// opaque application_id<V>;
/// ```
#[derive(
    PartialEq, Eq, Clone, Debug, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct ApplicationIdExtension {
    id: VLBytes,
}

impl ApplicationIdExtension {
    pub fn new(id: &[u8]) -> Self {
        Self { id: id.into() }
    }

    pub fn as_slice(&self) -> &[u8] {
        self.id.as_slice()
    }
}
