//! # Protocol versions

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

/// The two byte protocol version. 1.0 is the only one there is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TlsSerialize,
    TlsDeserialize, TlsSize,
)]
#[repr(u16)]
pub enum ProtocolVersion {
    #[default]
    Mls10 = 1,
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = match self {
            ProtocolVersion::Mls10 => "1.0",
        };
        f.write_str(version)
    }
}
