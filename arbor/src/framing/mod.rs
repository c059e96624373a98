//! # Message framing
//!
//! Handshake and application content travels in one of two framings:
//!
//! - [`PublicMessage`]: signed content, plus a membership tag when the sender
//!   is a member of the group.
//! - [`PrivateMessage`]: signed content, encrypted with keys from the secret
//!   tree. The sender's leaf index and generation are encrypted separately
//!   with a key derived from the sender data secret.
//!
//! Both are wrapped, together with welcomes, group infos and key packages,
//! in the [`MlsMessageIn`] / [`MlsMessageOut`] envelope.

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

pub(crate) mod content;
pub mod errors;
mod message;
mod private_message;
mod public_message;
mod sender;

#[cfg(test)]
mod tests;

pub use content::{AuthenticatedContent, FramedContent, FramedContentBody};
pub use errors::{MessageDecryptionError, MessageEncryptionError};
pub use message::{MlsMessageBody, MlsMessageIn, MlsMessageOut};
pub use private_message::PrivateMessage;
pub use public_message::PublicMessage;
pub use sender::Sender;

/// What a framed message carries. Encoded as one byte.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TlsSerialize, TlsDeserialize,
    TlsSize,
)]
#[repr(u8)]
pub enum ContentType {
    Application = 1,
    Proposal = 2,
    Commit = 3,
}

impl TryFrom<u8> for ContentType {
    type Error = tls_codec::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        [Self::Application, Self::Proposal, Self::Commit]
            .into_iter()
            .find(|content_type| *content_type as u8 == value)
            .ok_or(tls_codec::Error::InvalidInput)
    }
}

impl ContentType {
    /// Proposals and commits, as opposed to application data.
    pub(crate) fn is_handshake_message(&self) -> bool {
        !matches!(self, ContentType::Application)
    }
}

/// The two byte tag in front of every message in the envelope.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TlsSerialize, TlsDeserialize,
    TlsSize,
)]
#[repr(u16)]
pub enum WireFormat {
    PublicMessage = 1,
    PrivateMessage = 2,
    Welcome = 3,
    GroupInfo = 4,
    KeyPackage = 5,
}
