//! The `MLSMessage` envelope.
//!
//! ```text
//! struct {
//!     ProtocolVersion version = mls10;
//!     WireFormat wire_format;
//!     select (MLSMessage.wire_format) {
//!         case mls_public_message:
//!             PublicMessage public_message;
//!         case mls_private_message:
//!             PrivateMessage private_message;
//!         case mls_welcome:
//!             Welcome welcome;
//!         case mls_group_info:
//!             GroupInfo group_info;
//!         case mls_key_package:
//!             KeyPackage key_package;
//!     };
//! } MLSMessage;
//! ```

use tls_codec::{
    Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, TlsDeserialize,
    TlsSerialize, TlsSize,
};

use super::{PrivateMessage, PublicMessage, WireFormat};
use crate::{
    error::ArborError,
    key_packages::KeyPackage,
    messages::{group_info::GroupInfo, Welcome},
    versions::ProtocolVersion,
};

/// The payload of an `MLSMessage`, selected by its wire format.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, PartialEq, Eq, Clone, TlsSerialize, TlsDeserialize, TlsSize)]
#[repr(u16)]
pub enum MlsMessageBody {
    /// Plaintext message
    #[tls_codec(discriminant = 1)]
    PublicMessage(PublicMessage),
    /// Ciphertext message
    #[tls_codec(discriminant = 2)]
    PrivateMessage(PrivateMessage),
    /// Welcome message
    #[tls_codec(discriminant = 3)]
    Welcome(Welcome),
    /// Group information
    #[tls_codec(discriminant = 4)]
    GroupInfo(GroupInfo),
    /// KeyPackage
    #[tls_codec(discriminant = 5)]
    KeyPackage(KeyPackage),
}

impl MlsMessageBody {
    fn wire_format(&self) -> WireFormat {
        match self {
            MlsMessageBody::PublicMessage(_) => WireFormat::PublicMessage,
            MlsMessageBody::PrivateMessage(_) => WireFormat::PrivateMessage,
            MlsMessageBody::Welcome(_) => WireFormat::Welcome,
            MlsMessageBody::GroupInfo(_) => WireFormat::GroupInfo,
            MlsMessageBody::KeyPackage(_) => WireFormat::KeyPackage,
        }
    }
}

/// An outgoing message. It is serialized with [`MlsMessageOut::to_bytes()`]
/// and handed to the delivery service.
#[derive(Debug, PartialEq, Eq, Clone, TlsSerialize, TlsSize)]
pub struct MlsMessageOut {
    version: ProtocolVersion,
    body: MlsMessageBody,
}

impl From<PublicMessage> for MlsMessageOut {
    fn from(public_message: PublicMessage) -> Self {
        Self::new(MlsMessageBody::PublicMessage(public_message))
    }
}

impl From<PrivateMessage> for MlsMessageOut {
    fn from(private_message: PrivateMessage) -> Self {
        Self::new(MlsMessageBody::PrivateMessage(private_message))
    }
}

impl From<Welcome> for MlsMessageOut {
    fn from(welcome: Welcome) -> Self {
        Self::new(MlsMessageBody::Welcome(welcome))
    }
}

impl From<GroupInfo> for MlsMessageOut {
    fn from(group_info: GroupInfo) -> Self {
        Self::new(MlsMessageBody::GroupInfo(group_info))
    }
}

impl From<KeyPackage> for MlsMessageOut {
    fn from(key_package: KeyPackage) -> Self {
        Self::new(MlsMessageBody::KeyPackage(key_package))
    }
}

impl MlsMessageOut {
    fn new(body: MlsMessageBody) -> Self {
        Self {
            version: ProtocolVersion::Mls10,
            body,
        }
    }

    /// The wire format of the message.
    pub fn wire_format(&self) -> WireFormat {
        self.body.wire_format()
    }

    /// The protocol version of the message.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The payload of the message.
    pub fn body(&self) -> &MlsMessageBody {
        &self.body
    }

    /// Serialize the message.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArborError> {
        Ok(self.tls_serialize_detached()?)
    }

    /// The welcome, if this is one.
    pub fn into_welcome(self) -> Option<Welcome> {
        match self.body {
            MlsMessageBody::Welcome(welcome) => Some(welcome),
            _ => None,
        }
    }

    /// The group info, if this is one.
    pub fn into_group_info(self) -> Option<GroupInfo> {
        match self.body {
            MlsMessageBody::GroupInfo(group_info) => Some(group_info),
            _ => None,
        }
    }

    #[cfg(test)]
    pub(crate) fn body_mut(&mut self) -> &mut MlsMessageBody {
        &mut self.body
    }
}

/// An incoming message as received from the delivery service.
#[derive(Debug, PartialEq, Eq, Clone, TlsDeserialize, TlsSize)]
pub struct MlsMessageIn {
    version: ProtocolVersion,
    body: MlsMessageBody,
}

impl MlsMessageIn {
    /// Deserialize a message. Trailing bytes are an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArborError> {
        Ok(Self::tls_deserialize_exact(bytes)?)
    }

    /// The wire format of the message.
    pub fn wire_format(&self) -> WireFormat {
        self.body.wire_format()
    }

    /// The protocol version of the message.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Consume the message and return its payload.
    pub fn extract(self) -> MlsMessageBody {
        self.body
    }

    /// The welcome, if this is one.
    pub fn into_welcome(self) -> Option<Welcome> {
        match self.body {
            MlsMessageBody::Welcome(welcome) => Some(welcome),
            _ => None,
        }
    }

    /// The group info, if this is one.
    pub fn into_group_info(self) -> Option<GroupInfo> {
        match self.body {
            MlsMessageBody::GroupInfo(group_info) => Some(group_info),
            _ => None,
        }
    }

    /// The key package, if this is one.
    pub fn into_key_package(self) -> Option<KeyPackage> {
        match self.body {
            MlsMessageBody::KeyPackage(key_package) => Some(key_package),
            _ => None,
        }
    }
}

impl From<MlsMessageOut> for MlsMessageIn {
    fn from(message: MlsMessageOut) -> Self {
        Self {
            version: message.version,
            body: message.body,
        }
    }
}
