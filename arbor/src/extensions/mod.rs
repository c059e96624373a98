//! # Extensions
//!
//! Extensions appear in key packages, leaf nodes, group contexts and group
//! infos.
//!
//! ```text
//! struct {
//!     ExtensionType extension_type;
//!     opaque extension_data<V>;
//! } Extension;
//! ```
//!
//! The known extensions are parsed into their own types; any other extension
//! type is carried as [`Extension::Unknown`] with its raw data so that it
//! round-trips unchanged.

use serde::{Deserialize, Serialize};
use tls_codec::{Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size, VLBytes};

mod application_id_extension;
pub mod errors;
mod external_pub_extension;
mod ratchet_tree_extension;
mod required_capabilities;

pub use application_id_extension::ApplicationIdExtension;
pub use external_pub_extension::ExternalPubExtension;
pub use ratchet_tree_extension::RatchetTreeExtension;
pub use required_capabilities::RequiredCapabilitiesExtension;

use errors::ExtensionError;

use crate::utils::vl_prefix_len;

#[cfg(test)]
mod tests;

/// ```text
/// enum {
///     reserved(0),
///     application_id(1),
///     ratchet_tree(2),
///     required_capabilities(3),
///     external_pub(4),
///     external_senders(5),
///     (65535)
/// } ExtensionType;
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExtensionType {
    /// The application id extension is used to identify the application.
    ApplicationId,
    /// The ratchet tree extension carries the public tree in a group info.
    RatchetTree,
    /// Capabilities every member of the group must support.
    RequiredCapabilities,
    /// The public key used for external commits.
    ExternalPub,
    /// Senders that are not members of the group.
    ExternalSenders,
    /// Any other extension type.
    Unknown(u16),
}

impl ExtensionType {
    /// The extension types defined by the protocol. Members support them
    /// without listing them in their capabilities.
    pub fn is_default(&self) -> bool {
        !matches!(self, ExtensionType::Unknown(_))
    }

    /// Whether `value` may be used for a custom extension.
    fn is_reserved(value: u16) -> bool {
        value <= 5
    }
}

impl From<u16> for ExtensionType {
    fn from(value: u16) -> Self {
        match value {
            1 => ExtensionType::ApplicationId,
            2 => ExtensionType::RatchetTree,
            3 => ExtensionType::RequiredCapabilities,
            4 => ExtensionType::ExternalPub,
            5 => ExtensionType::ExternalSenders,
            unknown => ExtensionType::Unknown(unknown),
        }
    }
}

impl From<ExtensionType> for u16 {
    fn from(value: ExtensionType) -> Self {
        match value {
            ExtensionType::ApplicationId => 1,
            ExtensionType::RatchetTree => 2,
            ExtensionType::RequiredCapabilities => 3,
            ExtensionType::ExternalPub => 4,
            ExtensionType::ExternalSenders => 5,
            ExtensionType::Unknown(unknown) => unknown,
        }
    }
}

impl Size for ExtensionType {
    fn tls_serialized_len(&self) -> usize {
        2
    }
}

impl TlsSerializeTrait for ExtensionType {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        TlsSerializeTrait::tls_serialize(&u16::from(*self), writer)
    }
}

impl TlsDeserializeTrait for ExtensionType {
    fn tls_deserialize<R: std::io::Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        let value = <u16 as TlsDeserializeTrait>::tls_deserialize(bytes)?;
        Ok(value.into())
    }
}

/// The data of an extension this implementation does not interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownExtension(pub Vec<u8>);

/// An extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Extension {
    /// An [`ApplicationIdExtension`]
    ApplicationId(ApplicationIdExtension),
    /// A [`RatchetTreeExtension`]
    RatchetTree(RatchetTreeExtension),
    /// A [`RequiredCapabilitiesExtension`]
    RequiredCapabilities(RequiredCapabilitiesExtension),
    /// An [`ExternalPubExtension`]
    ExternalPub(ExternalPubExtension),
    /// An extension of any other type, including external senders.
    Unknown(u16, UnknownExtension),
}

impl Extension {
    /// Create a custom extension. Types 0 to 5 are reserved.
    pub fn custom(extension_type: u16, data: Vec<u8>) -> Result<Self, ExtensionError> {
        if ExtensionType::is_reserved(extension_type) {
            return Err(ExtensionError::ReservedExtensionType(extension_type));
        }
        Ok(Extension::Unknown(extension_type, UnknownExtension(data)))
    }

    /// The type of this extension.
    pub fn extension_type(&self) -> ExtensionType {
        match self {
            Extension::ApplicationId(_) => ExtensionType::ApplicationId,
            Extension::RatchetTree(_) => ExtensionType::RatchetTree,
            Extension::RequiredCapabilities(_) => ExtensionType::RequiredCapabilities,
            Extension::ExternalPub(_) => ExtensionType::ExternalPub,
            Extension::Unknown(extension_type, _) => ExtensionType::from(*extension_type),
        }
    }

    fn data_len(&self) -> usize {
        match self {
            Extension::ApplicationId(e) => e.tls_serialized_len(),
            Extension::RatchetTree(e) => e.tls_serialized_len(),
            Extension::RequiredCapabilities(e) => e.tls_serialized_len(),
            Extension::ExternalPub(e) => e.tls_serialized_len(),
            Extension::Unknown(_, e) => e.0.len(),
        }
    }

    fn serialized_data(&self) -> Result<Vec<u8>, tls_codec::Error> {
        match self {
            Extension::ApplicationId(e) => e.tls_serialize_detached(),
            Extension::RatchetTree(e) => e.tls_serialize_detached(),
            Extension::RequiredCapabilities(e) => e.tls_serialize_detached(),
            Extension::ExternalPub(e) => e.tls_serialize_detached(),
            Extension::Unknown(_, e) => Ok(e.0.clone()),
        }
    }
}

impl Size for Extension {
    fn tls_serialized_len(&self) -> usize {
        let data_len = self.data_len();
        2 + vl_prefix_len(data_len) + data_len
    }
}

impl TlsSerializeTrait for Extension {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        let written = self.extension_type().tls_serialize(writer)?;
        let data = VLBytes::new(self.serialized_data()?);
        Ok(written + data.tls_serialize(writer)?)
    }
}

impl TlsDeserializeTrait for Extension {
    fn tls_deserialize<R: std::io::Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        let extension_type = ExtensionType::tls_deserialize(bytes)?;
        let data = VLBytes::tls_deserialize(bytes)?;
        let data = data.as_slice();
        Ok(match extension_type {
            ExtensionType::ApplicationId => {
                Extension::ApplicationId(ApplicationIdExtension::tls_deserialize_exact(data)?)
            }
            ExtensionType::RatchetTree => {
                Extension::RatchetTree(RatchetTreeExtension::tls_deserialize_exact(data)?)
            }
            ExtensionType::RequiredCapabilities => Extension::RequiredCapabilities(
                RequiredCapabilitiesExtension::tls_deserialize_exact(data)?,
            ),
            ExtensionType::ExternalPub => {
                Extension::ExternalPub(ExternalPubExtension::tls_deserialize_exact(data)?)
            }
            other => Extension::Unknown(u16::from(other), UnknownExtension(data.to_vec())),
        })
    }
}

/// A list of extensions.
///
/// Lists built through this API never hold the same extension type twice.
/// Decoded lists are checked with [`Extensions::check_unique`] when they are
/// validated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extensions {
    extensions: Vec<Extension>,
}

impl Size for Extensions {
    fn tls_serialized_len(&self) -> usize {
        self.extensions.tls_serialized_len()
    }
}

impl TlsSerializeTrait for Extensions {
    fn tls_serialize<W: std::io::Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        self.extensions.tls_serialize(writer)
    }
}

impl TlsDeserializeTrait for Extensions {
    fn tls_deserialize<R: std::io::Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        Ok(Self {
            extensions: Vec::<Extension>::tls_deserialize(bytes)?,
        })
    }
}

impl Extensions {
    /// Create an empty extension list.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create an extension list with a single extension.
    pub fn single(extension: Extension) -> Self {
        Self {
            extensions: vec![extension],
        }
    }

    /// Create an extension list from a vector.
    ///
    /// Returns an error if an extension type appears more than once.
    pub fn from_vec(extensions: Vec<Extension>) -> Result<Self, ExtensionError> {
        let extensions = Self { extensions };
        extensions.check_unique()?;
        Ok(extensions)
    }

    /// Check that no extension type appears more than once.
    pub fn check_unique(&self) -> Result<(), ExtensionError> {
        let mut seen = std::collections::HashSet::new();
        for extension in self.extensions.iter() {
            let extension_type = extension.extension_type();
            if !seen.insert(extension_type) {
                return Err(ExtensionError::DuplicateExtension(extension_type.into()));
            }
        }
        Ok(())
    }

    /// Returns an iterator over the extensions.
    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.extensions.iter()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Add an extension. Fails if one of the same type is present.
    pub fn add(&mut self, extension: Extension) -> Result<(), ExtensionError> {
        if self.contains(extension.extension_type()) {
            return Err(ExtensionError::DuplicateExtension(
                extension.extension_type().into(),
            ));
        }
        self.extensions.push(extension);
        Ok(())
    }

    /// Add an extension, replacing one of the same type if present.
    pub fn add_or_replace(&mut self, extension: Extension) {
        self.remove(extension.extension_type());
        self.extensions.push(extension);
    }

    /// Remove the extension of the given type and return it.
    pub fn remove(&mut self, extension_type: ExtensionType) -> Option<Extension> {
        let position = self
            .extensions
            .iter()
            .position(|e| e.extension_type() == extension_type)?;
        Some(self.extensions.remove(position))
    }

    /// Whether an extension of the given type is present.
    pub fn contains(&self, extension_type: ExtensionType) -> bool {
        self.extensions
            .iter()
            .any(|e| e.extension_type() == extension_type)
    }

    /// Group contexts may not carry leaf node or group info extensions.
    pub(crate) fn validate_for_group_context(&self) -> Result<(), ExtensionError> {
        match self.extensions.iter().find(|e| {
            matches!(
                e.extension_type(),
                ExtensionType::ApplicationId | ExtensionType::RatchetTree | ExtensionType::ExternalPub
            )
        }) {
            Some(extension) => Err(ExtensionError::InvalidExtensionContext(
                extension.extension_type().into(),
            )),
            None => Ok(()),
        }
    }

    /// The application id extension, if present.
    pub fn application_id(&self) -> Option<&ApplicationIdExtension> {
        self.extensions.iter().find_map(|e| match e {
            Extension::ApplicationId(e) => Some(e),
            _ => None,
        })
    }

    /// The ratchet tree extension, if present.
    pub fn ratchet_tree(&self) -> Option<&RatchetTreeExtension> {
        self.extensions.iter().find_map(|e| match e {
            Extension::RatchetTree(e) => Some(e),
            _ => None,
        })
    }

    /// The required capabilities extension, if present.
    pub fn required_capabilities(&self) -> Option<&RequiredCapabilitiesExtension> {
        self.extensions.iter().find_map(|e| match e {
            Extension::RequiredCapabilities(e) => Some(e),
            _ => None,
        })
    }

    /// The external pub extension, if present.
    pub fn external_pub(&self) -> Option<&ExternalPubExtension> {
        self.extensions.iter().find_map(|e| match e {
            Extension::ExternalPub(e) => Some(e),
            _ => None,
        })
    }

    /// The data of an extension of an uninterpreted type, if present.
    pub fn unknown(&self, extension_type: u16) -> Option<&UnknownExtension> {
        self.extensions.iter().find_map(|e| match e {
            Extension::Unknown(t, e) if *t == extension_type => Some(e),
            _ => None,
        })
    }
}
