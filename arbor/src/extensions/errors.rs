//! # Extension errors.

use thiserror::Error;

/// Extension error
#[derive(Error, Debug, PartialEq, Clone)]
pub enum ExtensionError {
    /// The extension list contains the same extension type more than once.
    #[error("The extension list contains extension type {0} more than once.")]
    DuplicateExtension(u16),
    /// Custom extensions cannot use the reserved types 0 to 5.
    #[error("Extension type {0} is reserved.")]
    ReservedExtensionType(u16),
    /// The extension is not supported by a member.
    #[error("Extension type {0} is not supported.")]
    UnsupportedExtension(u16),
    /// This extension is not allowed in this context.
    #[error("Extension type {0} is not allowed here.")]
    InvalidExtensionContext(u16),
    /// Decoding the extension data failed.
    #[error("Decoding the extension data failed: {0:?}")]
    CodecError(tls_codec::Error),
}
