use tls_codec::{Serialize, TlsSerialize, TlsSize, VLBytes};

use super::{CryptoError, LABEL_PREFIX};

/// The `info` input of ExpandWithLabel: output length, prefixed label and
/// context.
#[derive(Debug, TlsSerialize, TlsSize)]
pub(in crate::ciphersuite) struct KdfLabel {
    length: u16,
    label: VLBytes,
    context: VLBytes,
}

impl KdfLabel {
    /// Encodes the label for an output of `length` bytes. Lengths beyond
    /// `u16::MAX` are rejected with [`CryptoError::KdfLabelTooLarge`].
    pub(in crate::ciphersuite) fn serialized_label(
        context: &[u8],
        label: &str,
        length: usize,
    ) -> Result<Vec<u8>, CryptoError> {
        let Ok(length) = u16::try_from(length) else {
            return Err(CryptoError::KdfLabelTooLarge);
        };
        let full_label = [LABEL_PREFIX.as_bytes(), label.as_bytes()].concat();
        let info = Self {
            length,
            label: full_label.into(),
            context: context.into(),
        };
        log::trace!("KDF label {label:?}, {length} bytes, context {context:x?}");
        info.tls_serialize_detached()
            .map_err(|_| CryptoError::KdfSerializationError)
    }
}
