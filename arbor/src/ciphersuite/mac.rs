use arbor_traits::crypto::ArborCrypto;
use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize, VLBytes};

use super::{equal_ct, Ciphersuite, CryptoError, Secret};

/// An HMAC tag, compared in constant time.
#[derive(Debug, Clone, Serialize, Deserialize, TlsDeserialize, TlsSerialize, TlsSize)]
pub(crate) struct Mac(VLBytes);

impl Mac {
    /// HMAC over `message` keyed with `key`. HKDF-Extract is exactly that
    /// HMAC with the salt as key, so it is computed through the provider's
    /// extract.
    pub(crate) fn new(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        key: &Secret,
        message: &[u8],
    ) -> Result<Self, CryptoError> {
        let tag = key.hkdf_extract(crypto, ciphersuite, &Secret::from_slice(message))?;
        Ok(Mac(tag.as_slice().into()))
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }

    #[cfg(test)]
    pub(crate) fn flip_last_byte(&mut self) {
        let mut bytes = self.0.as_slice().to_vec();
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xff;
        }
        self.0 = bytes.into();
    }
}

impl PartialEq for Mac {
    fn eq(&self, other: &Mac) -> bool {
        equal_ct(self.as_slice(), other.as_slice())
    }
}

impl Eq for Mac {}
