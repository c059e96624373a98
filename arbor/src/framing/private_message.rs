//! Private messages.
//!
//! ```text
//! struct {
//!     opaque group_id<V>;
//!     uint64 epoch;
//!     ContentType content_type;
//!     opaque authenticated_data<V>;
//!     opaque encrypted_sender_data<V>;
//!     opaque ciphertext<V>;
//! } PrivateMessage;
//!
//! struct {
//!     select (PrivateMessage.content_type) {
//!         case application:
//!           opaque application_data<V>;
//!         case proposal:
//!           Proposal proposal;
//!         case commit:
//!           Commit commit;
//!     };
//!
//!     FramedContentAuthData auth;
//!     opaque padding[length_of_padding];
//! } PrivateMessageContent;
//! ```

use arbor_traits::{crypto::ArborCrypto, random::ArborRand};
use tls_codec::{
    Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size, TlsDeserialize,
    TlsSerialize, TlsSize, VLByteSlice, VLBytes,
};

use super::{
    content::{AuthenticatedContent, FramedContent, FramedContentAuthData, FramedContentBody},
    errors::{MessageDecryptionError, MessageEncryptionError},
    ContentType, Sender, WireFormat,
};
use crate::{
    binary_tree::LeafNodeIndex,
    ciphersuite::{AeadKey, AeadNonce, Ciphersuite, ConsumedSecrets, ReuseGuard},
    error::LibraryError,
    group::{GroupEpoch, GroupId, PaddingConfig},
    schedule::SenderDataSecret,
    tree::{
        secret_tree::{SecretTree, SecretType},
        sender_ratchet::SenderRatchetConfiguration,
    },
};

/// An encrypted message.
#[derive(Debug, PartialEq, Eq, Clone, TlsSerialize, TlsDeserialize, TlsSize)]
pub struct PrivateMessage {
    group_id: GroupId,
    epoch: GroupEpoch,
    content_type: ContentType,
    authenticated_data: VLBytes,
    encrypted_sender_data: VLBytes,
    ciphertext: VLBytes,
}

/// ```text
/// struct {
///     uint32 leaf_index;
///     uint32 generation;
///     opaque reuse_guard[4];
/// } SenderData;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TlsSerialize, TlsDeserialize, TlsSize)]
pub(crate) struct SenderData {
    pub(crate) leaf_index: LeafNodeIndex,
    pub(crate) generation: u32,
    pub(crate) reuse_guard: ReuseGuard,
}

/// ```text
/// struct {
///     opaque group_id<V>;
///     uint64 epoch;
///     ContentType content_type;
/// } SenderDataAAD;
/// ```
#[derive(TlsSerialize, TlsSize)]
struct SenderDataAad {
    group_id: GroupId,
    epoch: GroupEpoch,
    content_type: ContentType,
}

/// ```text
/// struct {
///     opaque group_id<V>;
///     uint64 epoch;
///     ContentType content_type;
///     opaque authenticated_data<V>;
/// } PrivateContentAAD;
/// ```
#[derive(TlsSerialize, TlsSize)]
struct PrivateContentAad<'a> {
    group_id: GroupId,
    epoch: GroupEpoch,
    content_type: ContentType,
    authenticated_data: VLByteSlice<'a>,
}

/// The number of zero bytes appended to a plaintext of `plaintext_length`
/// bytes.
fn padding_length(
    padding: PaddingConfig,
    plaintext_length: usize,
) -> Result<usize, MessageEncryptionError> {
    match padding {
        PaddingConfig::None => Ok(0),
        PaddingConfig::PadUntilLength(length) => Ok(length.saturating_sub(plaintext_length)),
        PaddingConfig::AlwaysPad(length) => length
            .checked_sub(plaintext_length)
            .ok_or(MessageEncryptionError::PayloadTooLarge),
    }
}

impl PrivateMessage {
    /// Encrypt `authenticated_content` with the next key of the own sender
    /// ratchet. The used ratchet secret is moved into `consumed`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn encrypt(
        crypto: &impl ArborCrypto,
        rand: &impl ArborRand,
        authenticated_content: &AuthenticatedContent,
        ciphersuite: Ciphersuite,
        secret_tree: &mut SecretTree,
        sender_data_secret: &SenderDataSecret,
        padding: PaddingConfig,
        consumed: &mut ConsumedSecrets,
    ) -> Result<Self, MessageEncryptionError> {
        log::debug!("PrivateMessage::encrypt with {ciphersuite}");
        if authenticated_content.wire_format() != WireFormat::PrivateMessage {
            return Err(LibraryError::custom("Wrong wire format for a private message.").into());
        }
        let content = authenticated_content.content();
        let sender_index = content
            .sender()
            .as_member()
            .ok_or(MessageEncryptionError::SenderNotAMember)?;
        let content_type = content.content_type();

        let content_aad = PrivateContentAad {
            group_id: content.group_id().clone(),
            epoch: content.epoch(),
            content_type,
            authenticated_data: VLByteSlice(content.authenticated_data()),
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;

        let (generation, (ratchet_key, mut ratchet_nonce)) = secret_tree.secret_for_encryption(
            ciphersuite,
            crypto,
            SecretType::from(content_type),
            consumed,
        )?;
        let reuse_guard =
            ReuseGuard::try_from_random(rand).map_err(LibraryError::unexpected_crypto_error)?;
        ratchet_nonce.xor_with_reuse_guard(&reuse_guard);

        let plaintext = Self::encode_padded_content(authenticated_content, padding)?;
        log_crypto!(trace, "Encryption key for private message: {ratchet_key:x?}");
        log_content!(trace, "Private message plaintext: {plaintext:x?}");
        let ciphertext = ratchet_key
            .aead_seal(crypto, &plaintext, &content_aad, &ratchet_nonce)
            .map_err(LibraryError::unexpected_crypto_error)?;

        let (sender_data_key, sender_data_nonce) =
            Self::sender_data_key_nonce(crypto, ciphersuite, sender_data_secret, &ciphertext)?;
        let sender_data_aad = SenderDataAad {
            group_id: content.group_id().clone(),
            epoch: content.epoch(),
            content_type,
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
        let sender_data = SenderData {
            leaf_index: sender_index,
            generation,
            reuse_guard,
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
        let encrypted_sender_data = sender_data_key
            .aead_seal(crypto, &sender_data, &sender_data_aad, &sender_data_nonce)
            .map_err(LibraryError::unexpected_crypto_error)?;

        Ok(PrivateMessage {
            group_id: content.group_id().clone(),
            epoch: content.epoch(),
            content_type,
            authenticated_data: content.authenticated_data().into(),
            encrypted_sender_data: encrypted_sender_data.into(),
            ciphertext: ciphertext.into(),
        })
    }

    /// Encode `PrivateMessageContent` including the padding.
    fn encode_padded_content(
        authenticated_content: &AuthenticatedContent,
        padding: PaddingConfig,
    ) -> Result<Vec<u8>, MessageEncryptionError> {
        let body = &authenticated_content.content().body;
        let plaintext_length =
            body.serialized_len_without_type() + authenticated_content.auth.tls_serialized_len();
        let padding_length = padding_length(padding, plaintext_length)?;

        let mut buffer = Vec::with_capacity(plaintext_length + padding_length);
        body.serialize_without_type(&mut buffer)
            .map_err(LibraryError::missing_bound_check)?;
        authenticated_content
            .auth
            .tls_serialize(&mut buffer)
            .map_err(LibraryError::missing_bound_check)?;
        buffer.resize(plaintext_length + padding_length, 0u8);
        Ok(buffer)
    }

    fn sender_data_key_nonce(
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        sender_data_secret: &SenderDataSecret,
        ciphertext: &[u8],
    ) -> Result<(AeadKey, AeadNonce), LibraryError> {
        let key = sender_data_secret
            .derive_aead_key(crypto, ciphersuite, ciphertext)
            .map_err(LibraryError::unexpected_crypto_error)?;
        let nonce = sender_data_secret
            .derive_aead_nonce(crypto, ciphersuite, ciphertext)
            .map_err(LibraryError::unexpected_crypto_error)?;
        Ok((key, nonce))
    }

    /// The group the message belongs to.
    pub fn group_id(&self) -> &GroupId {
        &self.group_id
    }

    /// The epoch the message was sent in.
    pub fn epoch(&self) -> GroupEpoch {
        self.epoch
    }

    /// The content type of the encrypted content.
    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    /// Decrypt the sender data.
    pub(crate) fn sender_data(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        sender_data_secret: &SenderDataSecret,
    ) -> Result<SenderData, MessageDecryptionError> {
        log::debug!("Decrypting sender data");
        let (sender_data_key, sender_data_nonce) = Self::sender_data_key_nonce(
            crypto,
            ciphersuite,
            sender_data_secret,
            self.ciphertext.as_slice(),
        )?;
        let sender_data_aad = SenderDataAad {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            content_type: self.content_type,
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
        let sender_data_bytes = sender_data_key
            .aead_open(
                crypto,
                self.encrypted_sender_data.as_slice(),
                &sender_data_aad,
                &sender_data_nonce,
            )
            .map_err(|_| {
                log::error!("Sender data decryption error");
                MessageDecryptionError::SenderDataDecryptionError
            })?;
        SenderData::tls_deserialize_exact(&sender_data_bytes)
            .map_err(|_| MessageDecryptionError::MalformedContent)
    }

    /// Decrypt the content with the key of the sender and generation given in
    /// `sender_data`. Ratchet secrets used on the way are moved into
    /// `consumed`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn decrypt(
        &self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        sender_data: &SenderData,
        secret_tree: &mut SecretTree,
        configuration: &SenderRatchetConfiguration,
        consumed: &mut ConsumedSecrets,
    ) -> Result<AuthenticatedContent, MessageDecryptionError> {
        let (ratchet_key, mut ratchet_nonce) = secret_tree.secret_for_decryption(
            ciphersuite,
            crypto,
            sender_data.leaf_index,
            SecretType::from(self.content_type),
            sender_data.generation,
            configuration,
            consumed,
        )?;
        ratchet_nonce.xor_with_reuse_guard(&sender_data.reuse_guard);

        let content_aad = PrivateContentAad {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            content_type: self.content_type,
            authenticated_data: VLByteSlice(self.authenticated_data.as_slice()),
        }
        .tls_serialize_detached()
        .map_err(LibraryError::missing_bound_check)?;
        log_crypto!(trace, "Decryption key for private message: {ratchet_key:x?}");
        let plaintext = ratchet_key
            .aead_open(crypto, self.ciphertext.as_slice(), &content_aad, &ratchet_nonce)
            .map_err(|_| {
                log::error!("  Ciphertext decryption error");
                MessageDecryptionError::AeadError
            })?;
        log_content!(trace, "Private message plaintext: {plaintext:x?}");

        let reader = &mut plaintext.as_slice();
        let body = FramedContentBody::deserialize_without_type(reader, self.content_type)
            .map_err(MessageDecryptionError::CodecError)?;
        let auth = FramedContentAuthData::deserialize(reader, self.content_type)
            .map_err(MessageDecryptionError::CodecError)?;
        if reader.iter().any(|byte| *byte != 0x00) {
            log::error!("Private message padding is not all zero.");
            return Err(MessageDecryptionError::NonZeroPadding);
        }

        let content = FramedContent {
            group_id: self.group_id.clone(),
            epoch: self.epoch,
            sender: Sender::Member(sender_data.leaf_index),
            authenticated_data: self.authenticated_data.clone(),
            body,
        };
        Ok(AuthenticatedContent::from_parts(
            WireFormat::PrivateMessage,
            content,
            auth,
        ))
    }

    #[cfg(test)]
    pub(crate) fn ciphertext_mut(&mut self) -> &mut VLBytes {
        &mut self.ciphertext
    }

    #[cfg(test)]
    pub(crate) fn ciphertext(&self) -> &[u8] {
        self.ciphertext.as_slice()
    }
}
