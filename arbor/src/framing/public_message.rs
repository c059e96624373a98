//! Public messages.
//!
//! ```text
//! struct {
//!     FramedContent content;
//!     FramedContentAuthData auth;
//!     select (PublicMessage.content.sender.sender_type) {
//!         case member:
//!             MAC membership_tag;
//!         case external:
//!         case new_member_commit:
//!         case new_member_proposal:
//!             struct{};
//!     };
//! } PublicMessage;
//!
//! struct {
//!   FramedContentTBS content_tbs;
//!   FramedContentAuthData auth;
//! } AuthenticatedContentTBM;
//! ```

use std::io::{Read, Write};

use arbor_traits::crypto::ArborCrypto;
use tls_codec::{Deserialize as TlsDeserializeTrait, Serialize as TlsSerializeTrait, Size};

use super::{
    content::{framed_content_tbs, AuthenticatedContent, FramedContent, FramedContentAuthData},
    ContentType, Sender, WireFormat,
};
use crate::{
    ciphersuite::{Ciphersuite, Mac},
    error::{ArborError, LibraryError, ValidationError},
    group::{GroupContext, GroupEpoch, GroupId},
    schedule::MembershipKey,
};

/// A signed message that is sent in the clear.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublicMessage {
    content: FramedContent,
    auth: FramedContentAuthData,
    membership_tag: Option<Mac>,
}

impl From<AuthenticatedContent> for PublicMessage {
    fn from(authenticated_content: AuthenticatedContent) -> Self {
        Self {
            content: authenticated_content.content,
            auth: authenticated_content.auth,
            membership_tag: None,
        }
    }
}

impl PublicMessage {
    /// The group the message belongs to.
    pub fn group_id(&self) -> &GroupId {
        &self.content.group_id
    }

    /// The epoch the message was sent in.
    pub fn epoch(&self) -> GroupEpoch {
        self.content.epoch
    }

    /// The sender of the message.
    pub fn sender(&self) -> &Sender {
        &self.content.sender
    }

    /// The content type of the message.
    pub fn content_type(&self) -> ContentType {
        self.content.content_type()
    }

    /// `AuthenticatedContentTBM` for this message in the given context.
    fn tbm(&self, serialized_context: &[u8]) -> Result<Vec<u8>, tls_codec::Error> {
        let mut tbm = framed_content_tbs(
            WireFormat::PublicMessage,
            &self.content,
            Some(serialized_context),
        )?;
        self.auth.tls_serialize(&mut tbm)?;
        Ok(tbm)
    }

    /// Compute and set the membership tag. Only members have one.
    pub(crate) fn set_membership_tag(
        &mut self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        membership_key: &MembershipKey,
        group_context: &GroupContext,
    ) -> Result<(), LibraryError> {
        if !self.content.sender.is_member() {
            return Ok(());
        }
        let serialized_context = group_context
            .tls_serialize_detached()
            .map_err(LibraryError::missing_bound_check)?;
        let tbm = self
            .tbm(&serialized_context)
            .map_err(LibraryError::missing_bound_check)?;
        self.membership_tag = Some(
            membership_key
                .tag(crypto, ciphersuite, &tbm)
                .map_err(LibraryError::unexpected_crypto_error)?,
        );
        Ok(())
    }

    /// Check the membership tag of a member's message and turn it into
    /// authenticated content. The signature is checked later, once the
    /// sender's key is known.
    pub(crate) fn into_authenticated_content(
        self,
        crypto: &impl ArborCrypto,
        ciphersuite: Ciphersuite,
        membership_key: &MembershipKey,
        group_context: &GroupContext,
    ) -> Result<AuthenticatedContent, ArborError> {
        if self.content.sender.is_member() {
            let serialized_context = group_context
                .tls_serialize_detached()
                .map_err(LibraryError::missing_bound_check)?;
            let tbm = self
                .tbm(&serialized_context)
                .map_err(LibraryError::missing_bound_check)?;
            let expected = membership_key
                .tag(crypto, ciphersuite, &tbm)
                .map_err(LibraryError::unexpected_crypto_error)?;
            match &self.membership_tag {
                Some(membership_tag) if membership_tag == &expected => {}
                _ => {
                    log::error!("Membership tag verification failed.");
                    return Err(ValidationError::InvalidMembershipTag.into());
                }
            }
        }
        Ok(AuthenticatedContent::from_parts(
            WireFormat::PublicMessage,
            self.content,
            self.auth,
        ))
    }

    #[cfg(test)]
    pub(crate) fn invalidate_membership_tag(&mut self) {
        if let Some(membership_tag) = &mut self.membership_tag {
            membership_tag.flip_last_byte();
        }
    }
}

impl Size for PublicMessage {
    fn tls_serialized_len(&self) -> usize {
        self.content.tls_serialized_len()
            + self.auth.tls_serialized_len()
            + self
                .membership_tag
                .as_ref()
                .map(|tag| tag.tls_serialized_len())
                .unwrap_or(0)
    }
}

impl TlsSerializeTrait for PublicMessage {
    fn tls_serialize<W: Write>(&self, writer: &mut W) -> Result<usize, tls_codec::Error> {
        let mut written = self.content.tls_serialize(writer)?;
        written += self.auth.tls_serialize(writer)?;
        if self.content.sender.is_member() {
            let membership_tag = self.membership_tag.as_ref().ok_or_else(|| {
                tls_codec::Error::EncodingError("Missing membership tag.".into())
            })?;
            written += membership_tag.tls_serialize(writer)?;
        }
        Ok(written)
    }
}

impl TlsDeserializeTrait for PublicMessage {
    fn tls_deserialize<R: Read>(bytes: &mut R) -> Result<Self, tls_codec::Error> {
        let content = FramedContent::tls_deserialize(bytes)?;
        let auth = FramedContentAuthData::deserialize(bytes, content.content_type())?;
        let membership_tag = if content.sender.is_member() {
            Some(Mac::tls_deserialize(bytes)?)
        } else {
            None
        };
        Ok(Self {
            content,
            auth,
            membership_tag,
        })
    }
}
